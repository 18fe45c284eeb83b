pub mod acceptor;
pub mod multiport;
pub mod session;
pub mod shutdown;

pub use acceptor::Acceptor;
pub use multiport::MultiPortServer;
pub use session::SessionServer;
pub use shutdown::ShutdownSignal;
