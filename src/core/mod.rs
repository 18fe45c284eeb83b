pub mod auth;
pub mod handlers;
pub mod session;

pub use auth::{authenticate, login, Credential};
pub use handlers::{handle, ERR_DIRECTORY, ERR_FILE};
pub use session::{Session, SessionOutcome, SessionState};
