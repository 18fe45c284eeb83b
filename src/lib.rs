// Core modules
pub mod common;
pub mod core;
pub mod service;
pub mod server;
pub mod cli;

// Re-export commonly used types
pub use crate::common::{Config, Paths, Result, ServiceError};
pub use crate::core::{Credential, Session, SessionOutcome, SessionState};
pub use crate::service::{
    protocol, ClientSettings, MultiPortAddrs, MultiPortClient, ServiceKind, ServiceRequest,
    ServiceResponse, Services, SessionClient,
};
pub use crate::server::{MultiPortServer, SessionServer, ShutdownSignal};

/// Console logging shared by the binaries: verbose with source locations in
/// dev mode, default formatting otherwise.
pub fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .init();
    }
}
