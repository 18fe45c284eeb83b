use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication rejected for user: {0}")]
    AuthRejected(String),

    #[error("Not authenticated: call authenticate() first")]
    NotAuthenticated,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// True when the error means the peer went away (closed, reset, or timed out).
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
    )
}

impl ServiceError {
    pub fn is_disconnect(&self) -> bool {
        match self {
            ServiceError::Io(e) => is_disconnect(e),
            _ => false,
        }
    }
}
