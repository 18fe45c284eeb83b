pub mod config;
pub mod error;
pub mod paths;

pub use config::{Config, LimitsConfig, MultiPortConfig, ProtocolConfig, SessionConfig};
pub use error::{is_disconnect, Result, ServiceError};
pub use paths::{system_config_file, Paths, RunMode};
