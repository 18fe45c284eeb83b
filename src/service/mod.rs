pub mod client;
pub mod protocol;

pub use client::{ClientSettings, MultiPortAddrs, MultiPortClient, Services, SessionClient};
pub use protocol::{Selector, ServiceKind, ServiceRequest, ServiceResponse};
