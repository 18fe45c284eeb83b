use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use crate::common::error::{Result, ServiceError};
use crate::core::auth::Credential;
use crate::service::protocol::CREDENTIAL_FIELD_LEN;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub credential: Credential,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub multi_port: MultiPortConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_session_port")]
    pub port: u16,
}

fn default_bind_address() -> String { "0.0.0.0".to_string() }
fn default_session_port() -> u16 { 6000 }

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_session_port(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MultiPortConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_auth_port")]
    pub auth_port: u16,
    #[serde(default = "default_clock_port")]
    pub clock_port: u16,
    #[serde(default = "default_list_port")]
    pub list_port: u16,
    #[serde(default = "default_read_port")]
    pub read_port: u16,
    #[serde(default = "default_duration_port")]
    pub duration_port: u16,
}

fn default_auth_port() -> u16 { 6001 }
fn default_clock_port() -> u16 { 6002 }
fn default_list_port() -> u16 { 6003 }
fn default_read_port() -> u16 { 6004 }
fn default_duration_port() -> u16 { 6005 }

impl Default for MultiPortConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            auth_port: default_auth_port(),
            clock_port: default_clock_port(),
            list_port: default_list_port(),
            read_port: default_read_port(),
            duration_port: default_duration_port(),
        }
    }
}

impl MultiPortConfig {
    /// Ports in listener order: auth, clock, list, read, duration.
    pub fn ports(&self) -> [u16; 5] {
        [self.auth_port, self.clock_port, self.list_port, self.read_port, self.duration_port]
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LimitsConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
}

fn default_max_connections() -> usize { 64 }
// Also how long an interactive client may idle at its menu
fn default_read_timeout() -> u64 { 300 }
fn default_write_timeout() -> u64 { 10 }

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
        }
    }
}

impl LimitsConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct ProtocolConfig {
    /// Put a one-byte success flag before every service response.
    #[serde(default)]
    pub status_prefix: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credential: Credential::new("admin", "admin123"),
            session: SessionConfig::default(),
            multi_port: MultiPortConfig::default(),
            limits: LimitsConfig::default(),
            protocol: ProtocolConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ServiceError::Config(format!(
                "Config file not found: {}", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| ServiceError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Credentials travel in fixed-size fields
        if self.credential.username.is_empty() {
            return Err(ServiceError::Config("Username must not be empty".into()));
        }
        if self.credential.username.len() > CREDENTIAL_FIELD_LEN {
            return Err(ServiceError::Config(format!(
                "Username must be at most {} bytes, got {}",
                CREDENTIAL_FIELD_LEN, self.credential.username.len()
            )));
        }
        if self.credential.password.len() > CREDENTIAL_FIELD_LEN {
            return Err(ServiceError::Config(format!(
                "Password must be at most {} bytes, got {}",
                CREDENTIAL_FIELD_LEN, self.credential.password.len()
            )));
        }

        if self.limits.max_connections == 0 {
            return Err(ServiceError::Config("max_connections must be at least 1".into()));
        }
        for (name, secs) in [
            ("read_timeout_secs", self.limits.read_timeout_secs),
            ("write_timeout_secs", self.limits.write_timeout_secs),
        ] {
            if !(1..=3600).contains(&secs) {
                return Err(ServiceError::Config(format!(
                    "{} must be between 1 and 3600, got {}", name, secs
                )));
            }
        }

        // Port 0 means "any free port" and may repeat
        let ports = self.multi_port.ports();
        for (i, port) in ports.iter().enumerate() {
            if *port != 0 && ports[i + 1..].contains(port) {
                return Err(ServiceError::Config(format!(
                    "Multi-port services must use distinct ports, {} is used twice", port
                )));
            }
        }

        self.session_addr()?;
        self.multi_port_ip()?;
        Ok(())
    }

    pub fn session_addr(&self) -> Result<SocketAddr> {
        let ip = parse_ip(&self.session.bind_address)?;
        Ok(SocketAddr::new(ip, self.session.port))
    }

    pub fn multi_port_ip(&self) -> Result<IpAddr> {
        parse_ip(&self.multi_port.bind_address)
    }
}

fn parse_ip(address: &str) -> Result<IpAddr> {
    address.parse().map_err(|_| {
        ServiceError::Config(format!("Invalid bind address: {}", address))
    })
}
