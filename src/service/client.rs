use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use anyhow::Context as _;
use chrono::Utc;
use crate::common::config::{Config, MultiPortConfig, ProtocolConfig};
use crate::common::error::{Result, ServiceError};
use crate::core::auth::login;
use crate::service::protocol::{
    write_i32, ServiceKind, ServiceRequest, ServiceResponse, SELECTOR_QUIT,
};

/// Socket timeouts and wire options a client connects with.
#[derive(Debug, Clone, Copy)]
pub struct ClientSettings {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub protocol: ProtocolConfig,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            protocol: ProtocolConfig::default(),
        }
    }
}

impl ClientSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            read_timeout: config.limits.read_timeout(),
            write_timeout: config.limits.write_timeout(),
            protocol: config.protocol,
        }
    }
}

/// Anything that can answer the four services.
pub trait Services {
    fn call(&mut self, request: &ServiceRequest) -> Result<ServiceResponse>;

    /// Unix seconds the client considers its session to have started.
    fn session_start(&self) -> i64;

    fn elapsed_request(&self) -> ServiceRequest {
        ServiceRequest::ElapsedSince { start: self.session_start() }
    }
}

fn connect(addr: SocketAddr, settings: &ClientSettings) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr)
        .with_context(|| format!("Failed to connect to {}", addr))?;
    stream.set_read_timeout(Some(settings.read_timeout))?;
    stream.set_write_timeout(Some(settings.write_timeout))?;
    Ok(stream)
}

// Servers bind IPv4 by default, so `localhost` should not land on ::1
fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve {}:{}", host, port))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| ServiceError::Other(anyhow::anyhow!("No address for {}:{}", host, port)))
}

/// A persistent connection to the session server.
pub struct SessionClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    settings: ClientSettings,
    session_start: i64,
    authenticated: bool,
}

impl SessionClient {
    pub fn connect(host: &str, port: u16, settings: ClientSettings) -> Result<Self> {
        Self::connect_addr(resolve(host, port)?, settings)
    }

    pub fn connect_addr(addr: SocketAddr, settings: ClientSettings) -> Result<Self> {
        let writer = connect(addr, &settings)?;
        let reader = BufReader::new(writer.try_clone()?);
        tracing::debug!("Connected to session server at {}", addr);

        Ok(Self {
            reader,
            writer,
            settings,
            session_start: Utc::now().timestamp(),
            authenticated: false,
        })
    }

    /// Connect and authenticate; wrong credentials are an `AuthRejected` error.
    pub fn login(addr: SocketAddr, username: &str, password: &str, settings: ClientSettings) -> Result<Self> {
        let mut client = Self::connect_addr(addr, settings)?;
        if !client.authenticate(username, password)? {
            return Err(ServiceError::AuthRejected(username.to_string()));
        }
        Ok(client)
    }

    pub fn authenticate(&mut self, username: &str, password: &str) -> Result<bool> {
        self.authenticated = login(&mut self.reader, &mut self.writer, username, password)?;
        Ok(self.authenticated)
    }

    /// Send any selector, valid or not, and read the one response.
    pub fn call_raw(&mut self, selector: i32) -> Result<ServiceResponse> {
        if !self.authenticated {
            return Err(ServiceError::NotAuthenticated);
        }
        write_i32(&mut self.writer, selector)?;
        self.writer.flush()?;
        Ok(ServiceResponse::read_from(&mut self.reader, self.settings.protocol)?)
    }

    /// Send the quit selector and close the connection.
    pub fn quit(mut self) -> Result<()> {
        write_i32(&mut self.writer, SELECTOR_QUIT)?;
        self.writer.flush()?;
        // The server may already be gone; nothing left to report
        let _ = self.writer.shutdown(Shutdown::Both);
        Ok(())
    }
}

impl Services for SessionClient {
    fn call(&mut self, request: &ServiceRequest) -> Result<ServiceResponse> {
        if !self.authenticated {
            return Err(ServiceError::NotAuthenticated);
        }
        write_i32(&mut self.writer, request.kind().selector())?;
        request.write_payload(&mut self.writer)?;
        self.writer.flush()?;
        Ok(ServiceResponse::read_from(&mut self.reader, self.settings.protocol)?)
    }

    fn session_start(&self) -> i64 {
        self.session_start
    }
}

/// Addresses of the five listeners of a multi-port server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiPortAddrs {
    pub auth: SocketAddr,
    pub clock: SocketAddr,
    pub list: SocketAddr,
    pub read: SocketAddr,
    pub duration: SocketAddr,
}

impl MultiPortAddrs {
    pub fn resolve(host: &str, ports: &MultiPortConfig) -> Result<Self> {
        Ok(Self {
            auth: resolve(host, ports.auth_port)?,
            clock: resolve(host, ports.clock_port)?,
            list: resolve(host, ports.list_port)?,
            read: resolve(host, ports.read_port)?,
            duration: resolve(host, ports.duration_port)?,
        })
    }

    pub fn for_service(&self, kind: ServiceKind) -> SocketAddr {
        match kind {
            ServiceKind::Clock => self.clock,
            ServiceKind::ListDirectory => self.list,
            ServiceKind::ReadFile => self.read,
            ServiceKind::ElapsedSince => self.duration,
        }
    }
}

/// Client for the multi-port topology: one short connection per call.
pub struct MultiPortClient {
    addrs: MultiPortAddrs,
    settings: ClientSettings,
    session_start: Option<i64>,
}

impl MultiPortClient {
    pub fn new(addrs: MultiPortAddrs, settings: ClientSettings) -> Self {
        Self {
            addrs,
            settings,
            session_start: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_start.is_some()
    }

    /// On success the session clock starts now. A rejection, or any error
    /// during the exchange, drops an earlier session.
    pub fn authenticate(&mut self, username: &str, password: &str) -> Result<bool> {
        self.session_start = None;

        let mut stream = connect(self.addrs.auth, &self.settings)?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let accepted = login(&mut reader, &mut stream, username, password)?;

        if accepted {
            self.session_start = Some(Utc::now().timestamp());
        }
        Ok(accepted)
    }
}

impl Services for MultiPortClient {
    fn call(&mut self, request: &ServiceRequest) -> Result<ServiceResponse> {
        if self.session_start.is_none() {
            return Err(ServiceError::NotAuthenticated);
        }

        let mut stream = connect(self.addrs.for_service(request.kind()), &self.settings)?;
        request.write_payload(&mut stream)?;
        stream.flush()?;

        let mut reader = BufReader::new(stream);
        Ok(ServiceResponse::read_from(&mut reader, self.settings.protocol)?)
    }

    fn session_start(&self) -> i64 {
        self.session_start.unwrap_or_else(|| Utc::now().timestamp())
    }
}
