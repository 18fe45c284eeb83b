use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use anyhow::Context as _;
use crate::common::config::{Config, ProtocolConfig};
use crate::common::error::{Result, ServiceError};
use crate::core::auth::{authenticate, Credential};
use crate::core::handlers;
use crate::server::acceptor::Acceptor;
use crate::server::shutdown::ShutdownSignal;
use crate::service::client::MultiPortAddrs;
use crate::service::protocol::{ServiceKind, ServiceRequest};

/// Five independent listeners, one per service plus authentication. Every
/// connection carries exactly one exchange and is then closed.
pub struct MultiPortServer {
    auth: Acceptor,
    services: Vec<(ServiceKind, Acceptor)>,
    credential: Arc<Credential>,
    protocol: ProtocolConfig,
}

impl MultiPortServer {
    pub fn bind(config: &Config, shutdown: &ShutdownSignal) -> Result<Self> {
        let ip = config.multi_port_ip()?;
        let ports = &config.multi_port;
        let limits = &config.limits;

        let auth = Acceptor::bind("auth", SocketAddr::new(ip, ports.auth_port), limits, shutdown)?;
        let mut services = Vec::with_capacity(ServiceKind::ALL.len());
        for (kind, port) in [
            (ServiceKind::Clock, ports.clock_port),
            (ServiceKind::ListDirectory, ports.list_port),
            (ServiceKind::ReadFile, ports.read_port),
            (ServiceKind::ElapsedSince, ports.duration_port),
        ] {
            let acceptor = Acceptor::bind(kind.name(), SocketAddr::new(ip, port), limits, shutdown)?;
            services.push((kind, acceptor));
        }

        Ok(Self {
            auth,
            services,
            credential: Arc::new(config.credential.clone()),
            protocol: config.protocol,
        })
    }

    pub fn local_addrs(&self) -> Result<MultiPortAddrs> {
        let addr_of = |wanted: ServiceKind| -> Result<SocketAddr> {
            self.services
                .iter()
                .find(|(kind, _)| *kind == wanted)
                .map(|(_, acceptor)| acceptor.local_addr())
                .unwrap_or_else(|| Err(ServiceError::Other(anyhow::anyhow!("No {} listener", wanted.name()))))
        };

        Ok(MultiPortAddrs {
            auth: self.auth.local_addr()?,
            clock: addr_of(ServiceKind::Clock)?,
            list: addr_of(ServiceKind::ListDirectory)?,
            read: addr_of(ServiceKind::ReadFile)?,
            duration: addr_of(ServiceKind::ElapsedSince)?,
        })
    }

    /// Run every accept loop on its own thread until shutdown.
    pub fn run(self) -> Result<()> {
        let MultiPortServer { auth, services, credential, protocol } = self;

        let mut listeners = Vec::with_capacity(services.len() + 1);
        listeners.push(spawn_listener(auth, move |stream, peer| {
            serve_auth(stream, peer, &credential)
        })?);
        for (kind, acceptor) in services {
            listeners.push(spawn_listener(acceptor, move |stream, peer| {
                serve_service(kind, stream, peer, protocol)
            })?);
        }

        let mut result = Ok(());
        for listener in listeners {
            let outcome = listener
                .join()
                .unwrap_or_else(|_| Err(ServiceError::Other(anyhow::anyhow!("Listener thread panicked"))));
            if let Err(e) = outcome {
                tracing::error!("Listener failed: {}", e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

fn spawn_listener<F>(acceptor: Acceptor, handler: F) -> Result<JoinHandle<Result<()>>>
where
    F: Fn(TcpStream, SocketAddr) -> Result<()> + Send + Sync + 'static,
{
    let name = acceptor.name();
    let handle = thread::Builder::new()
        .name(format!("{}-listener", name))
        .spawn(move || acceptor.serve(handler))
        .with_context(|| format!("Failed to start {} listener", name))?;
    Ok(handle)
}

/// Credential check only; the client keeps its own session clock.
pub fn serve_auth(stream: TcpStream, peer: SocketAddr, credential: &Credential) -> Result<()> {
    tracing::info!(%peer, "Authentication request");

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = &stream;
    let result = authenticate(&mut reader, &mut writer, credential);
    let _ = stream.shutdown(Shutdown::Both);

    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_disconnect() => {
            tracing::debug!(%peer, "Client left during authentication");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// One request payload in, one response out, then close.
pub fn serve_service(
    kind: ServiceKind,
    stream: TcpStream,
    peer: SocketAddr,
    protocol: ProtocolConfig,
) -> Result<()> {
    let result = exchange(kind, &stream, protocol);
    let _ = stream.shutdown(Shutdown::Both);

    match result {
        Ok(()) => {
            tracing::info!(%peer, service = kind.name(), "Response sent");
            Ok(())
        }
        Err(e) if e.is_disconnect() => {
            tracing::debug!(%peer, service = kind.name(), "Client left before the response");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn exchange(kind: ServiceKind, stream: &TcpStream, protocol: ProtocolConfig) -> Result<()> {
    let mut reader = BufReader::new(stream);
    let request = ServiceRequest::read_payload(kind, &mut reader)?;
    tracing::debug!(service = kind.name(), ?request, "Dispatching request");

    let response = handlers::handle(&request);
    let mut writer = stream;
    response.write_to(&mut writer, protocol)?;
    writer.flush()?;
    Ok(())
}
