use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use crate::common::config::{Config, ProtocolConfig};
use crate::common::error::Result;
use crate::core::auth::Credential;
use crate::core::session::{Session, SessionOutcome};
use crate::server::acceptor::Acceptor;
use crate::server::shutdown::ShutdownSignal;

/// One port, one persistent authenticated session per connection.
pub struct SessionServer {
    acceptor: Acceptor,
    credential: Arc<Credential>,
    protocol: ProtocolConfig,
}

impl SessionServer {
    pub fn bind(config: &Config, shutdown: &ShutdownSignal) -> Result<Self> {
        let acceptor = Acceptor::bind("session", config.session_addr()?, &config.limits, shutdown)?;
        Ok(Self {
            acceptor,
            credential: Arc::new(config.credential.clone()),
            protocol: config.protocol,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.acceptor.local_addr()
    }

    pub fn run(self) -> Result<()> {
        let credential = self.credential;
        let protocol = self.protocol;
        self.acceptor
            .serve(move |stream, peer| serve_session(stream, peer, &credential, protocol))
    }
}

/// Worker body: run the session state machine to completion on `stream`.
pub fn serve_session(
    stream: TcpStream,
    peer: SocketAddr,
    credential: &Credential,
    protocol: ProtocolConfig,
) -> Result<()> {
    tracing::info!(%peer, "New client connected");

    let reader = stream.try_clone()?;
    let mut session = Session::new(reader, &stream);
    let outcome = session.run(credential, protocol);
    let age = session.age();
    let _ = stream.shutdown(Shutdown::Both);

    match outcome? {
        SessionOutcome::Rejected => {
            tracing::info!(%peer, "Connection closed after failed authentication");
        }
        SessionOutcome::Quit { requests } => {
            tracing::info!(%peer, requests, secs = age.as_secs(), "Client quit");
        }
        SessionOutcome::Disconnected { requests } => {
            tracing::info!(%peer, requests, secs = age.as_secs(), "Client disconnected");
        }
    }
    Ok(())
}
