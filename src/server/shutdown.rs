use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use crate::common::error::Result;

const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Stops accept loops. Workers already serving a client are left to finish.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    triggered: AtomicBool,
    listeners: Mutex<Vec<SocketAddr>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    pub(crate) fn register(&self, addr: SocketAddr) {
        match self.inner.listeners.lock() {
            Ok(mut listeners) => listeners.push(addr),
            Err(poisoned) => poisoned.into_inner().push(addr),
        }
    }

    /// Raise the flag, then connect once to every registered listener so a
    /// blocked `accept` returns and sees it.
    pub fn trigger(&self) {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            return;
        }

        let listeners = match self.inner.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for addr in listeners {
            let target = wake_addr(addr);
            if let Err(e) = TcpStream::connect_timeout(&target, WAKE_TIMEOUT) {
                tracing::debug!("Could not wake listener {}: {}", target, e);
            }
        }
    }

    /// Trigger on SIGINT (Ctrl+C).
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            tracing::info!("Shutting down server...");
            signal.trigger();
        })
        .map_err(|e| anyhow::anyhow!("Failed to install Ctrl+C handler: {}", e))?;
        Ok(())
    }
}

// A wildcard bind is reachable through loopback
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port()),
        _ => addr,
    }
}
