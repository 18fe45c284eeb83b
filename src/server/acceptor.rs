use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use anyhow::Context as _;
use crate::common::config::LimitsConfig;
use crate::common::error::Result;
use crate::server::shutdown::ShutdownSignal;

/// One listening socket: accepts on the calling thread and hands every
/// connection to its own worker thread, up to `max_connections` at once.
pub struct Acceptor {
    name: &'static str,
    listener: TcpListener,
    limits: LimitsConfig,
    active: Arc<AtomicUsize>,
    shutdown: ShutdownSignal,
}

impl Acceptor {
    pub fn bind(
        name: &'static str,
        addr: SocketAddr,
        limits: &LimitsConfig,
        shutdown: &ShutdownSignal,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .with_context(|| format!("Failed to bind {} listener on {}", name, addr))?;
        shutdown.register(listener.local_addr()?);

        Ok(Self {
            name,
            listener,
            limits: limits.clone(),
            active: Arc::new(AtomicUsize::new(0)),
            shutdown: shutdown.clone(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until the shutdown signal fires. Handler errors stay inside
    /// their worker.
    pub fn serve<F>(self, handler: F) -> Result<()>
    where
        F: Fn(TcpStream, SocketAddr) -> Result<()> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        tracing::info!(listener = self.name, "Listening on {}", self.local_addr()?);

        let mut failures = 0u32;
        for stream in self.listener.incoming() {
            if self.shutdown.is_triggered() {
                break;
            }
            match stream {
                Ok(stream) => {
                    failures = 0;
                    self.admit(stream, &handler);
                }
                Err(e) => {
                    // Out of descriptors fails every accept until a worker ends
                    failures = failures.saturating_add(1);
                    let pause = accept_backoff(failures);
                    tracing::error!(listener = self.name, failures, "Accept failed: {}, retrying in {:?}", e, pause);
                    thread::sleep(pause);
                }
            }
        }

        tracing::info!(listener = self.name, "Listener stopped");
        Ok(())
    }

    fn admit<F>(&self, stream: TcpStream, handler: &Arc<F>)
    where
        F: Fn(TcpStream, SocketAddr) -> Result<()> + Send + Sync + 'static,
    {
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                tracing::debug!(listener = self.name, "Peer left before setup: {}", e);
                return;
            }
        };

        let Some(slot) = ConnectionSlot::acquire(&self.active, self.limits.max_connections) else {
            tracing::warn!(
                listener = self.name,
                %peer,
                max = self.limits.max_connections,
                "Connection limit reached, closing"
            );
            let _ = stream.shutdown(Shutdown::Both);
            return;
        };

        if let Err(e) = configure_stream(&stream, &self.limits) {
            tracing::warn!(listener = self.name, %peer, "Failed to set socket timeouts: {}", e);
            return;
        }

        let name = self.name;
        let handler = Arc::clone(handler);
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", name, peer))
            .spawn(move || {
                let _slot = slot;
                if let Err(e) = handler(stream, peer) {
                    tracing::error!(listener = name, %peer, "Connection error: {}", e);
                }
            });

        if let Err(e) = spawned {
            tracing::error!(listener = name, %peer, "Failed to spawn worker: {}", e);
        }
    }
}

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause after the `failures`-th accept error in a row: doubles from 10 ms,
/// capped at one second.
fn accept_backoff(failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1u32 << shift)
        .min(ACCEPT_BACKOFF_MAX)
}

fn configure_stream(stream: &TcpStream, limits: &LimitsConfig) -> std::io::Result<()> {
    stream.set_read_timeout(Some(limits.read_timeout()))?;
    stream.set_write_timeout(Some(limits.write_timeout()))?;
    Ok(())
}

/// Counts one live worker; released on drop.
struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| Self { active: Arc::clone(active) })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::sync::mpsc;

    fn limits(max_connections: usize) -> LimitsConfig {
        LimitsConfig {
            max_connections,
            ..LimitsConfig::default()
        }
    }

    #[test]
    fn test_slots_are_bounded_and_released() {
        let active = Arc::new(AtomicUsize::new(0));
        let first = ConnectionSlot::acquire(&active, 2).unwrap();
        let second = ConnectionSlot::acquire(&active, 2).unwrap();
        assert!(ConnectionSlot::acquire(&active, 2).is_none());
        assert_eq!(active.load(Ordering::SeqCst), 2);

        drop(first);
        assert_eq!(active.load(Ordering::SeqCst), 1);
        let third = ConnectionSlot::acquire(&active, 2);
        assert!(third.is_some());
        drop(second);
        drop(third);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_accept_backoff_grows_and_is_capped() {
        assert_eq!(accept_backoff(1), Duration::from_millis(10));
        assert_eq!(accept_backoff(2), Duration::from_millis(20));
        assert_eq!(accept_backoff(4), Duration::from_millis(80));
        assert_eq!(accept_backoff(8), ACCEPT_BACKOFF_MAX);
        assert_eq!(accept_backoff(u32::MAX), ACCEPT_BACKOFF_MAX);
    }

    #[test]
    fn test_each_connection_gets_a_worker() {
        let shutdown = ShutdownSignal::new();
        let acceptor = Acceptor::bind("echo", "127.0.0.1:0".parse().unwrap(), &limits(8), &shutdown).unwrap();
        let addr = acceptor.local_addr().unwrap();
        assert_eq!(acceptor.name(), "echo");

        let server = thread::spawn(move || {
            acceptor.serve(|mut stream, _peer| {
                let mut byte = [0u8; 1];
                stream.read_exact(&mut byte)?;
                stream.write_all(&byte)?;
                Ok(())
            })
        });

        let mut clients: Vec<TcpStream> = (0..3).map(|_| TcpStream::connect(addr).unwrap()).collect();
        for (i, client) in clients.iter_mut().enumerate() {
            client.write_all(&[i as u8]).unwrap();
        }
        for (i, client) in clients.iter_mut().enumerate() {
            let mut byte = [0u8; 1];
            client.read_exact(&mut byte).unwrap();
            assert_eq!(byte[0], i as u8);
        }

        shutdown.trigger();
        server.join().unwrap().unwrap();
    }

    #[test]
    fn test_connection_over_limit_is_closed() {
        let shutdown = ShutdownSignal::new();
        let acceptor = Acceptor::bind("held", "127.0.0.1:0".parse().unwrap(), &limits(1), &shutdown).unwrap();
        let addr = acceptor.local_addr().unwrap();
        let (entered_tx, entered_rx) = mpsc::channel();

        let server = thread::spawn(move || {
            acceptor.serve(move |mut stream, _peer| {
                let _ = entered_tx.send(());
                // Hold the slot until the client hangs up
                let mut buf = [0u8; 16];
                while stream.read(&mut buf)? > 0 {}
                Ok(())
            })
        });

        let first = TcpStream::connect(addr).unwrap();
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let mut second = TcpStream::connect(addr).unwrap();
        second.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 1];
        // Closed by the server without a byte: EOF or reset
        match second.read(&mut buf) {
            Ok(n) => assert_eq!(n, 0),
            Err(e) => assert_ne!(e.kind(), std::io::ErrorKind::WouldBlock),
        }
        assert!(entered_rx.try_recv().is_err());

        drop(first);
        shutdown.trigger();
        server.join().unwrap().unwrap();
    }
}
