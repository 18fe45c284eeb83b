#![allow(dead_code)]

use multiservice::{ClientSettings, Config, MultiPortAddrs, MultiPortServer, SessionServer, ShutdownSignal};
use std::net::SocketAddr;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "admin123";
pub const CLOCK_PATTERN: &str = r"^Date: \d{2}/\d{2}/\d{4} - Heure: \d{2}:\d{2}:\d{2}$";

pub fn local_config() -> Config {
    let mut config = Config::default();
    config.session.bind_address = "127.0.0.1".into();
    config.session.port = 0;
    config.multi_port.bind_address = "127.0.0.1".into();
    config.multi_port.auth_port = 0;
    config.multi_port.clock_port = 0;
    config.multi_port.list_port = 0;
    config.multi_port.read_port = 0;
    config.multi_port.duration_port = 0;
    config.limits.read_timeout_secs = 5;
    config.limits.write_timeout_secs = 5;
    config
}

pub fn settings(config: &Config) -> ClientSettings {
    ClientSettings {
        read_timeout: Duration::from_secs(5),
        write_timeout: Duration::from_secs(5),
        protocol: config.protocol,
    }
}

pub struct Running<A> {
    pub addr: A,
    pub shutdown: ShutdownSignal,
    handle: JoinHandle<multiservice::Result<()>>,
}

impl<A> Running<A> {
    pub fn stop(self) {
        self.shutdown.trigger();
        self.handle.join().unwrap().unwrap();
    }
}

pub fn start_session_server(config: &Config) -> Running<SocketAddr> {
    let shutdown = ShutdownSignal::new();
    let server = SessionServer::bind(config, &shutdown).unwrap();
    let addr = server.local_addr().unwrap();
    let handle = thread::spawn(move || server.run());
    Running { addr, shutdown, handle }
}

pub fn start_multiport_server(config: &Config) -> Running<MultiPortAddrs> {
    let shutdown = ShutdownSignal::new();
    let server = MultiPortServer::bind(config, &shutdown).unwrap();
    let addr = server.local_addrs().unwrap();
    let handle = thread::spawn(move || server.run());
    Running { addr, shutdown, handle }
}
