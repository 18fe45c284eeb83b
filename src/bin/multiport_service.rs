use anyhow::{Context as _, Result};
use clap::Parser;
use multiservice::{setup_logging, Credential, MultiPortServer, Paths, ShutdownSignal};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "msvc-multiport")]
#[command(about = "Multi-service TCP server: one port per service, one request per connection")]
struct Args {
    /// Accepted username (overrides the config file)
    #[arg(requires = "password")]
    username: Option<String>,

    /// Accepted password (overrides the config file)
    password: Option<String>,

    /// First port; auth, clock, list, read and duration use it and the next four
    #[arg(long)]
    base_port: Option<u16>,

    /// Listening address
    #[arg(long)]
    bind: Option<String>,

    /// Config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run in development mode (local config, debug logging)
    #[arg(long)]
    dev: bool,
}

fn main() -> Result<()> {
    let args = Args::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(if e.use_stderr() { 1 } else { 0 });
    });

    setup_logging(args.dev);

    let mut config = Paths::new(args.dev)
        .load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let (Some(username), Some(password)) = (args.username, args.password) {
        config.credential = Credential::new(username, password);
    }
    if let Some(base) = args.base_port {
        let port = |offset: u16| {
            base.checked_add(offset)
                .with_context(|| format!("Base port {} leaves no room for five services", base))
        };
        config.multi_port.auth_port = port(0)?;
        config.multi_port.clock_port = port(1)?;
        config.multi_port.list_port = port(2)?;
        config.multi_port.read_port = port(3)?;
        config.multi_port.duration_port = port(4)?;
    }
    if let Some(bind) = args.bind {
        config.multi_port.bind_address = bind;
    }
    config.validate()?;

    let shutdown = ShutdownSignal::new();
    let server = MultiPortServer::bind(&config, &shutdown)?;
    let addrs = server.local_addrs()?;
    tracing::info!(
        "Starting multi-port server (user: {}): auth {}, clock {}, list {}, read {}, duration {}",
        config.credential.username,
        addrs.auth.port(),
        addrs.clock.port(),
        addrs.list.port(),
        addrs.read.port(),
        addrs.duration.port()
    );
    shutdown.install_ctrlc_handler()?;

    server.run()?;
    tracing::info!("Server stopped");
    Ok(())
}
