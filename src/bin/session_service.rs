use anyhow::{Context as _, Result};
use clap::Parser;
use multiservice::{setup_logging, Credential, Paths, SessionServer, ShutdownSignal};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "msvc-session")]
#[command(about = "Multi-service TCP server: one authenticated session per connection")]
struct Args {
    /// Accepted username (overrides the config file)
    #[arg(requires = "password")]
    username: Option<String>,

    /// Accepted password (overrides the config file)
    password: Option<String>,

    /// Listening port
    #[arg(long)]
    port: Option<u16>,

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
    if let Some(port) = args.port {
        config.session.port = port;
    }
    if let Some(bind) = args.bind {
        config.session.bind_address = bind;
    }
    config.validate()?;

    tracing::info!(
        "Starting session server (user: {}, max connections: {})",
        config.credential.username,
        config.limits.max_connections
    );

    let shutdown = ShutdownSignal::new();
    let server = SessionServer::bind(&config, &shutdown)?;
    shutdown.install_ctrlc_handler()?;

    server.run()?;
    tracing::info!("Server stopped");
    Ok(())
}
