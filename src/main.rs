use multiservice::{
    cli::{render_response, Menu},
    setup_logging, ClientSettings, MultiPortAddrs, MultiPortClient, Paths, ServiceRequest,
    Services, SessionClient,
};

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "msvc")]
#[command(about = "Client for the multi-service TCP servers")]
struct Cli {
    /// Enable development mode (local config, debug logging)
    #[arg(long, global = true)]
    dev: bool,

    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Login {
    /// Server host name or address
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Username (prompted when missing)
    #[arg(short, long)]
    username: Option<String>,

    /// Password (prompted when missing)
    #[arg(short, long)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive menu over one persistent session
    Session {
        #[command(flatten)]
        login: Login,
        /// Session server port (default from config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Interactive menu against the one-port-per-service server
    MultiPort {
        #[command(flatten)]
        login: Login,
    },
    /// Authenticate, run one service, quit
    Run {
        #[command(flatten)]
        login: Login,
        /// Session server port (default from config)
        #[arg(long)]
        port: Option<u16>,
        #[command(subcommand)]
        service: ServiceCommand,
    },
}

#[derive(Subcommand)]
enum ServiceCommand {
    /// Server date and time
    Clock,
    /// List a directory on the server
    List {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Show the start of a file on the server
    Read { file: PathBuf },
    /// Time since the session started
    Duration,
}

fn main() {
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(if e.use_stderr() { 1 } else { 0 });
    });

    setup_logging(cli.dev);

    if let Err(e) = run(cli) {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Paths::new(cli.dev)
        .load_config(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let settings = ClientSettings::from_config(&config);

    match cli.command {
        Commands::Session { login, port } => {
            let mut client = open_session(&login, port.unwrap_or(config.session.port), settings)?;
            let stdin = io::stdin();
            let sent = Menu::new(stdin.lock(), io::stdout()).run(&mut client)?;
            client.quit()?;
            tracing::debug!("Session closed after {} request(s)", sent);
        }
        Commands::MultiPort { login } => {
            let addrs = MultiPortAddrs::resolve(&login.host, &config.multi_port)?;
            let mut client = MultiPortClient::new(addrs, settings);
            let (username, password) = credentials(&login)?;
            if !client.authenticate(&username, &password)? {
                anyhow::bail!("Échec de l'authentification!");
            }
            println!("✅ Authentification réussie!\n");

            let stdin = io::stdin();
            Menu::new(stdin.lock(), io::stdout()).run(&mut client)?;
        }
        Commands::Run { login, port, service } => {
            let mut client = open_session(&login, port.unwrap_or(config.session.port), settings)?;
            let request = match service {
                ServiceCommand::Clock => ServiceRequest::Clock,
                ServiceCommand::List { path } => ServiceRequest::ListDirectory { path },
                ServiceCommand::Read { file } => ServiceRequest::ReadFile { name: file },
                ServiceCommand::Duration => client.elapsed_request(),
            };
            let response = client.call(&request)?;
            println!("{}", render_response(&response));
            client.quit()?;
        }
    }

    Ok(())
}

fn open_session(login: &Login, port: u16, settings: ClientSettings) -> Result<SessionClient> {
    let mut client = SessionClient::connect(&login.host, port, settings)?;
    println!("Connecté au serveur {}:{}", login.host, port);

    let (username, password) = credentials(login)?;
    if !client.authenticate(&username, &password)? {
        anyhow::bail!("Échec de l'authentification!");
    }
    println!("✅ Authentification réussie!\n");
    Ok(client)
}

fn credentials(login: &Login) -> Result<(String, String)> {
    let username = match &login.username {
        Some(username) => username.clone(),
        None => prompt("Username: ")?,
    };
    let password = match &login.password {
        Some(password) => password.clone(),
        None => prompt("Password: ")?,
    };
    Ok((username, password))
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
