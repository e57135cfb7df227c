//! natprobe CLI
//!
//! STUN-based NAT behavior discovery and binding lifetime estimation.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::Config;
use natprobe_client::{ClientConfig, RetryPolicy, StunClient, TransactionTable};
use natprobe_discovery::{LifetimeConfig, detect_nat, establish_binding, probe_lifetime};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// natprobe - discover how the NAT in front of this host behaves
#[derive(Parser)]
#[command(name = "natprobe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local IPv4 address to bind probe sockets to
    #[arg(short, long)]
    bind: Option<Ipv4Addr>,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the NAT type (mapping and filtering behavior)
    Probe {
        /// STUN server address (host:port)
        server: String,
    },

    /// Estimate the NAT binding lifetime
    Lifetime {
        /// STUN server address (host:port)
        server: String,
    },

    /// Report the public mapping of a local port
    Binding {
        /// STUN server address (host:port)
        server: String,

        /// Local port to bind; picked by the OS if omitted
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load_or_default()?,
    };
    config.validate()?;

    init_logging(&cli, &config)?;

    let bind = cli.bind.unwrap_or(config.client.bind_addr);

    match cli.command {
        Commands::Probe { server } => run_probe(&server, bind, &config).await,
        Commands::Lifetime { server } => run_lifetime(&server, bind, &config).await,
        Commands::Binding { server, port } => run_binding(&server, bind, port, &config).await,
    }
}

fn init_logging(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let log_file = cli.log_file.clone().or_else(|| config.logging.file.clone());

    match log_file {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(level.as_str())
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(level.as_str())
                .init();
        }
    }
    Ok(())
}

/// Resolve a `host:port` string to an IPv4 socket address
fn resolve_server(spec: &str) -> anyhow::Result<SocketAddrV4> {
    let addrs = spec
        .to_socket_addrs()
        .with_context(|| format!("invalid server address '{spec}'"))?;
    for addr in addrs {
        if let SocketAddr::V4(v4) = addr {
            return Ok(v4);
        }
    }
    anyhow::bail!("server '{spec}' did not resolve to an IPv4 address");
}

fn client_config(config: &Config) -> ClientConfig {
    ClientConfig {
        retry: RetryPolicy {
            rto: Duration::from_millis(config.client.rto_ms),
            attempts: config.client.attempts,
        },
        verify_fingerprint: config.client.verify_fingerprint,
        ..ClientConfig::default()
    }
}

async fn run_probe(server: &str, bind: Ipv4Addr, config: &Config) -> anyhow::Result<()> {
    let server = resolve_server(server)?;
    let client = StunClient::bind_with(SocketAddrV4::new(bind, 0), client_config(config))
        .await
        .context("failed to bind probe socket")?;
    tracing::info!(local = %client.local_addr(), %server, "starting NAT classification");

    let classification = detect_nat(&client, server).await?;

    println!("filtering: {}", classification.filtering);
    println!("mapping: {}", classification.mapping);
    println!("nat type: {}", classification.nat_type());

    client.close().await;
    Ok(())
}

async fn run_lifetime(server: &str, bind: Ipv4Addr, config: &Config) -> anyhow::Result<()> {
    let server = resolve_server(server)?;
    println!("estimating the NAT binding lifetime, this may take a while...");

    // The redirected probe reply lands on the first client's socket, so
    // both clients resolve transactions through one shared table.
    let table = Arc::new(TransactionTable::new());
    let settings = client_config(config);
    let x = StunClient::bind_with_table(
        SocketAddrV4::new(bind, 0),
        settings.clone(),
        Arc::clone(&table),
    )
    .await
    .context("failed to bind probe socket")?;
    let y = StunClient::bind_with_table(SocketAddrV4::new(bind, 0), settings, Arc::clone(&table))
        .await
        .context("failed to bind probe socket")?;

    let lifetime_config = LifetimeConfig {
        initial: config.lifetime.initial,
        acceptable_error: config.lifetime.acceptable_error,
        ..LifetimeConfig::default()
    };
    let lifetime = probe_lifetime(&x, &y, server, lifetime_config).await?;

    println!("nat binding lifetime: {lifetime}s");

    x.close().await;
    y.close().await;
    Ok(())
}

async fn run_binding(
    server: &str,
    bind: Ipv4Addr,
    port: Option<u16>,
    config: &Config,
) -> anyhow::Result<()> {
    let server = resolve_server(server)?;
    let client = StunClient::bind_with(
        SocketAddrV4::new(bind, port.unwrap_or(0)),
        client_config(config),
    )
    .await
    .context("failed to bind probe socket")?;

    let mapped = establish_binding(&client, server).await?;

    println!(
        "binding established: {} is mapped to public address {}",
        client.local_addr(),
        mapped
    );
    println!("while the binding stays alive, the public address can be reused to reach this host");

    client.close().await;
    Ok(())
}
