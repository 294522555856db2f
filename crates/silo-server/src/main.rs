//! Silo - S3-compatible object storage server

use clap::Parser;
use silo_core::config::SiloConfig;
use silo_s3_api::S3Server;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "silo")]
#[command(version = silo_core::VERSION)]
#[command(about = "S3-compatible object storage server", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Bind address
    #[arg(long, env = "SILO_BIND_ADDRESS")]
    bind: Option<String>,

    /// Port number
    #[arg(short, long, env = "SILO_PORT")]
    port: Option<u16>,

    /// Data directory
    #[arg(long, env = "SILO_DATA_DIR")]
    data_dir: Option<String>,

    /// Metadata database URL
    #[arg(long, env = "SILO_DATABASE_URL")]
    database_url: Option<String>,

    /// Access key
    #[arg(long, env = "SILO_ACCESS_KEY")]
    access_key: Option<String>,

    /// Secret key
    #[arg(long, env = "SILO_SECRET_KEY")]
    secret_key: Option<String>,

    /// Disable request authentication
    #[arg(long)]
    no_auth: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SILO_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    let mut config = match &cli.config {
        Some(path) => SiloConfig::from_file(path)?,
        None => SiloConfig::from_env(),
    };

    // CLI flags win over file and environment
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir.into();
    }
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if let Some(access_key) = cli.access_key {
        config.auth.access_key = access_key;
    }
    if let Some(secret_key) = cli.secret_key {
        config.auth.secret_key = secret_key;
    }
    if cli.no_auth {
        config.auth.enabled = false;
    }

    info!(
        "Starting silo {} (data dir {:?})",
        silo_core::VERSION, config.storage.data_dir
    );

    S3Server::new(config).run().await?;
    Ok(())
}
