//! VaultSync synchronization server.
//!
//! Stores only ciphertexts, public keys, and signatures; it never
//! possesses vault encryption keys or plaintext items.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vaultsync_server::{build_router, cleanup, ServerConfig, Storage};

#[derive(Parser)]
#[command(name = "vaultsync-server", about = "VaultSync zero-knowledge sync server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "vaultsync.toml")]
    config: PathBuf,

    /// Listen address override
    #[arg(short, long)]
    listen: Option<String>,

    /// Database path override
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut cfg = if cli.config.exists() {
        ServerConfig::load(&cli.config)?
    } else {
        tracing::info!("no config file found, using defaults");
        ServerConfig::default()
    };

    if let Some(listen) = cli.listen {
        cfg.listen_addr = listen;
    }
    if let Some(database) = cli.database {
        cfg.storage_path = database;
    }

    tracing::info!("starting vaultsync server on {}", cfg.listen_addr);

    let storage = Storage::open(&cfg.storage_path)?;
    cleanup::spawn_cleanup_task(storage.clone(), &cfg);
    let app = build_router(storage, &cfg);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
