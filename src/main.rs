//! WolfBlob - Replicated Blob Volume Server
//!
//! Serves needles from local volumes and keeps every replica of a volume
//! in step on each upload and delete.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfblob::api::{AppState, HttpServer};
use wolfblob::config::WolfBlobConfig;
use wolfblob::error::Result;
use wolfblob::network::{HttpPeerTransport, MasterClient};
use wolfblob::storage::MemoryVolumeStore;

/// WolfBlob - Replicated Blob Volume Server
#[derive(Parser)]
#[command(name = "wolfblob")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfblob.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the volume server
    Start,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfblob.toml")]
        output: PathBuf,

        /// Node ID
        #[arg(long, default_value = "volume-1")]
        node_id: String,
    },

    /// Validate configuration file
    Validate,

    /// Show node information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The config file may carry the log settings; a missing file falls back to defaults
    let (level, format) = match WolfBlobConfig::from_file(&cli.config) {
        Ok(config) => (config.logging.level, config.logging.format),
        Err(_) => ("info".to_string(), "pretty".to_string()),
    };
    init_logging(cli.log_level.as_deref().unwrap_or(&level), &format);

    match cli.command {
        Commands::Start => run_start(cli.config).await,
        Commands::Init { output, node_id } => run_init(output, node_id),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Start the volume server
async fn run_start(config_path: PathBuf) -> Result<()> {
    tracing::info!("Starting WolfBlob volume server...");

    let config = match WolfBlobConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };
    tracing::info!("Loaded configuration for node: {}", config.node.id);

    let store = Arc::new(MemoryVolumeStore::new(config.self_url()));
    for volume in &config.volumes {
        store.add_volume(volume.id, volume.replication, volume.read_only).await;
    }

    let directory = Arc::new(MasterClient::new(config.lookup_timeout())?);
    let transport = Arc::new(HttpPeerTransport::new(config.peer_timeout())?);

    let state = AppState::new(
        config.node.id.clone(),
        config.public_url(),
        config.master.address.clone(),
        store,
        directory,
        transport,
    );
    let server = HttpServer::new(config.api.clone(), state);

    tracing::info!(
        "Node {} serving {} volumes, master at {}",
        config.node.id,
        config.volumes.len(),
        config.master.address
    );

    if let Err(e) = server.start().await {
        tracing::error!("Volume server failed: {}", e);
        return Err(e);
    }

    tracing::info!("Volume server stopped");
    Ok(())
}

/// Initialize a new configuration file
fn run_init(output: PathBuf, node_id: String) -> Result<()> {
    let config = WolfBlobConfig::sample(&node_id);
    let content = format!(
        "# WolfBlob Configuration\n# Generated configuration file\n\n{}",
        config.to_toml()?
    );
    std::fs::write(&output, content)?;

    println!("Configuration written to {:?}", output);
    println!("Edit the file to point at your master and list your volumes, then run:");
    println!("  wolfblob --config {:?} start", output);
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfBlobConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!("  Self URL: {}", config.self_url());
            println!("  Master: {}", config.master.address);
            println!("  Volumes: {}", config.volumes.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show node information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = WolfBlobConfig::from_file(&config_path)?;

    println!("WolfBlob Node Information");
    println!("=========================");
    println!();
    println!("Node ID:          {}", config.node.id);
    println!("Self URL:         {}", config.self_url());
    println!("Public URL:       {}", config.public_url());
    println!("API Bind:         {}", config.api.bind_address);
    println!("Upload Limit:     {} MB", config.api.file_size_limit_mb);
    println!();
    println!("Master:");
    println!("  Address:        {}", config.master.address);
    println!("  Lookup Timeout: {} ms", config.master.lookup_timeout_ms);
    println!();
    println!("Replication:");
    println!("  Peer Timeout:   {} ms", config.replication.peer_timeout_ms);
    println!();
    println!("Volumes:");
    for volume in &config.volumes {
        println!(
            "  {:<6} replication {} (copies: {}){}",
            volume.id,
            volume.replication,
            volume.replication.copy_count(),
            if volume.read_only { ", read-only" } else { "" }
        );
    }

    Ok(())
}
