//! CLI entry point. Loads a TOML config, starts a single-peer extraction
//! session, and runs until interrupted.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use tracing_subscriber::EnvFilter;

use extractor_core::{Config, Extractor};
use extractor_store::memory::{InMemoryBlockChainStore, InMemoryTransactionPool, InMemoryTxBus};

#[derive(Parser)]
#[command(name = "extractor", about = "Single-peer Bitcoin P2P blockchain extractor")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, default_value = "extractor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to a peer and extract blocks and mempool transactions.
    Run {
        /// Address of the peer to connect to, e.g. `127.0.0.1:8333`.
        #[arg(long)]
        peer: SocketAddr,
        /// Chain symbol used as a namespace in the store (e.g. `btc`).
        #[arg(long, default_value = "btc")]
        symbol: String,
        /// Skip building an in-memory mempool pool and tx bus.
        #[arg(long)]
        no_mempool: bool,
    },
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn load_config(path: &PathBuf) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    config.validate().context("validating config")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let config = Arc::new(load_config(&cli.config)?);
    init_tracing(&config);

    match cli.command {
        Command::Run {
            peer,
            symbol,
            no_mempool,
        } => run(config, peer, symbol, no_mempool).await,
    }
}

async fn run(config: Arc<Config>, peer: SocketAddr, symbol: String, no_mempool: bool) -> Result<()> {
    let store = Arc::new(InMemoryBlockChainStore::new());
    let (pool, bus) = if no_mempool {
        (None, None)
    } else {
        (
            Some(Arc::new(InMemoryTransactionPool::new()) as Arc<dyn extractor_store::TransactionPool>),
            Some(Arc::new(InMemoryTxBus::new()) as Arc<dyn extractor_store::TxBus>),
        )
    };

    tracing::info!(%peer, %symbol, "starting extractor");
    let extractor = Extractor::start(symbol, peer, config, store, pool, bus)
        .await
        .context("starting extractor")?;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown signal received, draining in-flight work");

    extractor.shutdown().await.context("shutting down extractor")?;
    Ok(())
}
