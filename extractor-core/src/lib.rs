//! Wires a single peer connection to the ingestion pipeline: catch-up
//! driver, mempool bootstrap, and graceful shutdown.

#[macro_use]
extern crate tracing;

pub mod catchup;
pub mod config;
pub mod error;
pub mod ingest;
pub mod monitor;
pub mod tip;

use std::{
    future::Future,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use extractor_chain::{block, transaction::Transaction};
use extractor_network::{
    peer_session::{PeerConfig, PeerHandlers},
    protocol::external::types::PeerServices,
    Message, PeerSession,
};
use extractor_store::{BlockChainStore, TransactionPool, TxBus};

pub use config::Config;
pub use error::{ConfigError, ExtractorError};

use catchup::CatchupDriver;
use ingest::IngestContext;
use monitor::Monitor;

const USER_AGENT: &str = "/extractor:0.1.0/";

/// Tracks spawned `on_block`/`on_tx`/`on_inv` handler tasks so shutdown can
/// wait for every in-flight one to finish before flushing the store,
/// instead of racing it.
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn new() -> Arc<InFlight> {
        Arc::new(InFlight {
            count: AtomicUsize::new(0),
            idle: Notify::new(),
        })
    }

    /// Spawns `future`, counting it as in-flight until it completes.
    fn spawn<F>(self: &Arc<Self>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.count.fetch_add(1, Ordering::SeqCst);
        let this = self.clone();
        tokio::spawn(async move {
            future.await;
            if this.count.fetch_sub(1, Ordering::SeqCst) == 1 {
                this.idle.notify_waiters();
            }
        });
    }

    /// Resolves once every task spawned through this tracker has completed,
    /// including ones spawned while this call was already waiting.
    async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }
}

/// A running extraction session against a single peer.
///
/// Holds the handles needed to shut the ingestion pipeline down cleanly:
/// the peer connection, the catch-up loop, the in-flight handler tracker,
/// and the store it writes through.
pub struct Extractor {
    symbol: String,
    peer: Arc<PeerSession>,
    store: Arc<dyn BlockChainStore>,
    monitor: Arc<Monitor>,
    stop: CancellationToken,
    catchup: tokio::task::JoinHandle<()>,
    inflight: Arc<InFlight>,
}

impl Extractor {
    /// Connects to `addr`, seeds `valid_tip` from `store`, and starts the
    /// catch-up driver. Inbound blocks and transactions are persisted
    /// through `store`, queued in `pool` if supplied, and republished on
    /// `bus` if supplied.
    pub async fn start(
        symbol: impl Into<String>,
        addr: SocketAddr,
        config: Arc<Config>,
        store: Arc<dyn BlockChainStore>,
        pool: Option<Arc<dyn TransactionPool>>,
        bus: Option<Arc<dyn TxBus>>,
    ) -> Result<Extractor, ExtractorError> {
        config.validate().map_err(ExtractorError::from)?;
        let symbol = symbol.into();

        store.init(&symbol).await.map_err(ExtractorError::from)?;
        let tip = Arc::new(catchup::seed_tip(&config, store.as_ref(), &symbol).await?);
        let monitor = Arc::new(Monitor::new(config.block_monitor_lifetime));
        let has_pool = pool.is_some();
        let inflight = InFlight::new();

        let ctx = Arc::new(IngestContext {
            symbol: symbol.clone(),
            network: config.chain,
            config: config.clone(),
            store: store.clone(),
            pool,
            bus,
            tip: tip.clone(),
            monitor: monitor.clone(),
        });

        let peer_config = PeerConfig {
            network: config.chain,
            user_agent: USER_AGENT.to_string(),
            services: PeerServices::empty(),
            best_block: block::Height(tip.snapshot().height.max(0) as u32),
            relay: false,
        };

        let handlers = PeerHandlers {
            on_block: {
                let ctx = ctx.clone();
                let inflight = inflight.clone();
                Box::new(move |block: Arc<block::Block>| {
                    let ctx = ctx.clone();
                    inflight.spawn(async move { ingest::handle_block(block, &ctx).await });
                })
            },
            on_tx: {
                let ctx = ctx.clone();
                let inflight = inflight.clone();
                Box::new(move |tx: Arc<Transaction>| {
                    let ctx = ctx.clone();
                    inflight.spawn(async move { ingest::handle_tx(tx, &ctx).await });
                })
            },
            on_inv: {
                let inflight = inflight.clone();
                Box::new(move |items, outbound| {
                    inflight.spawn(async move { ingest::handle_inv(items, &outbound).await });
                })
            },
        };

        let peer = Arc::new(PeerSession::connect(addr, peer_config, handlers).await?);

        if has_pool {
            let _ = peer.send(Message::Mempool).await;
        }

        let stop = CancellationToken::new();
        let driver = CatchupDriver::new(config, tip, monitor.clone());

        let catchup = {
            let peer = peer.clone();
            let stop = stop.clone();
            tokio::spawn(async move { driver.run(&peer, stop).await })
        };

        Ok(Extractor {
            symbol,
            peer,
            store,
            monitor,
            stop,
            catchup,
            inflight,
        })
    }

    /// Requests graceful shutdown: stops the catch-up driver, waits for
    /// every in-flight `on_block`/`on_tx`/`on_inv` handler task to finish,
    /// wakes any remaining monitor waiters with `None`, and flushes the
    /// store.
    pub async fn shutdown(self) -> Result<(), ExtractorError> {
        self.stop.cancel();
        let _ = self.catchup.await;
        self.inflight.wait_idle().await;
        self.monitor.shutdown();
        drop(self.peer);

        self.store.flush_blocks(&self.symbol).await?;
        self.store.flush_transactions(&self.symbol).await?;
        Ok(())
    }
}
