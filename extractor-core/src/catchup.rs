//! The loop that replays history from the persisted tip up to the peer's
//! reported chain height.
//!
//! Snapshot the tip, sleep if already caught up, expire stale monitor
//! interest, request a batch via `getblocks`, race the batch-completion
//! wait against a stall timer, log throughput, loop. Stall detection uses a
//! single [`tokio_util::sync::CancellationToken`] per batch, cancelled
//! either by the stall check or by the batch resolving -- one cancellation
//! source instead of two independent ones.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use extractor_chain::block;
use extractor_network::{Message, PeerSession};

use crate::{monitor::Monitor, tip::ValidTip, Config};

/// How long the peer's last-announced height is cached for before
/// `CatchupDriver` treats "are we caught up" as stale and re-checks.
const CAUGHT_UP_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);
const STALL_CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Drives `valid_tip` forward, batch by batch, until `stop` fires.
pub struct CatchupDriver {
    config: Arc<Config>,
    tip: Arc<ValidTip>,
    monitor: Arc<Monitor>,
}

impl CatchupDriver {
    pub fn new(config: Arc<Config>, tip: Arc<ValidTip>, monitor: Arc<Monitor>) -> Self {
        CatchupDriver { config, tip, monitor }
    }

    /// Runs until `stop` is cancelled. Issues `getblocks` requests through
    /// `outbound` and relies on the caller's ingestion handlers to advance
    /// `tip` and signal `monitor` as blocks arrive.
    pub async fn run(&self, outbound: &PeerSession, stop: CancellationToken) {
        loop {
            if stop.is_cancelled() {
                return;
            }

            let snapshot = self.tip.snapshot();
            let peer_height = outbound.last_block();

            if peer_height <= snapshot.height {
                tokio::select! {
                    _ = tokio::time::sleep(CAUGHT_UP_POLL_INTERVAL) => continue,
                    _ = stop.cancelled() => return,
                }
            }

            self.monitor.expire_below_block_height(snapshot.height);

            let expected_height = snapshot.height + self.config.blocks_request_count as i64;

            if let Err(error) = outbound
                .send(Message::get_blocks(vec![snapshot.block_id], None))
                .await
            {
                tracing::warn!(%error, "failed to send getblocks, will retry next iteration");
                tokio::time::sleep(CAUGHT_UP_POLL_INTERVAL).await;
                continue;
            }

            let batch_cancel = CancellationToken::new();
            let stall_task = {
                let tip = self.tip.clone();
                let block_timeout = self.config.block_timeout;
                let batch_cancel = batch_cancel.clone();
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = tokio::time::sleep(STALL_CHECK_INTERVAL) => {
                                let elapsed = Utc::now() - tip.snapshot().last_block_time;
                                if elapsed.to_std().map(|d| d >= block_timeout).unwrap_or(false) {
                                    tracing::warn!("block timeout: no progress for {:?}", block_timeout);
                                    batch_cancel.cancel();
                                    return;
                                }
                            }
                            _ = batch_cancel.cancelled() => return,
                        }
                    }
                })
            };

            tokio::select! {
                result = self.monitor.wait_for_block_height(expected_height, self.config.blocks_request_timeout) => {
                    batch_cancel.cancel();
                    let _ = stall_task.await;
                    match result {
                        Some(_) => {
                            let new_height = self.tip.snapshot().height;
                            let rate = (new_height - snapshot.height).max(0);
                            tracing::info!(height = new_height, blocks_this_batch = rate, "batch complete");
                        }
                        None => tracing::debug!(expected_height, "did not get block for expected height, retrying"),
                    }
                }
                _ = batch_cancel.cancelled() => {
                    let _ = stall_task.await;
                    tracing::warn!("block timeout fired while waiting for batch, retrying");
                }
                _ = stop.cancelled() => {
                    batch_cancel.cancel();
                    let _ = stall_task.await;
                    return;
                }
            }
        }
    }
}

/// Seeds `valid_tip` from the store, falling back to the configured
/// starting point, or the chain's genesis block, on a cold start.
///
/// A cold start at genesis synthesises a minimal genesis entry and
/// persists it through the store before the tip is returned, mirroring the
/// peer's own handshake: the extractor must have ingested *something* before
/// it can issue its first `getblocks`.
pub async fn seed_tip(
    config: &Config,
    store: &dyn extractor_store::BlockChainStore,
    symbol: &str,
) -> Result<ValidTip, crate::error::ExtractorError> {
    match store.get_block_height(symbol).await {
        Ok((block_id, height)) if height >= config.start_block_height.max(0) => {
            Ok(ValidTip::new(block_id, height, Utc::now()))
        }
        _ => {
            if config.start_block_height == -1 {
                let genesis_id = extractor_chain::parameters::genesis::genesis_hash(config.chain);
                let now = Utc::now();
                let genesis_block = extractor_store::Block {
                    block_id: genesis_id,
                    prev_block_id: extractor_chain::parameters::genesis::GENESIS_PREVIOUS_BLOCK_HASH,
                    height: 0,
                    time: now,
                    raw: None,
                    transactions: Vec::new(),
                };
                store.insert_block(symbol, &genesis_block).await?;
                Ok(ValidTip::new(genesis_id, 0, now))
            } else {
                let block_id: block::Hash = config
                    .start_block_id
                    .parse()
                    .map_err(|_| crate::error::ConfigError::InvalidStartBlockId(config.start_block_id.clone()))?;
                Ok(ValidTip::new(block_id, config.start_block_height, Utc::now()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extractor_chain::parameters::Network;
    use extractor_store::{memory::InMemoryBlockChainStore, BlockChainStore};

    #[tokio::test]
    async fn cold_start_seeds_tip_at_genesis_and_persists_it() {
        let config = Config::genesis(Network::Regtest, "127.0.0.1");
        let store = InMemoryBlockChainStore::new();
        let genesis_id = extractor_chain::parameters::genesis::genesis_hash(Network::Regtest);

        let tip = seed_tip(&config, &store, "btc").await.unwrap();

        assert_eq!(tip.snapshot().height, 0);
        assert_eq!(tip.snapshot().block_id, genesis_id);
        // genesis must be ingested before the first getblocks is issued.
        assert_eq!(
            store.get_block_height("btc").await.unwrap(),
            (genesis_id, 0)
        );
    }

    #[tokio::test]
    async fn existing_tip_above_configured_start_height_is_reused() {
        let config = Config::genesis(Network::Regtest, "127.0.0.1");
        let store = InMemoryBlockChainStore::new();
        let persisted_id = block::Hash([7; 32]);
        store
            .insert_block(
                "btc",
                &extractor_store::Block {
                    block_id: persisted_id,
                    prev_block_id: extractor_chain::parameters::genesis::genesis_hash(Network::Regtest),
                    height: 42,
                    time: Utc::now(),
                    raw: None,
                    transactions: Vec::new(),
                },
            )
            .await
            .unwrap();

        let tip = seed_tip(&config, &store, "btc").await.unwrap();

        assert_eq!(tip.snapshot().height, 42);
        assert_eq!(tip.snapshot().block_id, persisted_id);
    }
}
