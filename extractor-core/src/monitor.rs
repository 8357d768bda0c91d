//! Rendezvous between asynchronously arriving blocks/transactions and the
//! catch-up driver waiting on them.
//!
//! A slot-keyed waiter table, one [`tokio::sync::oneshot`] per key rather
//! than a broadcast channel: only the current registrant for a given key
//! needs to be woken, never every past one. Every entry also carries its own
//! `created_at`, reaped independently of whatever per-call `timeout` the
//! caller passed in -- a waiter dropped out of a `tokio::select!` race (the
//! catch-up loop's stall/stop branches can win before its own timeout ever
//! fires) would otherwise sit in the table forever.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use extractor_chain::{block, transaction};
use tokio::sync::oneshot;

use extractor_store::Block as StoreBlock;

struct HeightWaiter {
    sender: oneshot::Sender<StoreBlock>,
    created_at: Instant,
}

struct TxWaiter {
    sender: oneshot::Sender<()>,
    created_at: Instant,
}

struct DeferredBlock {
    block: Arc<block::Block>,
    created_at: Instant,
}

#[derive(Default)]
struct State {
    by_height: HashMap<i64, HeightWaiter>,
    by_hash: HashMap<transaction::Hash, TxWaiter>,
    deferred_by_parent: HashMap<block::Hash, DeferredBlock>,
}

/// In-memory index of heights/hashes the catch-up driver and mempool
/// bootstrap are currently waiting on, plus blocks parked pending their
/// parent's arrival.
pub struct Monitor {
    state: Mutex<State>,
    lifetime: Duration,
}

impl Monitor {
    pub fn new(lifetime: Duration) -> Self {
        Monitor {
            state: Mutex::new(State::default()),
            lifetime,
        }
    }

    /// Acquires the lock, reaping any entry across all three maps older than
    /// `self.lifetime`. Dropping a stale waiter's sender wakes it with
    /// `None`, same as an explicit expiry.
    fn locked(&self) -> MutexGuard<'_, State> {
        let mut state = self.state.lock().expect("monitor lock poisoned");
        let now = Instant::now();
        let lifetime = self.lifetime;
        state
            .by_height
            .retain(|_, waiter| now.duration_since(waiter.created_at) < lifetime);
        state
            .by_hash
            .retain(|_, waiter| now.duration_since(waiter.created_at) < lifetime);
        state
            .deferred_by_parent
            .retain(|_, deferred| now.duration_since(deferred.created_at) < lifetime);
        state
    }

    /// Registers interest in the block at `height`, returning a future that
    /// resolves with the block once [`Monitor::signal_block`] is called for
    /// it, or `None` after `timeout` (or [`Monitor::shutdown`]).
    ///
    /// Registering twice for the same height drops the earlier waiter --
    /// only the last registrant is guaranteed to be woken.
    pub async fn wait_for_block_height(&self, height: i64, timeout: Duration) -> Option<StoreBlock> {
        let (tx, rx) = oneshot::channel();
        self.locked().by_height.insert(
            height,
            HeightWaiter {
                sender: tx,
                created_at: Instant::now(),
            },
        );

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(block)) => Some(block),
            Ok(Err(_)) | Err(_) => {
                self.locked().by_height.remove(&height);
                None
            }
        }
    }

    /// Registers interest in `tx_id` arriving, analogous to
    /// [`Monitor::wait_for_block_height`].
    pub async fn wait_for_tx(&self, tx_id: transaction::Hash, timeout: Duration) -> bool {
        let (tx, rx) = oneshot::channel();
        self.locked().by_hash.insert(
            tx_id,
            TxWaiter {
                sender: tx,
                created_at: Instant::now(),
            },
        );

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) | Err(_) => {
                self.locked().by_hash.remove(&tx_id);
                false
            }
        }
    }

    /// Resolves the waiter for `block.height`, if any. A no-op if nobody is
    /// waiting -- the block has already been persisted by the time this is
    /// called, the monitor is purely a rendezvous, not a buffer.
    pub fn signal_block(&self, height: i64, block: StoreBlock) {
        if let Some(waiter) = self.locked().by_height.remove(&height) {
            let _ = waiter.sender.send(block);
        }
    }

    /// Resolves the waiter for `tx_id`, if any.
    pub fn signal_tx(&self, tx_id: transaction::Hash) {
        if let Some(waiter) = self.locked().by_hash.remove(&tx_id) {
            let _ = waiter.sender.send(());
        }
    }

    /// Drops every height-waiter keyed below `height`, waking the blocked
    /// caller with `None` by dropping its sender.
    pub fn expire_below_block_height(&self, height: i64) {
        self.locked().by_height.retain(|key, _| *key >= height);
    }

    /// Parks a block that arrived before its parent linked, keyed by the
    /// parent hash it's waiting on. Registering twice for the same parent
    /// drops the earlier deferred block -- only the last one registered for
    /// a given parent is retained.
    pub fn defer_block(&self, parent_block_id: block::Hash, block: Arc<block::Block>) {
        self.locked().deferred_by_parent.insert(
            parent_block_id,
            DeferredBlock {
                block,
                created_at: Instant::now(),
            },
        );
    }

    /// Takes back whatever block was parked waiting on `parent_block_id`,
    /// now that the parent has linked.
    pub fn take_deferred_block(&self, parent_block_id: block::Hash) -> Option<Arc<block::Block>> {
        self.locked()
            .deferred_by_parent
            .remove(&parent_block_id)
            .map(|deferred| deferred.block)
    }

    /// Resolves every outstanding waiter with `None` and drops every
    /// deferred block, used at shutdown.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().expect("monitor lock poisoned");
        state.by_height.clear();
        state.by_hash.clear();
        state.deferred_by_parent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_LIFETIME: Duration = Duration::from_secs(60);

    fn dummy_block(height: i64) -> StoreBlock {
        StoreBlock {
            block_id: block::Hash([height as u8; 32]),
            prev_block_id: block::Hash([0; 32]),
            height,
            time: chrono::Utc::now(),
            raw: None,
            transactions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn signal_resolves_a_waiting_height() {
        let monitor = Arc::new(Monitor::new(LONG_LIFETIME));
        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_for_block_height(5, Duration::from_secs(5)).await })
        };

        tokio::task::yield_now().await;
        monitor.signal_block(5, dummy_block(5));

        let result = waiter.await.unwrap();
        assert_eq!(result.unwrap().height, 5);
    }

    #[tokio::test]
    async fn wait_times_out_with_none_when_never_signalled() {
        let monitor = Monitor::new(LONG_LIFETIME);
        let result = monitor
            .wait_for_block_height(5, Duration::from_millis(10))
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn expire_below_drops_only_lower_heights() {
        let monitor = Arc::new(Monitor::new(LONG_LIFETIME));
        let low = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_for_block_height(4, Duration::from_secs(5)).await })
        };
        let high = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_for_block_height(6, Duration::from_secs(5)).await })
        };

        tokio::task::yield_now().await;
        monitor.expire_below_block_height(5);
        monitor.signal_block(6, dummy_block(6));

        assert!(low.await.unwrap().is_none());
        assert_eq!(high.await.unwrap().unwrap().height, 6);
    }

    #[tokio::test]
    async fn shutdown_wakes_all_waiters_with_none() {
        let monitor = Arc::new(Monitor::new(LONG_LIFETIME));
        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_for_block_height(1, Duration::from_secs(5)).await })
        };

        tokio::task::yield_now().await;
        monitor.shutdown();

        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deferred_block_is_returned_once_its_parent_links() {
        let monitor = Monitor::new(LONG_LIFETIME);
        let parent = block::Hash([1; 32]);
        let child = Arc::new(block::Block {
            header: extractor_chain::block::Header::new(
                1,
                parent,
                extractor_chain::block::merkle::Root([0u8; 32]),
                chrono::Utc::now(),
                extractor_chain::work::difficulty::CompactDifficulty(0x1d00ffff),
                0,
            ),
            transactions: Vec::new(),
        });

        assert!(monitor.take_deferred_block(parent).is_none());
        monitor.defer_block(parent, child.clone());
        let taken = monitor.take_deferred_block(parent).unwrap();
        assert_eq!(taken.hash(), child.hash());
        // taking it removes it -- a second take finds nothing.
        assert!(monitor.take_deferred_block(parent).is_none());
    }

    #[tokio::test]
    async fn entries_older_than_lifetime_are_reaped_on_next_access() {
        let monitor = Arc::new(Monitor::new(Duration::from_millis(20)));
        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_for_block_height(5, Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        // any locked() call reaps -- expire_below_block_height(0) is a no-op
        // on keys but still sweeps stale entries first.
        monitor.expire_below_block_height(0);

        assert!(waiter.await.unwrap().is_none());
    }
}
