//! In-memory implementations of the store traits, used only by tests.
//!
//! `InMemoryBlockChainStore`/`InMemoryTransactionPool` compute their
//! aggregates (`get_transaction_count`, `get_transaction_bytes`,
//! `find_txs_by_addresses_and_time`) by scanning all entries, O(n) over the
//! symbol's keys -- matching the cost of a full keyspace scan a real backend
//! would need for the same query, not a regression introduced by the mock.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use extractor_chain::block;

use crate::{
    error::StoreError,
    model::{AddressStats, Block, Transaction},
    traits::{BlockChainStore, DistCache, MetricStore, TransactionPool, TxBus},
};

#[derive(Default)]
struct BlockChainState {
    tip: Option<(block::Hash, i64)>,
    blocks: Vec<Block>,
    transactions: Vec<Transaction>,
    flush_blocks_calls: usize,
    flush_transactions_calls: usize,
}

/// An in-memory [`BlockChainStore`] for tests.
#[derive(Default)]
pub struct InMemoryBlockChainStore {
    state: Mutex<BlockChainState>,
}

impl InMemoryBlockChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flush_blocks_calls(&self) -> usize {
        self.state.lock().expect("lock poisoned").flush_blocks_calls
    }

    pub fn flush_transactions_calls(&self) -> usize {
        self.state
            .lock()
            .expect("lock poisoned")
            .flush_transactions_calls
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.state.lock().expect("lock poisoned").blocks.clone()
    }
}

#[async_trait]
impl BlockChainStore for InMemoryBlockChainStore {
    async fn init(&self, _symbol: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_block(&self, _symbol: &str, block: &Block) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.tip = Some((block.block_id, block.height));
        state.transactions.extend(block.transactions.iter().cloned());
        state.blocks.push(block.clone());
        Ok(())
    }

    async fn insert_transaction(&self, _symbol: &str, tx: &Transaction) -> Result<(), StoreError> {
        self.state
            .lock()
            .expect("lock poisoned")
            .transactions
            .push(tx.clone());
        Ok(())
    }

    async fn get_block_height(&self, _symbol: &str) -> Result<(block::Hash, i64), StoreError> {
        self.state
            .lock()
            .expect("lock poisoned")
            .tip
            .ok_or(StoreError::NotFound)
    }

    async fn flush_blocks(&self, _symbol: &str) -> Result<(), StoreError> {
        self.state.lock().expect("lock poisoned").flush_blocks_calls += 1;
        Ok(())
    }

    async fn flush_transactions(&self, _symbol: &str) -> Result<(), StoreError> {
        self.state
            .lock()
            .expect("lock poisoned")
            .flush_transactions_calls += 1;
        Ok(())
    }

    async fn find_txs_by_addresses_and_time(
        &self,
        _symbol: &str,
        addresses: &[String],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.lock().expect("lock poisoned");
        let matches = state
            .transactions
            .iter()
            .filter(|tx| {
                if let Some(start) = start {
                    if tx.time < start {
                        return false;
                    }
                }
                if let Some(end) = end {
                    if tx.time >= end {
                        return false;
                    }
                }
                tx.outputs
                    .iter()
                    .flat_map(|out| out.addresses.iter())
                    .any(|a| addresses.contains(a))
            })
            .cloned()
            .collect();
        Ok(matches)
    }

    async fn get_address_stats(&self, _symbol: &str, address: &str) -> Result<AddressStats, StoreError> {
        let state = self.state.lock().expect("lock poisoned");
        let mut stats = AddressStats {
            address: address.to_string(),
            tx_count: 0,
            received: 0,
            spent: 0,
        };

        for tx in &state.transactions {
            let mut touched = false;
            for output in &tx.outputs {
                if output.addresses.contains(address) {
                    stats.received += output.value.value();
                    touched = true;
                }
            }
            for input in &tx.inputs {
                if let Some(out) = &input.out {
                    if out.addresses.contains(address) {
                        stats.spent += out.value.value();
                        touched = true;
                    }
                }
            }
            if touched {
                stats.tx_count += 1;
            }
        }

        Ok(stats)
    }
}

struct PoolEntry {
    size_bytes: usize,
    expires_at: Instant,
}

/// An in-memory [`TransactionPool`] for tests.
#[derive(Default)]
pub struct InMemoryTransactionPool {
    entries: Mutex<HashMap<String, PoolEntry>>,
}

impl InMemoryTransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn reap(entries: &mut HashMap<String, PoolEntry>) {
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
    }
}

#[async_trait]
impl TransactionPool for InMemoryTransactionPool {
    async fn insert_transaction(
        &self,
        _symbol: &str,
        tx: &Transaction,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("lock poisoned");
        entries.insert(
            tx.tx_id.to_string(),
            PoolEntry {
                size_bytes: tx.size_bytes,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete_transaction(&self, _symbol: &str, tx_id: &str) -> Result<(), StoreError> {
        self.entries.lock().expect("lock poisoned").remove(tx_id);
        Ok(())
    }

    async fn get_transaction_count(&self, _symbol: &str) -> Result<i64, StoreError> {
        let mut entries = self.entries.lock().expect("lock poisoned");
        Self::reap(&mut entries);
        Ok(entries.len() as i64)
    }

    async fn get_transaction_bytes(&self, _symbol: &str) -> Result<i64, StoreError> {
        let mut entries = self.entries.lock().expect("lock poisoned");
        Self::reap(&mut entries);
        Ok(entries.values().map(|e| e.size_bytes as i64).sum())
    }
}

/// An in-memory [`TxBus`] for tests: every published transaction is
/// appended to a log rather than actually fanned out anywhere.
#[derive(Default)]
pub struct InMemoryTxBus {
    published: Mutex<Vec<(String, Transaction)>>,
}

impl InMemoryTxBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, Transaction)> {
        self.published.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl TxBus for InMemoryTxBus {
    async fn publish(&self, symbol: &str, tx: &Transaction) {
        self.published
            .lock()
            .expect("lock poisoned")
            .push((symbol.to_string(), tx.clone()));
    }
}

/// An in-memory [`MetricStore`] for tests.
#[derive(Default)]
pub struct InMemoryMetricStore {
    counters: Mutex<HashMap<String, i64>>,
    gauges: Mutex<HashMap<String, f64>>,
}

impl InMemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> i64 {
        *self.counters.lock().expect("lock poisoned").get(name).unwrap_or(&0)
    }

    pub fn gauge_value(&self, name: &str) -> Option<f64> {
        self.gauges.lock().expect("lock poisoned").get(name).copied()
    }
}

#[async_trait]
impl MetricStore for InMemoryMetricStore {
    async fn increment(&self, name: &str, value: i64) {
        *self
            .counters
            .lock()
            .expect("lock poisoned")
            .entry(name.to_string())
            .or_insert(0) += value;
    }

    async fn gauge(&self, name: &str, value: f64) {
        self.gauges
            .lock()
            .expect("lock poisoned")
            .insert(name.to_string(), value);
    }
}

/// An in-memory [`DistCache`] for tests.
#[derive(Default)]
pub struct InMemoryDistCache {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl InMemoryDistCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistCache for InMemoryDistCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.lock().expect("lock poisoned");
        Ok(entries.get(key).and_then(|(value, expires_at)| {
            if *expires_at > Instant::now() {
                Some(value.clone())
            } else {
                None
            }
        }))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        self.entries
            .lock()
            .expect("lock poisoned")
            .insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extractor_chain::{amount::Amount, transaction, transparent::ScriptType};
    use std::collections::BTreeSet;

    fn sample_tx(tx_id_byte: u8, address: &str, value: i64, time: DateTime<Utc>) -> Transaction {
        let mut addresses = BTreeSet::new();
        addresses.insert(address.to_string());

        Transaction {
            tx_id: transaction::Hash([tx_id_byte; 32]),
            block_id: None,
            height: crate::model::HEIGHT_UNKNOWN,
            time,
            size_bytes: 250,
            raw: None,
            inputs: Vec::new(),
            outputs: vec![crate::model::TxOutput {
                value: Amount::try_new(value).unwrap(),
                script_pubkey: Vec::new(),
                addresses,
                script_type: ScriptType::PayToPublicKeyHash,
            }],
        }
    }

    #[tokio::test]
    async fn pool_expires_entries_after_ttl() {
        let pool = InMemoryTransactionPool::new();
        let tx = sample_tx(0xaa, "addr1", 1000, Utc::now());

        pool.insert_transaction("btc", &tx, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(pool.get_transaction_count("btc").await.unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(pool.get_transaction_count("btc").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn address_stats_sums_matching_outputs() {
        let store = InMemoryBlockChainStore::new();
        let now = Utc::now();
        let tx1 = sample_tx(0x01, "addr1", 500, now);
        let tx2 = sample_tx(0x02, "addr1", 1500, now);
        let tx3 = sample_tx(0x03, "other", 999, now);

        store.insert_transaction("btc", &tx1).await.unwrap();
        store.insert_transaction("btc", &tx2).await.unwrap();
        store.insert_transaction("btc", &tx3).await.unwrap();

        let stats = store.get_address_stats("btc", "addr1").await.unwrap();
        assert_eq!(stats.tx_count, 2);
        assert_eq!(stats.received, 2000);
        assert_eq!(stats.balance(), 2000);
    }
}
