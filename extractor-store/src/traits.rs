//! The narrow interfaces the core ingestion pipeline consumes.
//!
//! Every method here is called through a trait object or a generic bound by
//! `extractor-core`; the real backends (Elasticsearch, Redis, ...) are out
//! of scope and live outside this workspace. Only `InMemory*` test mocks
//! are provided.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use extractor_chain::block;

use crate::{
    error::StoreError,
    model::{AddressStats, Block, Transaction},
};

/// The block/transaction store: persists linked blocks and their
/// transactions, and answers the read-side address queries.
#[async_trait]
pub trait BlockChainStore: Send + Sync {
    /// Idempotent setup for a given chain symbol (e.g. `"btc"`).
    async fn init(&self, symbol: &str) -> Result<(), StoreError>;

    /// Persists a block's header and (if configured) raw bytes, plus every
    /// transaction it contains.
    async fn insert_block(&self, symbol: &str, block: &Block) -> Result<(), StoreError>;

    /// Persists a single transaction independent of a block (a mempool
    /// transaction, or a confirmed one inserted outside of `insert_block`).
    async fn insert_transaction(&self, symbol: &str, tx: &Transaction) -> Result<(), StoreError>;

    /// Returns the highest persisted block, or [`StoreError::NotFound`] if
    /// the store has never seen a block for this symbol.
    async fn get_block_height(&self, symbol: &str) -> Result<(block::Hash, i64), StoreError>;

    /// Flushes buffered block writes. Called once at shutdown.
    async fn flush_blocks(&self, symbol: &str) -> Result<(), StoreError>;

    /// Flushes buffered transaction writes. Called once at shutdown.
    async fn flush_transactions(&self, symbol: &str) -> Result<(), StoreError>;

    /// Finds transactions touching any of `addresses` (as an input or
    /// output) with a block time in `[start, end)`.
    async fn find_txs_by_addresses_and_time(
        &self,
        symbol: &str,
        addresses: &[String],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Aggregate received/spent/tx-count figures for a single address.
    async fn get_address_stats(&self, symbol: &str, address: &str) -> Result<AddressStats, StoreError>;
}

/// The mempool transaction pool: a TTL-keyed set of unconfirmed
/// transactions, keyed by `symbol:mempool:tx_id`.
#[async_trait]
pub trait TransactionPool: Send + Sync {
    async fn insert_transaction(
        &self,
        symbol: &str,
        tx: &Transaction,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    async fn delete_transaction(&self, symbol: &str, tx_id: &str) -> Result<(), StoreError>;

    /// Number of transactions currently held for `symbol`.
    async fn get_transaction_count(&self, symbol: &str) -> Result<i64, StoreError>;

    /// Total size in bytes of transactions currently held for `symbol`.
    async fn get_transaction_bytes(&self, symbol: &str) -> Result<i64, StoreError>;
}

/// A fire-and-forget publish channel for newly ingested transactions.
#[async_trait]
pub trait TxBus: Send + Sync {
    async fn publish(&self, symbol: &str, tx: &Transaction);
}

/// A sink for operational counters (blocks ingested, bytes read/written,
/// current valid height). Kept separate from `tracing`/`metrics` call
/// sites so a deployment can route extractor-specific business metrics
/// wherever it likes.
#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn increment(&self, name: &str, value: i64);
    async fn gauge(&self, name: &str, value: f64);
}

/// A distributed cache used to deduplicate work across multiple extractor
/// instances (e.g. "have we already requested this block"). Not used by the
/// single-peer core described here, but kept as part of the trait boundary
/// for deployments that run more than one extractor against the same chain.
#[async_trait]
pub trait DistCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;
}
