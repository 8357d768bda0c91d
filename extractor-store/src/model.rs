//! The store-facing data model.
//!
//! These types are deliberately simpler than the wire types in
//! `extractor_chain`: a store doesn't need a `Cached<Hash>` or a
//! `BitcoinSerialize` impl, it needs something that's cheap to index and
//! query by address/time. `extractor-core::ingest` is responsible for
//! turning a freshly-decoded wire `Block`/`Transaction` into one of these.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use extractor_chain::{amount::Amount, amount::NonNegative, block, transaction, transparent::ScriptType};

/// Sentinel height for a transaction or block whose place in the chain is
/// not yet known (an unconfirmed mempool transaction, or a block received
/// before its parent).
pub const HEIGHT_UNKNOWN: i64 = -1;

/// A block, as persisted by the block store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub block_id: block::Hash,
    pub prev_block_id: block::Hash,
    pub height: i64,
    pub time: DateTime<Utc>,
    pub raw: Option<Vec<u8>>,
    pub transactions: Vec<Transaction>,
}

/// A transaction, as persisted by the block store or transaction pool.
///
/// `block_id` is `None` for a transaction that has only been seen in the
/// mempool -- rather than threading a magic `"mempool"` string through the
/// store boundary, absence of a block is represented directly in the type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub tx_id: transaction::Hash,
    pub block_id: Option<block::Hash>,
    pub height: i64,
    pub time: DateTime<Utc>,
    pub size_bytes: usize,
    pub raw: Option<Vec<u8>>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// True if this transaction has not (yet) been linked to a block.
    pub fn is_mempool(&self) -> bool {
        self.block_id.is_none()
    }
}

/// One input of a persisted transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxInput {
    /// `None` for a coinbase input.
    pub prev_tx_id: Option<transaction::Hash>,
    pub prev_vout: Option<u32>,
    pub script_sig: Vec<u8>,
    pub witness: Vec<Vec<u8>>,
    pub sequence: u32,
    /// The previous output this input spends, resolved at ingestion time
    /// when available (best-effort; the extractor does not maintain a UTXO
    /// index, so this is usually `None`).
    pub out: Option<TxOutput>,
}

/// One output of a persisted transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    pub value: Amount<NonNegative>,
    pub script_pubkey: Vec<u8>,
    pub addresses: BTreeSet<String>,
    pub script_type: ScriptType,
}

/// Aggregate balance/activity figures for a single address, as returned by
/// the (out-of-scope) read API's address-stats endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressStats {
    pub address: String,
    pub tx_count: i64,
    pub received: i64,
    pub spent: i64,
}

impl AddressStats {
    pub fn balance(&self) -> i64 {
        self.received - self.spent
    }
}
