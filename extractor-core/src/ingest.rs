//! Turns decoded wire messages into store writes, monitor signals, and bus
//! publishes.
//!
//! Each function here runs as its own `tokio::task`, spawned by
//! [`crate::Extractor`] per inbound block/transaction, so the peer's
//! dispatch path is never blocked on store latency.

use std::sync::Arc;

use chrono::Utc;

use extractor_chain::{block, parameters::Network, transaction, transparent};
use extractor_network::InventoryHash;
use extractor_store::{model::HEIGHT_UNKNOWN, BlockChainStore, TransactionPool, TxBus};

use crate::{monitor::Monitor, tip::ValidTip, Config};

/// Everything an ingestion handler needs to do its job: where to write, who
/// to wake, and what chain parameters to resolve addresses against.
pub struct IngestContext {
    pub symbol: String,
    pub network: Network,
    pub config: Arc<Config>,
    pub store: Arc<dyn BlockChainStore>,
    pub pool: Option<Arc<dyn TransactionPool>>,
    pub bus: Option<Arc<dyn TxBus>>,
    pub tip: Arc<ValidTip>,
    pub monitor: Arc<Monitor>,
}

fn to_store_output(output: &transparent::Output, network: Network) -> extractor_store::TxOutput {
    let addresses = output.lock_script.addresses(network).into_iter().collect();
    extractor_store::TxOutput {
        value: output.value,
        script_pubkey: output.lock_script.0.clone(),
        addresses,
        script_type: output.lock_script.script_type(),
    }
}

fn to_store_input(input: &transparent::Input) -> extractor_store::TxInput {
    match input {
        transparent::Input::PrevOut {
            outpoint,
            unlock_script,
            sequence,
        } => extractor_store::TxInput {
            prev_tx_id: Some(outpoint.hash),
            prev_vout: Some(outpoint.index),
            script_sig: unlock_script.0.clone(),
            witness: Vec::new(),
            sequence: *sequence,
            out: None,
        },
        transparent::Input::Coinbase { sequence, .. } => extractor_store::TxInput {
            prev_tx_id: None,
            prev_vout: None,
            script_sig: Vec::new(),
            witness: Vec::new(),
            sequence: *sequence,
            out: None,
        },
    }
}

fn to_store_transaction(
    wire: &transaction::Transaction,
    block_id: Option<block::Hash>,
    height: i64,
    network: Network,
    store_raw: bool,
) -> extractor_store::Transaction {
    let mut raw = Vec::new();
    let _ = extractor_chain::serialization::BitcoinSerialize::bitcoin_serialize(wire, &mut raw);

    extractor_store::Transaction {
        tx_id: wire.hash(),
        block_id,
        height,
        time: Utc::now(),
        size_bytes: raw.len(),
        raw: store_raw.then_some(raw),
        inputs: wire.inputs.iter().map(to_store_input).collect(),
        outputs: wire.outputs.iter().map(|o| to_store_output(o, network)).collect(),
    }
}

/// Handles a `block` message: links it to the tip if possible, advances
/// `valid_tip`, persists it and its transactions, and wakes the monitor.
///
/// A block whose `prev_block_id` doesn't match the current tip is parked in
/// the monitor keyed by that parent hash rather than dropped -- once a
/// later block links and advances the tip to that parent's hash, any child
/// parked on it is popped back off and processed in the same call, so a
/// whole batch delivered out of order converges in one pass.
///
/// `valid_tip.advance` is attempted before the block is written to the
/// store: a block that loses the race to extend its parent (another block
/// got there first) is never persisted with a height computed from a tip
/// snapshot that's already stale.
pub async fn handle_block(wire_block: Arc<block::Block>, ctx: &IngestContext) {
    let mut pending = vec![wire_block];

    while let Some(wire_block) = pending.pop() {
        let block_id = wire_block.hash();
        let prev_block_id = wire_block.header.previous_block_hash;
        let snapshot = ctx.tip.snapshot();

        if prev_block_id != snapshot.block_id {
            tracing::debug!(?block_id, ?prev_block_id, "received block that does not link to the current tip, deferring");
            ctx.monitor.defer_block(prev_block_id, wire_block);
            continue;
        }

        let height = snapshot.height + 1;
        let now = Utc::now();

        if !ctx.tip.advance(prev_block_id, block_id, height, now) {
            tracing::warn!(?block_id, "lost the race to advance valid_tip for this height");
            continue;
        }

        let raw = ctx.config.store_raw_blocks.then(|| {
            let mut buf = Vec::new();
            let _ = extractor_chain::serialization::BitcoinSerialize::bitcoin_serialize(
                &wire_block.header,
                &mut buf,
            );
            buf
        });

        let store_block = extractor_store::Block {
            block_id,
            prev_block_id,
            height,
            time: wire_block.header.time,
            raw,
            transactions: wire_block
                .transactions
                .iter()
                .map(|tx| {
                    to_store_transaction(
                        tx,
                        Some(block_id),
                        height,
                        ctx.network,
                        ctx.config.store_raw_transactions,
                    )
                })
                .collect(),
        };

        if let Err(error) = ctx.store.insert_block(&ctx.symbol, &store_block).await {
            tracing::warn!(?block_id, %error, "failed to persist block after advancing valid_tip");
        }

        ctx.monitor.signal_block(height, store_block.clone());

        if let Some(bus) = &ctx.bus {
            for tx in &store_block.transactions {
                bus.publish(&ctx.symbol, tx).await;
            }
        }

        if let Some(child) = ctx.monitor.take_deferred_block(block_id) {
            pending.push(child);
        }
    }
}

/// Handles a `tx` message with no containing block (a mempool delivery):
/// inserts it into the pool with the configured TTL, wakes the monitor, and
/// publishes it to the bus as unconfirmed.
pub async fn handle_tx(tx: Arc<transaction::Transaction>, ctx: &IngestContext) {
    let tx_id = tx.hash();
    let store_tx = to_store_transaction(
        &tx,
        None,
        HEIGHT_UNKNOWN,
        ctx.network,
        ctx.config.store_raw_transactions,
    );

    if let Some(pool) = &ctx.pool {
        if let Err(error) = pool
            .insert_transaction(&ctx.symbol, &store_tx, ctx.config.transaction_lifetime)
            .await
        {
            tracing::warn!(?tx_id, %error, "failed to insert mempool transaction");
            return;
        }
    }

    ctx.monitor.signal_tx(tx_id);

    if let Some(bus) = &ctx.bus {
        bus.publish(&ctx.symbol, &store_tx).await;
    }
}

/// Handles an `inv` message: every `TX`/`BLOCK` entry gets one `getdata`
/// request queued straight back to the peer.
pub async fn handle_inv(
    items: Vec<InventoryHash>,
    outbound: &tokio::sync::mpsc::Sender<extractor_network::Message>,
) {
    let wanted: Vec<InventoryHash> = items
        .into_iter()
        .filter(|item| matches!(item, InventoryHash::Tx(_) | InventoryHash::Block(_)))
        .collect();

    if wanted.is_empty() {
        return;
    }

    if outbound
        .send(extractor_network::Message::GetData(wanted))
        .await
        .is_err()
    {
        tracing::warn!("failed to queue getdata, peer session appears closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use extractor_chain::{
        block::{merkle, Header},
        parameters::Network,
        serialization::BitcoinDeserializeInto,
        work::difficulty::CompactDifficulty,
    };
    use extractor_store::memory::{InMemoryBlockChainStore, InMemoryTransactionPool, InMemoryTxBus};
    use extractor_test::vectors::DUMMY_TX1;
    use tokio::sync::mpsc;

    fn hash(byte: u8) -> block::Hash {
        block::Hash([byte; 32])
    }

    fn header(previous_block_hash: block::Hash) -> Header {
        Header::new(
            1,
            previous_block_hash,
            merkle::Root([0u8; 32]),
            Utc::now(),
            CompactDifficulty(0x1d00ffff),
            0,
        )
    }

    fn sample_transaction() -> Arc<transaction::Transaction> {
        Arc::new(DUMMY_TX1.bitcoin_deserialize_into().unwrap())
    }

    fn ctx(
        store: Arc<dyn BlockChainStore>,
        pool: Option<Arc<dyn TransactionPool>>,
        bus: Option<Arc<dyn TxBus>>,
        tip: Arc<ValidTip>,
        monitor: Arc<Monitor>,
    ) -> IngestContext {
        IngestContext {
            symbol: "btc".to_string(),
            network: Network::Regtest,
            config: Arc::new(crate::Config::genesis(Network::Regtest, "127.0.0.1")),
            store,
            pool,
            bus,
            tip,
            monitor,
        }
    }

    const LONG_LIFETIME: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn handle_block_links_to_tip_advances_and_signals_monitor() {
        let store = Arc::new(InMemoryBlockChainStore::new());
        let tip = Arc::new(ValidTip::new(hash(0), 0, Utc::now()));
        let monitor = Arc::new(Monitor::new(LONG_LIFETIME));
        let context = ctx(store.clone(), None, None, tip.clone(), monitor.clone());

        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_for_block_height(1, Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;

        let block = Arc::new(block::Block {
            header: header(hash(0)),
            transactions: vec![sample_transaction()],
        });
        let block_id = block.hash();
        handle_block(block, &context).await;

        assert_eq!(tip.snapshot().height, 1);
        assert_eq!(tip.snapshot().block_id, block_id);
        assert_eq!(store.get_block_height("btc").await.unwrap(), (block_id, 1));

        let resolved = waiter.await.unwrap();
        assert_eq!(resolved.unwrap().height, 1);
    }

    #[tokio::test]
    async fn handle_block_with_unlinked_parent_is_deferred_and_replayed_once_its_parent_links() {
        let store = Arc::new(InMemoryBlockChainStore::new());
        let tip = Arc::new(ValidTip::new(hash(0), 0, Utc::now()));
        let monitor = Arc::new(Monitor::new(LONG_LIFETIME));
        let context = ctx(store.clone(), None, None, tip.clone(), monitor);

        let parent = Arc::new(block::Block {
            header: header(hash(0)),
            transactions: vec![sample_transaction()],
        });
        let parent_id = parent.hash();
        let child = Arc::new(block::Block {
            header: header(parent_id),
            transactions: vec![sample_transaction()],
        });

        // the child arrives first: it doesn't link, so it's parked rather
        // than dropped, and the tip doesn't move.
        handle_block(child, &context).await;
        assert_eq!(tip.snapshot().height, 0);
        assert!(store.get_block_height("btc").await.is_err());

        // once the parent arrives and links, the parked child is replayed
        // in the same call and also links.
        handle_block(parent, &context).await;
        assert_eq!(tip.snapshot().height, 2);
        assert_eq!(store.blocks().len(), 2);
    }

    #[tokio::test]
    async fn out_of_order_delivery_links_once_each_in_a_single_reverse_order_pass() {
        let store = Arc::new(InMemoryBlockChainStore::new());
        let tip = Arc::new(ValidTip::new(hash(0), 0, Utc::now()));
        let monitor = Arc::new(Monitor::new(LONG_LIFETIME));
        let context = ctx(store.clone(), None, None, tip.clone(), monitor);

        let block1 = Arc::new(block::Block { header: header(hash(0)), transactions: vec![sample_transaction()] });
        let id1 = block1.hash();
        let block2 = Arc::new(block::Block { header: header(id1), transactions: vec![sample_transaction()] });
        let id2 = block2.hash();
        let block3 = Arc::new(block::Block { header: header(id2), transactions: vec![sample_transaction()] });

        // delivered newest-first, one call each, no manual redelivery: the
        // earliest parent's arrival should flush the whole chain.
        handle_block(block3, &context).await;
        assert_eq!(tip.snapshot().height, 0);
        handle_block(block2, &context).await;
        assert_eq!(tip.snapshot().height, 0);
        handle_block(block1, &context).await;

        assert_eq!(tip.snapshot().height, 3);
        assert_eq!(store.blocks().len(), 3);
        let heights: std::collections::BTreeSet<i64> =
            store.blocks().iter().map(|b| b.height).collect();
        assert_eq!(heights, [1, 2, 3].into_iter().collect());
    }

    #[tokio::test]
    async fn handle_tx_with_no_block_is_treated_as_mempool() {
        let store = Arc::new(InMemoryBlockChainStore::new());
        let pool = Arc::new(InMemoryTransactionPool::new());
        let bus = Arc::new(InMemoryTxBus::new());
        let tip = Arc::new(ValidTip::new(hash(0), 0, Utc::now()));
        let monitor = Arc::new(Monitor::new(LONG_LIFETIME));
        let context = ctx(
            store,
            Some(pool.clone() as Arc<dyn TransactionPool>),
            Some(bus.clone() as Arc<dyn TxBus>),
            tip,
            monitor.clone(),
        );

        let tx = sample_transaction();
        let tx_id = tx.hash();
        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_for_tx(tx_id, Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;

        handle_tx(tx, &context).await;

        assert_eq!(pool.get_transaction_count("btc").await.unwrap(), 1);
        assert!(waiter.await.unwrap());

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert!(published[0].1.block_id.is_none());
    }

    #[tokio::test]
    async fn handle_inv_queues_exactly_one_getdata_per_entry() {
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<extractor_network::Message>(8);

        let items = vec![
            InventoryHash::Tx(transaction::Hash([1; 32])),
            InventoryHash::Block(block::Hash([2; 32])),
            InventoryHash::Error,
        ];
        handle_inv(items, &outbound_tx).await;

        let message = outbound_rx.recv().await.unwrap();
        match message {
            extractor_network::Message::GetData(wanted) => assert_eq!(wanted.len(), 2),
            other => panic!("expected GetData, got {other:?}"),
        }
        assert!(outbound_rx.try_recv().is_err());
    }
}
