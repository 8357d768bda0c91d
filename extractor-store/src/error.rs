use thiserror::Error;

/// Errors surfaced by the downstream store/pool/bus/metrics/cache traits.
///
/// At startup (`init`, the initial `get_block_height`) these are fatal. At
/// steady state the ingestion handlers log and drop the offending
/// block/transaction rather than propagating -- see the ingest module.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no persisted tip found")]
    NotFound,
    #[error("store backend error: {0}")]
    Backend(String),
}
