use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown chain: {0}")]
    UnknownChain(#[from] extractor_chain::parameters::UnknownNetworkError),
    #[error("start_block_height {0} is invalid (must be -1 or a non-negative height)")]
    InvalidStartHeight(i64),
    #[error("start_block_id {0:?} is not a valid block hash")]
    InvalidStartBlockId(String),
}

/// Fatal, startup-time errors -- these surface to the CLI and abort the
/// process rather than being retried.
#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to connect to peer: {0}")]
    Connect(#[from] extractor_network::peer_session::PeerError),
    #[error("store initialization failed: {0}")]
    Store(#[from] extractor_store::StoreError),
}
