//! Bitcoin P2P wire codec and single-peer session handling.
//!
//! This crate owns the connection to exactly one upstream peer: the
//! handshake, the framed read/write halves, and the typed message stream.
//! It knows nothing about chain state, persistence, or catch-up strategy --
//! that's `extractor-core`.

#[macro_use]
extern crate tracing;

pub mod constants;
pub mod meta_addr;
pub mod peer_session;
pub mod protocol;

pub use meta_addr::MetaAddr;
pub use peer_session::{PeerConfig, PeerSession};
pub use protocol::external::{Codec, InventoryHash, Message, Version};
