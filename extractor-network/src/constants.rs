//! Protocol-level tuning constants shared across the peer session and codec.

use std::time::Duration;

use crate::protocol::external::types::ProtocolVersion;

/// The protocol version this extractor advertises in its own `version` message.
///
/// BIP152 compact blocks (70014) and beyond aren't spoken by this extractor,
/// but advertising a recent version keeps peers from pruning useful services.
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion(70_015);

/// How long a peer session waits for the peer's `verack` before giving up on
/// the handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The interval on which queued outbound messages are flushed to the peer.
pub const TRICKLE_INTERVAL: Duration = Duration::from_secs(10);

/// Depth of the bounded outbound message queue per peer session.
pub const PEER_SEND_QUEUE_CAPACITY: usize = 256;
