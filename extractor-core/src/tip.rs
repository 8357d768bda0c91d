//! The extractor's notion of "how far we've linked the chain".
//!
//! Advancement is serialised here rather than left to callers: `advance`
//! only succeeds when the new block actually links to the current tip,
//! which is what gives the extractor its "heights never skip" invariant.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use extractor_chain::block;

/// A snapshot of the tip at a point in time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TipSnapshot {
    pub block_id: block::Hash,
    pub height: i64,
    pub last_block_time: DateTime<Utc>,
}

struct Inner {
    block_id: block::Hash,
    height: i64,
    last_block_time: DateTime<Utc>,
}

/// The highest block this extractor has persisted, plus everything
/// downstream of it back to the configured starting point.
pub struct ValidTip(Mutex<Inner>);

impl ValidTip {
    pub fn new(block_id: block::Hash, height: i64, last_block_time: DateTime<Utc>) -> Self {
        ValidTip(Mutex::new(Inner {
            block_id,
            height,
            last_block_time,
        }))
    }

    pub fn snapshot(&self) -> TipSnapshot {
        let inner = self.0.lock().expect("tip lock poisoned");
        TipSnapshot {
            block_id: inner.block_id,
            height: inner.height,
            last_block_time: inner.last_block_time,
        }
    }

    /// Advances the tip to `(block_id, height)`, but only if `prev_block_id`
    /// matches the current tip. Returns `true` if the advance happened.
    ///
    /// This is the single serialisation point for `valid_tip`: two blocks
    /// racing to extend the same parent will have exactly one of them win.
    pub fn advance(
        &self,
        prev_block_id: block::Hash,
        block_id: block::Hash,
        height: i64,
        now: DateTime<Utc>,
    ) -> bool {
        let mut inner = self.0.lock().expect("tip lock poisoned");
        if inner.block_id != prev_block_id {
            return false;
        }
        inner.block_id = block_id;
        inner.height = height;
        inner.last_block_time = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> block::Hash {
        block::Hash([byte; 32])
    }

    #[test]
    fn advance_only_succeeds_when_parent_matches() {
        let tip = ValidTip::new(hash(1), 100, Utc::now());

        assert!(!tip.advance(hash(99), hash(2), 101, Utc::now()));
        assert_eq!(tip.snapshot().height, 100);

        assert!(tip.advance(hash(1), hash(2), 101, Utc::now()));
        assert_eq!(tip.snapshot().height, 101);
        assert_eq!(tip.snapshot().block_id, hash(2));
    }
}
