//! Bitcoin block and transaction data model, and the consensus-adjacent wire
//! serialization primitives the extractor needs to parse them.
//!
//! This crate intentionally does not implement script or transaction
//! validation: the extractor is a structural parser, not a node.

#[macro_use]
extern crate serde;

pub mod amount;
pub mod block;
pub mod cached;
pub mod compactint;
pub mod fmt;
pub mod parameters;
pub mod serialization;
pub mod transaction;
pub mod transparent;
pub mod work;

pub use cached::Cached;
pub use compactint::CompactInt;
pub use serialization::{
    BitcoinDeserialize, BitcoinDeserializeInto, BitcoinSerialize, SerializationError,
};
