//! Small newtype wrappers for primitive wire values.
//!
//! These give otherwise-bare integers a type identity (a peer's protocol
//! version isn't just any `u32`) and a place to hang their
//! [`BitcoinSerialize`]/[`BitcoinDeserialize`] impls.

use std::fmt;

use extractor_chain::{parameters::Network, BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// The 4-byte magic value that prefixes every message on a given [`Network`].
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Magic(pub [u8; 4]);

impl From<Network> for Magic {
    fn from(network: Network) -> Magic {
        Magic(network.magic())
    }
}

impl fmt::Debug for Magic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Magic").field(&hex::encode(self.0)).finish()
    }
}

/// The Bitcoin network protocol version spoken by a peer.
///
/// Negotiated during the `version`/`verack` handshake; some message formats
/// change behavior based on the negotiated value (e.g. `getblocks` carries
/// its own copy of the version field for historical reasons).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ProtocolVersion(pub u32);

impl BitcoinSerialize for ProtocolVersion {
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for ProtocolVersion {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(ProtocolVersion(u32::bitcoin_deserialize(reader)?))
    }
}

/// A nonce used to detect self-connections (`version`) or match requests to
/// replies (`ping`/`pong`).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Nonce(pub u64);

impl BitcoinSerialize for Nonce {
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for Nonce {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Nonce(u64::bitcoin_deserialize(reader)?))
    }
}

/// A BIP37 bloom filter, as carried by a `filterload` message.
///
/// Unlike most variable-length fields, a `filterload` body has no internal
/// length prefix for the filter bytes: the length is implied by the message's
/// overall body length, so `Filter` does not implement [`BitcoinSerialize`]/
/// [`BitcoinDeserialize`] itself. The codec reads and writes its bytes directly.
#[derive(Clone, Eq, PartialEq)]
pub struct Filter(pub Vec<u8>);

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.0.len()).finish()
    }
}

/// A random value mixed into the seed of a [`Filter`]'s hash functions.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Tweak(pub u32);

bitflags::bitflags! {
    /// Services advertised by a peer in its `version` message.
    ///
    /// [Bitcoin reference](https://en.bitcoin.it/wiki/Protocol_documentation#version)
    pub struct PeerServices: u64 {
        /// Full node: can serve the complete block chain.
        const NODE_NETWORK = 0x01;
        /// Can be queried for the UTXO set, per BIP64 (deprecated upstream, rarely set).
        const NODE_GETUTXO = 0x02;
        /// Supports BIP37 bloom filters.
        const NODE_BLOOM = 0x04;
        /// Supports BIP144 segregated witness serialization.
        const NODE_WITNESS = 0x08;
        /// Can serve blocks only for a limited recent window (BIP159).
        const NODE_NETWORK_LIMITED = 0x400;
    }
}

impl BitcoinSerialize for PeerServices {
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.bits().bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for PeerServices {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        let bits = u64::bitcoin_deserialize(reader)?;
        // Unknown/future service bits are preserved rather than rejected: a
        // peer advertising a bit we don't recognize isn't a protocol error.
        Ok(PeerServices::from_bits_truncate(bits))
    }
}
