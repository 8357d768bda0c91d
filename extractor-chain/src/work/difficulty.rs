//! Bitcoin's compact difficulty ("nBits") target encoding.

use std::io;

use serde::{Deserialize, Serialize};

use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A block's difficulty threshold, encoded the same way as Bitcoin's `nBits`
/// header field: a 1-byte exponent and a 3-byte mantissa, read together as a
/// little-endian `u32`.
///
/// This type stores the raw encoded value rather than decoding it to a
/// 256-bit target, since the extractor never validates proof of work -- it
/// only needs to round-trip the header field.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CompactDifficulty(pub u32);

impl BitcoinSerialize for CompactDifficulty {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for CompactDifficulty {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(CompactDifficulty(u32::bitcoin_deserialize(reader)?))
    }
}
