use std::io;

use serde::{Deserialize, Serialize};

use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// The height of a block, i.e. its distance from the genesis block (height 0).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(proptest_derive::Arbitrary))]
pub struct Height(pub u32);

impl Height {
    /// The maximum height that can be represented by BIP 34 coinbase-embedded heights.
    pub const MAX: Height = Height(499_999_999);
}

impl std::fmt::Display for Height {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl BitcoinSerialize for Height {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for Height {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Height(u32::bitcoin_deserialize(reader)?))
    }
}
