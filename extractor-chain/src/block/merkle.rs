//! The transaction Merkle tree root committed to by a block header.

use std::{io, iter::FromIterator};

use serde::{Deserialize, Serialize};

use crate::{
    serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError},
    transaction,
};

/// The root of a block's transaction Merkle tree.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Root(pub [u8; 32]);

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(reversed))
            .finish()
    }
}

impl BitcoinSerialize for Root {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for Root {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::bitcoin_deserialize(reader)?))
    }
}

/// Computes the Merkle root of a list of transaction hashes using Bitcoin's
/// pairwise double-SHA256 scheme, duplicating the last hash at each level
/// when the level has an odd count.
impl FromIterator<transaction::Hash> for Root {
    fn from_iter<T: IntoIterator<Item = transaction::Hash>>(iter: T) -> Self {
        let mut layer: Vec<[u8; 32]> = iter.into_iter().map(|hash| hash.0).collect();
        if layer.is_empty() {
            return Root([0; 32]);
        }
        while layer.len() > 1 {
            if layer.len() % 2 == 1 {
                layer.push(*layer.last().expect("layer is non-empty"));
            }
            layer = layer
                .chunks(2)
                .map(|pair| {
                    let mut writer = sha256d::Writer::default();
                    io::Write::write_all(&mut writer, &pair[0]).expect("write is infallible");
                    io::Write::write_all(&mut writer, &pair[1]).expect("write is infallible");
                    writer.finish()
                })
                .collect();
        }
        Root(layer[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_transaction_merkle_root_is_its_own_hash() {
        let hash = transaction::Hash([7; 32]);
        let root: Root = std::iter::once(hash).collect();
        assert_eq!(root.0, hash.0);
    }

    #[test]
    fn odd_transaction_count_duplicates_last_hash() {
        let a = transaction::Hash([1; 32]);
        let b = transaction::Hash([2; 32]);
        let c = transaction::Hash([3; 32]);

        let three: Root = vec![a, b, c].into_iter().collect();
        let four: Root = vec![a, b, c, c].into_iter().collect();
        assert_eq!(three.0, four.0);
    }
}
