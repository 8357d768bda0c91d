use std::io;

use crate::{
    block,
    cached::Cached,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
};

use super::{CoinbaseData, Input, OutPoint, Script};

/// A coinbase input is identified on the wire by a null `OutPoint`: an
/// all-zero hash and an index of `0xffff_ffff`.
fn is_coinbase_outpoint(hash: &[u8; 32], index: u32) -> bool {
    *hash == [0u8; 32] && index == u32::MAX
}

impl BitcoinSerialize for Input {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self {
            Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
            } => {
                outpoint.bitcoin_serialize(&mut writer)?;
                unlock_script.bitcoin_serialize(&mut writer)?;
                sequence.bitcoin_serialize(&mut writer)
            }
            Input::Coinbase {
                data, sequence, ..
            } => {
                [0u8; 32].bitcoin_serialize(&mut writer)?;
                u32::MAX.bitcoin_serialize(&mut writer)?;
                data.bitcoin_serialize(&mut writer)?;
                sequence.bitcoin_serialize(&mut writer)
            }
        }
    }
}

impl BitcoinDeserialize for Input {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let prev_hash = <[u8; 32]>::bitcoin_deserialize(&mut reader)?;
        let prev_index = u32::bitcoin_deserialize(&mut reader)?;

        if is_coinbase_outpoint(&prev_hash, prev_index) {
            let data = CoinbaseData::bitcoin_deserialize(&mut reader)?;
            let sequence = u32::bitcoin_deserialize(&mut reader)?;
            Ok(Input::Coinbase {
                height: coinbase_height(&data),
                data,
                sequence,
            })
        } else {
            let outpoint = OutPoint {
                hash: crate::transaction::Hash(prev_hash),
                index: prev_index,
            };
            let unlock_script = Script::bitcoin_deserialize(&mut reader)?;
            let sequence = u32::bitcoin_deserialize(&mut reader)?;
            Ok(Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
            })
        }
    }
}

/// Attempts to read a BIP 34 block height from the start of a coinbase's free-form data.
///
/// BIP 34 specifies that, past its activation height, the coinbase input's
/// `data` field begins with the serialized block height as a minimally-encoded
/// script push. We don't know activation status here, so the caller decides
/// whether to trust this value; returning `None` just means "could not be read",
/// not "not present".
fn coinbase_height(data: &CoinbaseData) -> Option<Cached<block::Height>> {
    let bytes = data.as_ref();
    let push_len = *bytes.first()? as usize;
    if push_len == 0 || push_len > 4 || bytes.len() < 1 + push_len {
        return None;
    }
    let mut height_bytes = [0u8; 4];
    height_bytes[..push_len].copy_from_slice(&bytes[1..1 + push_len]);
    Some(Cached::from(block::Height(u32::from_le_bytes(
        height_bytes,
    ))))
}

impl BitcoinDeserialize for OutPoint {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(OutPoint {
            hash: crate::transaction::Hash::bitcoin_deserialize(&mut reader)?,
            index: u32::bitcoin_deserialize(&mut reader)?,
        })
    }
}
