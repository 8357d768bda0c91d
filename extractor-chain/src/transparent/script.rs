#![allow(clippy::unit_arg)]
use crate::{
    compactint::CompactInt,
    parameters::Network,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
};
use std::{
    fmt,
    io::{self, Read},
};

use super::address::SegwitAddress;
use super::Address;

/// An encoding of a Bitcoin script.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn serialized_size(&self) -> usize {
        CompactInt::size(self.0.len()) + self.0.len()
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Script")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl BitcoinSerialize for Script {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        CompactInt::from(self.0.len()).bitcoin_serialize(&mut writer)?;
        writer.write_all(&self.0[..])?;
        Ok(())
    }
}

impl BitcoinDeserialize for Script {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        // XXX what is the max length of a script?
        let len = CompactInt::bitcoin_deserialize(&mut reader)?.value();
        let mut bytes = Vec::new();
        reader.take(len).read_to_end(&mut bytes)?;
        Ok(Script(bytes))
    }
}

/// A coarse classification of a lock script's spending pattern, used for
/// address/statistics reporting rather than for validation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScriptType {
    PayToPublicKeyHash,
    PayToScriptHash,
    PayToPublicKey,
    PayToWitnessPublicKeyHash,
    PayToWitnessScriptHash,
    PayToTaproot,
    NullData,
    Multisig,
    NonStandard,
}

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_EQUAL: u8 = 0x87;
const OP_RETURN: u8 = 0x6a;
const OP_0: u8 = 0x00;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;
const OP_CHECKMULTISIG: u8 = 0xae;

impl Script {
    /// Classifies this script by matching it against the standard output
    /// templates recognised by Bitcoin Core's `IsStandard` checks.
    pub fn script_type(&self) -> ScriptType {
        let b = &self.0[..];
        match b {
            [OP_DUP, OP_HASH160, 0x14, .., OP_EQUALVERIFY, OP_CHECKSIG] if b.len() == 25 => {
                ScriptType::PayToPublicKeyHash
            }
            [OP_HASH160, 0x14, .., OP_EQUAL] if b.len() == 23 => ScriptType::PayToScriptHash,
            [0x21, .., OP_CHECKSIG] if b.len() == 35 => ScriptType::PayToPublicKey,
            [0x41, .., OP_CHECKSIG] if b.len() == 67 => ScriptType::PayToPublicKey,
            [OP_0, 0x14, ..] if b.len() == 22 => ScriptType::PayToWitnessPublicKeyHash,
            [OP_0, 0x20, ..] if b.len() == 34 => ScriptType::PayToWitnessScriptHash,
            [0x51, 0x20, ..] if b.len() == 34 => ScriptType::PayToTaproot,
            [OP_RETURN, ..] => ScriptType::NullData,
            _ if b.len() >= 3
                && (OP_1..=OP_16).contains(&b[0])
                && (OP_1..=OP_16).contains(&b[b.len() - 2])
                && b[b.len() - 1] == OP_CHECKMULTISIG =>
            {
                ScriptType::Multisig
            }
            _ => ScriptType::NonStandard,
        }
    }

    /// Renders the address(es) this lock script pays, if any.
    ///
    /// Returns zero addresses for `OP_RETURN`, bare multisig, and
    /// non-standard scripts -- these have no single canonical address.
    pub fn addresses(&self, network: Network) -> Vec<String> {
        let b = &self.0[..];
        match self.script_type() {
            ScriptType::PayToPublicKeyHash => vec![Address::PayToPublicKeyHash {
                network,
                pub_key_hash: b[3..23].try_into().expect("checked by script_type match"),
            }
            .to_string()],
            ScriptType::PayToScriptHash => vec![Address::PayToScriptHash {
                network,
                script_hash: b[2..22].try_into().expect("checked by script_type match"),
            }
            .to_string()],
            ScriptType::PayToWitnessPublicKeyHash => vec![SegwitAddress {
                network,
                witness_version: 0,
                program: b[2..22].to_vec(),
            }
            .to_string()],
            ScriptType::PayToWitnessScriptHash => vec![SegwitAddress {
                network,
                witness_version: 0,
                program: b[2..34].to_vec(),
            }
            .to_string()],
            ScriptType::PayToTaproot => vec![SegwitAddress {
                network,
                witness_version: 1,
                program: b[2..34].to_vec(),
            }
            .to_string()],
            ScriptType::PayToPublicKey
            | ScriptType::NullData
            | ScriptType::Multisig
            | ScriptType::NonStandard => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2pkh_script_resolves_to_one_address() {
        // OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
        let mut bytes = vec![OP_DUP, OP_HASH160, 0x14];
        bytes.extend_from_slice(&[0u8; 20]);
        bytes.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        let script = Script(bytes);

        assert_eq!(script.script_type(), ScriptType::PayToPublicKeyHash);
        assert_eq!(
            script.addresses(Network::Mainnet),
            vec!["1111111111111111111114oLvT2".to_string()]
        );
    }

    #[test]
    fn op_return_script_resolves_to_no_addresses() {
        let script = Script(vec![OP_RETURN, 0x02, 0xab, 0xcd]);
        assert_eq!(script.script_type(), ScriptType::NullData);
        assert!(script.addresses(Network::Mainnet).is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;
    use crate::serialization::{BitcoinDeserialize, BitcoinSerialize};

    proptest! {
        #[test]
        fn script_roundtrip(script in any::<Script>()) {
            extractor_test::init();

            let mut bytes = Cursor::new(Vec::new());
            script.bitcoin_serialize(&mut bytes)?;

            bytes.set_position(0);
            let other_script = Script::bitcoin_deserialize(&mut bytes)?;

            prop_assert_eq![script, other_script];
        }
    }
}
