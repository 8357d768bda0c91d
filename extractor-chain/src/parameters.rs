//! Per-chain consensus parameters: network magic bytes and genesis blocks.

pub mod genesis;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The Bitcoin chain the extractor is configured to follow.
///
/// Distinguished on the wire by a 4-byte network magic in every P2P message header.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(proptest_derive::Arbitrary))]
pub enum Network {
    Mainnet,
    Testnet3,
    Regtest,
    Simnet,
}

impl Network {
    /// The 4-byte network magic prefixed to every P2P message on this chain.
    pub const fn magic(&self) -> [u8; 4] {
        match self {
            Network::Mainnet => [0xf9, 0xbe, 0xb4, 0xd9],
            Network::Testnet3 => [0x0b, 0x11, 0x09, 0x07],
            Network::Regtest => [0xfa, 0xbf, 0xb5, 0xda],
            Network::Simnet => [0x16, 0x1c, 0x14, 0x12],
        }
    }

    pub fn from_magic(magic: [u8; 4]) -> Option<Network> {
        [
            Network::Mainnet,
            Network::Testnet3,
            Network::Regtest,
            Network::Simnet,
        ]
        .into_iter()
        .find(|network| network.magic() == magic)
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet3 => "testnet3",
            Network::Regtest => "regtest",
            Network::Simnet => "simnet",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
#[error("unknown chain {0:?}, expected one of mainnet, testnet3, regtest, simnet")]
pub struct UnknownNetworkError(String);

impl FromStr for Network {
    type Err = UnknownNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "testnet3" => Ok(Network::Testnet3),
            "regtest" => Ok(Network::Regtest),
            "simnet" => Ok(Network::Simnet),
            other => Err(UnknownNetworkError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_round_trips_through_from_magic() {
        for network in [
            Network::Mainnet,
            Network::Testnet3,
            Network::Regtest,
            Network::Simnet,
        ] {
            assert_eq!(Network::from_magic(network.magic()), Some(network));
        }
    }

    #[test]
    fn chain_name_parses_case_sensitively() {
        assert_eq!("regtest".parse::<Network>().unwrap(), Network::Regtest);
        assert!("Regtest".parse::<Network>().is_err());
    }
}
