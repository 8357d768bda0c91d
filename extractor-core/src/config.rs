//! Extractor configuration.
//!
//! `host`/`port`/`chain` default to a local mainnet peer on the standard
//! port; the remaining timeouts and batch sizes default to values picked
//! for a one-batch-of-500 `getblocks` cadence (see `DESIGN.md` for the
//! reasoning behind each default).

use std::time::Duration;

use extractor_chain::{block, parameters::Network};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_blocks_request_count() -> u32 {
    500
}

fn default_blocks_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_block_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_block_monitor_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_block_monitor_lifetime() -> Duration {
    Duration::from_secs(300)
}

fn default_transaction_lifetime() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_port() -> u16 {
    8333
}

/// `[logging]` table -- always carried even though any read-side API is
/// out of scope here, since logging is ambient, not a feature.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

mod chain_name {
    use std::str::FromStr;

    use extractor_chain::parameters::Network;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(network: &Network, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(network)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Network, D::Error> {
        let s = String::deserialize(deserializer)?;
        Network::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Top-level extractor configuration, loaded from TOML with environment
/// overrides applied by the `extractor` binary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(with = "chain_name")]
    pub chain: Network,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    pub start_block_id: String,
    pub start_block_height: i64,

    #[serde(default = "default_blocks_request_count")]
    pub blocks_request_count: u32,
    #[serde(with = "humantime_serde", default = "default_blocks_request_timeout")]
    pub blocks_request_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_block_timeout")]
    pub block_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_block_monitor_timeout")]
    pub block_monitor_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_block_monitor_lifetime")]
    pub block_monitor_lifetime: Duration,
    #[serde(with = "humantime_serde", default = "default_transaction_lifetime")]
    pub transaction_lifetime: Duration,

    #[serde(default)]
    pub store_raw_blocks: bool,
    #[serde(default)]
    pub store_raw_transactions: bool,
    #[serde(default)]
    pub debug_messages: bool,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates cross-field invariants: `start_block_id` must match
    /// `start_block_height`. `start_block_height == -1` means "synthesise
    /// the chain's genesis block", in which case `start_block_id` is
    /// ignored.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_block_height == -1 {
            return Ok(());
        }
        if self.start_block_height < -1 {
            return Err(ConfigError::InvalidStartHeight(self.start_block_height));
        }
        self.start_block_id
            .parse::<block::Hash>()
            .map_err(|_| ConfigError::InvalidStartBlockId(self.start_block_id.clone()))?;
        Ok(())
    }

    /// The genesis-seeded config for `network`, used by tests and by a
    /// cold start with no persisted tip.
    pub fn genesis(network: Network, host: impl Into<String>) -> Config {
        Config {
            chain: network,
            host: host.into(),
            port: default_port(),
            start_block_id: extractor_chain::parameters::genesis::genesis_hash(network).to_string(),
            start_block_height: -1,
            blocks_request_count: default_blocks_request_count(),
            blocks_request_timeout: default_blocks_request_timeout(),
            block_timeout: default_block_timeout(),
            block_monitor_timeout: default_block_monitor_timeout(),
            block_monitor_lifetime: default_block_monitor_lifetime(),
            transaction_lifetime: default_transaction_lifetime(),
            store_raw_blocks: false,
            store_raw_transactions: false,
            debug_messages: false,
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_start_height_skips_start_block_id_validation() {
        let mut config = Config::genesis(Network::Regtest, "127.0.0.1");
        config.start_block_id = "not hex".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn mismatched_start_block_id_is_rejected() {
        let mut config = Config::genesis(Network::Regtest, "127.0.0.1");
        config.start_block_height = 100;
        config.start_block_id = "not hex".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trips_with_defaults() {
        let toml_src = r#"
            chain = "mainnet"
            host = "bitcoind"
            start_block_id = "0000000000000000000000000000000000000000000000000000000000000000"
            start_block_height = 0
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.port, 8333);
        assert_eq!(config.blocks_request_count, 500);
        assert_eq!(config.block_timeout, Duration::from_secs(120));
    }
}
