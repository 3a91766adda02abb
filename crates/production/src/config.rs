//! Node configuration file.
//!
//! ```toml
//! [node]
//! key_seed = "0101010101010101010101010101010101010101010101010101010101010101"
//! channel_capacity = 10000
//!
//! [consensus]
//! max_block_bytes = 90000
//!
//! [consensus.pacemaker]
//! timeout_ms = 5000
//!
//! [telemetry]
//! log_filter = "info,hotstuff=debug"
//! ```
//!
//! Every field has a default, so an empty file is a valid config.

use crate::TelemetryConfig;
use hotstuff_bft::ConsensusConfig;
use hotstuff_types::KeyPair;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Default capacity of a runner's inbound event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid key seed: {0}")]
    KeySeed(String),
}

/// Top-level node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub consensus: ConsensusConfig,
    pub telemetry: TelemetryConfig,
}

/// The `[node]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Hex-encoded 32-byte ed25519 secret seed.
    pub key_seed: Option<String>,

    /// Capacity of the inbound event channel.
    pub channel_capacity: usize,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            key_seed: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// The configured signing key, if a seed is set.
    pub fn signing_key(&self) -> Result<Option<KeyPair>, ConfigError> {
        let Some(seed) = &self.node.key_seed else {
            return Ok(None);
        };
        let bytes = hex::decode(seed.trim()).map_err(|e| ConfigError::KeySeed(e.to_string()))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| ConfigError::KeySeed(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Some(KeyPair::from_seed(&seed)))
    }
}
