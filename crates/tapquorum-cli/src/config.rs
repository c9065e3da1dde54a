//! CLI configuration, parsed from TOML file + environment variable overrides.
//!
//! Priority: environment variables > config file > defaults.

use anyhow::{Context, Result};
use bitcoin::key::XOnlyPublicKey;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tapquorum_policy::{InternalKey, LeafStrategy, ThresholdPolicy, WeightingScheme};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingSection,

    #[serde(default)]
    pub bitcoin: BitcoinSection,

    /// Threshold policy to build
    pub policy: PolicySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinSection {
    /// Bitcoin network: "bitcoin", "testnet", "signet", "regtest"
    #[serde(default = "default_network")]
    pub network: String,
}

impl Default for BitcoinSection {
    fn default() -> Self {
        Self {
            network: default_network(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySection {
    /// Signer keys, 64-character hex x-only
    pub keys: Vec<String>,

    /// Number of signers that must cooperate
    pub threshold: usize,

    /// Hex x-only owner key, or "unspendable"
    #[serde(default = "default_internal_key")]
    pub internal_key: String,

    /// "checksigadd" or "musig"
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// "floor-percent" or "spread-percent"
    #[serde(default = "default_weighting")]
    pub weighting: String,

    /// Sort keys before building so key order in the file does not matter
    #[serde(default)]
    pub sort_keys: bool,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_network() -> String {
    "bitcoin".to_string()
}

fn default_internal_key() -> String {
    "unspendable".to_string()
}

fn default_strategy() -> String {
    "checksigadd".to_string()
}

fn default_weighting() -> String {
    "floor-percent".to_string()
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `TAPQUORUM_LOG_LEVEL`
    /// - `TAPQUORUM_NETWORK`
    /// - `TAPQUORUM_THRESHOLD`
    /// - `TAPQUORUM_STRATEGY`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TAPQUORUM_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("TAPQUORUM_NETWORK") {
            self.bitcoin.network = v;
        }
        if let Ok(v) = std::env::var("TAPQUORUM_THRESHOLD") {
            if let Ok(k) = v.parse::<usize>() {
                self.policy.threshold = k;
            }
        }
        if let Ok(v) = std::env::var("TAPQUORUM_STRATEGY") {
            self.policy.strategy = v;
        }
    }

    /// Parse the bitcoin network string to a `bitcoin::Network`.
    pub fn network(&self) -> bitcoin::Network {
        match self.bitcoin.network.as_str() {
            "testnet" | "testnet3" => bitcoin::Network::Testnet,
            "signet" => bitcoin::Network::Signet,
            "regtest" => bitcoin::Network::Regtest,
            _ => bitcoin::Network::Bitcoin,
        }
    }

    pub fn strategy(&self) -> Result<LeafStrategy> {
        LeafStrategy::from_str(&self.policy.strategy).context("policy.strategy")
    }

    pub fn weighting(&self) -> Result<WeightingScheme> {
        WeightingScheme::from_str(&self.policy.weighting).context("policy.weighting")
    }

    /// Build the threshold policy described by the `[policy]` section.
    pub fn threshold_policy(&self) -> Result<ThresholdPolicy> {
        let keys = self
            .policy
            .keys
            .iter()
            .enumerate()
            .map(|(i, k)| {
                XOnlyPublicKey::from_str(k)
                    .with_context(|| format!("policy.keys[{}] is not an x-only key: {}", i, k))
            })
            .collect::<Result<Vec<_>>>()?;
        let internal_key =
            InternalKey::from_str(&self.policy.internal_key).context("policy.internal_key")?;

        let policy = ThresholdPolicy::new(keys, self.policy.threshold, internal_key)
            .context("Invalid threshold policy")?;
        Ok(if self.policy.sort_keys {
            policy.sorted()
        } else {
            policy
        })
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            matches!(
                self.bitcoin.network.as_str(),
                "bitcoin" | "testnet" | "testnet3" | "signet" | "regtest"
            ),
            "bitcoin.network must be one of bitcoin, testnet, signet, regtest"
        );

        anyhow::ensure!(
            matches!(
                self.logging.level.as_str(),
                "error" | "warn" | "info" | "debug" | "trace"
            ),
            "logging.level must be one of error, warn, info, debug, trace"
        );

        anyhow::ensure!(!self.policy.keys.is_empty(), "policy.keys must not be empty");

        self.strategy()?;
        self.weighting()?;
        self.threshold_policy()?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
