use std::{num::NonZeroUsize, time::Duration};

use alloy::primitives::{B256, U256, keccak256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Senders per coordinator, independent of CPU count.
pub(crate) const DEFAULT_SENDER_COUNT: usize = 10;

/// Worker-pool size used when none is configured.
pub(crate) fn default_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Sizing parameters for a [`Coordinator`](crate::Coordinator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// 1-based position of this instance within the cooperating fleet.
    pub instance_index: u64,
    pub total_instances: u64,
    /// Transactions per second across the whole fleet.
    pub global_rate_cap: u64,
    /// Rate-accounting window used to size account ranges.
    pub window: Duration,
    /// Number of generator workers.
    pub parallelism: usize,
    pub sender_count: usize,
}

impl CoordinatorConfig {
    pub fn new(
        instance_index: u64,
        total_instances: u64,
        global_rate_cap: u64,
        window: Duration,
    ) -> Self {
        Self {
            instance_index,
            total_instances,
            global_rate_cap,
            window,
            parallelism: default_parallelism(),
            sender_count: DEFAULT_SENDER_COUNT,
        }
    }

    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub const fn with_sender_count(mut self, sender_count: usize) -> Self {
        self.sender_count = sender_count;
        self
    }
}

const fn default_instance() -> u64 {
    1
}

const fn default_rate() -> u64 {
    100
}

fn default_window() -> String {
    "10s".to_string()
}

const fn default_senders() -> usize {
    DEFAULT_SENDER_COUNT
}

fn default_key_seed() -> String {
    "txn-storm".to_string()
}

fn default_funding_amount() -> String {
    // 0.01 ether
    "10000000000000000".to_string()
}

const fn default_max_fee_per_gas() -> u128 {
    1_000_000_000
}

fn default_poll_interval() -> String {
    "1s".to_string()
}

/// Full run configuration, loadable from YAML and overridable from the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StormConfig {
    /// JSON-RPC endpoint receiving the load.
    pub rpc: String,
    /// Private key of the account funding every generator's accounts.
    pub donor_key: String,
    #[serde(default = "default_instance")]
    pub instance: u64,
    #[serde(default = "default_instance")]
    pub instances: u64,
    /// Global cap in transactions per second.
    #[serde(default = "default_rate")]
    pub rate: u64,
    #[serde(default = "default_window")]
    pub window: String,
    pub parallelism: Option<usize>,
    #[serde(default = "default_senders")]
    pub senders: usize,
    pub duration: Option<String>,
    /// Seed for the deterministic account keys.
    #[serde(default = "default_key_seed")]
    pub key_seed: String,
    /// Wei given to every generated account.
    #[serde(default = "default_funding_amount")]
    pub funding_amount: String,
    #[serde(default = "default_max_fee_per_gas")]
    pub max_fee_per_gas: u128,
    #[serde(default)]
    pub max_priority_fee_per_gas: u128,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
}

impl StormConfig {
    /// Config with only the required fields set.
    pub fn new(rpc: impl Into<String>, donor_key: impl Into<String>) -> Self {
        Self {
            rpc: rpc.into(),
            donor_key: donor_key.into(),
            instance: default_instance(),
            instances: default_instance(),
            rate: default_rate(),
            window: default_window(),
            parallelism: None,
            senders: default_senders(),
            duration: None,
            key_seed: default_key_seed(),
            funding_amount: default_funding_amount(),
            max_fee_per_gas: default_max_fee_per_gas(),
            max_priority_fee_per_gas: 0,
            poll_interval: default_poll_interval(),
        }
    }

    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        serde_yaml::from_str(&contents).context("failed to parse config YAML")
    }

    pub fn coordinator_config(&self) -> Result<CoordinatorConfig, ConfigError> {
        let window = parse_duration(&self.window)?;
        Ok(CoordinatorConfig::new(self.instance, self.instances, self.rate, window)
            .with_parallelism(self.parallelism.unwrap_or_else(default_parallelism))
            .with_sender_count(self.senders))
    }

    pub fn parse_duration(&self) -> Result<Option<Duration>, ConfigError> {
        self.duration.as_deref().map(parse_duration).transpose()
    }

    pub fn parse_poll_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.poll_interval)
    }

    pub fn parse_funding_amount(&self) -> Result<U256> {
        self.funding_amount.parse::<U256>().context("invalid funding_amount")
    }

    pub fn key_seed(&self) -> B256 {
        keccak256(self.key_seed.as_bytes())
    }
}

fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidDuration {
        value: value.to_string(),
        reason: e.to_string(),
    })
}
