use anyhow::{Result, bail};
use clap::Parser;

use crate::config::StormConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "txn-storm")]
#[command(
    about = "Transaction load generator - partitions accounts across workers and instances, and submits rate-capped transfers"
)]
pub struct Args {
    /// YAML config file; flags below override its values.
    #[arg(long, env = "TXN_STORM_CONFIG")]
    pub config: Option<String>,

    // ── Target ───────────────────────────────────────────────
    /// JSON-RPC endpoint URL.
    #[arg(long, env = "TXN_STORM_RPC")]
    pub rpc: Option<String>,

    /// Donor private key (hex, with or without 0x prefix).
    #[arg(long, env = "TXN_STORM_DONOR_KEY", hide_env_values = true)]
    pub donor_key: Option<String>,

    /// Seed for deterministic account keys.
    #[arg(long, env = "TXN_STORM_KEY_SEED")]
    pub key_seed: Option<String>,

    /// Wei given to each generated account.
    #[arg(long, env = "TXN_STORM_FUNDING_AMOUNT")]
    pub funding_amount: Option<String>,

    /// Max fee per gas in wei.
    #[arg(long, env = "TXN_STORM_MAX_FEE_PER_GAS")]
    pub max_fee_per_gas: Option<u128>,

    /// Max priority fee per gas in wei.
    #[arg(long, env = "TXN_STORM_MAX_PRIORITY_FEE_PER_GAS")]
    pub max_priority_fee_per_gas: Option<u128>,

    // ── Fleet ────────────────────────────────────────────────
    /// 1-based index of this instance.
    #[arg(long, env = "TXN_STORM_INSTANCE")]
    pub instance: Option<u64>,

    /// Number of cooperating instances.
    #[arg(long, env = "TXN_STORM_INSTANCES")]
    pub instances: Option<u64>,

    /// Global transactions-per-second cap shared by all instances.
    #[arg(long, env = "TXN_STORM_RATE")]
    pub rate: Option<u64>,

    /// Rate window used to size account ranges (e.g. "10s").
    #[arg(long, env = "TXN_STORM_WINDOW")]
    pub window: Option<String>,

    // ── Pools ────────────────────────────────────────────────
    /// Generator workers (defaults to available CPUs).
    #[arg(long, env = "TXN_STORM_PARALLELISM")]
    pub parallelism: Option<usize>,

    /// Sender workers.
    #[arg(long, env = "TXN_STORM_SENDERS")]
    pub senders: Option<usize>,

    // ── Run ──────────────────────────────────────────────────
    /// Run duration (e.g. "60s", "5m"). Runs until Ctrl+C if unset.
    #[arg(long, env = "TXN_STORM_DURATION")]
    pub duration: Option<String>,

    /// Block height poll interval.
    #[arg(long, env = "TXN_STORM_POLL_INTERVAL")]
    pub poll_interval: Option<String>,

    /// Log level.
    #[arg(long, env = "TXN_STORM_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format: `json` or `text`.
    #[arg(long, env = "TXN_STORM_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Args {
    /// Loads the config file, if any, and applies flag overrides.
    pub fn into_config(self) -> Result<StormConfig> {
        let mut config = match (&self.config, &self.rpc, &self.donor_key) {
            (Some(path), _, _) => StormConfig::load(path)?,
            (None, Some(rpc), Some(donor_key)) => StormConfig::new(rpc, donor_key),
            (None, None, _) => bail!("--rpc is required when no --config is given"),
            (None, _, None) => bail!("--donor-key is required when no --config is given"),
        };

        if let Some(rpc) = self.rpc {
            config.rpc = rpc;
        }
        if let Some(donor_key) = self.donor_key {
            config.donor_key = donor_key;
        }
        if let Some(key_seed) = self.key_seed {
            config.key_seed = key_seed;
        }
        if let Some(funding_amount) = self.funding_amount {
            config.funding_amount = funding_amount;
        }
        if let Some(fee) = self.max_fee_per_gas {
            config.max_fee_per_gas = fee;
        }
        if let Some(fee) = self.max_priority_fee_per_gas {
            config.max_priority_fee_per_gas = fee;
        }
        if let Some(instance) = self.instance {
            config.instance = instance;
        }
        if let Some(instances) = self.instances {
            config.instances = instances;
        }
        if let Some(rate) = self.rate {
            config.rate = rate;
        }
        if let Some(window) = self.window {
            config.window = window;
        }
        if self.parallelism.is_some() {
            config.parallelism = self.parallelism;
        }
        if let Some(senders) = self.senders {
            config.senders = senders;
        }
        if self.duration.is_some() {
            config.duration = self.duration;
        }
        if let Some(poll_interval) = self.poll_interval {
            config.poll_interval = poll_interval;
        }

        Ok(config)
    }
}
