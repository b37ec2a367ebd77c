use thiserror::Error;

/// Invalid coordinator sizing. Always reported at construction, before any
/// worker is created, because a bad partition silently overlaps account ranges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("instance index {index} must be within 1..={total}")]
    InstanceIndexOutOfRange { index: u64, total: u64 },

    #[error("global rate cap {cap} tx/s shared by {instances} instances leaves a zero per-instance budget")]
    ZeroRateBudget { cap: u64, instances: u64 },

    #[error("worker pool parallelism must be at least 1")]
    ZeroParallelism,

    #[error("sender pool must contain at least one sender")]
    ZeroSenders,

    #[error(
        "window budget of {window_budget} accounts cannot give each of {workers} generators a non-empty range"
    )]
    EmptyAccountRange { window_budget: u64, workers: usize },

    #[error(
        "rate budget {rate_budget} tx/s over a {window_secs}s window for {instances} instances exceeds the account index space"
    )]
    AccountSpaceOverflow { rate_budget: u64, window_secs: u64, instances: u64 },

    #[error("invalid duration {value:?}: {reason}")]
    InvalidDuration { value: String, reason: String },
}
