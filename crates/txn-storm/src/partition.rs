//! Construction-time sizing: per-instance rate budget and the disjoint account
//! ranges handed to each generator worker.

use std::fmt;

use crate::{config::CoordinatorConfig, error::ConfigError};

/// Half-open interval `[from, to)` of account indices owned by one generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountRange {
    pub from: u64,
    pub to: u64,
}

impl AccountRange {
    pub const fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    pub const fn len(&self) -> u64 {
        self.to.saturating_sub(self.from)
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn contains(&self, index: u64) -> bool {
        index >= self.from && index < self.to
    }

    pub const fn overlaps(&self, other: &Self) -> bool {
        self.from < other.to && other.from < self.to
    }

    /// Iterates the account indices of the range in ascending order.
    pub fn indices(&self) -> std::ops::Range<u64> {
        self.from..self.to
    }
}

impl fmt::Display for AccountRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// Sizing derived from a [`CoordinatorConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Transactions per second this instance may forward.
    pub rate_budget: u64,
    /// Accounts this instance consumes over one rate-accounting window.
    pub window_budget: u64,
    /// Width of each generator's range.
    pub accounts_per_worker: u64,
    /// First account index owned by this instance.
    pub offset: u64,
    /// One range per generator, in pool order.
    pub ranges: Vec<AccountRange>,
}

impl Partition {
    /// Validates the config and lays out this instance's account ranges.
    ///
    /// Instance `i` (1-based) owns `[window_budget * (i - 1), window_budget * i)`,
    /// split into `parallelism` equal contiguous slices. Indices left over by the
    /// integer division stay unassigned. Fails if the whole fleet's account
    /// space does not fit in `u64`.
    pub fn plan(config: &CoordinatorConfig) -> Result<Self, ConfigError> {
        let index = config.instance_index;
        let total = config.total_instances;
        if index < 1 || index > total {
            return Err(ConfigError::InstanceIndexOutOfRange { index, total });
        }
        if config.parallelism == 0 {
            return Err(ConfigError::ZeroParallelism);
        }
        if config.sender_count == 0 {
            return Err(ConfigError::ZeroSenders);
        }

        let rate_budget = config.global_rate_cap / total;
        if rate_budget == 0 {
            return Err(ConfigError::ZeroRateBudget { cap: config.global_rate_cap, instances: total });
        }

        let window_secs = config.window.as_secs();
        let overflow =
            ConfigError::AccountSpaceOverflow { rate_budget, window_secs, instances: total };
        let window_budget = rate_budget.checked_mul(window_secs).ok_or(overflow.clone())?;
        // Every instance's range must be addressable, not only this one's.
        window_budget.checked_mul(total).ok_or(overflow)?;

        let workers = config.parallelism as u64;
        let accounts_per_worker = window_budget / workers;
        if accounts_per_worker == 0 {
            return Err(ConfigError::EmptyAccountRange {
                window_budget,
                workers: config.parallelism,
            });
        }

        let offset = window_budget * (index - 1);
        let ranges = (0..workers)
            .map(|i| {
                let from = offset + i * accounts_per_worker;
                AccountRange::new(from, from + accounts_per_worker)
            })
            .collect();

        Ok(Self { rate_budget, window_budget, accounts_per_worker, offset, ranges })
    }

    /// The contiguous interval covered by all ranges.
    pub fn span(&self) -> AccountRange {
        let from = self.ranges.first().map_or(self.offset, |r| r.from);
        let to = self.ranges.last().map_or(self.offset, |r| r.to);
        AccountRange::new(from, to)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config(index: u64, total: u64, cap: u64, window_secs: u64, workers: usize) -> CoordinatorConfig {
        CoordinatorConfig::new(index, total, cap, Duration::from_secs(window_secs))
            .with_parallelism(workers)
    }

    #[test]
    fn single_instance_scenario() {
        let plan = Partition::plan(&config(1, 1, 100, 10, 4)).unwrap();

        assert_eq!(plan.rate_budget, 100);
        assert_eq!(plan.window_budget, 1000);
        assert_eq!(plan.accounts_per_worker, 250);
        assert_eq!(plan.offset, 0);
        assert_eq!(
            plan.ranges,
            vec![
                AccountRange::new(0, 250),
                AccountRange::new(250, 500),
                AccountRange::new(500, 750),
                AccountRange::new(750, 1000),
            ]
        );
    }

    #[test]
    fn ranges_are_disjoint_and_contiguous_for_every_instance() {
        let total = 4;
        let mut spans = Vec::new();
        for index in 1..=total {
            let plan = Partition::plan(&config(index, total, 1_000, 3, 7)).unwrap();
            for (i, a) in plan.ranges.iter().enumerate() {
                assert!(!a.is_empty());
                for b in &plan.ranges[i + 1..] {
                    assert!(!a.overlaps(b), "{a} overlaps {b}");
                }
            }
            for pair in plan.ranges.windows(2) {
                assert_eq!(pair[0].to, pair[1].from, "gap between {} and {}", pair[0], pair[1]);
            }
            spans.push(plan.span());
        }

        for (i, a) in spans.iter().enumerate() {
            for b in &spans[i + 1..] {
                assert!(!a.overlaps(b), "instance spans {a} and {b} overlap");
            }
        }
    }

    #[test]
    fn rate_cap_is_shared_between_instances() {
        let plan = Partition::plan(&config(2, 3, 300, 2, 2)).unwrap();
        assert_eq!(plan.rate_budget, 100);
        assert_eq!(plan.window_budget, 200);
        assert_eq!(plan.offset, 200);
        assert_eq!(plan.span(), AccountRange::new(200, 400));
    }

    #[test]
    fn remainder_accounts_are_left_unassigned() {
        let plan = Partition::plan(&config(1, 1, 10, 1, 3)).unwrap();
        assert_eq!(plan.accounts_per_worker, 3);
        assert_eq!(plan.span(), AccountRange::new(0, 9));
    }

    #[test]
    fn rejects_out_of_range_instance_index() {
        assert_eq!(
            Partition::plan(&config(0, 2, 100, 10, 4)),
            Err(ConfigError::InstanceIndexOutOfRange { index: 0, total: 2 })
        );
        assert_eq!(
            Partition::plan(&config(3, 2, 100, 10, 4)),
            Err(ConfigError::InstanceIndexOutOfRange { index: 3, total: 2 })
        );
    }

    #[test]
    fn rejects_degenerate_sizing() {
        assert_eq!(
            Partition::plan(&config(1, 4, 3, 10, 4)),
            Err(ConfigError::ZeroRateBudget { cap: 3, instances: 4 })
        );
        assert_eq!(Partition::plan(&config(1, 1, 100, 10, 0)), Err(ConfigError::ZeroParallelism));
        assert_eq!(
            Partition::plan(&config(1, 1, 2, 1, 4)),
            Err(ConfigError::EmptyAccountRange { window_budget: 2, workers: 4 })
        );
        assert_eq!(
            Partition::plan(&config(1, 1, 100, 10, 4).with_sender_count(0)),
            Err(ConfigError::ZeroSenders)
        );
    }

    #[test]
    fn rejects_account_space_overflow() {
        assert_eq!(
            Partition::plan(&config(2, 2, u64::MAX, 10, 4)),
            Err(ConfigError::AccountSpaceOverflow {
                rate_budget: u64::MAX / 2,
                window_secs: 10,
                instances: 2,
            })
        );

        // The window budget fits, but the third instance's range would not.
        let cap = u64::MAX / 2;
        for index in 1..=3 {
            assert_eq!(
                Partition::plan(&config(index, 3, cap, 3, 4)),
                Err(ConfigError::AccountSpaceOverflow {
                    rate_budget: cap / 3,
                    window_secs: 3,
                    instances: 3,
                })
            );
        }
    }

    #[test]
    fn largest_account_space_is_usable() {
        let plan = Partition::plan(&config(1, 1, u64::MAX, 1, 4)).unwrap();
        assert_eq!(plan.window_budget, u64::MAX);
        assert_eq!(plan.ranges.len(), 4);
        assert_eq!(plan.ranges[3].to, 4 * (u64::MAX / 4));
    }

    #[test]
    fn range_helpers() {
        let range = AccountRange::new(10, 13);
        assert_eq!(range.len(), 3);
        assert!(range.contains(10));
        assert!(!range.contains(13));
        assert_eq!(range.indices().collect::<Vec<_>>(), vec![10, 11, 12]);
        assert_eq!(range.to_string(), "10-13");
    }
}
