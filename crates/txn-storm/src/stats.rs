use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

const REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Counters shared by every sender.
#[derive(Debug)]
pub(crate) struct Stats {
    sent: AtomicU64,
    failed: AtomicU64,
    latest_block: AtomicU64,
    started_at: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            latest_block: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }
}

impl Stats {
    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Keeps the highest block height seen so far.
    pub(crate) fn observe_block(&self, block: u64) {
        self.latest_block.fetch_max(block, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            latest_block: self.latest_block.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub(crate) struct StatsSnapshot {
    pub sent: u64,
    pub failed: u64,
    pub latest_block: u64,
    pub elapsed_secs: f64,
}

impl StatsSnapshot {
    pub(crate) fn tps(&self) -> f64 {
        if self.elapsed_secs <= 0.0 { 0.0 } else { self.sent as f64 / self.elapsed_secs }
    }

    /// Send rate between `earlier` and `self`.
    pub(crate) fn tps_since(&self, earlier: &Self) -> f64 {
        let elapsed = self.elapsed_secs - earlier.elapsed_secs;
        if elapsed <= 0.0 {
            0.0
        } else {
            self.sent.saturating_sub(earlier.sent) as f64 / elapsed
        }
    }
}

/// Logs progress every [`REPORT_INTERVAL`] until cancelled.
pub(crate) async fn run_stats_reporter(stats: Arc<Stats>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(REPORT_INTERVAL);
    let mut previous = stats.snapshot();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let current = stats.snapshot();
                log_stats(&current, &previous);
                previous = current;
            }
        }
    }
}

fn log_stats(current: &StatsSnapshot, previous: &StatsSnapshot) {
    info!(
        sent = current.sent,
        failed = current.failed,
        block = current.latest_block,
        tps = format!("{:.1}", current.tps_since(previous)),
        avg_tps = format!("{:.1}", current.tps()),
        "Progress"
    );
}
