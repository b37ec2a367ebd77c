//! Rate-limited transfer stage: the single reader of the source channel and the
//! single writer of the destination channel.

use std::time::Duration;

use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Length of the rate-accounting window.
pub(crate) const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Forwarded-transaction counter for the current window.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateWindow {
    budget: u64,
    count: u64,
    start: Instant,
}

impl RateWindow {
    pub(crate) const fn new(budget: u64, now: Instant) -> Self {
        Self { budget, count: 0, start: now }
    }

    /// Starts a new window once [`RATE_WINDOW`] has elapsed since the current one began.
    pub(crate) fn roll(&mut self, now: Instant) {
        if now.saturating_duration_since(self.start) >= RATE_WINDOW {
            self.count = 0;
            self.start = now;
        }
    }

    pub(crate) const fn is_exhausted(&self) -> bool {
        self.count >= self.budget
    }

    pub(crate) fn record(&mut self) {
        self.count += 1;
    }

    /// When the current window ends.
    pub(crate) fn deadline(&self) -> Instant {
        self.start + RATE_WINDOW
    }

    #[cfg(test)]
    const fn count(&self) -> u64 {
        self.count
    }
}

/// Moves transactions from `source` to `destination`, forwarding at most
/// `budget` per window.
///
/// Every wait races `cancel`. The task exits on cancellation, when the source is
/// closed and drained, or when the destination has no receivers; dropping
/// `destination` on exit closes the channel for the senders.
pub(crate) async fn run_transfer<T: Send>(
    mut source: mpsc::Receiver<T>,
    destination: mpsc::Sender<T>,
    budget: u64,
    cancel: CancellationToken,
) {
    let mut window = RateWindow::new(budget, Instant::now());
    let mut forwarded: u64 = 0;

    loop {
        window.roll(Instant::now());

        if window.is_exhausted() {
            let deadline = window.deadline();
            debug!(
                timeout = ?deadline.saturating_duration_since(Instant::now()),
                budget,
                "tps limit"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep_until(deadline) => continue,
            }
        }

        let tx = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            tx = source.recv() => match tx {
                Some(tx) => tx,
                None => {
                    debug!("Source channel closed");
                    break;
                }
            },
        };
        window.record();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = destination.send(tx) => {
                if sent.is_err() {
                    debug!("Destination channel closed");
                    break;
                }
                forwarded += 1;
            }
        }
    }

    debug!(forwarded, "Transfer stage stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_rolls_after_one_second() {
        let start = Instant::now();
        let mut window = RateWindow::new(2, start);
        window.record();
        window.record();
        assert!(window.is_exhausted());

        window.roll(start + Duration::from_millis(999));
        assert!(window.is_exhausted());

        window.roll(start + RATE_WINDOW);
        assert_eq!(window.count(), 0);
        assert!(!window.is_exhausted());
        assert_eq!(window.deadline(), start + RATE_WINDOW * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_at_most_budget_per_window() {
        let budget = 5;
        let (source_tx, source_rx) = mpsc::channel(64);
        let (dest_tx, mut dest_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        for i in 0..100u32 {
            source_tx.send(i).await.unwrap();
        }
        let transfer = tokio::spawn(run_transfer(source_rx, dest_tx, budget, cancel.clone()));

        let started = Instant::now();
        let mut stamps = Vec::new();
        while stamps.len() < 20 {
            let item = dest_rx.recv().await.unwrap();
            assert_eq!(item as usize, stamps.len());
            stamps.push(Instant::now());
        }

        // Any `budget + 1` consecutive forwards span at least one full window.
        for pair in stamps.windows(budget as usize + 1) {
            assert!(pair[budget as usize] - pair[0] >= RATE_WINDOW);
        }
        assert!(Instant::now() - started >= RATE_WINDOW * 3);

        cancel.cancel();
        transfer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn counts_whole_windows() {
        let (source_tx, source_rx) = mpsc::channel(64);
        let (dest_tx, mut dest_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        for i in 0..50u32 {
            source_tx.send(i).await.unwrap();
        }
        let transfer = tokio::spawn(run_transfer(source_rx, dest_tx, 4, cancel.clone()));

        let consumer = tokio::spawn(async move {
            let mut received = 0usize;
            while dest_rx.recv().await.is_some() {
                received += 1;
            }
            received
        });

        // Windows open at 0s, 1s and 2s.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        cancel.cancel();
        transfer.await.unwrap();

        assert_eq!(consumer.await.unwrap(), 12);
    }

    #[tokio::test]
    async fn cancellation_closes_destination() {
        let (_source_tx, source_rx) = mpsc::channel::<u32>(4);
        let (dest_tx, mut dest_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let transfer = tokio::spawn(run_transfer(source_rx, dest_tx, 10, cancel.clone()));
        cancel.cancel();
        transfer.await.unwrap();

        assert!(dest_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancellation_interrupts_blocked_send() {
        let (source_tx, source_rx) = mpsc::channel(4);
        let (dest_tx, _dest_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        source_tx.send(1u32).await.unwrap();
        source_tx.send(2u32).await.unwrap();
        let transfer = tokio::spawn(run_transfer(source_rx, dest_tx, 10, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!transfer.is_finished());
        cancel.cancel();
        transfer.await.unwrap();
    }

    #[tokio::test]
    async fn exits_when_source_closes() {
        let (source_tx, source_rx) = mpsc::channel(4);
        let (dest_tx, mut dest_rx) = mpsc::channel(4);

        source_tx.send(7u32).await.unwrap();
        drop(source_tx);
        run_transfer(source_rx, dest_tx, 10, CancellationToken::new()).await;

        assert_eq!(dest_rx.recv().await, Some(7));
        assert_eq!(dest_rx.recv().await, None);
    }
}
