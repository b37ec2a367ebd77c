use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use alloy::providers::Provider;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    client::RpcProvider,
    generator::SignedTransfer,
    stats::Stats,
    traits::Sender,
    worker::{SharedReceiver, WorkerTask, recv_shared},
};

/// Submits signed transfers with `eth_sendRawTransaction`.
pub(crate) struct RpcSender {
    name: String,
    provider: RpcProvider,
    stats: Arc<Stats>,
    latest_block: Arc<AtomicU64>,
    task: WorkerTask,
}

impl std::fmt::Debug for RpcSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcSender")
            .field("name", &self.name)
            .field("latest_block", &self.latest_block())
            .finish()
    }
}

impl RpcSender {
    pub(crate) fn new(index: usize, provider: RpcProvider, stats: Arc<Stats>) -> Self {
        Self {
            name: format!("Sender-{index}"),
            provider,
            stats,
            latest_block: Arc::new(AtomicU64::new(0)),
            task: WorkerTask::new(),
        }
    }

    /// Highest block height this sender has been notified of.
    pub(crate) fn latest_block(&self) -> u64 {
        self.latest_block.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Sender<SignedTransfer> for RpcSender {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, input: SharedReceiver<SignedTransfer>) {
        let provider = self.provider.clone();
        let stats = Arc::clone(&self.stats);
        let latest_block = Arc::clone(&self.latest_block);
        let name = self.name.clone();
        self.task.spawn(&self.name, move |cancel| {
            send_loop(name, provider, stats, latest_block, input, cancel)
        });
    }

    async fn stop(&self) {
        self.task.stop(&self.name).await;
    }

    async fn notify(&self, block: u64) {
        self.latest_block.fetch_max(block, Ordering::Relaxed);
        self.stats.observe_block(block);
        debug!(sender = %self.name, block, "Block confirmed");
    }
}

async fn send_loop(
    name: String,
    provider: RpcProvider,
    stats: Arc<Stats>,
    latest_block: Arc<AtomicU64>,
    input: SharedReceiver<SignedTransfer>,
    cancel: CancellationToken,
) {
    debug!(sender = %name, "Sender started");
    let mut sent: u64 = 0;
    let mut failed: u64 = 0;

    while let Some(tx) = recv_shared(&input, &cancel).await {
        // Once received, a transaction is submitted even if a stop is pending.
        match provider.send_raw_transaction(&tx.raw).await {
            Ok(_) => {
                sent += 1;
                stats.record_sent();
            }
            Err(e) => {
                failed += 1;
                stats.record_failed();
                warn!(
                    sender = %name,
                    from = %tx.from,
                    nonce = tx.nonce,
                    tx_hash = %tx.hash,
                    block = latest_block.load(Ordering::Relaxed),
                    error = %e,
                    "Failed to send transaction"
                );
            }
        }
    }

    debug!(sender = %name, sent, failed, "Sender stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy::primitives::{Address, B256, Bytes};
    use tokio::sync::mpsc;

    use super::*;
    use crate::{client, worker::shared_receiver};

    fn unreachable_sender(stats: Arc<Stats>) -> RpcSender {
        let http = client::create_shared_client().unwrap();
        let provider = client::create_provider(http, "http://127.0.0.1:1").unwrap();
        RpcSender::new(3, provider, stats)
    }

    fn transfer(nonce: u64) -> SignedTransfer {
        SignedTransfer {
            from: Address::ZERO,
            account: Some(0),
            nonce,
            hash: B256::with_last_byte(nonce as u8),
            raw: Bytes::from_static(&[0x02, 0x00]),
        }
    }

    #[tokio::test]
    async fn notify_tracks_highest_block() {
        let stats = Arc::new(Stats::default());
        let sender = unreachable_sender(Arc::clone(&stats));
        assert_eq!(sender.name(), "Sender-3");

        sender.notify(7).await;
        sender.notify(5).await;
        assert_eq!(sender.latest_block(), 7);
        assert_eq!(stats.snapshot().latest_block, 7);
    }

    #[tokio::test]
    async fn failed_sends_are_counted_and_loop_drains() {
        let stats = Arc::new(Stats::default());
        let sender = unreachable_sender(Arc::clone(&stats));

        let (tx, rx) = mpsc::channel(4);
        tx.send(transfer(0)).await.unwrap();
        tx.send(transfer(1)).await.unwrap();
        drop(tx);

        sender.start(shared_receiver(rx));
        tokio::time::timeout(Duration::from_secs(10), async {
            while stats.snapshot().failed < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        sender.stop().await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.sent, 0);
        assert_eq!(snapshot.failed, 2);
    }

    #[tokio::test]
    async fn stop_interrupts_idle_sender() {
        let stats = Arc::new(Stats::default());
        let sender = unreachable_sender(stats);
        let (_tx, rx) = mpsc::channel::<SignedTransfer>(1);

        sender.start(shared_receiver(rx));
        tokio::time::timeout(Duration::from_secs(1), sender.stop()).await.unwrap();
    }
}
