use std::{sync::Arc, time::Duration};

use alloy::providers::Provider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{client::RpcProvider, traits::Feedback, worker::WorkerTask};

const BLOCK_CHANNEL_CAPACITY: usize = 64;

/// Reads the current chain height.
#[async_trait]
pub(crate) trait BlockSource: Send + Sync + 'static {
    async fn block_number(&self) -> Result<u64>;
}

#[async_trait]
impl BlockSource for RpcProvider {
    async fn block_number(&self) -> Result<u64> {
        self.get_block_number().await.context("Failed to get block number")
    }
}

/// Polls the chain head and emits every new height, in order and without gaps.
pub(crate) struct BlockFeedback<B = RpcProvider> {
    source: Arc<B>,
    poll_interval: Duration,
    task: WorkerTask,
}

impl<B> std::fmt::Debug for BlockFeedback<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockFeedback")
            .field("poll_interval", &self.poll_interval)
            .field("task", &self.task)
            .finish()
    }
}

impl<B: BlockSource> BlockFeedback<B> {
    pub(crate) fn new(source: B, poll_interval: Duration) -> Self {
        Self { source: Arc::new(source), poll_interval, task: WorkerTask::new() }
    }
}

#[async_trait]
impl<B: BlockSource> Feedback for BlockFeedback<B> {
    fn name(&self) -> &str {
        "BlockFeedback"
    }

    fn start(&self) -> mpsc::Receiver<u64> {
        let (tx, rx) = mpsc::channel(BLOCK_CHANNEL_CAPACITY);
        let source = Arc::clone(&self.source);
        let poll_interval = self.poll_interval;
        self.task.spawn(self.name(), move |cancel| poll_blocks(source, poll_interval, tx, cancel));
        rx
    }

    async fn stop(&self) {
        self.task.stop(self.name()).await;
    }
}

async fn poll_blocks<B: BlockSource>(
    source: Arc<B>,
    poll_interval: Duration,
    blocks: mpsc::Sender<u64>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last: Option<u64> = None;

    'poll: loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let tip = match source.block_number().await {
            Ok(tip) => tip,
            Err(e) => {
                warn!(error = %e, "Failed to poll block number");
                continue;
            }
        };

        let first = match last {
            None => tip,
            Some(last) if tip > last => last + 1,
            Some(_) => continue,
        };

        for block in first..=tip {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'poll,
                sent = blocks.send(block) => {
                    if sent.is_err() {
                        debug!("Block receiver dropped");
                        break 'poll;
                    }
                }
            }
            last = Some(block);
        }
    }

    debug!(last_block = ?last, "Block feedback stopped");
}
