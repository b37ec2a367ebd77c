use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::traits::Sender;

/// Relays every block height to every sender, in pool order, before taking the
/// next height. Exits on cancellation or when the feedback stream ends.
pub(crate) async fn run_notify<T, S>(
    mut blocks: mpsc::Receiver<u64>,
    senders: Arc<[Arc<S>]>,
    cancel: CancellationToken,
) where
    T: Send + 'static,
    S: Sender<T>,
{
    loop {
        let block = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            block = blocks.recv() => match block {
                Some(block) => block,
                None => {
                    debug!("Block feedback stream closed");
                    break;
                }
            },
        };

        debug!(block, senders = senders.len(), "Notifying senders");
        for sender in senders.iter() {
            sender.notify(block).await;
        }
    }
}
