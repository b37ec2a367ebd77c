use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::{
    sync::{Mutex as AsyncMutex, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Receiving half of the destination channel, shared by every sender.
pub type SharedReceiver<T> = Arc<AsyncMutex<mpsc::Receiver<T>>>;

pub(crate) fn shared_receiver<T>(rx: mpsc::Receiver<T>) -> SharedReceiver<T> {
    Arc::new(AsyncMutex::new(rx))
}

/// Receives the next item from a shared receiver, racing both the lock and the
/// receive against `cancel`. Returns `None` on cancellation or once the channel
/// is closed and drained.
pub async fn recv_shared<T>(input: &SharedReceiver<T>, cancel: &CancellationToken) -> Option<T> {
    let mut rx = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        rx = input.lock() => rx,
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        item = rx.recv() => item,
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Restartable background task owned by a long-lived worker.
///
/// `spawn` is a no-op while a previous task is still alive; `stop` cancels the
/// task and waits for it to exit.
#[derive(Default)]
pub struct WorkerTask {
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for WorkerTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerTask").field("running", &self.is_running()).finish()
    }
}

impl WorkerTask {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns `task` with a fresh cancellation token. Returns `false` if a
    /// previous task is still running.
    pub fn spawn<F, Fut>(&self, name: &str, task: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            debug!(worker = name, "Worker already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task(cancel.clone()));
        *slot = Some(Running { cancel, handle });
        true
    }

    /// Cancels the running task, if any, and waits for it to exit.
    pub async fn stop(&self, name: &str) {
        let running = self.slot().take();
        let Some(Running { cancel, handle }) = running else {
            return;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(worker = name, error = %e, "Worker task panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot().as_ref().is_some_and(|running| !running.handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn spawn_stop_and_respawn() {
        let worker = WorkerTask::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = Arc::clone(&runs);
            assert!(worker.spawn("test", move |cancel| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                cancel.cancelled().await;
            }));
            assert!(worker.is_running());
            assert!(!worker.spawn("test", |_| async {}));

            worker.stop("test").await;
            assert!(!worker.is_running());
        }

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_without_spawn_is_noop() {
        let worker = WorkerTask::new();
        worker.stop("idle").await;
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn finished_task_can_be_replaced() {
        let worker = WorkerTask::new();
        assert!(worker.spawn("short", |_| async {}));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!worker.is_running());
        assert!(worker.spawn("short", |cancel| async move { cancel.cancelled().await }));
        worker.stop("short").await;
    }

    #[tokio::test]
    async fn shared_receiver_yields_items_then_none() {
        let (tx, rx) = mpsc::channel(4);
        let input = shared_receiver(rx);
        let cancel = CancellationToken::new();

        tx.send(1u32).await.unwrap();
        drop(tx);

        assert_eq!(recv_shared(&input, &cancel).await, Some(1));
        assert_eq!(recv_shared(&input, &cancel).await, None);
    }

    #[tokio::test]
    async fn shared_receiver_observes_cancellation() {
        let (_tx, rx) = mpsc::channel::<u32>(4);
        let input = shared_receiver(rx);
        let cancel = CancellationToken::new();

        let waiter = {
            let input = Arc::clone(&input);
            let cancel = cancel.clone();
            tokio::spawn(async move { recv_shared(&input, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), None);
    }
}
