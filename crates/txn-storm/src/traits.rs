//! Collaborator seams driven by the [`Coordinator`](crate::Coordinator).
//!
//! Workers are created once and reused across start/stop cycles, so every
//! method takes `&self` and implementations keep their running task behind a
//! [`WorkerTask`](crate::worker::WorkerTask). Each `stop` is idempotent and
//! returns only after the worker's task has exited.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::worker::SharedReceiver;

/// Produces transactions for one disjoint account range.
#[async_trait]
pub trait Generator: Send + Sync + 'static {
    type Tx: Send + 'static;

    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Builds the bootstrap transaction for handoff number `seq` (1-based).
    async fn yield_tx(&self, seq: u64) -> anyhow::Result<Self::Tx>;

    /// Begins producing into `out` until stopped or until `out` closes.
    fn start(&self, out: mpsc::Sender<Self::Tx>);

    /// Blocks until production has ceased.
    async fn stop(&self);
}

/// Consumes transactions from the shared destination channel and transmits them.
#[async_trait]
pub trait Sender<T: Send + 'static>: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Begins consuming `input` until stopped or until the channel closes.
    fn start(&self, input: SharedReceiver<T>);

    /// Blocks until in-flight sends have settled.
    async fn stop(&self);

    /// Records a newly confirmed block height.
    async fn notify(&self, block: u64);
}

/// Source of confirmed block heights.
#[async_trait]
pub trait Feedback: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Begins emitting heights, returning the event stream.
    fn start(&self) -> mpsc::Receiver<u64>;

    /// Blocks until the subscription is torn down.
    async fn stop(&self);
}
