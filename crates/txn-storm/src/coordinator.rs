//! Pipeline owner: partitions accounts across generators at construction, wires
//! generators, the rate-limited transfer stage, senders and block feedback
//! together on [`Coordinator::start`], and tears them down in order on
//! [`Coordinator::stop`].
//!
//! Data flow:
//!
//! ```text
//! generators -> source -> transfer (rate cap) -> destination -> senders
//! feedback -> notify -> senders
//! ```
//!
//! Bootstrap transactions are pushed straight onto the destination channel and
//! are not counted against the rate window.

use std::sync::Arc;

use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::CoordinatorConfig,
    error::ConfigError,
    notify::run_notify,
    partition::{AccountRange, Partition},
    traits::{Feedback, Generator, Sender},
    transfer::run_transfer,
    worker::shared_receiver,
};

/// Per-start resources, dropped on stop.
struct Running {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

pub struct Coordinator<G, S, F>
where
    G: Generator,
    S: Sender<G::Tx>,
    F: Feedback,
{
    generators: Vec<Arc<G>>,
    senders: Arc<[Arc<S>]>,
    feedback: Arc<F>,
    partition: Partition,
    state: Mutex<Option<Running>>,
}

impl<G, S, F> std::fmt::Debug for Coordinator<G, S, F>
where
    G: Generator,
    S: Sender<G::Tx>,
    F: Feedback,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("generators", &self.generators.len())
            .field("senders", &self.senders.len())
            .field("feedback", &self.feedback.name())
            .field("partition", &self.partition)
            .finish()
    }
}

impl<G, S, F> Coordinator<G, S, F>
where
    G: Generator,
    S: Sender<G::Tx>,
    F: Feedback,
{
    /// Sizes the pools from `config` and builds every worker.
    ///
    /// `make_generator` is called once per account range in pool order and
    /// `make_sender` once per sender index. Fails without building anything if
    /// the config cannot be partitioned.
    pub fn new(
        config: &CoordinatorConfig,
        mut make_generator: impl FnMut(AccountRange) -> G,
        make_sender: impl FnMut(usize) -> S,
        feedback: F,
    ) -> Result<Self, ConfigError> {
        let partition = Partition::plan(config)?;

        let generators =
            partition.ranges.iter().map(|range| Arc::new(make_generator(*range))).collect();
        let senders = (0..config.sender_count).map(make_sender).map(Arc::new).collect();

        info!(
            instance = config.instance_index,
            instances = config.total_instances,
            rate_budget = partition.rate_budget,
            window_budget = partition.window_budget,
            accounts_per_generator = partition.accounts_per_worker,
            accounts = %partition.span(),
            generators = config.parallelism,
            senders = config.sender_count,
            "Coordinator configured"
        );

        Ok(Self {
            generators,
            senders,
            feedback: Arc::new(feedback),
            partition,
            state: Mutex::new(None),
        })
    }

    pub const fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn rate_budget(&self) -> u64 {
        self.partition.rate_budget
    }

    pub fn generators(&self) -> &[Arc<G>] {
        &self.generators
    }

    pub fn senders(&self) -> &[Arc<S>] {
        &self.senders
    }

    pub const fn feedback(&self) -> &Arc<F> {
        &self.feedback
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Builds fresh channels and a fresh cancellation token, then starts the
    /// pipeline. No-op if already running.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.is_some() {
            debug!("Coordinator already running");
            return;
        }

        let (destination_tx, destination_rx) = mpsc::channel(self.senders.len() * 2);
        let (source_tx, source_rx) = mpsc::channel(self.generators.len() * 2);
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        tasks.spawn(run_transfer(
            source_rx,
            destination_tx.clone(),
            self.partition.rate_budget,
            cancel.clone(),
        ));

        let input = shared_receiver(destination_rx);
        for sender in self.senders.iter() {
            sender.start(Arc::clone(&input));
        }
        drop(input);

        self.bootstrap(&destination_tx).await;
        // The transfer stage now holds the only destination handle.
        drop(destination_tx);

        for generator in &self.generators {
            generator.start(source_tx.clone());
        }
        drop(source_tx);

        let blocks = self.feedback.start();
        tasks.spawn(run_notify::<G::Tx, S>(blocks, Arc::clone(&self.senders), cancel.clone()));

        *state = Some(Running { cancel, tasks });
        info!(
            generators = self.generators.len(),
            senders = self.senders.len(),
            rate_budget = self.partition.rate_budget,
            "started"
        );
    }

    /// Hands each generator's first transaction to the senders in pool order,
    /// ahead of the rate-limited stream.
    async fn bootstrap(&self, destination: &mpsc::Sender<G::Tx>) {
        for (i, generator) in self.generators.iter().enumerate() {
            let seq = i as u64 + 1;
            let tx = match generator.yield_tx(seq).await {
                Ok(tx) => tx,
                Err(e) => {
                    warn!(
                        generator = generator.name(),
                        seq,
                        error = %e,
                        "Failed to build bootstrap transaction"
                    );
                    continue;
                }
            };
            if destination.send(tx).await.is_err() {
                warn!(generator = generator.name(), seq, "Destination closed during bootstrap");
                return;
            }
            debug!(generator = generator.name(), seq, "Bootstrap transaction queued");
        }
    }

    /// Stops every worker, then the coordinator's own tasks. No-op if not running.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let Some(mut running) = state.take() else {
            debug!("Coordinator not running");
            return;
        };

        let mut stopping = JoinSet::new();
        let feedback = Arc::clone(&self.feedback);
        stopping.spawn(async move { feedback.stop().await });
        for generator in &self.generators {
            let generator = Arc::clone(generator);
            stopping.spawn(async move { generator.stop().await });
        }
        for sender in self.senders.iter() {
            let sender = Arc::clone(sender);
            stopping.spawn(async move { sender.stop().await });
        }
        while let Some(result) = stopping.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Worker stop panicked");
            }
        }

        running.cancel.cancel();
        while let Some(result) = running.tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Coordinator task panicked");
            }
        }

        info!("stopped");
    }
}
