//! Rate-capped transaction load generation.
//!
//! A [`Coordinator`] splits a fleet-wide rate cap and account space across
//! cooperating instances and its own generator pool, then drives generators,
//! a rate-limited transfer stage, senders and block feedback as one pipeline.

mod accounts;
mod cli;
mod client;
mod config;
mod coordinator;
mod error;
mod feedback;
mod generator;
mod notify;
mod partition;
mod runner;
mod sender;
mod stats;
mod traits;
mod transfer;
mod worker;

pub use cli::Args;
pub use config::{CoordinatorConfig, StormConfig};
pub use coordinator::Coordinator;
pub use error::ConfigError;
pub use partition::{AccountRange, Partition};
pub use runner::run;
pub use traits::{Feedback, Generator, Sender};
pub use worker::{SharedReceiver, WorkerTask, recv_shared};
