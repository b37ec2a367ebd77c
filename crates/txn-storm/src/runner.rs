use std::{sync::Arc, time::Duration};

use alloy::{providers::Provider, rpc::types::BlockNumberOrTag};
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    accounts::parse_private_key,
    client::{RpcProvider, create_provider, create_shared_client},
    config::StormConfig,
    coordinator::Coordinator,
    feedback::BlockFeedback,
    generator::{TransferGenerator, TransferSettings},
    sender::RpcSender,
    stats::{Stats, run_stats_reporter},
};

/// Coordinator wired to the JSON-RPC collaborators.
pub(crate) type StormCoordinator = Coordinator<TransferGenerator, RpcSender, BlockFeedback>;

/// Builds a coordinator against `provider` without touching the network.
pub(crate) fn build_coordinator(
    config: &StormConfig,
    provider: &RpcProvider,
    settings: &TransferSettings,
    stats: &Arc<Stats>,
) -> Result<StormCoordinator> {
    let coordinator_config = config.coordinator_config()?;
    let donor = parse_private_key(&config.donor_key)?;
    let poll_interval = config.parse_poll_interval()?;

    let coordinator = Coordinator::new(
        &coordinator_config,
        |range| TransferGenerator::new(donor.clone(), range, settings.clone(), provider.clone()),
        |index| RpcSender::new(index, provider.clone(), Arc::clone(stats)),
        BlockFeedback::new(provider.clone(), poll_interval),
    )?;
    Ok(coordinator)
}

/// Main entry point: runs the pipeline until the duration elapses or a
/// shutdown signal arrives.
pub async fn run(config: StormConfig) -> Result<()> {
    info!("Starting txn-storm");

    let duration = config.parse_duration()?;
    let funding_amount = config.parse_funding_amount()?;
    let poll_interval = config.parse_poll_interval()?;
    let donor = parse_private_key(&config.donor_key)?;
    info!(donor = %donor.address(), "Donor wallet loaded");

    let http_client = create_shared_client()?;
    let provider = create_provider(http_client, &config.rpc)?;
    let chain_id = provider.get_chain_id().await.context("Failed to get chain ID")?;
    let donor_nonce = provider
        .get_transaction_count(donor.address())
        .block_id(BlockNumberOrTag::Pending.into())
        .await
        .context("Failed to get donor nonce")?;
    info!(chain_id, donor_nonce, rpc = %config.rpc, "Connected to chain");

    let settings = TransferSettings {
        chain_id,
        key_seed: config.key_seed(),
        donor_nonce,
        funding_amount,
        max_fee_per_gas: config.max_fee_per_gas,
        max_priority_fee_per_gas: config.max_priority_fee_per_gas,
        poll_interval,
    };
    let stats = Arc::new(Stats::default());
    let coordinator = build_coordinator(&config, &provider, &settings, &stats)?;

    let reporter_cancel = CancellationToken::new();
    let reporter =
        tokio::spawn(run_stats_reporter(Arc::clone(&stats), reporter_cancel.clone()));

    coordinator.start().await;
    match duration {
        Some(d) => info!(duration_secs = d.as_secs(), "Load test running"),
        None => info!("Load test running until Ctrl+C"),
    }

    wait_for_shutdown(duration).await;

    info!("Shutting down...");
    coordinator.stop().await;
    reporter_cancel.cancel();
    if let Err(e) = reporter.await {
        warn!(error = %e, "Stats reporter panicked");
    }

    let summary = stats.snapshot();
    let summary_json = serde_json::to_string(&summary).context("Failed to serialize stats")?;
    info!(
        sent = summary.sent,
        failed = summary.failed,
        tps = format!("{:.1}", summary.tps()),
        summary = %summary_json,
        "Load test complete"
    );
    Ok(())
}

/// Returns when `duration` elapses, or on SIGINT/SIGTERM.
async fn wait_for_shutdown(duration: Option<Duration>) {
    let elapsed = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = elapsed => info!("Duration elapsed"),
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
        _ = sigterm() => info!("received SIGTERM, shutting down"),
    }
}

async fn sigterm() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }
    std::future::pending::<()>().await;
}
