use std::time::Duration;

use alloy::{
    providers::RootProvider,
    rpc::client::RpcClient,
    transports::http::{Http, reqwest},
};
use anyhow::{Context, Result};

/// Concrete provider type shared by senders and block feedback
pub(crate) type RpcProvider = RootProvider;

/// Creates a shared HTTP client with connection pooling sized for many senders.
pub(crate) fn create_shared_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")
}

/// Creates a read/write provider for the target endpoint
pub(crate) fn create_provider(http_client: reqwest::Client, rpc_url: &str) -> Result<RpcProvider> {
    let url: url::Url = rpc_url.parse().context("Invalid RPC URL")?;
    let http = Http::with_client(http_client, url);
    let rpc_client = RpcClient::new(http, true);
    Ok(RootProvider::new(rpc_client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_url() {
        let client = create_shared_client().unwrap();
        assert!(create_provider(client.clone(), "not a url").is_err());
        assert!(create_provider(client, "http://127.0.0.1:8545").is_ok());
    }
}
