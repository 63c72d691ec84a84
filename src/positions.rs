//! Redeemable-position discovery via the Polymarket Data API

use crate::config::Config;
use crate::types::RedeemablePosition;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use tracing::{debug, info};

/// Where a cycle's work comes from. Seam for tests; production uses
/// [`DataApiClient`].
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn fetch_redeemable(&self, account: &str) -> Result<Vec<RedeemablePosition>>;
}

/// Client for the Polymarket Data API
pub struct DataApiClient {
    client: Client,
    base_url: String,
}

impl DataApiClient {
    pub fn new(config: &Config) -> Self {
        // Claims always go direct; the optional proxy covers RPC traffic only
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .no_proxy()
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.data_api_url.clone(),
        }
    }

    /// Fetch the account's currently redeemable positions
    pub async fn fetch_redeemable(&self, account: &str) -> Result<Vec<RedeemablePosition>> {
        let url = format!(
            "{}/positions?user={}&redeemable=true&limit=100",
            self.base_url, account
        );

        debug!("Fetching redeemable positions from: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch redeemable positions")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Data API error {}: {}", status, body);
        }

        let positions: Vec<RedeemablePosition> = response
            .json()
            .await
            .context("Failed to parse positions response")?;

        info!("Redeemable positions: {}", positions.len());
        Ok(positions)
    }
}

#[async_trait]
impl PositionSource for DataApiClient {
    async fn fetch_redeemable(&self, account: &str) -> Result<Vec<RedeemablePosition>> {
        DataApiClient::fetch_redeemable(self, account).await
    }
}

/// Unique condition ids in first-seen order. Several positions share a
/// condition id when the user held both outcomes of a market; one
/// redemption covers them all. Blank ids are skipped.
pub fn dedupe_condition_ids(positions: &[RedeemablePosition]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for pos in positions {
        let id = pos.condition_id.trim();
        if id.is_empty() {
            continue;
        }
        if seen.insert(id.to_string()) {
            ids.push(id.to_string());
        }
    }

    ids
}
