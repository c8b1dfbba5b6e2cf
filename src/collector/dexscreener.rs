//! DexScreener collector — free, keyless DEX pair search.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::http::{CollectorHttpClient, ResilientHttpClient};
use super::{CollectOptions, Collector, CollectedItem};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{OrchestratorError, Result};

const BASE_URL: &str = "https://api.dexscreener.com";
const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

pub struct DexScreenerCollector {
    client: CollectorHttpClient,
}

impl DexScreenerCollector {
    pub fn new(http: Arc<ResilientHttpClient>, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client: CollectorHttpClient::new(http, "dexscreener", 60, circuit_breaker),
        }
    }

    async fn fetch_once(&self, query: &str, limit: usize) -> Result<Vec<CollectedItem>> {
        let url = format!(
            "{BASE_URL}/latest/dex/search?q={}",
            urlencoding::encode(query)
        );
        let data: Value = self.client.get(&url).await?.json().await.map_err(OrchestratorError::HttpError)?;

        let items = data["pairs"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(limit)
            .map(|pair| {
                let base = &pair["baseToken"];
                let name = base["name"].as_str().unwrap_or("Unknown").to_string();
                let symbol = base["symbol"].as_str().unwrap_or("?").to_string();
                let price = pair["priceUsd"].as_str().unwrap_or("N/A").to_string();
                let chain = pair["chainId"].as_str().unwrap_or("?").to_string();
                let liquidity = pair["liquidity"]["usd"].as_f64().unwrap_or(0.0);
                let volume = pair["volume"]["h24"].as_f64().unwrap_or(0.0);
                let change = pair["priceChange"]["h24"].as_f64().unwrap_or(0.0);
                let dex_id = pair["dexId"].as_str().unwrap_or("unknown").to_string();
                let url = pair["url"].as_str().unwrap_or_default().to_string();
                let address = base["address"].as_str().unwrap_or_default().to_string();

                let content = format!(
                    "{name} ({symbol}) on {chain}: ${price}. 24h change: {change}%. Liquidity: ${liquidity:.0}. 24h volume: ${volume:.0}. DEX: {dex_id}."
                );

                CollectedItem::new("dexscreener", format!("{symbol} on {chain} - ${price}"))
                    .with_content(content)
                    .with_url(url)
                    .with_metadata("chain", json!(chain))
                    .with_metadata("address", json!(address))
                    .with_metadata("liquidity_usd", json!(liquidity))
                    .with_metadata("volume_24h", json!(volume))
                    .with_metadata("change_24h", json!(change))
            })
            .collect();

        Ok(items)
    }
}

#[async_trait]
impl Collector for DexScreenerCollector {
    fn name(&self) -> &str {
        "dexscreener"
    }

    async fn collect(&self, query: &str, options: CollectOptions) -> Result<Vec<CollectedItem>> {
        let limit = options.limit.unwrap_or(5);
        super::with_retry("dexscreener", MAX_RETRIES, BASE_DELAY, || {
            self.fetch_once(query, limit)
        })
        .await
    }
}
