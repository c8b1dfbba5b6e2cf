//! CoinGecko crypto collector
//!
//! Query is a mode selector: `"trending"` for trending coins, `"market"` /
//! `"top"` for top coins by market cap, anything else is treated as a coin
//! name/id and resolved via direct lookup or search.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::http::{CollectorHttpClient, ResilientHttpClient};
use super::{CollectOptions, Collector, CollectedItem};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{OrchestratorError, Result};

const BASE_URL: &str = "https://api.coingecko.com/api/v3";
const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

pub struct CryptoCollector {
    client: CollectorHttpClient,
}

impl CryptoCollector {
    pub fn new(http: Arc<ResilientHttpClient>, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client: CollectorHttpClient::new(http, "crypto", 30, circuit_breaker),
        }
    }

    async fn fetch_trending(&self) -> Result<Vec<CollectedItem>> {
        let response = self
            .client
            .get(&format!("{BASE_URL}/search/trending"))
            .await?;
        let data: Value = response.json().await.map_err(OrchestratorError::HttpError)?;

        let items = data["coins"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|coin_data| {
                let coin = &coin_data["item"];
                let name = coin["name"].as_str().unwrap_or_default().to_string();
                let symbol = coin["symbol"].as_str().unwrap_or_default().to_string();
                let id = coin["id"].as_str().unwrap_or_default().to_string();
                let rank = coin["market_cap_rank"].clone();
                let price_btc = coin["price_btc"].as_f64().unwrap_or(0.0);

                let content = format!(
                    "{name} ({symbol}) is trending on CoinGecko. Market cap rank: #{rank}. Price in BTC: {price_btc:.8}.",
                    rank = rank,
                );

                CollectedItem::new("crypto_coingecko", format!("Trending: {name} ({symbol})"))
                    .with_content(content)
                    .with_url(format!("https://www.coingecko.com/en/coins/{id}"))
                    .with_metadata("coin_id", json!(id))
                    .with_metadata("symbol", json!(symbol))
                    .with_metadata("price_btc", json!(price_btc))
            })
            .collect();

        Ok(items)
    }

    async fn fetch_market(&self, limit: usize) -> Result<Vec<CollectedItem>> {
        let url = format!(
            "{BASE_URL}/coins/markets?vs_currency=usd&order=market_cap_desc&per_page={limit}&page=1&sparkline=false&price_change_percentage=24h,7d"
        );
        let response = self.client.get(&url).await?;
        let data: Vec<Value> = response.json().await.map_err(OrchestratorError::HttpError)?;

        let items = data
            .into_iter()
            .map(|coin| {
                let name = coin["name"].as_str().unwrap_or_default().to_string();
                let symbol = coin["symbol"].as_str().unwrap_or_default().to_uppercase();
                let id = coin["id"].as_str().unwrap_or_default().to_string();
                let price = coin["current_price"].as_f64().unwrap_or(0.0);
                let market_cap = coin["market_cap"].as_f64().unwrap_or(0.0);
                let change_24h = coin["price_change_percentage_24h"].as_f64().unwrap_or(0.0);
                let change_7d = coin["price_change_percentage_7d_in_currency"]
                    .as_f64()
                    .unwrap_or(0.0);
                let volume = coin["total_volume"].as_f64().unwrap_or(0.0);
                let direction = if change_24h > 0.0 { "up" } else { "down" };

                let content = format!(
                    "{name} ({symbol}): ${price:.2} ({direction} {abs_change:.1}% 24h). Market cap: ${market_cap:.0}. 24h volume: ${volume:.0}. 7d change: {change_7d:+.1}%.",
                    abs_change = change_24h.abs(),
                );

                CollectedItem::new("crypto_coingecko", format!("{name} ({symbol}) - ${price:.2}"))
                    .with_content(content)
                    .with_url(format!("https://www.coingecko.com/en/coins/{id}"))
                    .with_metadata("coin_id", json!(id))
                    .with_metadata("symbol", json!(symbol))
                    .with_metadata("price_usd", json!(price))
                    .with_metadata("market_cap", json!(market_cap))
                    .with_metadata("change_24h", json!(change_24h))
            })
            .collect();

        Ok(items)
    }

    async fn fetch_coin(&self, coin_id: &str) -> Result<Vec<CollectedItem>> {
        let direct_url = format!(
            "{BASE_URL}/coins/{}?localization=false&tickers=false&community_data=false",
            coin_id.to_lowercase()
        );

        let data: Value = match self.client.get(&direct_url).await {
            Ok(response) => response.json().await.map_err(OrchestratorError::HttpError)?,
            Err(_) => {
                let search_url = format!("{BASE_URL}/search?query={}", urlencoding::encode(coin_id));
                let search: Value = self
                    .client
                    .get(&search_url)
                    .await?
                    .json()
                    .await
                    .map_err(OrchestratorError::HttpError)?;
                let coins = search["coins"].as_array().cloned().unwrap_or_default();
                let Some(first) = coins.first() else {
                    return Ok(vec![CollectedItem::new(
                        "crypto_coingecko",
                        format!("Coin not found: {coin_id}"),
                    )
                    .with_content(format!("No cryptocurrency found matching '{coin_id}'."))]);
                };
                let actual_id = first["id"].as_str().unwrap_or_default();
                let follow_up = format!(
                    "{BASE_URL}/coins/{actual_id}?localization=false&tickers=false&community_data=false"
                );
                self.client
                    .get(&follow_up)
                    .await?
                    .json()
                    .await
                    .map_err(OrchestratorError::HttpError)?
            }
        };

        let name = data["name"].as_str().unwrap_or_default().to_string();
        let symbol = data["symbol"].as_str().unwrap_or_default().to_uppercase();
        let id = data["id"].as_str().unwrap_or_default().to_string();
        let market_data = &data["market_data"];
        let price = market_data["current_price"]["usd"].as_f64().unwrap_or(0.0);
        let market_cap = market_data["market_cap"]["usd"].as_f64().unwrap_or(0.0);
        let change_24h = market_data["price_change_percentage_24h"].as_f64().unwrap_or(0.0);
        let ath = market_data["ath"]["usd"].as_f64().unwrap_or(0.0);
        let description = data["description"]["en"]
            .as_str()
            .unwrap_or_default()
            .chars()
            .take(500)
            .collect::<String>();

        let content = format!(
            "{name} ({symbol}): ${price:.2} ({change_24h:+.1}% 24h). Market cap: ${market_cap:.0}. ATH: ${ath:.2}. {description}"
        );

        Ok(vec![CollectedItem::new(
            "crypto_coingecko",
            format!("{name} ({symbol}) - ${price:.2}"),
        )
        .with_content(content)
        .with_url(format!("https://www.coingecko.com/en/coins/{id}"))
        .with_metadata("coin_id", json!(id))
        .with_metadata("symbol", json!(symbol))
        .with_metadata("price_usd", json!(price))])
    }
}

#[async_trait]
impl Collector for CryptoCollector {
    fn name(&self) -> &str {
        "crypto"
    }

    async fn collect(&self, query: &str, options: CollectOptions) -> Result<Vec<CollectedItem>> {
        let limit = options.limit.unwrap_or(10);
        debug!(source = "crypto", query, "dispatching crypto query");

        super::with_retry("crypto", MAX_RETRIES, BASE_DELAY, || async {
            match query.to_lowercase().as_str() {
                "trending" => self.fetch_trending().await,
                "market" | "top" => self.fetch_market(limit).await,
                _ => self.fetch_coin(query).await,
            }
        })
        .await
    }
}
