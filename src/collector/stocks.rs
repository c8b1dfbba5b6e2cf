//! Stocks collector — Yahoo Finance quote endpoint, with a per-symbol chart
//! endpoint fallback when the batch quote endpoint is unavailable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::http::{CollectorHttpClient, ResilientHttpClient};
use super::{CollectOptions, Collector, CollectedItem};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{OrchestratorError, Result};

const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

pub struct StocksCollector {
    client: CollectorHttpClient,
}

impl StocksCollector {
    pub fn new(http: Arc<ResilientHttpClient>, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client: CollectorHttpClient::new(http, "stocks", 60, circuit_breaker),
        }
    }

    async fn fetch_quotes(&self, symbols: &[&str]) -> Result<Vec<CollectedItem>> {
        let url = format!(
            "https://query1.finance.yahoo.com/v7/finance/quote?symbols={}",
            symbols.join(",")
        );

        match self.client.get(&url).await {
            Ok(response) => {
                let data: Value = response.json().await.map_err(OrchestratorError::HttpError)?;
                let quotes = data["quoteResponse"]["result"].as_array().cloned().unwrap_or_default();
                Ok(quotes.iter().map(Self::quote_to_item).collect())
            }
            Err(e) => {
                let mut items = Vec::new();
                for symbol in symbols {
                    match self.fetch_chart(symbol).await {
                        Ok(chart_items) => items.extend(chart_items),
                        Err(chart_err) => {
                            tracing::warn!(symbol, error = %chart_err, "stocks: chart fallback failed for symbol, skipping");
                        }
                    }
                }
                if items.is_empty() {
                    Err(e)
                } else {
                    Ok(items)
                }
            }
        }
    }

    fn quote_to_item(quote: &Value) -> CollectedItem {
        let symbol = quote["symbol"].as_str().unwrap_or_default().to_string();
        let name = quote["shortName"].as_str().unwrap_or(&symbol).to_string();
        let price = quote["regularMarketPrice"].as_f64().unwrap_or(0.0);
        let change = quote["regularMarketChangePercent"].as_f64().unwrap_or(0.0);
        let direction = if change >= 0.0 { "up" } else { "down" };

        let content = format!("{name} ({symbol}): ${price:.2}, {direction} {:.2}% today", change.abs());

        CollectedItem::new("stocks", format!("{symbol} - ${price:.2}"))
            .with_content(content)
            .with_url(format!("https://finance.yahoo.com/quote/{symbol}"))
            .with_metadata("price", json!(price))
            .with_metadata("change_pct", json!(change))
    }

    async fn fetch_chart(&self, symbol: &str) -> Result<Vec<CollectedItem>> {
        let url = format!(
            "https://query1.finance.yahoo.com/v8/finance/chart/{symbol}?interval=1d&range=5d"
        );
        let data: Value = self.client.get(&url).await?.json().await.map_err(OrchestratorError::HttpError)?;
        let result = &data["chart"]["result"][0];
        let closes = result["indicators"]["quote"][0]["close"].as_array().cloned().unwrap_or_default();
        let last_close = closes.last().and_then(|v| v.as_f64()).unwrap_or(0.0);

        Ok(vec![CollectedItem::new(
            "stocks",
            format!("{symbol} - ${last_close:.2}"),
        )
        .with_content(format!("{symbol} last close: ${last_close:.2}"))
        .with_metadata("price", json!(last_close))])
    }
}

#[async_trait]
impl Collector for StocksCollector {
    fn name(&self) -> &str {
        "stocks"
    }

    async fn collect(&self, query: &str, _options: CollectOptions) -> Result<Vec<CollectedItem>> {
        super::with_retry("stocks", MAX_RETRIES, BASE_DELAY, || async {
            if query.trim().is_empty() || query.eq_ignore_ascii_case("market") {
                self.fetch_quotes(&["^GSPC", "^DJI", "^IXIC"]).await
            } else {
                let symbols: Vec<&str> = query.split(',').map(|s| s.trim()).collect();
                self.fetch_quotes(&symbols).await
            }
        })
        .await
    }
}
