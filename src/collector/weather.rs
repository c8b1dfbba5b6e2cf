//! Weather collector, via wttr.in's free JSON endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::http::{CollectorHttpClient, ResilientHttpClient};
use super::{CollectOptions, Collector, CollectedItem};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{OrchestratorError, Result};

const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct WttrResponse {
    current_condition: Vec<CurrentCondition>,
    nearest_area: Vec<NearestArea>,
    weather: Vec<ForecastDay>,
}

#[derive(Debug, Deserialize)]
struct CurrentCondition {
    #[serde(rename = "temp_C")]
    temp_c: String,
    #[serde(rename = "FeelsLikeC")]
    feels_like_c: String,
    humidity: String,
    weather_desc: Vec<WeatherDesc>,
}

#[derive(Debug, Deserialize)]
struct WeatherDesc {
    value: String,
}

#[derive(Debug, Deserialize)]
struct NearestArea {
    #[serde(rename = "areaName")]
    area_name: Vec<WeatherDesc>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct ForecastDay {
    date: String,
    maxtempC: String,
    mintempC: String,
}

pub struct WeatherCollector {
    client: CollectorHttpClient,
}

impl WeatherCollector {
    pub fn new(http: Arc<ResilientHttpClient>, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client: CollectorHttpClient::new(http, "weather", 60, circuit_breaker),
        }
    }

    async fn fetch_once(&self, location: &str) -> Result<Vec<CollectedItem>> {
        let url = format!(
            "https://wttr.in/{}?format=j1",
            urlencoding::encode(location)
        );

        debug!(source = "weather", location, "fetching wttr.in");

        let response = self.client.get(&url).await?;
        let parsed: WttrResponse = response.json().await.map_err(OrchestratorError::HttpError)?;

        let current = parsed
            .current_condition
            .first()
            .ok_or_else(|| OrchestratorError::ValidationError("no current_condition".to_string()))?;
        let area = parsed
            .nearest_area
            .first()
            .and_then(|a| a.area_name.first())
            .map(|a| a.value.clone())
            .unwrap_or_else(|| location.to_string());
        let description = current
            .weather_desc
            .first()
            .map(|d| d.value.clone())
            .unwrap_or_default();

        let mut content = format!(
            "{description}, {temp}°C (feels like {feels}°C), humidity {humidity}%",
            description = description,
            temp = current.temp_c,
            feels = current.feels_like_c,
            humidity = current.humidity,
        );

        for day in parsed.weather.iter().take(3) {
            content.push_str(&format!(
                "\n{}: {}°C - {}°C",
                day.date, day.mintempC, day.maxtempC
            ));
        }

        let item = CollectedItem::new("weather", format!("Weather in {area}"))
            .with_content(content)
            .with_metadata("temp_c", json!(current.temp_c))
            .with_metadata("location", json!(area));

        Ok(vec![item])
    }
}

#[async_trait]
impl Collector for WeatherCollector {
    fn name(&self) -> &str {
        "weather"
    }

    async fn collect(&self, query: &str, _options: CollectOptions) -> Result<Vec<CollectedItem>> {
        let location = if query.trim().is_empty() { "London" } else { query };
        super::with_retry("weather", MAX_RETRIES, BASE_DELAY, || self.fetch_once(location)).await
    }
}
