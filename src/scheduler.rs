//! Daily scheduler: wakes once a day at a configured UTC hour/minute, runs
//! the pipeline once per configured source, and delivers the assembled
//! briefing to the group sink (if configured) and to every active
//! subscriber.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use tracing::{error, info, warn};

use crate::collector::CollectorRegistry;
use crate::config::Config;
use crate::pipeline::{self, PipelineState};
use crate::storage::Storage;

const GUARD_INTERVAL_SECS: i64 = 60;
const CHUNK_LEN: usize = 4000;

/// Computes the next wall-clock instant at `hour:minute` UTC strictly after
/// `now`. Always schedules relative to `now`, never the previous target, so
/// a late-waking process self-corrects instead of drifting.
pub fn next_wake(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let target_time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    let today_target = now.date_naive().and_time(target_time).and_utc();

    if today_target > now {
        today_target
    } else {
        today_target + ChronoDuration::days(1)
    }
}

/// Per-source default query used when firing the daily briefing.
fn default_query_for(source: &str, config: &Config) -> String {
    match source {
        "weather" => config.default_weather_location.clone(),
        "stocks" => config.default_stock_symbols.clone(),
        "reddit" => format!("r/{}", config.default_reddit_subreddit),
        "crypto" => "trending".to_string(),
        "github" => "trending".to_string(),
        "wikipedia" => "current_events".to_string(),
        _ => "today".to_string(),
    }
}

/// Runs the trigger loop forever. Never returns under normal operation;
/// an error during one fire is logged and the loop continues to the next
/// scheduled wake.
pub async fn run_forever(
    registry: &CollectorRegistry,
    config: &Config,
    storage: Option<&Storage>,
) -> ! {
    loop {
        let now = Utc::now();
        let wake_at = next_wake(now, config.daily_hour, config.daily_minute);
        let sleep_for = (wake_at - now).to_std().unwrap_or(std::time::Duration::from_secs(1));

        info!(wake_at = %wake_at, sleep_secs = sleep_for.as_secs(), "scheduler: sleeping until next wake");
        tokio::time::sleep(sleep_for).await;

        info!("scheduler: firing daily briefing");
        match fire(registry, config, storage).await {
            Ok(()) => crate::metrics::record_scheduler_fire(true),
            Err(e) => {
                crate::metrics::record_scheduler_fire(false);
                error!(error = %e, "scheduler: fire failed, continuing");
            }
        }

        tokio::time::sleep(std::time::Duration::from_secs(GUARD_INTERVAL_SECS as u64)).await;
    }
}

fn date_header(now: DateTime<Utc>) -> String {
    format!("Daily briefing — {}", now.format("%Y-%m-%d"))
}

fn format_section(source: &str, analysis: &str) -> String {
    format!("--- {} ---\n{}", source.to_uppercase(), analysis)
}

async fn fire(registry: &CollectorRegistry, config: &Config, storage: Option<&Storage>) -> anyhow::Result<()> {
    let mut sections = vec![date_header(Utc::now())];

    for source in &config.daily_sources {
        let query = default_query_for(source, config);
        info!(source, query, "scheduler: running pipeline for source");

        let state = PipelineState::new(query.clone()).with_source_and_query(source.clone(), query);
        let result = pipeline::run(registry, config, state).await;

        sections.push(format_section(source, &result.analysis));
    }

    let briefing = sections.join("\n\n");

    if let Some(sink_id) = &config.group_sink_id {
        deliver_chunked(sink_id, &briefing);
    }

    if let Some(storage) = storage {
        match storage.active_subscribers().await {
            Ok(subscribers) => {
                for subscriber in subscribers {
                    deliver_chunked(&subscriber.phone_number, &briefing);
                }
            }
            Err(e) => warn!(error = %e, "scheduler: failed to enumerate subscribers, skipping fan-out"),
        }
    }

    Ok(())
}

/// Splits `text` into chunks of at most `CHUNK_LEN` characters and "sends"
/// each one to `recipient`. The actual delivery transport (chat API, SMS
/// gateway) is intentionally outside this crate's scope; this logs what
/// would be sent so the chunking/ordering behavior is observable and
/// testable without a live sink.
fn deliver_chunked(recipient: &str, text: &str) {
    for (i, chunk_text) in chunk_text(text).into_iter().enumerate() {
        info!(recipient, chunk_index = i, len = chunk_text.len(), "scheduler: delivering chunk");
    }
}

/// Splits `text` into pieces of at most `CHUNK_LEN` chars, preserving order.
fn chunk_text(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(CHUNK_LEN)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_wake_later_today() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 5, 0, 0).unwrap();
        let wake = next_wake(now, 7, 0);
        assert_eq!(wake, Utc.with_ymd_and_hms(2026, 7, 28, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_next_wake_rolls_to_tomorrow_when_passed() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 8, 0, 0).unwrap();
        let wake = next_wake(now, 7, 0);
        assert_eq!(wake, Utc.with_ymd_and_hms(2026, 7, 29, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_next_wake_exact_match_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 7, 0, 0).unwrap();
        let wake = next_wake(now, 7, 0);
        assert_eq!(wake, Utc.with_ymd_and_hms(2026, 7, 29, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_default_query_for_weather_uses_configured_location() {
        let mut config = test_config();
        config.default_weather_location = "Paris".to_string();
        assert_eq!(default_query_for("weather", &config), "Paris");
    }

    #[test]
    fn test_default_query_for_unknown_source_falls_back_to_today() {
        let config = test_config();
        assert_eq!(default_query_for("arxiv", &config), "today");
    }

    #[test]
    fn test_date_header_format() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 7, 0, 0).unwrap();
        assert_eq!(date_header(now), "Daily briefing — 2026-07-28");
    }

    #[test]
    fn test_format_section_uppercases_source() {
        let section = format_section("weather", "23°C, clear skies");
        assert_eq!(section, "--- WEATHER ---\n23°C, clear skies");
    }

    #[test]
    fn test_chunk_text_short_text_single_chunk() {
        let chunks = chunk_text("short briefing");
        assert_eq!(chunks, vec!["short briefing".to_string()]);
    }

    #[test]
    fn test_chunk_text_splits_long_text_into_bounded_pieces() {
        let long = "x".repeat(CHUNK_LEN * 2 + 10);
        let chunks = chunk_text(&long);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= CHUNK_LEN));
        assert_eq!(chunks.iter().map(|c| c.chars().count()).sum::<usize>(), long.chars().count());
    }

    /// Scenario: two subscribers, same briefing, both receive an identical
    /// chunk sequence starting with the date header's day.
    #[test]
    fn test_briefing_fans_out_identically_to_every_subscriber() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 7, 0, 0).unwrap();
        let briefing = format!("{}\n\n{}", date_header(now), format_section("news", "Top story today."));

        let subscribers = ["p1", "p2"];
        let per_subscriber: Vec<Vec<String>> = subscribers.iter().map(|_| chunk_text(&briefing)).collect();

        assert_eq!(per_subscriber[0], per_subscriber[1]);
        assert!(per_subscriber[0][0].starts_with("Daily briefing — 2026-07-28"));
    }

    fn test_config() -> Config {
        Config {
            llm_provider: crate::config::LlmProvider::Local,
            local_base_url: "http://localhost:11434".to_string(),
            local_routing_model: "llama3.2".to_string(),
            local_analysis_model: "llama3.2".to_string(),
            cloud_api_key: None,
            cloud_model: "openai/gpt-4o-mini".to_string(),
            cloud_base_url: "https://openrouter.ai/api/v1".to_string(),
            github_token: None,
            serper_api_key: None,
            rapidapi_key: None,
            database_url: Some("postgres://localhost/test".to_string()),
            daily_hour: 7,
            daily_minute: 0,
            daily_sources: vec!["news".to_string()],
            group_sink_id: None,
            default_weather_location: "London".to_string(),
            default_stock_symbols: "AAPL,MSFT,GOOGL".to_string(),
            default_reddit_subreddit: "technology".to_string(),
            max_concurrent_requests: 10,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_open_duration_secs: 30,
            metrics_port: 9090,
            metrics_enabled: true,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
