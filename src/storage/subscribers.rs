//! Subscriber store: phone-number-keyed recipients of the daily briefing.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Storage;
use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Subscriber {
    pub phone_number: String,
    pub subscribed_at: DateTime<Utc>,
    pub active: bool,
    pub preferences: Vec<String>,
}

impl Storage {
    /// Upserts a subscriber: flips `active` to true and overwrites
    /// `preferences` whether the row is new or returning.
    pub async fn subscribe(&self, phone_number: &str, preferences: &[String]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wa_subscribers (phone_number, active, preferences)
            VALUES ($1, TRUE, $2)
            ON CONFLICT (phone_number) DO UPDATE SET
                active = TRUE,
                preferences = EXCLUDED.preferences
            "#,
        )
        .bind(phone_number)
        .bind(preferences)
        .execute(self.pool())
        .await
        .map_err(OrchestratorError::DatabaseError)?;

        Ok(())
    }

    /// Soft-deletes: flips `active` to false. A no-op (not an error) if the
    /// number was never subscribed.
    pub async fn unsubscribe(&self, phone_number: &str) -> Result<()> {
        sqlx::query("UPDATE wa_subscribers SET active = FALSE WHERE phone_number = $1")
            .bind(phone_number)
            .execute(self.pool())
            .await
            .map_err(OrchestratorError::DatabaseError)?;

        Ok(())
    }

    /// Enumerates every currently active subscriber.
    pub async fn active_subscribers(&self) -> Result<Vec<Subscriber>> {
        sqlx::query_as::<_, Subscriber>(
            "SELECT phone_number, subscribed_at, active, preferences FROM wa_subscribers WHERE active = TRUE",
        )
        .fetch_all(self.pool())
        .await
        .map_err(OrchestratorError::DatabaseError)
    }
}
