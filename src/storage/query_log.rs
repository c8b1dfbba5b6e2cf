//! Query log: append-only history of pipeline completions.
//!
//! Writes are best-effort: a failure to log must never fail the caller's
//! request, so every write call site here logs and swallows its own error
//! rather than propagating it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::Storage;
use crate::error::{OrchestratorError, Result};

const RESPONSE_TRUNCATE_LEN: usize = 2000;

#[derive(Debug, Clone, Serialize)]
pub struct QueryLogEntry {
    pub user_id: String,
    pub source: String,
    pub query: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

impl Storage {
    /// Appends one entry. Best-effort: logs and returns `Ok(())` on failure
    /// rather than propagating, since a log write must never fail a request.
    pub async fn log_query(&self, user_id: &str, source: &str, query: &str, response: &str) {
        let truncated: String = response.chars().take(RESPONSE_TRUNCATE_LEN).collect();

        let result = sqlx::query(
            "INSERT INTO query_log (user_id, source, query, response) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(source)
        .bind(query)
        .bind(&truncated)
        .execute(self.pool())
        .await;

        if let Err(e) = result {
            warn!(error = %e, user_id, "failed to write query log entry");
        }
    }

    /// Fetches up to `limit` most recent entries for `user_id`, newest first.
    pub async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<QueryLogEntry>> {
        let rows = sqlx::query_as::<_, QueryLogRow>(
            "SELECT user_id, source, query, response, created_at FROM query_log \
             WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(OrchestratorError::DatabaseError)?;

        Ok(rows.into_iter().map(QueryLogEntry::from).collect())
    }
}

#[derive(sqlx::FromRow)]
struct QueryLogRow {
    user_id: String,
    source: String,
    query: String,
    response: String,
    created_at: DateTime<Utc>,
}

impl From<QueryLogRow> for QueryLogEntry {
    fn from(row: QueryLogRow) -> Self {
        Self {
            user_id: row.user_id,
            source: row.source,
            query: row.query,
            response: row.response,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_truncate_len_matches_spec() {
        assert_eq!(super::RESPONSE_TRUNCATE_LEN, 2000);
    }
}
