//! Storage layer: the query log and the subscriber store.
//!
//! Runtime-checked queries (`sqlx::query(...).bind(...)`) rather than the
//! compile-time `query!` macros, since this crate has no fixed DATABASE_URL
//! available at build time.

pub mod query_log;
pub mod subscribers;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::error::{OrchestratorError, Result};

pub use query_log::QueryLogEntry;
pub use subscribers::Subscriber;

#[derive(Clone)]
pub struct Storage {
    pool: PgPool,
}

impl Storage {
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("connecting to database");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(OrchestratorError::DatabaseError)?;
        info!("database connection established");
        Ok(Self { pool })
    }

    /// Creates the `query_log` and `wa_subscribers` tables if they do not
    /// already exist. Called once at boot.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS query_log (
                id BIGSERIAL PRIMARY KEY,
                user_id TEXT NOT NULL,
                source TEXT NOT NULL,
                query TEXT NOT NULL,
                response TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(OrchestratorError::DatabaseError)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_query_log_user_id ON query_log (user_id)")
            .execute(&self.pool)
            .await
            .map_err(OrchestratorError::DatabaseError)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wa_subscribers (
                id BIGSERIAL PRIMARY KEY,
                phone_number TEXT UNIQUE NOT NULL,
                subscribed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                active BOOLEAN NOT NULL DEFAULT TRUE,
                preferences TEXT[] NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(OrchestratorError::DatabaseError)?;

        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
