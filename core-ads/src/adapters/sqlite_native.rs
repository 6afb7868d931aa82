//! # SQLite Performance Store
//!
//! Persists [`PerformanceRecord`]s in the `ad_performance` table using a
//! sqlx connection pool. The schema lives in `migrations/` and is applied
//! when the store is opened.
//!
//! Timestamps are stored as Unix milliseconds.
//!
//! ```rust,ignore
//! let store = SqlitePerformanceStore::open(StoreConfig::new("ads.db")).await?;
//! let config = CoreConfig::builder()
//!     .config_source(source)
//!     .ad_provider(provider)
//!     .performance_store(Arc::new(store))
//!     .build()?;
//! ```

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{PerformanceRecord, PerformanceStore};
use chrono::{TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{query, Row, SqlitePool};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Connection settings for [`SqlitePerformanceStore::open`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `sqlite:<path>` or `sqlite::memory:`
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl StoreConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        Self {
            database_url: format!("sqlite:{}", path.display()),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(10),
        }
    }

    /// In-memory database. Pinned to a single connection since each SQLite
    /// connection gets its own private memory database.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(10),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

pub struct SqlitePerformanceStore {
    pool: SqlitePool,
}

impl SqlitePerformanceStore {
    /// Wrap an existing pool. The schema must already be applied; see
    /// [`migrate`](Self::migrate).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool, apply migrations and return the store.
    #[instrument(skip(config), fields(database_url = %config.database_url))]
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(database_error)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to open performance database");
                database_error(e)
            })?;

        let store = Self::new(pool);
        store.migrate().await?;
        info!("Performance store ready");
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::open(StoreConfig::in_memory()).await
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Performance store migration failed");
                BridgeError::DatabaseError(e.to_string())
            })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn database_error(e: sqlx::Error) -> BridgeError {
    BridgeError::DatabaseError(e.to_string())
}

fn to_column(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_column(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[async_trait]
impl PerformanceStore for SqlitePerformanceStore {
    async fn get_performance(&self, config_id: &str) -> Result<Option<PerformanceRecord>> {
        let row = query(
            "SELECT config_id, impressions, clicks, click_through_rate, last_updated \
             FROM ad_performance WHERE config_id = ?",
        )
        .bind(config_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let millis: i64 = row.try_get("last_updated").map_err(database_error)?;
        let last_updated = Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
            BridgeError::DatabaseError(format!("invalid last_updated value {}", millis))
        })?;

        Ok(Some(PerformanceRecord {
            config_id: row.try_get("config_id").map_err(database_error)?,
            impressions: from_column(row.try_get("impressions").map_err(database_error)?),
            clicks: from_column(row.try_get("clicks").map_err(database_error)?),
            click_through_rate: row.try_get("click_through_rate").map_err(database_error)?,
            last_updated,
        }))
    }

    async fn update_performance(&self, record: PerformanceRecord) -> Result<()> {
        query(
            r#"
            INSERT INTO ad_performance (
                config_id, impressions, clicks, click_through_rate, last_updated
            )
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(config_id) DO UPDATE SET
                impressions = excluded.impressions,
                clicks = excluded.clicks,
                click_through_rate = excluded.click_through_rate,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&record.config_id)
        .bind(to_column(record.impressions))
        .bind(to_column(record.clicks))
        .bind(record.click_through_rate)
        .bind(record.last_updated.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        debug!(config_id = %record.config_id, "Performance record written");
        Ok(())
    }
}
