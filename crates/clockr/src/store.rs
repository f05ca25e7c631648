//! Local record of submitted time entries.
//!
//! Every accepted allocation becomes one row, whether or not Clockify took
//! it. Failed rows keep an empty external id so they can be retried by hand.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SELECT_COLUMNS: &str = "id, clockify_id, project_id, project_name, client_name, description, \
     start_time, end_time, minutes, status, raw_input, created_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid timestamp {value:?} in column {column}")]
    Timestamp { column: &'static str, value: String },

    #[error("invalid entry status {0:?}")]
    Status(String),

    #[error("cannot create data directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Outcome of the Clockify call for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Logged,
    Failed,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Logged => "logged",
            EntryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logged" => Ok(EntryStatus::Logged),
            "failed" => Ok(EntryStatus::Failed),
            other => Err(StoreError::Status(other.to_string())),
        }
    }
}

/// One submitted allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedEntry {
    /// Row id, assigned on insert.
    pub local_id: Option<i64>,
    /// Clockify time-entry id; empty when creation failed.
    pub external_id: String,
    pub project_id: String,
    pub project_name: String,
    pub client_name: Option<String>,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub minutes: u32,
    pub status: EntryStatus,
    /// The free-text description the allocation came from.
    pub raw_input: String,
    pub created_at: DateTime<Utc>,
}

/// Persistent entry storage.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Insert an entry and return its row id.
    async fn persist(&self, entry: &PersistedEntry) -> Result<i64, StoreError>;

    /// Entries whose start lies in `[from, to)`, oldest first.
    async fn entries_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PersistedEntry>, StoreError>;

    /// Entries whose Clockify creation failed, oldest first.
    async fn failed_entries(&self) -> Result<Vec<PersistedEntry>, StoreError>;

    /// Most recent non-empty free-text description.
    async fn last_raw_input(&self) -> Result<Option<String>, StoreError>;

    /// Most recently created entry that Clockify accepted.
    async fn last_logged_entry(&self) -> Result<Option<PersistedEntry>, StoreError>;
}

/// SQLite-backed entry store.
pub struct SqliteEntryStore {
    pool: SqlitePool,
}

impl SqliteEntryStore {
    /// Open (creating if needed) the database at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let store = Self { pool };
        store.initialize_tables().await?;
        Ok(store)
    }

    /// Private in-memory database; one connection so every query sees it.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.initialize_tables().await?;
        Ok(store)
    }

    /// Default database location: `<clockr home>/clockr.db`.
    pub fn default_path(home: &Path) -> PathBuf {
        home.join("clockr.db")
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn initialize_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                clockify_id TEXT,
                project_id TEXT NOT NULL,
                project_name TEXT NOT NULL,
                client_name TEXT,
                description TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                minutes INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'logged',
                raw_input TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_entries_start
            ON entries(start_time)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Entries that started today in local time.
    pub async fn today_entries(&self) -> Result<Vec<PersistedEntry>, StoreError> {
        let (from, to) = local_day_bounds(Local::now());
        self.entries_between(from, to).await
    }
}

#[async_trait]
impl EntryStore for SqliteEntryStore {
    async fn persist(&self, entry: &PersistedEntry) -> Result<i64, StoreError> {
        let external_id = (!entry.external_id.is_empty()).then_some(entry.external_id.as_str());
        let result = sqlx::query(
            r#"
            INSERT INTO entries (clockify_id, project_id, project_name, client_name, description,
                                 start_time, end_time, minutes, status, raw_input, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(external_id)
        .bind(&entry.project_id)
        .bind(&entry.project_name)
        .bind(entry.client_name.as_deref())
        .bind(&entry.description)
        .bind(format_timestamp(entry.start))
        .bind(format_timestamp(entry.end))
        .bind(i64::from(entry.minutes))
        .bind(entry.status.as_str())
        .bind(&entry.raw_input)
        .bind(format_timestamp(entry.created_at))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn entries_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PersistedEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM entries WHERE start_time >= ?1 AND start_time < ?2 ORDER BY start_time ASC, id ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(format_timestamp(from))
            .bind(format_timestamp(to))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn failed_entries(&self) -> Result<Vec<PersistedEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM entries WHERE status = 'failed' ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn last_raw_input(&self) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT raw_input FROM entries
            WHERE raw_input IS NOT NULL AND raw_input != ''
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.try_get::<String, _>("raw_input")).transpose()?)
    }

    async fn last_logged_entry(&self) -> Result<Option<PersistedEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM entries WHERE status = 'logged' ORDER BY created_at DESC, id DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(entry_from_row).transpose()
    }
}

/// Second-precision UTC timestamp, e.g. `2025-03-03T09:00:00Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn parse_timestamp(column: &'static str, value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Timestamp { column, value })
}

fn entry_from_row(row: &SqliteRow) -> Result<PersistedEntry, StoreError> {
    let minutes: i64 = row.try_get("minutes")?;
    let status: String = row.try_get("status")?;
    Ok(PersistedEntry {
        local_id: Some(row.try_get("id")?),
        external_id: row
            .try_get::<Option<String>, _>("clockify_id")?
            .unwrap_or_default(),
        project_id: row.try_get("project_id")?,
        project_name: row.try_get("project_name")?,
        client_name: row.try_get("client_name")?,
        description: row.try_get("description")?,
        start: parse_timestamp("start_time", row.try_get("start_time")?)?,
        end: parse_timestamp("end_time", row.try_get("end_time")?)?,
        minutes: u32::try_from(minutes).unwrap_or(0),
        status: status.parse()?,
        raw_input: row
            .try_get::<Option<String>, _>("raw_input")?
            .unwrap_or_default(),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

/// UTC bounds of the local calendar day containing `now`.
pub fn local_day_bounds<Tz: TimeZone>(now: DateTime<Tz>) -> (DateTime<Utc>, DateTime<Utc>) {
    let tz = now.timezone();
    let day = now.date_naive();
    let start = tz
        .from_local_datetime(&day.and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc));
    (start, start + chrono::Duration::days(1))
}
