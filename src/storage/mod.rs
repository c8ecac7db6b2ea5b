//! SQLite storage layer -- schema, appends, and ordered read-back.

pub mod record;
pub mod schema;

pub use self::record::{NewProbeResult, ProbeResult};

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, TransactionBehavior};
use thiserror::Error;

use crate::clock::{Clock, SystemClock};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Row limit used by every history reader.
pub const DEFAULT_RECENT_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database unavailable: {0}")]
    Unavailable(#[from] r2d2::Error),

    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage task aborted: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Durable append/query store for probe results.
#[async_trait::async_trait]
pub trait ResultStore: Send + Sync {
    /// Assign `id` and `timestamp`, commit, and return the stored record.
    async fn append(&self, record: NewProbeResult) -> Result<ProbeResult, StorageError>;

    /// Up to `limit` records, newest first (ties broken by id, newest first).
    async fn recent(&self, limit: usize) -> Result<Vec<ProbeResult>, StorageError>;
}

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    if path == ":memory:" {
        return open_memory_pool();
    }

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create database directory {}", parent.display()))?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Single-connection in-memory database. Every pooled connection to
/// `:memory:` would otherwise see its own empty database.
pub fn open_memory_pool() -> Result<Pool> {
    let pool = R2D2Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(SqliteConnectionManager::memory())?;

    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// [`ResultStore`] backed by the `probe_results` table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: Pool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl ResultStore for SqliteStore {
    async fn append(&self, record: NewProbeResult) -> Result<ProbeResult, StorageError> {
        let pool = self.pool.clone();
        let clock = self.clock.clone();
        tokio::task::spawn_blocking(move || insert(&pool, clock.as_ref(), record)).await?
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ProbeResult>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || select_recent(&pool, limit)).await?
    }
}

// Fixed-width UTC text so lexical order in SQLite equals time order.
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn insert(
    pool: &Pool,
    clock: &dyn Clock,
    record: NewProbeResult,
) -> Result<ProbeResult, StorageError> {
    let mut conn = pool.get()?;
    // Take the write lock before reading the clock so commit order, id order
    // and timestamp order agree across connections and processes.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let timestamp = clock.now();
    tx.execute(
        "INSERT INTO probe_results (request_payload, response_data, status_code, response_time_ms, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.request_payload,
            record.response_data,
            record.status_code,
            i64::try_from(record.response_time).unwrap_or(i64::MAX),
            encode_timestamp(&timestamp),
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    Ok(ProbeResult {
        id,
        request_payload: record.request_payload,
        response_data: record.response_data,
        status_code: record.status_code,
        response_time: record.response_time,
        // Round-trip through the stored precision so readers see the same value.
        timestamp: truncate_to_micros(timestamp),
    })
}

fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&encode_timestamp(&ts))
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(ts)
}

fn select_recent(pool: &Pool, limit: usize) -> Result<Vec<ProbeResult>, StorageError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, request_payload, response_data, status_code, response_time_ms, timestamp
         FROM probe_results
         ORDER BY timestamp DESC, id DESC
         LIMIT ?1",
    )?;

    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt.query_map(params![limit], |row| {
        let raw_ts: String = row.get(5)?;
        let timestamp = DateTime::parse_from_rfc3339(&raw_ts)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })?;
        Ok(ProbeResult {
            id: row.get(0)?,
            request_payload: row.get(1)?,
            response_data: row.get(2)?,
            status_code: row.get(3)?,
            response_time: row.get::<_, i64>(4)?.max(0) as u64,
            timestamp,
        })
    })?;

    let mut results = Vec::new();
    for r in rows {
        results.push(r?);
    }
    Ok(results)
}
