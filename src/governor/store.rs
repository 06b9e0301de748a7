//! Persistence for governor state across restarts.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use super::usage::{ApiUsageStats, DailyUsage};

/// Everything the governor needs to resume after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernorSnapshot {
    pub stats: ApiUsageStats,
    pub chat_window: Vec<DateTime<Utc>>,
    pub embedding_window: Vec<DateTime<Utc>>,
}

/// Storage backend for [`GovernorSnapshot`]s.
///
/// Calls are synchronous and made while the governor holds its state lock,
/// so snapshots are written in the order they were taken.
pub trait UsageStore: Send + Sync {
    fn load(&self) -> Result<Option<GovernorSnapshot>>;

    fn save(&self, snapshot: &GovernorSnapshot) -> Result<()>;

    /// Record the final totals of a finished UTC day.
    fn archive_day(&self, day: &str, usage: &DailyUsage) -> Result<()>;
}

/// SQLite-backed store (see [`crate::db`]).
pub struct SqliteUsageStore {
    conn: Mutex<Connection>,
}

impl SqliteUsageStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("usage db lock poisoned: {e}"))?;
        f(&conn)
    }

    /// Archived days, newest first.
    pub fn archived_days(&self, limit: usize) -> Result<Vec<(String, DailyUsage)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT day, chat_requests, embedding_requests, tokens, cost \
                 FROM daily_usage ORDER BY day DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        DailyUsage {
                            chat_requests: row.get::<_, i64>(1)? as u64,
                            embedding_requests: row.get::<_, i64>(2)? as u64,
                            tokens: row.get::<_, i64>(3)? as u64,
                            cost: row.get(4)?,
                        },
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

impl UsageStore for SqliteUsageStore {
    fn load(&self) -> Result<Option<GovernorSnapshot>> {
        self.with_conn(|conn| {
            let raw = match conn.query_row(
                "SELECT snapshot FROM governor_state WHERE id = 1",
                [],
                |row| row.get::<_, String>(0),
            ) {
                Ok(raw) => raw,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let snapshot =
                serde_json::from_str(&raw).context("stored governor snapshot is corrupt")?;
            Ok(Some(snapshot))
        })
    }

    fn save(&self, snapshot: &GovernorSnapshot) -> Result<()> {
        let raw = serde_json::to_string(snapshot)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO governor_state (id, snapshot, updated_at) VALUES (1, ?1, ?2) \
                 ON CONFLICT(id) DO UPDATE SET snapshot = excluded.snapshot, \
                 updated_at = excluded.updated_at",
                params![raw, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    fn archive_day(&self, day: &str, usage: &DailyUsage) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO daily_usage \
                 (day, chat_requests, embedding_requests, tokens, cost) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    day,
                    usage.chat_requests as i64,
                    usage.embedding_requests as i64,
                    usage.tokens as i64,
                    usage.cost
                ],
            )?;
            Ok(())
        })
    }
}

/// Process-local store. Used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryUsageStore {
    snapshot: Mutex<Option<GovernorSnapshot>>,
    archived: Mutex<Vec<(String, DailyUsage)>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn archived(&self) -> Vec<(String, DailyUsage)> {
        self.archived
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

impl UsageStore for MemoryUsageStore {
    fn load(&self) -> Result<Option<GovernorSnapshot>> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|e| anyhow::anyhow!("snapshot lock poisoned: {e}"))?;
        Ok(guard.clone())
    }

    fn save(&self, snapshot: &GovernorSnapshot) -> Result<()> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|e| anyhow::anyhow!("snapshot lock poisoned: {e}"))?;
        *guard = Some(snapshot.clone());
        Ok(())
    }

    fn archive_day(&self, day: &str, usage: &DailyUsage) -> Result<()> {
        let mut guard = self
            .archived
            .lock()
            .map_err(|e| anyhow::anyhow!("archive lock poisoned: {e}"))?;
        guard.push((day.to_string(), usage.clone()));
        Ok(())
    }
}
