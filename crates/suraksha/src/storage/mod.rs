//! Storage layer for suraksha.
//!
//! This module provides `SQLite`-based persistent storage for zones, subjects,
//! alerts, evidence, notification records, crime reports and sync tokens.
//! A single [`Storage`] handle is constructed at startup and shared by every
//! component through an `Arc`.

mod alerts;
pub mod analytics;
mod evidence;
pub mod migrations;
mod notifications;
mod reports;
pub mod schema;
mod subjects;
mod sync_tokens;
mod zones;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::geofence::Coordinate;

pub use alerts::ResolveOutcome;
pub use analytics::{
    AreaDensity, CrimeTypeCount, DashboardStats, PeriodCount, ResponseTime, ResponseTimes,
    ZoneEffectiveness,
};
pub use sync_tokens::TokenClaim;

/// Storage engine for the alert core.
///
/// Wraps one `SQLite` connection behind a mutex so the handle is `Sync` and
/// can be shared across concurrent requests. Status changes that must be
/// exclusive (alert resolution, sync token claims) are expressed as
/// compare-and-set statements rather than read-then-write.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL keeps readers unblocked while a request writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the database file in bytes, 0 for in-memory databases.
    #[must_use]
    pub fn db_size_bytes(&self) -> u64 {
        if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("storage connection mutex poisoned"))
    }
}

/// Format a timestamp for storage.
///
/// Fixed-width microsecond RFC 3339 with a `Z` suffix, so lexical order in
/// SQL matches chronological order.
pub(crate) fn to_db_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Truncate a timestamp to the precision kept in storage.
pub(crate) fn db_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// Parse a stored timestamp column.
pub(crate) fn from_db_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse an optional stored timestamp column.
pub(crate) fn from_db_time_opt(
    idx: usize,
    value: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| from_db_time(idx, &v)).transpose()
}

/// Read a coordinate from two REAL columns.
pub(crate) fn coordinate_at(
    row: &rusqlite::Row,
    lat_idx: usize,
    lon_idx: usize,
) -> rusqlite::Result<Coordinate> {
    let latitude: f64 = row.get(lat_idx)?;
    let longitude: f64 = row.get(lon_idx)?;
    Coordinate::new(latitude, longitude).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(lat_idx, Type::Real, e.to_string().into())
    })
}

/// Read an optional coordinate from two nullable REAL columns.
pub(crate) fn coordinate_opt_at(
    row: &rusqlite::Row,
    lat_idx: usize,
    lon_idx: usize,
) -> rusqlite::Result<Option<Coordinate>> {
    let latitude: Option<f64> = row.get(lat_idx)?;
    let longitude: Option<f64> = row.get(lon_idx)?;
    match (latitude, longitude) {
        (Some(_), Some(_)) => coordinate_at(row, lat_idx, lon_idx).map(Some),
        _ => Ok(None),
    }
}

/// Parse a TEXT column through `FromStr`.
pub(crate) fn parse_text<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = Error>,
{
    value.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
    })
}
