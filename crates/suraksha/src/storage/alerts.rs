//! Alert persistence.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{
    coordinate_at, db_precision, from_db_time, from_db_time_opt, parse_text, to_db_time, Storage,
};
use crate::alert::{Alert, AlertStatus, NewAlert, Resolution};
use crate::error::Result;

const ALERT_COLUMNS: &str = "id, subject_id, correlation_id, latitude, longitude, address, \
                             zone_id, status, triggered_at, resolved_at, resolved_by, notes";

/// Result of a compare-and-set resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// This call moved the alert from active to resolved.
    Resolved,
    /// The alert exists but was already resolved.
    AlreadyResolved,
    /// No alert has that ID.
    Missing,
}

impl Storage {
    /// Insert a new active alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_alert(&self, alert: &NewAlert) -> Result<Alert> {
        let triggered_at = db_precision(alert.triggered_at);
        let conn = self.conn()?;
        conn.execute(
            r"
            INSERT INTO alerts
                (subject_id, correlation_id, latitude, longitude, address, zone_id, status, triggered_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
            params![
                alert.subject_id,
                alert.correlation_id,
                alert.location.latitude(),
                alert.location.longitude(),
                alert.address,
                alert.zone_id,
                AlertStatus::Active.to_string(),
                to_db_time(&triggered_at),
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!(alert_id = id, subject_id = alert.subject_id, "Inserted alert");
        Ok(Alert {
            id,
            subject_id: alert.subject_id,
            correlation_id: alert.correlation_id.clone(),
            location: alert.location,
            address: alert.address.clone(),
            zone_id: alert.zone_id,
            status: AlertStatus::Active,
            triggered_at,
            resolution: None,
        })
    }

    /// Get an alert by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_alert(&self, id: i64) -> Result<Option<Alert>> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1");
        let alert = self
            .conn()?
            .query_row(&sql, [id], Self::row_to_alert)
            .optional()?;
        Ok(alert)
    }

    /// Check whether an alert exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn alert_exists(&self, id: i64) -> Result<bool> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM alerts WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Resolve an alert if, and only if, it is still active.
    ///
    /// The status check and the write are one statement, so of two racing
    /// callers exactly one observes [`ResolveOutcome::Resolved`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn resolve_alert(
        &self,
        id: i64,
        resolved_by: i64,
        notes: Option<&str>,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolveOutcome> {
        let conn = self.conn()?;
        let affected = conn.execute(
            r"
            UPDATE alerts
            SET status = ?1, resolved_at = ?2, resolved_by = ?3, notes = ?4
            WHERE id = ?5 AND status = ?6
            ",
            params![
                AlertStatus::Resolved.to_string(),
                to_db_time(&resolved_at),
                resolved_by,
                notes,
                id,
                AlertStatus::Active.to_string(),
            ],
        )?;

        if affected > 0 {
            return Ok(ResolveOutcome::Resolved);
        }

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(if exists > 0 {
            ResolveOutcome::AlreadyResolved
        } else {
            ResolveOutcome::Missing
        })
    }

    /// List alerts newest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_alerts(&self, status: Option<AlertStatus>) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let alerts = if let Some(status) = status {
            let sql = format!(
                "SELECT {ALERT_COLUMNS} FROM alerts WHERE status = ?1 \
                 ORDER BY triggered_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([status.to_string()], Self::row_to_alert)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        } else {
            let sql =
                format!("SELECT {ALERT_COLUMNS} FROM alerts ORDER BY triggered_at DESC, id DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], Self::row_to_alert)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };
        Ok(alerts)
    }

    fn row_to_alert(row: &rusqlite::Row) -> rusqlite::Result<Alert> {
        let status: String = row.get(7)?;
        let status: AlertStatus = parse_text(7, &status)?;
        let triggered_at: String = row.get(8)?;
        let resolved_at = from_db_time_opt(9, row.get(9)?)?;
        let resolved_by: Option<i64> = row.get(10)?;

        let resolution = match (resolved_at, resolved_by) {
            (Some(resolved_at), Some(resolved_by)) => Some(Resolution {
                resolved_at,
                resolved_by,
                notes: row.get(11)?,
            }),
            _ => None,
        };

        Ok(Alert {
            id: row.get(0)?,
            subject_id: row.get(1)?,
            correlation_id: row.get(2)?,
            location: coordinate_at(row, 3, 4)?,
            address: row.get(5)?,
            zone_id: row.get(6)?,
            status,
            triggered_at: from_db_time(8, &triggered_at)?,
            resolution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::Coordinate;
    use chrono::Duration;

    fn new_alert(subject_id: i64, triggered_at: DateTime<Utc>) -> NewAlert {
        NewAlert {
            subject_id,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            location: Coordinate::new(12.97, 77.59).unwrap(),
            address: Some("Church Street".to_string()),
            zone_id: None,
            triggered_at,
        }
    }

    #[test]
    fn test_insert_and_get_alert() {
        let storage = Storage::open_in_memory().unwrap();
        let alert = storage.insert_alert(&new_alert(1, Utc::now())).unwrap();

        let fetched = storage.get_alert(alert.id).unwrap().unwrap();
        assert_eq!(fetched, alert);
        assert_eq!(fetched.status, AlertStatus::Active);
        assert!(fetched.resolution.is_none());
    }

    #[test]
    fn test_resolve_alert_compare_and_set() {
        let storage = Storage::open_in_memory().unwrap();
        let alert = storage.insert_alert(&new_alert(1, Utc::now())).unwrap();

        let first = storage
            .resolve_alert(alert.id, 99, Some("handled"), Utc::now())
            .unwrap();
        assert_eq!(first, ResolveOutcome::Resolved);

        let second = storage
            .resolve_alert(alert.id, 100, Some("overwrite"), Utc::now())
            .unwrap();
        assert_eq!(second, ResolveOutcome::AlreadyResolved);

        let fetched = storage.get_alert(alert.id).unwrap().unwrap();
        let resolution = fetched.resolution.unwrap();
        assert_eq!(resolution.resolved_by, 99);
        assert_eq!(resolution.notes.as_deref(), Some("handled"));
    }

    #[test]
    fn test_resolve_missing_alert() {
        let storage = Storage::open_in_memory().unwrap();
        let outcome = storage.resolve_alert(5, 1, None, Utc::now()).unwrap();
        assert_eq!(outcome, ResolveOutcome::Missing);
    }

    #[test]
    fn test_list_alerts_newest_first() {
        let storage = Storage::open_in_memory().unwrap();
        let now = Utc::now();
        let old = storage
            .insert_alert(&new_alert(1, now - Duration::hours(2)))
            .unwrap();
        let newest = storage.insert_alert(&new_alert(2, now)).unwrap();
        let middle = storage
            .insert_alert(&new_alert(3, now - Duration::hours(1)))
            .unwrap();

        let ids: Vec<i64> = storage
            .list_alerts(None)
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![newest.id, middle.id, old.id]);

        storage.resolve_alert(middle.id, 9, None, now).unwrap();
        let active: Vec<i64> = storage
            .list_alerts(Some(AlertStatus::Active))
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(active, vec![newest.id, old.id]);
    }

    #[test]
    fn test_alert_exists() {
        let storage = Storage::open_in_memory().unwrap();
        let alert = storage.insert_alert(&new_alert(1, Utc::now())).unwrap();
        assert!(storage.alert_exists(alert.id).unwrap());
        assert!(!storage.alert_exists(alert.id + 1).unwrap());
    }
}
