//! Crime report persistence.

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{coordinate_at, db_precision, from_db_time, to_db_time, Storage};
use crate::error::Result;
use crate::report::{CrimeReport, NewReport};

const REPORT_COLUMNS: &str = "id, anonymous_id, description, voice_handle, latitude, longitude, \
                              address, crime_type, reported_at, synced";

impl Storage {
    /// Insert a crime report.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_report(&self, report: &NewReport) -> Result<CrimeReport> {
        let reported_at = db_precision(report.reported_at);
        let conn = self.conn()?;
        conn.execute(
            r"
            INSERT INTO crime_reports
                (anonymous_id, description, voice_handle, latitude, longitude,
                 address, crime_type, reported_at, synced)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
            params![
                report.anonymous_id,
                report.description,
                report.voice_handle,
                report.location.latitude(),
                report.location.longitude(),
                report.address,
                report.crime_type,
                to_db_time(&reported_at),
                report.synced,
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!(
            report_id = id,
            crime_type = %report.crime_type,
            synced = report.synced,
            "Inserted crime report"
        );
        Ok(CrimeReport {
            id,
            anonymous_id: report.anonymous_id.clone(),
            description: report.description.clone(),
            voice_handle: report.voice_handle.clone(),
            location: report.location,
            address: report.address.clone(),
            crime_type: report.crime_type.clone(),
            reported_at,
            synced: report.synced,
        })
    }

    /// Get a crime report by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_report(&self, id: i64) -> Result<Option<CrimeReport>> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM crime_reports WHERE id = ?1");
        let report = self
            .conn()?
            .query_row(&sql, [id], Self::row_to_report)
            .optional()?;
        Ok(report)
    }

    /// List crime reports, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_reports(&self, limit: usize) -> Result<Vec<CrimeReport>> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM crime_reports ORDER BY reported_at DESC, id DESC LIMIT ?1"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let reports = stmt
            .query_map([limit], Self::row_to_report)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(reports)
    }

    fn row_to_report(row: &rusqlite::Row) -> rusqlite::Result<CrimeReport> {
        let reported_at: String = row.get(8)?;
        Ok(CrimeReport {
            id: row.get(0)?,
            anonymous_id: row.get(1)?,
            description: row.get(2)?,
            voice_handle: row.get(3)?,
            location: coordinate_at(row, 4, 5)?,
            address: row.get(6)?,
            crime_type: row.get(7)?,
            reported_at: from_db_time(8, &reported_at)?,
            synced: row.get(9)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::Coordinate;
    use chrono::{Duration, Utc};

    fn report(crime_type: &str, hours_ago: i64) -> NewReport {
        NewReport {
            anonymous_id: format!("anon-{hours_ago}"),
            description: Some("bag snatched".to_string()),
            voice_handle: None,
            location: Coordinate::new(12.97, 77.59).unwrap(),
            address: None,
            crime_type: crime_type.to_string(),
            reported_at: Utc::now() - Duration::hours(hours_ago),
            synced: false,
        }
    }

    #[test]
    fn test_insert_and_get_report() {
        let storage = Storage::open_in_memory().unwrap();
        let inserted = storage.insert_report(&report("theft", 0)).unwrap();
        let fetched = storage.get_report(inserted.id).unwrap().unwrap();
        assert_eq!(fetched, inserted);
        assert!(storage.get_report(inserted.id + 1).unwrap().is_none());
    }

    #[test]
    fn test_list_reports_newest_first_with_limit() {
        let storage = Storage::open_in_memory().unwrap();
        let old = storage.insert_report(&report("theft", 5)).unwrap();
        let new = storage.insert_report(&report("assault", 1)).unwrap();
        let mid = storage.insert_report(&report("harassment", 3)).unwrap();

        let ids: Vec<i64> = storage
            .list_reports(10)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![new.id, mid.id, old.id]);
        assert_eq!(storage.list_reports(1).unwrap().len(), 1);
    }

    #[test]
    fn test_synced_flag_round_trips() {
        let storage = Storage::open_in_memory().unwrap();
        let mut synced = report("other", 0);
        synced.synced = true;
        let inserted = storage.insert_report(&synced).unwrap();
        assert!(storage.get_report(inserted.id).unwrap().unwrap().synced);
    }
}
