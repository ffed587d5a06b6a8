//! Evidence ledger persistence. Rows are never updated or deleted.

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{coordinate_opt_at, db_precision, from_db_time, parse_text, to_db_time, Storage};
use crate::error::Result;
use crate::evidence::{Evidence, NewEvidence, PayloadHandle};

const EVIDENCE_COLUMNS: &str =
    "id, alert_id, kind, payload_handle, latitude, longitude, duration_seconds, captured_at";

impl Storage {
    /// Append an evidence record.
    ///
    /// The caller is responsible for checking that the alert exists so it can
    /// report a not-found error; the foreign key is a backstop.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_evidence(&self, evidence: &NewEvidence) -> Result<Evidence> {
        let captured_at = db_precision(evidence.captured_at);
        let conn = self.conn()?;
        conn.execute(
            r"
            INSERT INTO evidence
                (alert_id, kind, payload_handle, latitude, longitude, duration_seconds, captured_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                evidence.alert_id,
                evidence.kind.to_string(),
                evidence.payload_handle.as_str(),
                evidence.location.map(|c| c.latitude()),
                evidence.location.map(|c| c.longitude()),
                evidence.duration_seconds,
                to_db_time(&captured_at),
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!(
            evidence_id = id,
            alert_id = evidence.alert_id,
            kind = %evidence.kind,
            "Appended evidence"
        );
        Ok(Evidence {
            id,
            alert_id: evidence.alert_id,
            kind: evidence.kind,
            payload_handle: evidence.payload_handle.clone(),
            location: evidence.location,
            duration_seconds: evidence.duration_seconds,
            captured_at,
        })
    }

    /// List evidence for an alert, oldest capture first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_evidence(&self, alert_id: i64) -> Result<Vec<Evidence>> {
        let sql = format!(
            "SELECT {EVIDENCE_COLUMNS} FROM evidence WHERE alert_id = ?1 \
             ORDER BY captured_at ASC, id ASC"
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let evidence = stmt
            .query_map([alert_id], Self::row_to_evidence)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(evidence)
    }

    /// Fetch one evidence record by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_evidence(&self, id: i64) -> Result<Option<Evidence>> {
        let sql = format!("SELECT {EVIDENCE_COLUMNS} FROM evidence WHERE id = ?1");
        let evidence = self
            .conn()?
            .query_row(&sql, [id], Self::row_to_evidence)
            .optional()?;
        Ok(evidence)
    }

    fn row_to_evidence(row: &rusqlite::Row) -> rusqlite::Result<Evidence> {
        let kind: String = row.get(2)?;
        let handle: String = row.get(3)?;
        let captured_at: String = row.get(7)?;

        Ok(Evidence {
            id: row.get(0)?,
            alert_id: row.get(1)?,
            kind: parse_text(2, &kind)?,
            payload_handle: parse_text::<PayloadHandle>(3, &handle)?,
            location: coordinate_opt_at(row, 4, 5)?,
            duration_seconds: row.get(6)?,
            captured_at: from_db_time(7, &captured_at)?,
        })
    }
}
