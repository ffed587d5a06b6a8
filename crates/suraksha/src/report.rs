//! Anonymous crime reports.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::geofence::Coordinate;
use crate::storage::Storage;

/// Crime type used when the reporter does not pick one.
pub const DEFAULT_CRIME_TYPE: &str = "other";

/// Upper bound on report list queries.
pub const MAX_LIST_LIMIT: usize = 1000;

/// A stored crime report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeReport {
    /// Storage-assigned identifier.
    pub id: i64,
    /// Random identifier handed back to the reporter.
    pub anonymous_id: String,
    /// Free-text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Blob handle of an attached voice note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_handle: Option<String>,
    /// Where the incident happened.
    pub location: Coordinate,
    /// Human-readable address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Crime type label.
    pub crime_type: String,
    /// When the report was made.
    pub reported_at: DateTime<Utc>,
    /// Whether the report arrived through offline sync.
    pub synced: bool,
}

/// A crime report to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    /// Anonymous identifier.
    pub anonymous_id: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Voice note handle.
    pub voice_handle: Option<String>,
    /// Incident location.
    pub location: Coordinate,
    /// Address.
    pub address: Option<String>,
    /// Crime type label.
    pub crime_type: String,
    /// Event time.
    pub reported_at: DateTime<Utc>,
    /// Arrived through offline sync.
    pub synced: bool,
}

/// Report fields supplied by the reporter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDraft {
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Voice note handle.
    #[serde(default)]
    pub voice_handle: Option<String>,
    /// Address.
    #[serde(default)]
    pub address: Option<String>,
    /// Crime type; blank means [`DEFAULT_CRIME_TYPE`].
    #[serde(default)]
    pub crime_type: Option<String>,
}

/// Crime report intake and lookup.
#[derive(Debug, Clone)]
pub struct CrimeReports {
    storage: Arc<Storage>,
}

impl CrimeReports {
    /// Create a report service over shared storage.
    #[must_use]
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// File a report now under a fresh anonymous identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn submit(&self, location: Coordinate, draft: ReportDraft) -> Result<CrimeReport> {
        self.record(
            Uuid::new_v4().to_string(),
            location,
            draft,
            Utc::now(),
            false,
        )
    }

    /// Record a report that was filed while the client was offline.
    ///
    /// Keeps the client's anonymous identifier when it sent one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record_synced(
        &self,
        anonymous_id: Option<String>,
        location: Coordinate,
        draft: ReportDraft,
        reported_at: DateTime<Utc>,
    ) -> Result<CrimeReport> {
        let anonymous_id = anonymous_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.record(anonymous_id, location, draft, reported_at, true)
    }

    fn record(
        &self,
        anonymous_id: String,
        location: Coordinate,
        draft: ReportDraft,
        reported_at: DateTime<Utc>,
        synced: bool,
    ) -> Result<CrimeReport> {
        let crime_type = draft
            .crime_type
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_CRIME_TYPE.to_string());

        let report = self.storage.insert_report(&NewReport {
            anonymous_id,
            description: draft.description,
            voice_handle: draft.voice_handle,
            location,
            address: draft.address,
            crime_type,
            reported_at,
            synced,
        })?;
        info!(
            report_id = report.id,
            crime_type = %report.crime_type,
            synced,
            "Crime report recorded"
        );
        Ok(report)
    }

    /// Fetch a report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the report does not exist.
    pub fn get(&self, id: i64) -> Result<CrimeReport> {
        self.storage
            .get_report(id)?
            .ok_or_else(|| Error::not_found("crime report", id))
    }

    /// Most recent reports first, capped at [`MAX_LIST_LIMIT`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list(&self, limit: usize) -> Result<Vec<CrimeReport>> {
        self.storage.list_reports(limit.min(MAX_LIST_LIMIT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn service() -> CrimeReports {
        CrimeReports::new(Arc::new(Storage::open_in_memory().unwrap()))
    }

    fn spot() -> Coordinate {
        Coordinate::new(19.076, 72.8777).unwrap()
    }

    #[test]
    fn test_submit_defaults_crime_type() {
        let reports = service();
        let report = reports.submit(spot(), ReportDraft::default()).unwrap();
        assert_eq!(report.crime_type, DEFAULT_CRIME_TYPE);
        assert!(!report.synced);
        assert!(Uuid::parse_str(&report.anonymous_id).is_ok());
        assert_eq!(reports.get(report.id).unwrap(), report);
    }

    #[test]
    fn test_submit_normalizes_crime_type() {
        let report = service()
            .submit(
                spot(),
                ReportDraft {
                    crime_type: Some(" Theft ".to_string()),
                    ..ReportDraft::default()
                },
            )
            .unwrap();
        assert_eq!(report.crime_type, "theft");
    }

    #[test]
    fn test_record_synced_keeps_client_identity_and_time() {
        let reports = service();
        let at = Utc.with_ymd_and_hms(2024, 4, 2, 22, 10, 0).unwrap();
        let report = reports
            .record_synced(Some("client-anon".to_string()), spot(), ReportDraft::default(), at)
            .unwrap();
        assert_eq!(report.anonymous_id, "client-anon");
        assert_eq!(report.reported_at, at);
        assert!(report.synced);
    }

    #[test]
    fn test_get_missing_report() {
        assert!(service().get(1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_newest_first() {
        let reports = service();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let old = reports
            .record_synced(None, spot(), ReportDraft::default(), at)
            .unwrap();
        let new = reports.submit(spot(), ReportDraft::default()).unwrap();
        let ids: Vec<i64> = reports.list(10).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![new.id, old.id]);
    }
}
