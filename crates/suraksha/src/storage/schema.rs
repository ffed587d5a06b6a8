//! `SQLite` schema definitions for suraksha.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// Subjects mirrored from the identity collaborator.
pub const CREATE_SUBJECTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS subjects (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    phone TEXT,
    role TEXT NOT NULL DEFAULT 'citizen',
    created_at TEXT NOT NULL
)
";

/// Emergency contacts, ordered by position per subject.
pub const CREATE_CONTACTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS emergency_contacts (
    subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    recipient TEXT NOT NULL,
    PRIMARY KEY (subject_id, position)
)
";

/// Risk zones. Rows are never deleted; `active` is cleared instead.
pub const CREATE_ZONES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS risk_zones (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    radius_km REAL NOT NULL CHECK (radius_km > 0),
    risk_level TEXT NOT NULL DEFAULT 'high',
    description TEXT,
    created_by INTEGER,
    created_at TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
)
";

/// Emergency alerts.
pub const CREATE_ALERTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id INTEGER NOT NULL,
    correlation_id TEXT NOT NULL UNIQUE,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    address TEXT,
    zone_id INTEGER REFERENCES risk_zones(id),
    status TEXT NOT NULL DEFAULT 'active',
    triggered_at TEXT NOT NULL,
    resolved_at TEXT,
    resolved_by INTEGER,
    notes TEXT,
    CHECK ((resolved_at IS NULL) = (resolved_by IS NULL))
)
";

/// Index for listing alerts newest first.
pub const CREATE_ALERTS_TRIGGERED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_alerts_triggered ON alerts(triggered_at DESC)
";

/// Index for the active-alert queue.
pub const CREATE_ALERTS_STATUS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts(status)
";

/// Evidence attached to alerts. Append-only.
pub const CREATE_EVIDENCE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS evidence (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    alert_id INTEGER NOT NULL REFERENCES alerts(id),
    kind TEXT NOT NULL,
    payload_handle TEXT NOT NULL,
    latitude REAL,
    longitude REAL,
    duration_seconds INTEGER,
    captured_at TEXT NOT NULL
)
";

/// Index for per-alert evidence listing.
pub const CREATE_EVIDENCE_ALERT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_evidence_alert ON evidence(alert_id, captured_at)
";

/// Notification delivery attempts. Append-only.
pub const CREATE_NOTIFICATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    alert_id INTEGER NOT NULL REFERENCES alerts(id),
    recipient TEXT NOT NULL,
    message TEXT NOT NULL,
    dispatched_at TEXT NOT NULL,
    status TEXT NOT NULL
)
";

/// Index for per-alert notification listing.
pub const CREATE_NOTIFICATIONS_ALERT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_notifications_alert ON notifications(alert_id)
";

/// Anonymous crime reports.
pub const CREATE_REPORTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS crime_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    anonymous_id TEXT NOT NULL,
    description TEXT,
    voice_handle TEXT,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    address TEXT,
    crime_type TEXT NOT NULL DEFAULT 'other',
    reported_at TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
)
";

/// Index for time-ordered report queries.
pub const CREATE_REPORTS_TIME_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_reports_reported ON crime_reports(reported_at DESC)
";

/// Idempotency tokens claimed by the sync reconciler, scoped per subject.
///
/// `record_id` stays NULL while the claiming operation is in flight.
pub const CREATE_SYNC_TOKENS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sync_tokens (
    subject_id INTEGER NOT NULL,
    token TEXT NOT NULL,
    op_type TEXT NOT NULL,
    record_id INTEGER,
    claimed_at TEXT NOT NULL,
    PRIMARY KEY (subject_id, token)
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_SUBJECTS_TABLE,
    CREATE_CONTACTS_TABLE,
    CREATE_ZONES_TABLE,
    CREATE_ALERTS_TABLE,
    CREATE_ALERTS_TRIGGERED_INDEX,
    CREATE_ALERTS_STATUS_INDEX,
    CREATE_EVIDENCE_TABLE,
    CREATE_EVIDENCE_ALERT_INDEX,
    CREATE_NOTIFICATIONS_TABLE,
    CREATE_NOTIFICATIONS_ALERT_INDEX,
    CREATE_REPORTS_TABLE,
    CREATE_REPORTS_TIME_INDEX,
    CREATE_SYNC_TOKENS_TABLE,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.trim().is_empty());
        }
    }

    #[test]
    fn test_alerts_table_pairs_resolution_fields() {
        assert!(CREATE_ALERTS_TABLE.contains("(resolved_at IS NULL) = (resolved_by IS NULL)"));
        assert!(CREATE_ALERTS_TABLE.contains("correlation_id TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn test_zones_table_requires_positive_radius() {
        assert!(CREATE_ZONES_TABLE.contains("CHECK (radius_km > 0)"));
    }
}
