//! Notification record persistence. Append-only.

use rusqlite::params;

use super::{db_precision, from_db_time, parse_text, to_db_time, Storage};
use crate::error::Result;
use crate::notify::{DeliveryStatus, NewNotification, NotificationRecord};

const NOTIFICATION_COLUMNS: &str = "id, alert_id, recipient, message, dispatched_at, status";

impl Storage {
    /// Append a delivery attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_notification(&self, record: &NewNotification) -> Result<NotificationRecord> {
        let dispatched_at = db_precision(record.dispatched_at);
        let conn = self.conn()?;
        conn.execute(
            r"
            INSERT INTO notifications (alert_id, recipient, message, dispatched_at, status)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                record.alert_id,
                record.recipient,
                record.message,
                to_db_time(&dispatched_at),
                record.status.to_string(),
            ],
        )?;

        Ok(NotificationRecord {
            id: conn.last_insert_rowid(),
            alert_id: record.alert_id,
            recipient: record.recipient.clone(),
            message: record.message.clone(),
            dispatched_at,
            status: record.status,
        })
    }

    /// List delivery attempts for an alert in dispatch order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_notifications(&self, alert_id: i64) -> Result<Vec<NotificationRecord>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE alert_id = ?1 ORDER BY id ASC"
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map([alert_id], Self::row_to_notification)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// List every failed delivery attempt, oldest first.
    ///
    /// Intended for an outer retry layer; the core itself never retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_failed_notifications(&self) -> Result<Vec<NotificationRecord>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE status = ?1 ORDER BY id ASC"
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(
                [DeliveryStatus::Failed.to_string()],
                Self::row_to_notification,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn row_to_notification(row: &rusqlite::Row) -> rusqlite::Result<NotificationRecord> {
        let dispatched_at: String = row.get(4)?;
        let status: String = row.get(5)?;
        Ok(NotificationRecord {
            id: row.get(0)?,
            alert_id: row.get(1)?,
            recipient: row.get(2)?,
            message: row.get(3)?,
            dispatched_at: from_db_time(4, &dispatched_at)?,
            status: parse_text(5, &status)?,
        })
    }
}
