//! Notification fan-out.
//!
//! The core renders one message per alert, hands it to a
//! [`NotificationDispatcher`] once per recipient, and records every attempt.
//! Nothing is retried here; failed records are listed for an outer layer.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::alert::Alert;
use crate::error::{Error, Result};
use crate::storage::Storage;

/// Delivery outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The dispatcher accepted the message.
    Sent,
    /// The dispatcher reported a failure.
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(Error::validation(format!("unknown delivery status: {other}"))),
        }
    }
}

/// A persisted delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Storage-assigned identifier.
    pub id: i64,
    /// Alert the message was about.
    pub alert_id: i64,
    /// Recipient address.
    pub recipient: String,
    /// Rendered message body.
    pub message: String,
    /// When the dispatcher was called.
    pub dispatched_at: DateTime<Utc>,
    /// Outcome.
    pub status: DeliveryStatus,
}

/// A delivery attempt to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    /// Alert the message was about.
    pub alert_id: i64,
    /// Recipient address.
    pub recipient: String,
    /// Rendered message body.
    pub message: String,
    /// When the dispatcher was called.
    pub dispatched_at: DateTime<Utc>,
    /// Outcome.
    pub status: DeliveryStatus,
}

/// Transport that delivers a rendered message to one recipient.
///
/// Implementations talk to an SMS gateway, push service, or similar.
#[async_trait::async_trait]
pub trait NotificationDispatcher: Send + Sync + std::fmt::Debug {
    /// Name of this transport (for logging).
    fn name(&self) -> &'static str;

    /// Deliver `message` to `recipient`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dependency`] if the transport could not deliver.
    async fn dispatch(&self, alert_id: i64, recipient: &str, message: &str) -> Result<()>;
}

/// Dispatcher that only writes the message to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait::async_trait]
impl NotificationDispatcher for LogDispatcher {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn dispatch(&self, alert_id: i64, recipient: &str, message: &str) -> Result<()> {
        info!(alert_id, recipient, message, "SMS dispatched");
        Ok(())
    }
}

/// A message captured by [`MemoryDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Alert the message was about.
    pub alert_id: i64,
    /// Recipient address.
    pub recipient: String,
    /// Message body.
    pub message: String,
}

/// In-memory dispatcher for tests and dry runs.
///
/// Records every call and fails for recipients registered with
/// [`MemoryDispatcher::fail_for`].
#[derive(Debug, Default)]
pub struct MemoryDispatcher {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future dispatch to `recipient` fail.
    pub fn fail_for(&self, recipient: impl Into<String>) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(recipient.into());
        }
    }

    /// Messages dispatched so far, failed ones included.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl NotificationDispatcher for MemoryDispatcher {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn dispatch(&self, alert_id: i64, recipient: &str, message: &str) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| Error::internal("memory dispatcher mutex poisoned"))?
            .push(SentMessage {
                alert_id,
                recipient: recipient.to_string(),
                message: message.to_string(),
            });

        let fails = self
            .failing
            .lock()
            .map_err(|_| Error::internal("memory dispatcher mutex poisoned"))?
            .contains(recipient);
        if fails {
            return Err(Error::dependency("notification", format!("{recipient} unreachable")));
        }
        Ok(())
    }
}

/// Render the emergency message for an alert.
#[must_use]
pub fn render_message(alert: &Alert, signature: &str) -> String {
    let location = alert
        .address
        .clone()
        .unwrap_or_else(|| alert.location.to_string());
    format!(
        "EMERGENCY ALERT: Your registered contact is in danger. \
         Last known location: {location}. Time: {}. - {signature}",
        alert.triggered_at.format("%d %b %Y %H:%M:%S UTC")
    )
}

/// Fans an alert out to its recipients and records each attempt.
#[derive(Debug, Clone)]
pub struct Notifier {
    storage: Arc<Storage>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    signature: String,
}

impl Notifier {
    /// Create a notifier.
    #[must_use]
    pub fn new(
        storage: Arc<Storage>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            dispatcher,
            signature: signature.into(),
        }
    }

    /// Dispatch the alert message to every recipient in order.
    ///
    /// Never fails: dispatch errors become [`DeliveryStatus::Failed`] records
    /// and storage errors while recording are logged and skipped. Returns the
    /// records that were persisted.
    pub async fn fan_out(&self, alert: &Alert, recipients: &[String]) -> Vec<NotificationRecord> {
        let message = render_message(alert, &self.signature);
        let mut records = Vec::with_capacity(recipients.len());

        for recipient in recipients {
            let dispatched_at = Utc::now();
            let status = match self
                .dispatcher
                .dispatch(alert.id, recipient, &message)
                .await
            {
                Ok(()) => DeliveryStatus::Sent,
                Err(e) => {
                    warn!(
                        alert_id = alert.id,
                        recipient = %recipient,
                        dispatcher = self.dispatcher.name(),
                        error = %e,
                        "Notification dispatch failed"
                    );
                    DeliveryStatus::Failed
                }
            };

            let attempt = NewNotification {
                alert_id: alert.id,
                recipient: recipient.clone(),
                message: message.clone(),
                dispatched_at,
                status,
            };
            match self.storage.insert_notification(&attempt) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    alert_id = alert.id,
                    recipient = %recipient,
                    error = %e,
                    "Failed to record notification attempt"
                ),
            }
        }

        info!(
            alert_id = alert.id,
            recipients = recipients.len(),
            failed = records
                .iter()
                .filter(|r| r.status == DeliveryStatus::Failed)
                .count(),
            "Alert fan-out complete"
        );
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::NewAlert;
    use crate::geofence::Coordinate;
    use chrono::TimeZone;

    fn stored_alert(storage: &Storage, address: Option<&str>) -> Alert {
        storage
            .insert_alert(&NewAlert {
                subject_id: 3,
                correlation_id: uuid::Uuid::new_v4().to_string(),
                location: Coordinate::new(12.9716, 77.5946).unwrap(),
                address: address.map(ToString::to_string),
                zone_id: None,
                triggered_at: Utc.with_ymd_and_hms(2024, 6, 1, 18, 30, 5).unwrap(),
            })
            .unwrap()
    }

    #[test]
    fn test_delivery_status_strings() {
        assert_eq!(DeliveryStatus::Sent.to_string(), "sent");
        assert_eq!("failed".parse::<DeliveryStatus>().unwrap(), DeliveryStatus::Failed);
        assert!("lost".parse::<DeliveryStatus>().is_err());
    }

    #[test]
    fn test_render_message_prefers_address() {
        let storage = Storage::open_in_memory().unwrap();
        let alert = stored_alert(&storage, Some("Brigade Road"));
        let message = render_message(&alert, "Suraksha 360");
        assert!(message.starts_with("EMERGENCY ALERT"));
        assert!(message.contains("Last known location: Brigade Road."));
        assert!(message.contains("01 Jun 2024 18:30:05 UTC"));
        assert!(message.ends_with("- Suraksha 360"));
    }

    #[test]
    fn test_render_message_falls_back_to_coordinates() {
        let storage = Storage::open_in_memory().unwrap();
        let alert = stored_alert(&storage, None);
        let message = render_message(&alert, "S");
        assert!(message.contains("Last known location: 12.9716, 77.5946."));
    }

    #[tokio::test]
    async fn test_fan_out_records_every_attempt() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let dispatcher = Arc::new(MemoryDispatcher::new());
        dispatcher.fail_for("+912");
        let notifier = Notifier::new(storage.clone(), dispatcher.clone(), "Suraksha 360");

        let alert = stored_alert(&storage, None);
        let recipients = vec!["+911".to_string(), "+912".to_string()];
        let records = notifier.fan_out(&alert, &recipients).await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, DeliveryStatus::Sent);
        assert_eq!(records[1].status, DeliveryStatus::Failed);
        assert_eq!(dispatcher.sent().len(), 2);
        assert_eq!(storage.list_notifications(alert.id).unwrap(), records);
    }

    #[tokio::test]
    async fn test_fan_out_with_no_recipients() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let notifier = Notifier::new(storage.clone(), Arc::new(LogDispatcher), "S");
        let alert = stored_alert(&storage, None);
        assert!(notifier.fan_out(&alert, &[]).await.is_empty());
    }
}
