//! Alert lifecycle.
//!
//! An alert is created `Active` by [`AlertManager::trigger`] and moves to
//! `Resolved` exactly once. Resolution is a compare-and-set in storage, so
//! concurrent resolvers cannot both succeed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::evidence::Evidence;
use crate::geofence::{self, Coordinate};
use crate::notify::{NotificationRecord, Notifier};
use crate::storage::{ResolveOutcome, Storage};

/// Lifecycle status of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Awaiting response.
    Active,
    /// Closed by an operator. Terminal.
    Resolved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "resolved" => Ok(Self::Resolved),
            other => Err(Error::validation(format!("unknown alert status: {other}"))),
        }
    }
}

/// Who closed an alert, when, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// When the alert was resolved.
    pub resolved_at: DateTime<Utc>,
    /// Subject that resolved it.
    pub resolved_by: i64,
    /// Free-text notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// An emergency alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Storage-assigned identifier.
    pub id: i64,
    /// Subject that raised the alert.
    pub subject_id: i64,
    /// Opaque identifier safe to share with third parties.
    pub correlation_id: String,
    /// Where the alert was raised.
    pub location: Coordinate,
    /// Human-readable address, if the client resolved one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// First active zone containing the location at trigger time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<i64>,
    /// Lifecycle status.
    pub status: AlertStatus,
    /// When the alert was raised.
    pub triggered_at: DateTime<Utc>,
    /// Set once the alert is resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

impl Alert {
    /// Whether the alert still awaits resolution.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

/// An alert to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    /// Subject that raised the alert.
    pub subject_id: i64,
    /// Opaque correlation identifier.
    pub correlation_id: String,
    /// Where the alert was raised.
    pub location: Coordinate,
    /// Optional address.
    pub address: Option<String>,
    /// Containing zone, if any.
    pub zone_id: Option<i64>,
    /// Event time.
    pub triggered_at: DateTime<Utc>,
}

/// An alert with everything attached to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDetail {
    /// The alert itself.
    pub alert: Alert,
    /// Name of the tagged zone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,
    /// Evidence in capture order.
    pub evidence: Vec<Evidence>,
    /// Notification attempts in dispatch order.
    pub notifications: Vec<NotificationRecord>,
}

/// Drives alerts through their lifecycle.
#[derive(Debug, Clone)]
pub struct AlertManager {
    storage: Arc<Storage>,
    notifier: Notifier,
}

impl AlertManager {
    /// Create a manager over shared storage.
    #[must_use]
    pub fn new(storage: Arc<Storage>, notifier: Notifier) -> Self {
        Self { storage, notifier }
    }

    /// Raise an alert now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the subject is unknown, or a storage
    /// error if the alert cannot be persisted.
    pub async fn trigger(
        &self,
        subject_id: i64,
        location: Coordinate,
        address: Option<String>,
    ) -> Result<Alert> {
        self.trigger_at(subject_id, location, address, Utc::now())
            .await
    }

    /// Raise an alert with an explicit event time.
    ///
    /// Used when replaying alerts recorded offline. Tags the first active zone
    /// containing `location`, persists the alert, then notifies each of the
    /// subject's emergency contacts before returning. Notification failures are
    /// recorded and never fail the trigger.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the subject is unknown, or a storage
    /// error if the alert cannot be persisted.
    pub async fn trigger_at(
        &self,
        subject_id: i64,
        location: Coordinate,
        address: Option<String>,
        triggered_at: DateTime<Utc>,
    ) -> Result<Alert> {
        let subject = self
            .storage
            .get_subject(subject_id)?
            .ok_or_else(|| Error::validation(format!("unknown subject {subject_id}")))?;

        let zone_id = match self.storage.list_active_zones() {
            Ok(zones) => geofence::find_containing(&location, &zones).map(|z| z.id),
            Err(e) => {
                warn!(subject_id, error = %e, "Zone lookup failed, alert left untagged");
                None
            }
        };

        let alert = self.storage.insert_alert(&NewAlert {
            subject_id,
            correlation_id: Uuid::new_v4().to_string(),
            location,
            address,
            zone_id,
            triggered_at,
        })?;
        info!(
            alert_id = alert.id,
            subject_id,
            zone_id = ?alert.zone_id,
            "Alert triggered"
        );

        self.notifier
            .fan_out(&alert, &subject.emergency_contacts)
            .await;
        Ok(alert)
    }

    /// Resolve an active alert.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the alert does not exist and
    /// [`Error::InvalidState`] if it was already resolved; in that case the
    /// first resolution is left untouched.
    pub fn resolve(&self, alert_id: i64, resolver_id: i64, notes: Option<&str>) -> Result<Alert> {
        match self
            .storage
            .resolve_alert(alert_id, resolver_id, notes, Utc::now())?
        {
            ResolveOutcome::Resolved => {
                info!(alert_id, resolver_id, "Alert resolved");
                self.get(alert_id)
            }
            ResolveOutcome::AlreadyResolved => Err(Error::invalid_state(format!(
                "alert {alert_id} is already resolved"
            ))),
            ResolveOutcome::Missing => Err(Error::not_found("alert", alert_id)),
        }
    }

    /// Fetch an alert.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the alert does not exist.
    pub fn get(&self, alert_id: i64) -> Result<Alert> {
        self.storage
            .get_alert(alert_id)?
            .ok_or_else(|| Error::not_found("alert", alert_id))
    }

    /// Fetch an alert together with its zone, evidence and notifications.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the alert does not exist.
    pub fn detail(&self, alert_id: i64) -> Result<AlertDetail> {
        let alert = self.get(alert_id)?;
        let zone_name = match alert.zone_id {
            Some(zone_id) => self.storage.get_zone(zone_id)?.map(|z| z.name),
            None => None,
        };
        Ok(AlertDetail {
            evidence: self.storage.list_evidence(alert_id)?,
            notifications: self.storage.list_notifications(alert_id)?,
            zone_name,
            alert,
        })
    }

    /// Active alerts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_active(&self) -> Result<Vec<Alert>> {
        self.storage.list_alerts(Some(AlertStatus::Active))
    }

    /// All alerts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_all(&self) -> Result<Vec<Alert>> {
        self.storage.list_alerts(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{DeliveryStatus, MemoryDispatcher};
    use crate::subject::{Role, Subject};
    use crate::zone::{RiskLevel, ZoneSpec};

    struct Fixture {
        storage: Arc<Storage>,
        dispatcher: Arc<MemoryDispatcher>,
        manager: AlertManager,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let dispatcher = Arc::new(MemoryDispatcher::new());
        let notifier = Notifier::new(storage.clone(), dispatcher.clone(), "Suraksha 360");
        storage
            .upsert_subject(&Subject {
                id: 1,
                name: "Meera".to_string(),
                phone: None,
                role: Role::Citizen,
                emergency_contacts: vec!["+911111111".to_string(), "+922222222".to_string()],
            })
            .unwrap();
        Fixture {
            manager: AlertManager::new(storage.clone(), notifier),
            storage,
            dispatcher,
        }
    }

    fn here() -> Coordinate {
        Coordinate::new(12.9750, 77.5950).unwrap()
    }

    #[tokio::test]
    async fn test_trigger_creates_active_alert_and_notifies() {
        let f = fixture();
        let alert = f.manager.trigger(1, here(), None).await.unwrap();

        assert!(alert.is_active());
        assert!(alert.resolution.is_none());
        assert!(Uuid::parse_str(&alert.correlation_id).is_ok());
        assert_eq!(f.dispatcher.sent().len(), 2);
        assert_eq!(f.storage.list_notifications(alert.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_trigger_unknown_subject_is_validation() {
        let f = fixture();
        let err = f.manager.trigger(99, here(), None).await.unwrap_err();
        assert!(err.is_validation());
        assert!(f.manager.list_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_tags_containing_zone() {
        let f = fixture();
        let zone = f
            .storage
            .insert_zone(
                &ZoneSpec {
                    name: "Majestic".to_string(),
                    center: Coordinate::new(12.9716, 77.5946).unwrap(),
                    radius_km: 2.0,
                    risk_level: RiskLevel::High,
                    description: None,
                },
                None,
                Utc::now(),
            )
            .unwrap();

        let inside = f.manager.trigger(1, here(), None).await.unwrap();
        assert_eq!(inside.zone_id, Some(zone.id));

        let outside = f
            .manager
            .trigger(1, Coordinate::new(13.05, 77.60).unwrap(), None)
            .await
            .unwrap();
        assert_eq!(outside.zone_id, None);

        let detail = f.manager.detail(inside.id).unwrap();
        assert_eq!(detail.zone_name.as_deref(), Some("Majestic"));
    }

    #[tokio::test]
    async fn test_dispatch_failure_does_not_fail_trigger() {
        let f = fixture();
        f.dispatcher.fail_for("+911111111");
        f.dispatcher.fail_for("+922222222");

        let alert = f.manager.trigger(1, here(), None).await.unwrap();
        let records = f.storage.list_notifications(alert.id).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status == DeliveryStatus::Failed));
        assert!(f.manager.get(alert.id).unwrap().is_active());
    }

    #[tokio::test]
    async fn test_resolve_then_resolve_again() {
        let f = fixture();
        let alert = f.manager.trigger(1, here(), None).await.unwrap();

        let resolved = f.manager.resolve(alert.id, 50, Some("safe")).unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        let first = resolved.resolution.clone().unwrap();
        assert_eq!(first.resolved_by, 50);

        let err = f.manager.resolve(alert.id, 51, Some("again")).unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(f.manager.get(alert.id).unwrap().resolution, Some(first));
    }

    #[tokio::test]
    async fn test_resolve_missing_alert() {
        let f = fixture();
        assert!(f.manager.resolve(404, 1, None).unwrap_err().is_not_found());
        assert!(f.manager.get(404).unwrap_err().is_not_found());
        assert!(f.manager.detail(404).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_active_excludes_resolved() {
        let f = fixture();
        let a = f.manager.trigger(1, here(), None).await.unwrap();
        let b = f.manager.trigger(1, here(), None).await.unwrap();
        f.manager.resolve(a.id, 2, None).unwrap();

        let active: Vec<i64> = f.manager.list_active().unwrap().iter().map(|x| x.id).collect();
        assert_eq!(active, vec![b.id]);
        assert_eq!(f.manager.list_all().unwrap().len(), 2);
    }

    #[test]
    fn test_alert_status_strings() {
        assert_eq!(AlertStatus::Resolved.to_string(), "resolved");
        assert_eq!("active".parse::<AlertStatus>().unwrap(), AlertStatus::Active);
        assert!("closed".parse::<AlertStatus>().is_err());
    }
}
