//! Offline sync reconciliation.
//!
//! Clients buffer operations while disconnected and submit them as a batch.
//! Each operation is decoded and applied on its own: a bad entry yields a
//! failed outcome at its index and the rest of the batch still applies.
//! The client timestamp of each operation becomes the event time of the
//! record it creates.
//!
//! Delivery is at-least-once unless [`SyncConfig::dedup_tokens`] is set, in
//! which case an operation whose idempotency token the same subject already
//! applied is reported as [`OutcomeStatus::AlreadyApplied`] and creates
//! nothing. A token whose first attempt has not settled yet fails with
//! [`ErrorKind::InvalidState`] so the client keeps the operation and retries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::alert::AlertManager;
use crate::config::SyncConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::evidence::{EvidenceKind, EvidenceLedger, PayloadHandle};
use crate::geofence::Coordinate;
use crate::report::{CrimeReports, ReportDraft};
use crate::storage::{Storage, TokenClaim};

/// One buffered client operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Operation type tag, e.g. `crime-report-create`.
    #[serde(rename = "type")]
    pub op_type: String,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: Value,
    /// Client-generated token identifying this operation across retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_token: Option<String>,
    /// When the client recorded the operation.
    pub client_timestamp: DateTime<Utc>,
}

/// Operation types the reconciler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// File a crime report.
    CrimeReportCreate,
    /// Raise an alert.
    AlertTrigger,
    /// Attach evidence to an alert.
    EvidenceAttach,
}

impl OperationType {
    /// Parse a wire tag, returning `None` for unknown types.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "crime-report-create" => Some(Self::CrimeReportCreate),
            "alert-trigger" => Some(Self::AlertTrigger),
            "evidence-attach" => Some(Self::EvidenceAttach),
            _ => None,
        }
    }

    /// The wire tag.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::CrimeReportCreate => "crime-report-create",
            Self::AlertTrigger => "alert-trigger",
            Self::EvidenceAttach => "evidence-attach",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrimeReportPayload {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    anonymous_id: Option<String>,
    #[serde(flatten)]
    draft: ReportDraft,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertTriggerPayload {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvidenceAttachPayload {
    alert_id: i64,
    kind: EvidenceKind,
    payload_handle: String,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    duration_seconds: Option<u32>,
}

/// What happened to one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Applied by this batch.
    Applied,
    /// Its token was applied by an earlier batch; nothing new was created.
    AlreadyApplied,
    /// Not applied; see the error.
    Failed,
}

/// Error detail for a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationError {
    /// Position of the operation in the submitted batch.
    pub index: usize,
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

/// Per-operation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    /// Position of the operation in the submitted batch.
    pub index: usize,
    /// Type tag as submitted.
    #[serde(rename = "type")]
    pub op_type: String,
    /// Outcome.
    pub status: OutcomeStatus,
    /// ID of the created record, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<i64>,
    /// Error detail when the operation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl OperationOutcome {
    /// Whether the client may discard this operation from its buffer.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.status != OutcomeStatus::Failed
    }
}

/// Result of applying a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// Operations applied now or previously.
    pub applied_count: usize,
    /// Operations that failed.
    pub failed_count: usize,
    /// One outcome per submitted operation, in submission order.
    pub outcomes: Vec<OperationOutcome>,
    /// The errors of the failed operations.
    pub per_operation_errors: Vec<OperationError>,
}

impl BatchResult {
    fn push(&mut self, outcome: OperationOutcome) {
        if outcome.is_settled() {
            self.applied_count += 1;
        } else {
            self.failed_count += 1;
        }
        if let Some(error) = &outcome.error {
            self.per_operation_errors.push(error.clone());
        }
        self.outcomes.push(outcome);
    }
}

/// Applies client batches against server state.
#[derive(Debug, Clone)]
pub struct SyncReconciler {
    storage: Arc<Storage>,
    alerts: AlertManager,
    evidence: EvidenceLedger,
    reports: CrimeReports,
    config: SyncConfig,
}

impl SyncReconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(
        storage: Arc<Storage>,
        alerts: AlertManager,
        evidence: EvidenceLedger,
        reports: CrimeReports,
        config: SyncConfig,
    ) -> Self {
        Self {
            storage,
            alerts,
            evidence,
            reports,
            config,
        }
    }

    /// Apply decoded operations on behalf of `subject_id`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] without applying anything if the batch
    /// exceeds the configured maximum size. Individual operation failures are
    /// reported in the result, never as an error.
    pub async fn apply_batch(
        &self,
        subject_id: i64,
        operations: Vec<SyncOperation>,
    ) -> Result<BatchResult> {
        self.check_batch_size(operations.len())?;

        let mut result = BatchResult::default();
        for (index, op) in operations.into_iter().enumerate() {
            result.push(self.apply_one(subject_id, index, &op).await);
        }
        Self::log_result(subject_id, &result);
        Ok(result)
    }

    /// Apply raw JSON entries, decoding each one independently.
    ///
    /// An entry that is not a valid operation envelope fails with
    /// [`ErrorKind::Rejected`] at its index; the rest still apply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] without applying anything if the batch
    /// exceeds the configured maximum size.
    pub async fn apply_raw_batch(
        &self,
        subject_id: i64,
        entries: Vec<Value>,
    ) -> Result<BatchResult> {
        self.check_batch_size(entries.len())?;

        let mut result = BatchResult::default();
        for (index, entry) in entries.into_iter().enumerate() {
            let tag = entry
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let outcome = match serde_json::from_value::<SyncOperation>(entry) {
                Ok(op) => self.apply_one(subject_id, index, &op).await,
                Err(e) => failed(index, tag.clone(), &Error::rejected(tag, e.to_string())),
            };
            result.push(outcome);
        }
        Self::log_result(subject_id, &result);
        Ok(result)
    }

    fn check_batch_size(&self, len: usize) -> Result<()> {
        if len > self.config.max_batch_size {
            return Err(Error::validation(format!(
                "batch of {len} operations exceeds the limit of {}",
                self.config.max_batch_size
            )));
        }
        Ok(())
    }

    fn log_result(subject_id: i64, result: &BatchResult) {
        info!(
            subject_id,
            applied = result.applied_count,
            failed = result.failed_count,
            "Sync batch reconciled"
        );
    }

    async fn apply_one(
        &self,
        subject_id: i64,
        index: usize,
        op: &SyncOperation,
    ) -> OperationOutcome {
        let Some(op_type) = OperationType::from_tag(&op.op_type) else {
            let err = Error::rejected(op.op_type.clone(), "unknown operation type");
            return failed(index, op.op_type.clone(), &err);
        };

        let token = op
            .idempotency_token
            .as_deref()
            .filter(|t| self.config.dedup_tokens && !t.is_empty());

        if let Some(token) = token {
            let now = Utc::now();
            let claim = self.storage.claim_sync_token(
                subject_id,
                token,
                op_type.tag(),
                now,
                self.stale_before(now),
            );
            match claim {
                Ok(TokenClaim::Claimed) => {}
                Ok(TokenClaim::Applied(record_id)) => {
                    debug!(index, token, "Skipping already applied operation");
                    return OperationOutcome {
                        index,
                        op_type: op.op_type.clone(),
                        status: OutcomeStatus::AlreadyApplied,
                        record_id: Some(record_id),
                        error: None,
                    };
                }
                Ok(TokenClaim::InFlight) => {
                    let err = Error::invalid_state(format!(
                        "operation with token {token} is still in progress"
                    ));
                    return failed(index, op.op_type.clone(), &err);
                }
                Err(e) => return failed(index, op.op_type.clone(), &e),
            }
        }

        let applied = self.apply_effect(subject_id, op_type, op).await;

        if let Some(token) = token {
            let settled = match &applied {
                Ok(record_id) => self.storage.complete_sync_token(subject_id, token, *record_id),
                Err(_) => self.storage.release_sync_token(subject_id, token),
            };
            if let Err(e) = settled {
                warn!(index, token, error = %e, "Failed to settle idempotency token");
            }
        }

        match applied {
            Ok(record_id) => OperationOutcome {
                index,
                op_type: op.op_type.clone(),
                status: OutcomeStatus::Applied,
                record_id: Some(record_id),
                error: None,
            },
            Err(e) => failed(index, op.op_type.clone(), &e),
        }
    }

    /// Claims made before this instant are abandoned and may be taken over.
    fn stale_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let timeout = std::time::Duration::from_secs(self.config.claim_timeout_secs);
        chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|timeout| now.checked_sub_signed(timeout))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    async fn apply_effect(
        &self,
        subject_id: i64,
        op_type: OperationType,
        op: &SyncOperation,
    ) -> Result<i64> {
        match op_type {
            OperationType::CrimeReportCreate => {
                let payload: CrimeReportPayload = decode(op)?;
                let location = Coordinate::new(payload.latitude, payload.longitude)?;
                let report = self.reports.record_synced(
                    payload.anonymous_id,
                    location,
                    payload.draft,
                    op.client_timestamp,
                )?;
                Ok(report.id)
            }
            OperationType::AlertTrigger => {
                let payload: AlertTriggerPayload = decode(op)?;
                let location = Coordinate::new(payload.latitude, payload.longitude)?;
                let alert = self
                    .alerts
                    .trigger_at(subject_id, location, payload.address, op.client_timestamp)
                    .await?;
                Ok(alert.id)
            }
            OperationType::EvidenceAttach => {
                let payload: EvidenceAttachPayload = decode(op)?;
                let location = match (payload.latitude, payload.longitude) {
                    (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)?),
                    (None, None) => None,
                    _ => {
                        return Err(Error::validation(
                            "latitude and longitude must be given together",
                        ))
                    }
                };
                let evidence = self.evidence.attach_at(
                    payload.alert_id,
                    payload.kind,
                    PayloadHandle::new(payload.payload_handle)?,
                    location,
                    payload.duration_seconds,
                    op.client_timestamp,
                )?;
                Ok(evidence.id)
            }
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(op: &SyncOperation) -> Result<T> {
    T::deserialize(&op.payload).map_err(|e| Error::rejected(op.op_type.clone(), e.to_string()))
}

fn failed(index: usize, op_type: String, err: &Error) -> OperationOutcome {
    warn!(index, op_type = %op_type, error = %err, "Sync operation failed");
    OperationOutcome {
        index,
        op_type,
        status: OutcomeStatus::Failed,
        record_id: None,
        error: Some(OperationError {
            index,
            kind: err.kind(),
            message: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{MemoryDispatcher, Notifier};
    use crate::subject::{Role, Subject};
    use chrono::TimeZone;
    use serde_json::json;

    struct Fixture {
        storage: Arc<Storage>,
        dispatcher: Arc<MemoryDispatcher>,
        reconciler: SyncReconciler,
    }

    fn fixture(config: SyncConfig) -> Fixture {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        for (id, name, contact) in [
            (5, "Kavya", "+919900000001"),
            (6, "Meera", "+919900000002"),
        ] {
            storage
                .upsert_subject(&Subject {
                    id,
                    name: name.to_string(),
                    phone: None,
                    role: Role::Citizen,
                    emergency_contacts: vec![contact.to_string()],
                })
                .unwrap();
        }
        let dispatcher = Arc::new(MemoryDispatcher::new());
        let notifier = Notifier::new(storage.clone(), dispatcher.clone(), "Suraksha 360");
        let reconciler = SyncReconciler::new(
            storage.clone(),
            AlertManager::new(storage.clone(), notifier),
            EvidenceLedger::new(storage.clone()),
            CrimeReports::new(storage.clone()),
            config,
        );
        Fixture {
            storage,
            dispatcher,
            reconciler,
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 23, 45, 0).unwrap()
    }

    fn op(op_type: &str, payload: Value) -> SyncOperation {
        SyncOperation {
            op_type: op_type.to_string(),
            payload,
            idempotency_token: None,
            client_timestamp: at(),
        }
    }

    fn report_op() -> SyncOperation {
        op(
            "crime-report-create",
            json!({"latitude": 12.97, "longitude": 77.59, "crimeType": "theft"}),
        )
    }

    #[test]
    fn test_operation_type_tags() {
        for t in [
            OperationType::CrimeReportCreate,
            OperationType::AlertTrigger,
            OperationType::EvidenceAttach,
        ] {
            assert_eq!(OperationType::from_tag(t.tag()), Some(t));
        }
        assert_eq!(OperationType::from_tag("zone-create"), None);
    }

    #[tokio::test]
    async fn test_unknown_type_is_rejected_and_batch_continues() {
        let f = fixture(SyncConfig::default());
        let ops = vec![report_op(), op("teleport", json!({})), report_op()];

        let result = f.reconciler.apply_batch(5, ops).await.unwrap();
        assert_eq!(result.applied_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.outcomes[1].status, OutcomeStatus::Failed);
        assert_eq!(result.per_operation_errors.len(), 1);
        assert_eq!(result.per_operation_errors[0].index, 1);
        assert_eq!(result.per_operation_errors[0].kind, ErrorKind::Rejected);
        assert_eq!(f.storage.list_reports(10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_rejected() {
        let f = fixture(SyncConfig::default());
        let ops = vec![op("crime-report-create", json!({"latitude": "north"}))];

        let result = f.reconciler.apply_batch(5, ops).await.unwrap();
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.per_operation_errors[0].kind, ErrorKind::Rejected);
    }

    #[tokio::test]
    async fn test_out_of_range_coordinate_is_validation() {
        let f = fixture(SyncConfig::default());
        let ops = vec![op("alert-trigger", json!({"latitude": 91.0, "longitude": 0.0}))];

        let result = f.reconciler.apply_batch(5, ops).await.unwrap();
        assert_eq!(result.per_operation_errors[0].kind, ErrorKind::Validation);
        assert!(f.storage.list_alerts(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_client_timestamp_becomes_event_time() {
        let f = fixture(SyncConfig::default());
        let ops = vec![
            report_op(),
            op(
                "alert-trigger",
                json!({"latitude": 12.97, "longitude": 77.59, "address": "Indiranagar"}),
            ),
        ];

        let result = f.reconciler.apply_batch(5, ops).await.unwrap();
        assert_eq!(result.applied_count, 2);

        let report_id = result.outcomes[0].record_id.unwrap();
        let report = f.storage.get_report(report_id).unwrap().unwrap();
        assert_eq!(report.reported_at, at());
        assert!(report.synced);
        assert_eq!(report.crime_type, "theft");

        let alert_id = result.outcomes[1].record_id.unwrap();
        let alert = f.storage.get_alert(alert_id).unwrap().unwrap();
        assert_eq!(alert.triggered_at, at());
        assert_eq!(f.dispatcher.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_evidence_attach_for_missing_alert_is_not_found() {
        let f = fixture(SyncConfig::default());
        let ops = vec![op(
            "evidence-attach",
            json!({"alertId": 77, "kind": "audio", "payloadHandle": "blake3:00"}),
        )];

        let result = f.reconciler.apply_batch(5, ops).await.unwrap();
        assert_eq!(result.per_operation_errors[0].kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_evidence_attach_uses_capture_time() {
        let f = fixture(SyncConfig::default());
        let first = f
            .reconciler
            .apply_batch(
                5,
                vec![op("alert-trigger", json!({"latitude": 1.0, "longitude": 1.0}))],
            )
            .await
            .unwrap();
        let alert_id = first.outcomes[0].record_id.unwrap();

        let result = f
            .reconciler
            .apply_batch(
                5,
                vec![op(
                    "evidence-attach",
                    json!({
                        "alertId": alert_id,
                        "kind": "video",
                        "payloadHandle": "blake3:ff",
                        "durationSeconds": 45
                    }),
                )],
            )
            .await
            .unwrap();
        assert_eq!(result.applied_count, 1);

        let evidence = f.storage.list_evidence(alert_id).unwrap();
        assert_eq!(evidence[0].captured_at, at());
        assert_eq!(evidence[0].kind, EvidenceKind::Video);
    }

    #[tokio::test]
    async fn test_replay_without_dedup_applies_twice() {
        let f = fixture(SyncConfig::default());
        let mut op = report_op();
        op.idempotency_token = Some("tok".to_string());

        f.reconciler.apply_batch(5, vec![op.clone()]).await.unwrap();
        f.reconciler.apply_batch(5, vec![op]).await.unwrap();
        assert_eq!(f.storage.list_reports(10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replay_with_dedup_is_already_applied() {
        let f = fixture(SyncConfig {
            dedup_tokens: true,
            ..SyncConfig::default()
        });
        let mut op = report_op();
        op.idempotency_token = Some("tok".to_string());

        let first = f.reconciler.apply_batch(5, vec![op.clone()]).await.unwrap();
        let second = f.reconciler.apply_batch(5, vec![op]).await.unwrap();

        assert_eq!(first.outcomes[0].status, OutcomeStatus::Applied);
        assert_eq!(second.outcomes[0].status, OutcomeStatus::AlreadyApplied);
        assert_eq!(second.outcomes[0].record_id, first.outcomes[0].record_id);
        assert_eq!(second.applied_count, 1);
        assert_eq!(f.storage.list_reports(10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_operation_releases_token() {
        let f = fixture(SyncConfig {
            dedup_tokens: true,
            ..SyncConfig::default()
        });
        let mut bad = op(
            "evidence-attach",
            json!({"alertId": 1, "kind": "audio", "payloadHandle": "h"}),
        );
        bad.idempotency_token = Some("retry-me".to_string());

        let first = f.reconciler.apply_batch(5, vec![bad.clone()]).await.unwrap();
        assert_eq!(first.failed_count, 1);

        f.reconciler
            .apply_batch(
                5,
                vec![op("alert-trigger", json!({"latitude": 1.0, "longitude": 1.0}))],
            )
            .await
            .unwrap();
        let second = f.reconciler.apply_batch(5, vec![bad]).await.unwrap();
        assert_eq!(second.outcomes[0].status, OutcomeStatus::Applied);
    }

    fn dedup() -> SyncConfig {
        SyncConfig {
            dedup_tokens: true,
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn test_same_token_from_two_subjects_applies_for_both() {
        let f = fixture(dedup());
        let mut trigger = op("alert-trigger", json!({"latitude": 12.97, "longitude": 77.59}));
        trigger.idempotency_token = Some("1".to_string());

        let first = f.reconciler.apply_batch(5, vec![trigger.clone()]).await.unwrap();
        let second = f.reconciler.apply_batch(6, vec![trigger]).await.unwrap();

        assert_eq!(first.outcomes[0].status, OutcomeStatus::Applied);
        assert_eq!(second.outcomes[0].status, OutcomeStatus::Applied);
        assert_ne!(first.outcomes[0].record_id, second.outcomes[0].record_id);

        let alerts = f.storage.list_alerts(None).unwrap();
        assert_eq!(alerts.len(), 2);
        let mut subjects: Vec<_> = alerts.iter().map(|a| a.subject_id).collect();
        subjects.sort_unstable();
        assert_eq!(subjects, vec![5, 6]);
    }

    #[tokio::test]
    async fn test_retry_during_unsettled_claim_is_not_settled() {
        let f = fixture(dedup());
        let mut report = report_op();
        report.idempotency_token = Some("tok-x".to_string());

        // A first attempt holds the claim and later fails
        let now = Utc::now();
        f.storage
            .claim_sync_token(5, "tok-x", "crime-report-create", now, now)
            .unwrap();

        let retry = f.reconciler.apply_batch(5, vec![report.clone()]).await.unwrap();
        let outcome = &retry.outcomes[0];
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(!outcome.is_settled());
        assert_eq!(retry.failed_count, 1);
        assert_eq!(retry.per_operation_errors[0].kind, ErrorKind::InvalidState);

        f.storage.release_sync_token(5, "tok-x").unwrap();
        assert!(f.storage.list_reports(10).unwrap().is_empty());

        let again = f.reconciler.apply_batch(5, vec![report]).await.unwrap();
        assert_eq!(again.outcomes[0].status, OutcomeStatus::Applied);
        assert_eq!(f.storage.list_reports(10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_claim_is_taken_over_after_timeout() {
        let f = fixture(dedup());
        let mut report = report_op();
        report.idempotency_token = Some("tok-crashed".to_string());

        // Claimed by an attempt that never completed or released
        let long_ago = Utc::now() - chrono::Duration::hours(2);
        f.storage
            .claim_sync_token(5, "tok-crashed", "crime-report-create", long_ago, long_ago)
            .unwrap();

        let result = f.reconciler.apply_batch(5, vec![report.clone()]).await.unwrap();
        assert_eq!(result.outcomes[0].status, OutcomeStatus::Applied);
        let record_id = result.outcomes[0].record_id;

        let replay = f.reconciler.apply_batch(5, vec![report]).await.unwrap();
        assert_eq!(replay.outcomes[0].status, OutcomeStatus::AlreadyApplied);
        assert_eq!(replay.outcomes[0].record_id, record_id);
        assert_eq!(f.storage.list_reports(10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected_whole() {
        let f = fixture(SyncConfig {
            max_batch_size: 2,
            ..SyncConfig::default()
        });
        let ops = vec![report_op(), report_op(), report_op()];

        let err = f.reconciler.apply_batch(5, ops).await.unwrap_err();
        assert!(err.is_validation());
        assert!(f.storage.list_reports(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_raw_batch_rejects_undecodable_envelope() {
        let f = fixture(SyncConfig::default());
        let entries = vec![
            serde_json::to_value(report_op()).unwrap(),
            json!({"type": "alert-trigger", "payload": {}}),
            json!("not an object"),
            serde_json::to_value(report_op()).unwrap(),
        ];

        let result = f.reconciler.apply_raw_batch(5, entries).await.unwrap();
        assert_eq!(result.applied_count, 2);
        assert_eq!(result.failed_count, 2);
        assert_eq!(result.outcomes[1].op_type, "alert-trigger");
        assert_eq!(result.outcomes[2].op_type, "unknown");
        assert!(result
            .per_operation_errors
            .iter()
            .all(|e| e.kind == ErrorKind::Rejected));
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let parsed: SyncOperation = serde_json::from_value(json!({
            "type": "alert-trigger",
            "payload": {"latitude": 1.0, "longitude": 2.0},
            "idempotencyToken": "abc",
            "clientTimestamp": "2024-05-20T23:45:00Z"
        }))
        .unwrap();
        assert_eq!(parsed.op_type, "alert-trigger");
        assert_eq!(parsed.client_timestamp, at());

        let mut result = BatchResult::default();
        result.push(failed(0, "x".to_string(), &Error::rejected("x", "nope")));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["appliedCount"], 0);
        assert_eq!(value["failedCount"], 1);
        assert_eq!(value["perOperationErrors"][0]["kind"], "rejected");
    }
}
