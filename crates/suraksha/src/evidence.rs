//! Evidence ledger.
//!
//! Media captured during an emergency is stored elsewhere (see
//! [`crate::blob`]); the ledger keeps the handle plus capture metadata.
//! Evidence can be attached while the alert is active and after it is
//! resolved. Records are never updated or deleted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::geofence::Coordinate;
use crate::storage::Storage;

/// Media kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// Audio recording.
    Audio,
    /// Video recording.
    Video,
}

impl std::fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

impl std::str::FromStr for EvidenceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(Error::validation(format!("unknown evidence kind: {other}"))),
        }
    }
}

/// Opaque reference to a stored media payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PayloadHandle(String);

impl PayloadHandle {
    /// Wrap a handle returned by a blob store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the handle is blank.
    pub fn new(handle: impl Into<String>) -> Result<Self> {
        let handle = handle.into();
        if handle.trim().is_empty() {
            return Err(Error::validation("payload handle must not be empty"));
        }
        Ok(Self(handle))
    }

    /// The handle as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PayloadHandle {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<PayloadHandle> for String {
    fn from(handle: PayloadHandle) -> Self {
        handle.0
    }
}

impl std::str::FromStr for PayloadHandle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl std::fmt::Display for PayloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A media record attached to an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Storage-assigned identifier.
    pub id: i64,
    /// Alert this evidence belongs to.
    pub alert_id: i64,
    /// Media kind.
    pub kind: EvidenceKind,
    /// Where the payload is stored.
    pub payload_handle: PayloadHandle,
    /// Where the media was captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Coordinate>,
    /// Recording length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    /// When the media was captured.
    pub captured_at: DateTime<Utc>,
}

/// An evidence record to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvidence {
    /// Alert this evidence belongs to.
    pub alert_id: i64,
    /// Media kind.
    pub kind: EvidenceKind,
    /// Where the payload is stored.
    pub payload_handle: PayloadHandle,
    /// Capture location.
    pub location: Option<Coordinate>,
    /// Recording length.
    pub duration_seconds: Option<u32>,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
}

/// Append-only store of evidence per alert.
#[derive(Debug, Clone)]
pub struct EvidenceLedger {
    storage: Arc<Storage>,
}

impl EvidenceLedger {
    /// Create a ledger over shared storage.
    #[must_use]
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Attach evidence captured now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the alert does not exist.
    pub fn attach(
        &self,
        alert_id: i64,
        kind: EvidenceKind,
        payload_handle: PayloadHandle,
        location: Option<Coordinate>,
        duration_seconds: Option<u32>,
    ) -> Result<Evidence> {
        self.attach_at(
            alert_id,
            kind,
            payload_handle,
            location,
            duration_seconds,
            Utc::now(),
        )
    }

    /// Attach evidence with an explicit capture time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the alert does not exist.
    pub fn attach_at(
        &self,
        alert_id: i64,
        kind: EvidenceKind,
        payload_handle: PayloadHandle,
        location: Option<Coordinate>,
        duration_seconds: Option<u32>,
        captured_at: DateTime<Utc>,
    ) -> Result<Evidence> {
        if !self.storage.alert_exists(alert_id)? {
            return Err(Error::not_found("alert", alert_id));
        }

        let evidence = self.storage.insert_evidence(&NewEvidence {
            alert_id,
            kind,
            payload_handle,
            location,
            duration_seconds,
            captured_at,
        })?;
        info!(
            evidence_id = evidence.id,
            alert_id,
            kind = %kind,
            "Evidence attached"
        );
        Ok(evidence)
    }

    /// Fetch one evidence record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the evidence does not exist.
    pub fn get(&self, id: i64) -> Result<Evidence> {
        self.storage
            .get_evidence(id)?
            .ok_or_else(|| Error::not_found("evidence", id))
    }

    /// Evidence for an alert, oldest capture first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the alert does not exist.
    pub fn list_for_alert(&self, alert_id: i64) -> Result<Vec<Evidence>> {
        if !self.storage.alert_exists(alert_id)? {
            return Err(Error::not_found("alert", alert_id));
        }
        self.storage.list_evidence(alert_id)
    }
}
