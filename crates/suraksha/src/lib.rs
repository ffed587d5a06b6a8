//! `suraksha` - Emergency-alert lifecycle and offline sync engine
//!
//! This library decides whether a location falls inside a geofenced risk
//! zone, drives SOS alerts from trigger to resolution while notifying
//! emergency contacts and collecting evidence, and reconciles operations
//! that clients recorded while offline.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod alert;
pub mod blob;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod geofence;
pub mod logging;
pub mod notify;
pub mod report;
pub mod storage;
pub mod subject;
pub mod sync;
pub mod zone;

pub use alert::{Alert, AlertDetail, AlertManager, AlertStatus, Resolution};
pub use blob::{BlobStore, FsBlobStore};
pub use config::Config;
pub use engine::Engine;
pub use error::{Error, ErrorKind, Result};
pub use evidence::{Evidence, EvidenceKind, EvidenceLedger, PayloadHandle};
pub use geofence::{contains, find_containing, haversine_km, Coordinate};
pub use logging::init_logging;
pub use notify::{
    DeliveryStatus, LogDispatcher, MemoryDispatcher, NotificationDispatcher, NotificationRecord,
    Notifier,
};
pub use report::{CrimeReport, CrimeReports, ReportDraft};
pub use storage::Storage;
pub use subject::{Role, Subject, SubjectDirectory};
pub use sync::{BatchResult, OperationOutcome, OutcomeStatus, SyncOperation, SyncReconciler};
pub use zone::{RiskLevel, RiskZone, ZoneRegistry, ZoneSpec, ZoneState};
