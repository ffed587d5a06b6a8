//! Error types for suraksha.
//!
//! This module defines all error types used throughout the suraksha crate.
//! Domain errors (validation, not-found, invalid-state, rejected, dependency)
//! are request-scoped; storage and configuration errors wrap their sources.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for suraksha operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Domain Errors ===
    /// Malformed or out-of-range input. The caller must fix and retry.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the invalid input.
        message: String,
    },

    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// Identifier that was looked up.
        id: i64,
    },

    /// The operation is not legal in the entity's current lifecycle state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the conflicting state.
        message: String,
    },

    /// A sync operation was not recognized or its payload could not be decoded.
    #[error("sync operation '{op_type}' rejected: {reason}")]
    Rejected {
        /// The operation's type tag as submitted.
        op_type: String,
        /// Why the operation was rejected.
        reason: String,
    },

    /// An external collaborator (notification, blob store) failed.
    #[error("{collaborator} failed: {message}")]
    Dependency {
        /// Name of the collaborator.
        collaborator: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for suraksha operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

/// Coarse classification of an [`Error`], as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or out-of-range input.
    Validation,
    /// Referenced entity absent.
    NotFound,
    /// Operation illegal in the current lifecycle state.
    InvalidState,
    /// Unrecognized sync operation.
    Rejected,
    /// External collaborator failure.
    Dependency,
    /// Storage, configuration or other server-side failure.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not_found"),
            Self::InvalidState => write!(f, "invalid_state"),
            Self::Rejected => write!(f, "rejected"),
            Self::Dependency => write!(f, "dependency"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl Error {
    /// Create a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Create a new invalid-state error.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a new rejected-operation error.
    #[must_use]
    pub fn rejected(op_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            op_type: op_type.into(),
            reason: reason.into(),
        }
    }

    /// Create a new dependency error.
    #[must_use]
    pub fn dependency(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Dependency {
            collaborator,
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::Dependency { .. } => ErrorKind::Dependency,
            _ => ErrorKind::Internal,
        }
    }

    /// Check if this error is a not-found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is an invalid-state error.
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    /// Check if this error is a validation error.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
