//! Subjects and their emergency contacts.
//!
//! Identity lives in an external collaborator; this module keeps just enough
//! of it locally (id, role, contact list) for alerts to fan out.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::storage::Storage;

/// Role granted by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Ordinary user who can raise alerts and file reports.
    #[default]
    Citizen,
    /// Operator who can manage zones and resolve alerts.
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Citizen => write!(f, "citizen"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "citizen" | "user" => Ok(Self::Citizen),
            "admin" => Ok(Self::Admin),
            other => Err(Error::validation(format!("unknown role: {other}"))),
        }
    }
}

/// A person who can raise alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Identifier issued by the identity collaborator.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Subject's own phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Role.
    #[serde(default)]
    pub role: Role,
    /// Recipients notified when this subject raises an alert, in order.
    #[serde(default)]
    pub emergency_contacts: Vec<String>,
}

/// Local directory of subjects.
#[derive(Debug, Clone)]
pub struct SubjectDirectory {
    storage: Arc<Storage>,
    recipient_pattern: Regex,
    max_contacts: usize,
}

impl SubjectDirectory {
    /// Create a directory that validates contacts against `recipient_pattern`.
    #[must_use]
    pub fn new(storage: Arc<Storage>, recipient_pattern: Regex, max_contacts: usize) -> Self {
        Self {
            storage,
            recipient_pattern,
            max_contacts,
        }
    }

    /// Register or update a subject.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the name is blank, there are too many
    /// contacts, or a contact does not look like a recipient address.
    pub fn register(&self, subject: &Subject) -> Result<()> {
        if subject.name.trim().is_empty() {
            return Err(Error::validation("subject name must not be empty"));
        }
        if subject.emergency_contacts.len() > self.max_contacts {
            return Err(Error::validation(format!(
                "at most {} emergency contacts allowed, got {}",
                self.max_contacts,
                subject.emergency_contacts.len()
            )));
        }
        if let Some(bad) = subject
            .emergency_contacts
            .iter()
            .find(|c| !self.recipient_pattern.is_match(c))
        {
            return Err(Error::validation(format!(
                "invalid emergency contact: {bad}"
            )));
        }

        self.storage.upsert_subject(subject)?;
        info!(
            subject_id = subject.id,
            role = %subject.role,
            contacts = subject.emergency_contacts.len(),
            "Registered subject"
        );
        Ok(())
    }

    /// Look up a subject.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the subject is unknown.
    pub fn get(&self, id: i64) -> Result<Subject> {
        self.storage
            .get_subject(id)?
            .ok_or_else(|| Error::not_found("subject", id))
    }
}
