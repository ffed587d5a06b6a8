//! Wiring of the alert core.
//!
//! [`Engine`] builds every component over one shared [`Storage`] handle so
//! callers (the CLI, an HTTP layer) construct the system in one place.

use std::sync::Arc;

use crate::alert::AlertManager;
use crate::config::Config;
use crate::error::Result;
use crate::evidence::EvidenceLedger;
use crate::notify::{NotificationDispatcher, Notifier};
use crate::report::CrimeReports;
use crate::storage::Storage;
use crate::subject::SubjectDirectory;
use crate::sync::SyncReconciler;
use crate::zone::ZoneRegistry;

/// All alert-core components sharing one storage handle.
#[derive(Debug, Clone)]
pub struct Engine {
    storage: Arc<Storage>,
    zones: ZoneRegistry,
    subjects: SubjectDirectory,
    alerts: AlertManager,
    evidence: EvidenceLedger,
    reports: CrimeReports,
    sync: SyncReconciler,
}

impl Engine {
    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured recipient pattern does not compile.
    pub fn new(
        storage: Arc<Storage>,
        config: &Config,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Result<Self> {
        let notifier = Notifier::new(
            storage.clone(),
            dispatcher,
            config.notification.signature.clone(),
        );
        let alerts = AlertManager::new(storage.clone(), notifier);
        let evidence = EvidenceLedger::new(storage.clone());
        let reports = CrimeReports::new(storage.clone());
        let sync = SyncReconciler::new(
            storage.clone(),
            alerts.clone(),
            evidence.clone(),
            reports.clone(),
            config.sync.clone(),
        );

        Ok(Self {
            zones: ZoneRegistry::new(storage.clone()),
            subjects: SubjectDirectory::new(
                storage.clone(),
                config.recipient_regex()?,
                config.notification.max_contacts,
            ),
            alerts,
            evidence,
            reports,
            sync,
            storage,
        })
    }

    /// Shared storage, for aggregate queries and record listings.
    #[must_use]
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Zone administration.
    #[must_use]
    pub fn zones(&self) -> &ZoneRegistry {
        &self.zones
    }

    /// Subject directory.
    #[must_use]
    pub fn subjects(&self) -> &SubjectDirectory {
        &self.subjects
    }

    /// Alert lifecycle.
    #[must_use]
    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    /// Evidence ledger.
    #[must_use]
    pub fn evidence(&self) -> &EvidenceLedger {
        &self.evidence
    }

    /// Crime reports.
    #[must_use]
    pub fn reports(&self) -> &CrimeReports {
        &self.reports
    }

    /// Offline sync.
    #[must_use]
    pub fn sync(&self) -> &SyncReconciler {
        &self.sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogDispatcher;

    #[test]
    fn test_engine_rejects_bad_pattern() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let mut config = Config::default();
        config.notification.recipient_pattern = "(".to_string();
        assert!(Engine::new(storage, &config, Arc::new(LogDispatcher)).is_err());
    }

    #[test]
    fn test_engine_components_share_storage() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let engine =
            Engine::new(storage.clone(), &Config::default(), Arc::new(LogDispatcher)).unwrap();
        assert!(Arc::ptr_eq(engine.storage(), &storage));
        assert!(engine.zones().list_active().unwrap().is_empty());
        assert!(engine.alerts().list_all().unwrap().is_empty());
    }
}
