use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use inspection_control::DatabaseAdmin;
use inspection_models::PlatformError;

#[derive(Debug, Default)]
struct Volume {
    databases: BTreeSet<String>,
    grants: BTreeSet<(String, String)>,
    ledger: Option<BTreeSet<String>>,
    calls: Vec<String>,
}

/// In-memory stand-in for a database engine volume. Clones share state so a
/// test can inspect what a bootstrapper did.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdmin {
    volume: Arc<Mutex<Volume>>,
}

impl MemoryAdmin {
    /// A freshly initialised volume holding only the primary database.
    pub fn fresh(primary: &str) -> Self {
        Self::default().with_database(primary)
    }

    pub fn with_database(self, name: &str) -> Self {
        self.lock().databases.insert(name.to_string());
        self
    }

    pub fn databases(&self) -> Vec<String> {
        self.lock().databases.iter().cloned().collect()
    }

    pub fn has_grant(&self, database: &str, role: &str) -> bool {
        self.lock()
            .grants
            .contains(&(database.to_string(), role.to_string()))
    }

    pub fn ledger_markers(&self) -> Vec<String> {
        self.lock()
            .ledger
            .as_ref()
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Mutating calls in order, e.g. `create_database vehicle_inspection_test`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Volume> {
        // A panicking test poisons the lock; the state is still usable.
        self.volume.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn missing_ledger() -> PlatformError {
    PlatformError::DatabaseError {
        reason: "relation \"inspection_bootstrap_ledger\" does not exist".to_string(),
    }
}

#[async_trait]
impl DatabaseAdmin for MemoryAdmin {
    async fn ensure_ledger(&self) -> Result<(), PlatformError> {
        let mut volume = self.lock();
        if volume.ledger.is_none() {
            volume.ledger = Some(BTreeSet::new());
            volume.calls.push("create_ledger".to_string());
        }
        Ok(())
    }

    async fn ledger_exists(&self) -> Result<bool, PlatformError> {
        Ok(self.lock().ledger.is_some())
    }

    async fn ledger_contains(&self, marker: &str) -> Result<bool, PlatformError> {
        let volume = self.lock();
        let ledger = volume.ledger.as_ref().ok_or_else(missing_ledger)?;
        Ok(ledger.contains(marker))
    }

    async fn record_marker(&self, marker: &str) -> Result<(), PlatformError> {
        let mut volume = self.lock();
        let ledger = volume.ledger.as_mut().ok_or_else(missing_ledger)?;
        ledger.insert(marker.to_string());
        volume.calls.push(format!("record_marker {marker}"));
        Ok(())
    }

    async fn database_exists(&self, name: &str) -> Result<bool, PlatformError> {
        Ok(self.lock().databases.contains(name))
    }

    async fn create_database(&self, name: &str) -> Result<(), PlatformError> {
        let mut volume = self.lock();
        if !volume.databases.insert(name.to_string()) {
            return Err(PlatformError::DatabaseAlreadyExists { name: name.to_string() });
        }
        volume.calls.push(format!("create_database {name}"));
        Ok(())
    }

    async fn grant_all(&self, database: &str, role: &str) -> Result<(), PlatformError> {
        let mut volume = self.lock();
        if !volume.databases.contains(database) {
            return Err(PlatformError::DatabaseError {
                reason: format!("database \"{database}\" does not exist"),
            });
        }
        volume.grants.insert((database.to_string(), role.to_string()));
        volume.calls.push(format!("grant_all {database} {role}"));
        Ok(())
    }

    async fn has_all_privileges(&self, database: &str, role: &str) -> Result<bool, PlatformError> {
        Ok(self.has_grant(database, role))
    }
}
