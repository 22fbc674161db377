//! StateStore — redb-backed persistence for definitions and instances.
//!
//! Definitions are wrapped in a [`VersionedDefinition`] envelope; every
//! successful write bumps the resource version, and conditional updates
//! fail with [`StateError::Conflict`] when the stored version no longer
//! matches the one the caller read. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use gantry_model::{RolloutInstance, WorkloadDefinition};
use gantry_rollout::{DefinitionStore, InstanceStore, ResourceVersion, StoreError};

use crate::error::{StateError, StateResult};
use crate::tables::{DEFINITIONS, INSTANCES};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Storage envelope pairing a definition with its resource version.
#[derive(Debug, Serialize, Deserialize)]
struct VersionedDefinition {
    resource_version: ResourceVersion,
    definition: WorkloadDefinition,
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DEFINITIONS).map_err(map_err!(Table))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Definitions ────────────────────────────────────────────────

    /// Create a definition at resource version 1. Fails if it already
    /// exists.
    pub fn create_definition(
        &self,
        definition: &WorkloadDefinition,
    ) -> StateResult<ResourceVersion> {
        let key = definition.table_key();
        let envelope = VersionedDefinition {
            resource_version: 1,
            definition: definition.clone(),
        };
        let value = serde_json::to_vec(&envelope).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEFINITIONS).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Conflict(key));
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "definition created");
        Ok(1)
    }

    /// Get a definition and its resource version.
    pub fn get_definition(
        &self,
        namespace: &str,
        name: &str,
    ) -> StateResult<Option<(WorkloadDefinition, ResourceVersion)>> {
        let key = format!("{namespace}/{name}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEFINITIONS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let envelope: VersionedDefinition =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some((envelope.definition, envelope.resource_version)))
            }
            None => Ok(None),
        }
    }

    /// Conditionally update a definition. The write succeeds only if the
    /// stored resource version still equals `expected`; the bumped
    /// version is returned.
    pub fn update_definition(
        &self,
        definition: &WorkloadDefinition,
        expected: ResourceVersion,
    ) -> StateResult<(WorkloadDefinition, ResourceVersion)> {
        let key = definition.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let next = expected + 1;
        {
            let mut table = txn.open_table(DEFINITIONS).map_err(map_err!(Table))?;
            let current = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    let envelope: VersionedDefinition =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    envelope.resource_version
                }
                None => return Err(StateError::NotFound(key)),
            };
            if current != expected {
                return Err(StateError::Conflict(key));
            }
            let envelope = VersionedDefinition {
                resource_version: next,
                definition: definition.clone(),
            };
            let value = serde_json::to_vec(&envelope).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, resource_version = next, "definition updated");
        Ok((definition.clone(), next))
    }

    /// List all definitions in a namespace.
    pub fn list_definitions(&self, namespace: &str) -> StateResult<Vec<WorkloadDefinition>> {
        let prefix = format!("{namespace}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEFINITIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let envelope: VersionedDefinition =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(envelope.definition);
            }
        }
        Ok(results)
    }

    /// Delete a definition. Returns true if it existed.
    pub fn delete_definition(&self, namespace: &str, name: &str) -> StateResult<bool> {
        let key = format!("{namespace}/{name}");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(DEFINITIONS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "definition deleted");
        Ok(existed)
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Insert or update a rollout instance.
    pub fn put_instance(&self, instance: &RolloutInstance) -> StateResult<()> {
        let key = instance.table_key();
        let value = serde_json::to_vec(instance).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get an instance by namespace and name.
    pub fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> StateResult<Option<RolloutInstance>> {
        let key = format!("{namespace}/{name}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let instance: RolloutInstance =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(instance))
            }
            None => Ok(None),
        }
    }

    /// List instances in a namespace, optionally restricted to one
    /// owning definition.
    pub fn list_instances(
        &self,
        namespace: &str,
        owner: Option<&str>,
    ) -> StateResult<Vec<RolloutInstance>> {
        let prefix = format!("{namespace}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                continue;
            }
            let instance: RolloutInstance =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if owner.is_none_or(|o| instance.owner() == Some(o)) {
                results.push(instance);
            }
        }
        Ok(results)
    }

    /// Delete an instance. Returns true if it existed.
    pub fn delete_instance(&self, namespace: &str, name: &str) -> StateResult<bool> {
        let key = format!("{namespace}/{name}");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "instance deleted");
        Ok(existed)
    }
}

// The orchestrator's storage contracts are implemented directly on the
// store; conflicts surface as `StoreError::Conflict` so the retry
// combinator can absorb them.

impl DefinitionStore for StateStore {
    fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<(WorkloadDefinition, ResourceVersion)>, StoreError> {
        Ok(self.get_definition(namespace, name)?)
    }

    fn update(
        &self,
        definition: &WorkloadDefinition,
        expected: ResourceVersion,
    ) -> Result<(WorkloadDefinition, ResourceVersion), StoreError> {
        Ok(self.update_definition(definition, expected)?)
    }
}

impl InstanceStore for StateStore {
    fn get(&self, namespace: &str, name: &str) -> Result<Option<RolloutInstance>, StoreError> {
        Ok(self.get_instance(namespace, name)?)
    }

    fn list(
        &self,
        namespace: &str,
        owner: Option<&str>,
    ) -> Result<Vec<RolloutInstance>, StoreError> {
        Ok(self.list_instances(namespace, owner)?)
    }

    fn delete(&self, namespace: &str, name: &str) -> Result<bool, StoreError> {
        Ok(self.delete_instance(namespace, name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_model::RolloutPhase;
    use gantry_model::fixtures::{ok_definition, ok_instance};

    // ── Definition CRUD ────────────────────────────────────────────

    #[test]
    fn definition_create_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let def = ok_definition(0);

        let rv = store.create_definition(&def).unwrap();
        assert_eq!(rv, 1);

        let (stored, stored_rv) = store.get_definition("prod", "frontend").unwrap().unwrap();
        assert_eq!(stored, def);
        assert_eq!(stored_rv, 1);
    }

    #[test]
    fn definition_create_twice_conflicts() {
        let store = StateStore::open_in_memory().unwrap();
        let def = ok_definition(0);
        store.create_definition(&def).unwrap();
        assert!(matches!(
            store.create_definition(&def),
            Err(StateError::Conflict(_))
        ));
    }

    #[test]
    fn definition_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_definition("nope", "nothing").unwrap().is_none());
    }

    #[test]
    fn conditional_update_bumps_resource_version() {
        let store = StateStore::open_in_memory().unwrap();
        let mut def = ok_definition(0);
        let rv = store.create_definition(&def).unwrap();

        def.status.latest_version = 1;
        let (_, rv2) = store.update_definition(&def, rv).unwrap();
        assert_eq!(rv2, 2);

        let (stored, stored_rv) = store.get_definition("prod", "frontend").unwrap().unwrap();
        assert_eq!(stored.status.latest_version, 1);
        assert_eq!(stored_rv, 2);
    }

    #[test]
    fn stale_update_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let mut def = ok_definition(0);
        let rv = store.create_definition(&def).unwrap();

        def.status.latest_version = 1;
        store.update_definition(&def, rv).unwrap();

        // Second writer still holds the original version.
        def.status.latest_version = 7;
        assert!(matches!(
            store.update_definition(&def, rv),
            Err(StateError::Conflict(_))
        ));
        let (stored, _) = store.get_definition("prod", "frontend").unwrap().unwrap();
        assert_eq!(stored.status.latest_version, 1);
    }

    #[test]
    fn update_of_missing_definition_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(matches!(
            store.update_definition(&ok_definition(0), 1),
            Err(StateError::NotFound(_))
        ));
    }

    #[test]
    fn definition_list_is_namespace_scoped() {
        let store = StateStore::open_in_memory().unwrap();
        let mut staging = ok_definition(0);
        staging.namespace = "staging".to_string();
        store.create_definition(&ok_definition(0)).unwrap();
        store.create_definition(&staging).unwrap();

        assert_eq!(store.list_definitions("prod").unwrap().len(), 1);
        assert_eq!(store.list_definitions("staging").unwrap().len(), 1);
        assert!(store.list_definitions("dev").unwrap().is_empty());
    }

    #[test]
    fn definition_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.create_definition(&ok_definition(0)).unwrap();

        assert!(store.delete_definition("prod", "frontend").unwrap());
        assert!(!store.delete_definition("prod", "frontend").unwrap());
        assert!(store.get_definition("prod", "frontend").unwrap().is_none());
    }

    // ── Instance CRUD ──────────────────────────────────────────────

    #[test]
    fn instance_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let instance = ok_instance(&ok_definition(1), 1, RolloutPhase::Complete);

        store.put_instance(&instance).unwrap();
        let stored = store.get_instance("prod", "frontend-1").unwrap();
        assert_eq!(stored, Some(instance));
    }

    #[test]
    fn instance_list_filters_by_owner() {
        let store = StateStore::open_in_memory().unwrap();
        let def = ok_definition(2);
        store
            .put_instance(&ok_instance(&def, 1, RolloutPhase::Complete))
            .unwrap();
        store
            .put_instance(&ok_instance(&def, 2, RolloutPhase::Running))
            .unwrap();
        let mut other = ok_definition(1);
        other.name = "backend".to_string();
        store
            .put_instance(&ok_instance(&other, 1, RolloutPhase::Complete))
            .unwrap();

        assert_eq!(store.list_instances("prod", None).unwrap().len(), 3);
        assert_eq!(
            store.list_instances("prod", Some("frontend")).unwrap().len(),
            2
        );
        assert!(store.list_instances("prod", Some("gone")).unwrap().is_empty());
    }

    #[test]
    fn instance_delete() {
        let store = StateStore::open_in_memory().unwrap();
        let instance = ok_instance(&ok_definition(1), 1, RolloutPhase::Failed);
        store.put_instance(&instance).unwrap();

        assert!(store.delete_instance("prod", "frontend-1").unwrap());
        assert!(!store.delete_instance("prod", "frontend-1").unwrap());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.create_definition(&ok_definition(3)).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let (def, rv) = store.get_definition("prod", "frontend").unwrap().unwrap();
        assert_eq!(def.status.latest_version, 3);
        assert_eq!(rv, 1);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_definitions("prod").unwrap().is_empty());
        assert!(store.list_instances("prod", None).unwrap().is_empty());
        assert!(!store.delete_definition("prod", "nope").unwrap());
        assert!(!store.delete_instance("prod", "nope").unwrap());
    }
}
