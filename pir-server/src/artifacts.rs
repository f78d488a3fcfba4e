//! In-memory index of constructed tables.

use std::sync::Arc;

use dashmap::DashMap;
use pir_core::PirTable;

/// Installed tables keyed by service id; entries are replaced, never mutated.
#[derive(Default)]
pub struct ArtifactStore {
    tables: DashMap<String, Arc<PirTable>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the table of `table.service_id`.
    pub fn install(&self, table: Arc<PirTable>) {
        tracing::debug!(
            service_id = %table.service_id,
            records = table.len(),
            "Installing constructed table"
        );
        self.tables.insert(table.service_id.clone(), table);
    }

    pub fn get(&self, service_id: &str) -> Option<Arc<PirTable>> {
        self.tables.get(service_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, service_id: &str) -> Option<Arc<PirTable>> {
        self.tables.remove(service_id).map(|(_, table)| table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("tables", &self.tables.len())
            .finish()
    }
}
