//! Dataset construction
//!
//! Turns a source dataset into the [`PirTable`] a published service answers
//! from, and persists it as a CBOR blob so a restarted node can reload it
//! without reconstructing.
//!
//! A new table is first written to a staging key; [`DatasetConstructor::promote`]
//! swaps it in once the publish has committed, so a failed republish never
//! touches the artifact of the live service.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use pir_core::{PirError, PirRecord, PirTable, Result, ServiceSetting};
use serde_json::{Map, Value};

use crate::blob::BlobStore;

/// One source row: column name to JSON value.
pub type SourceRow = Map<String, Value>;

/// Supplies the raw rows of a dataset.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn read_rows(&self, dataset_id: &str) -> Result<Vec<SourceRow>>;
}

/// Reads JSON-lines datasets at `<prefix>/<dataset_id>.jsonl`.
pub struct BlobDatasetSource {
    blobs: Arc<dyn BlobStore>,
    prefix: String,
}

impl BlobDatasetSource {
    pub fn new(blobs: Arc<dyn BlobStore>, prefix: impl Into<String>) -> Self {
        Self {
            blobs,
            prefix: prefix.into(),
        }
    }

    pub fn dataset_key(&self, dataset_id: &str) -> String {
        if self.prefix.is_empty() {
            format!("{}.jsonl", dataset_id)
        } else {
            format!("{}/{}.jsonl", self.prefix, dataset_id)
        }
    }
}

#[async_trait]
impl DatasetSource for BlobDatasetSource {
    async fn read_rows(&self, dataset_id: &str) -> Result<Vec<SourceRow>> {
        let key = self.dataset_key(dataset_id);
        let bytes = self.blobs.get(&key).await.map_err(|e| {
            PirError::construction(format!("Failed to read dataset {}: {}", dataset_id, e))
        })?;
        let text = String::from_utf8(bytes).map_err(|_| {
            PirError::construction(format!("Dataset {} is not valid UTF-8", dataset_id))
        })?;

        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str::<SourceRow>(line).map_err(|e| {
                    PirError::construction(format!(
                        "Dataset {} line {}: {}",
                        dataset_id,
                        n + 1,
                        e
                    ))
                })
            })
            .collect()
    }
}

/// Blob key of the persisted table of a service.
pub fn artifact_key(service_id: &str) -> String {
    format!("pir/{}/table.cbor", service_id)
}

/// Blob key of a table built by a publish that has not committed.
pub fn staged_artifact_key(service_id: &str) -> String {
    format!("pir/{}/table.cbor.staged", service_id)
}

/// Render a scalar cell; nested values are rejected.
fn cell(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Builds and persists service tables.
pub struct DatasetConstructor {
    source: Arc<dyn DatasetSource>,
    blobs: Arc<dyn BlobStore>,
}

impl DatasetConstructor {
    pub fn new(source: Arc<dyn DatasetSource>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { source, blobs }
    }

    /// Build the table of `service_id` and stage it next to the live artifact.
    pub async fn construct(
        &self,
        service_id: &str,
        setting: &ServiceSetting,
    ) -> Result<Arc<PirTable>> {
        let rows = self.source.read_rows(&setting.dataset_id).await?;
        let table = build_table(service_id, setting, rows)?;

        let bytes = table.to_cbor()?;
        let size = bytes.len();
        self.blobs
            .put(&staged_artifact_key(service_id), bytes)
            .await
            .map_err(|e| {
                PirError::construction(format!("Failed to stage table of {}: {}", service_id, e))
            })?;

        tracing::info!(
            service_id = %service_id,
            dataset_id = %setting.dataset_id,
            records = table.len(),
            size,
            "Constructed PIR table"
        );
        Ok(Arc::new(table))
    }

    /// Replace the persisted table of `service_id` with the staged one.
    pub async fn promote(&self, service_id: &str) -> Result<()> {
        let staged = staged_artifact_key(service_id);
        let bytes = self.blobs.get(&staged).await?;
        self.blobs.put(&artifact_key(service_id), bytes).await?;
        self.blobs.delete(&staged).await?;
        Ok(())
    }

    /// Drop the staged table of `service_id`, if any.
    pub async fn discard(&self, service_id: &str) {
        if let Err(e) = self.blobs.delete(&staged_artifact_key(service_id)).await {
            tracing::warn!(service_id = %service_id, error = %e, "Failed to discard staged table");
        }
    }

    /// Read back the persisted table of `service_id`.
    pub async fn load(&self, service_id: &str) -> Result<Arc<PirTable>> {
        let bytes = self.blobs.get(&artifact_key(service_id)).await?;
        let table = PirTable::from_cbor(&bytes)?;
        if table.service_id != service_id {
            return Err(PirError::construction(format!(
                "Artifact of {} belongs to service {}",
                service_id, table.service_id
            )));
        }
        Ok(Arc::new(table))
    }
}

fn build_table(
    service_id: &str,
    setting: &ServiceSetting,
    rows: Vec<SourceRow>,
) -> Result<PirTable> {
    let mut seen_fields: HashSet<&str> = HashSet::new();
    let mut records = Vec::with_capacity(rows.len());

    for (n, row) in rows.iter().enumerate() {
        let key = row
            .get(&setting.id_field)
            .and_then(cell)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                PirError::construction(format!(
                    "Row {} of dataset {} has no usable {} value",
                    n + 1,
                    setting.dataset_id,
                    setting.id_field
                ))
            })?;

        let mut values = BTreeMap::new();
        for field in &setting.value_fields {
            if let Some(value) = row.get(field) {
                let rendered = cell(value).unwrap_or_default();
                values.insert(field.clone(), rendered);
                seen_fields.insert(field.as_str());
            }
        }
        records.push(PirRecord::new(key, values));
    }

    if !rows.is_empty() {
        if let Some(missing) = setting
            .value_fields
            .iter()
            .find(|f| !seen_fields.contains(f.as_str()))
        {
            return Err(PirError::construction(format!(
                "Dataset {} has no column {}",
                setting.dataset_id, missing
            )));
        }
    }

    Ok(PirTable::new(
        service_id,
        setting.dataset_id.clone(),
        setting.id_field.clone(),
        setting.value_fields.clone(),
        records,
    ))
}
