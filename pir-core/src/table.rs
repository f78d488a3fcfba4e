//! Constructed lookup table backing a published service.
//!
//! A [`PirTable`] is built once per publish and then shared read-only by every
//! query against the service. Records are kept sorted by the hex SHA3-256 of
//! their key so filter-prefix lookups are a range scan.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::error::{PirError, Result};

/// Hex-encoded SHA3-256 of a lookup key.
pub fn key_hash(key: &str) -> String {
    hex::encode(Sha3_256::digest(key.as_bytes()))
}

/// One row of a constructed dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PirRecord {
    pub key: String,
    pub key_hash: String,
    pub values: BTreeMap<String, String>,
}

impl PirRecord {
    pub fn new(key: impl Into<String>, values: BTreeMap<String, String>) -> Self {
        let key = key.into();
        Self {
            key_hash: key_hash(&key),
            key,
            values,
        }
    }
}

/// Immutable query-optimized representation of a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PirTable {
    pub service_id: String,
    pub dataset_id: String,
    pub id_field: String,
    pub value_fields: Vec<String>,
    pub constructed_at: DateTime<Utc>,
    records: Vec<PirRecord>,
}

impl PirTable {
    pub fn new(
        service_id: impl Into<String>,
        dataset_id: impl Into<String>,
        id_field: impl Into<String>,
        value_fields: Vec<String>,
        mut records: Vec<PirRecord>,
    ) -> Self {
        records.sort_by(|a, b| a.key_hash.cmp(&b.key_hash).then_with(|| a.key.cmp(&b.key)));
        Self {
            service_id: service_id.into(),
            dataset_id: dataset_id.into(),
            id_field: id_field.into(),
            value_fields,
            constructed_at: Utc::now(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PirRecord] {
        &self.records
    }

    /// All records whose key hash starts with `prefix` (lowercase hex).
    pub fn filter_prefix(&self, prefix: &str) -> Vec<PirRecord> {
        let start = self
            .records
            .partition_point(|r| r.key_hash.as_str() < prefix);
        self.records[start..]
            .iter()
            .take_while(|r| r.key_hash.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// All records whose key is one of `keys`.
    pub fn find_keys(&self, keys: &[String]) -> Vec<PirRecord> {
        let mut wanted: Vec<String> = keys.iter().map(|k| key_hash(k)).collect();
        wanted.sort();
        wanted.dedup();
        let keys: HashSet<&str> = keys.iter().map(String::as_str).collect();

        let mut matched = Vec::new();
        for hash in &wanted {
            matched.extend(
                self.filter_prefix(hash)
                    .into_iter()
                    .filter(|r| keys.contains(r.key.as_str())),
            );
        }
        matched
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        ciborium::into_writer(self, &mut buffer)
            .map_err(|e| PirError::Serialization(e.to_string()))?;
        Ok(buffer)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| PirError::Serialization(e.to_string()))
    }
}
