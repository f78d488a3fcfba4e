//! Row lookup for query items.

use std::sync::Arc;

use async_trait::async_trait;
use pir_core::{
    AlgorithmType, ObfuscateDataItem, PirError, PirRecord, QueryParam, Result, ServiceSetting,
};

use crate::artifacts::ArtifactStore;

/// Fetches the rows a query item addresses.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn fetch_rows(
        &self,
        setting: &ServiceSetting,
        query_param: &QueryParam,
        item: &ObfuscateDataItem,
    ) -> Result<Vec<PirRecord>>;
}

/// Looks rows up in the installed table of the queried service.
pub struct ArtifactRowSource {
    artifacts: Arc<ArtifactStore>,
}

impl ArtifactRowSource {
    pub fn new(artifacts: Arc<ArtifactStore>) -> Self {
        Self { artifacts }
    }
}

#[async_trait]
impl RowSource for ArtifactRowSource {
    async fn fetch_rows(
        &self,
        setting: &ServiceSetting,
        query_param: &QueryParam,
        item: &ObfuscateDataItem,
    ) -> Result<Vec<PirRecord>> {
        let table = self.artifacts.get(&query_param.service_id).ok_or_else(|| {
            PirError::Lookup(format!(
                "No table installed for service {}",
                query_param.service_id
            ))
        })?;
        if table.dataset_id != setting.dataset_id {
            return Err(PirError::Lookup(format!(
                "Installed table of {} is built from {}, expected {}",
                query_param.service_id, table.dataset_id, setting.dataset_id
            )));
        }

        let algorithm: AlgorithmType = query_param.algorithm_type.parse()?;
        let rows = match algorithm {
            AlgorithmType::IdFilter => {
                table.filter_prefix(item.filter.as_deref().unwrap_or_default())
            }
            AlgorithmType::IdObfuscation => table.find_keys(&item.candidates),
        };
        Ok(rows)
    }
}
