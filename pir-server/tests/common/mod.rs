//! Shared fixtures for the pir-server integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pir_core::{
    AlgorithmType, CredentialInfo, ObfuscateDataItem, PirClient, PirRecord, QueryParam,
    QueryRequest, QuerySecrets, Result, SearchType, ServiceSetting,
};
use pir_server::{
    ArtifactRowSource, AppState, Backends, BlobDatasetSource, BlobStore, Config, DatasetSource,
    LocalTransport, MemoryBlobStore, MemoryStore, PublishOutcome, PublishStatus, RowSource,
    ServiceAuth, SourceRow, AuthStore,
};
use tokio::sync::Semaphore;

pub const AGENCY: &str = "agency-test";
pub const ACCESS_KEY: &str = "ak-1";
pub const SECRET: &str = "secret-1";
pub const DATASET: &str = "blacklist";

/// Rows of the default dataset: keys `user-0` .. `user-9`.
pub fn dataset_lines() -> String {
    (0..10)
        .map(|i| {
            format!(
                r#"{{"id":"user-{i}","score":{},"level":"L{}"}}"#,
                i * 10,
                i % 3
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keys of the default dataset, used as the decoy pool of `idObfuscation` clients.
pub fn dataset_keys() -> Vec<String> {
    (0..10).map(|i| format!("user-{i}")).collect()
}

pub fn setting(dataset_id: &str) -> ServiceSetting {
    ServiceSetting {
        dataset_id: dataset_id.to_string(),
        id_field: "id".to_string(),
        value_fields: vec!["score".to_string(), "level".to_string()],
        search_types: vec![SearchType::SearchExist, SearchType::SearchValue],
        algorithm_types: vec![AlgorithmType::IdFilter, AlgorithmType::IdObfuscation],
    }
}

pub fn test_config() -> Config {
    Config {
        agency: AGENCY.to_string(),
        ..Config::default()
    }
}

pub async fn seed_dataset(blobs: &dyn BlobStore, dataset_id: &str, lines: &str) {
    blobs
        .put(&format!("datasets/{}.jsonl", dataset_id), lines.as_bytes().to_vec())
        .await
        .unwrap();
}

/// Row source counting every lookup before delegating to the installed tables.
pub struct CountingRowSource {
    inner: ArtifactRowSource,
    calls: AtomicUsize,
}

impl CountingRowSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RowSource for CountingRowSource {
    async fn fetch_rows(
        &self,
        setting: &ServiceSetting,
        query_param: &QueryParam,
        item: &ObfuscateDataItem,
    ) -> Result<Vec<PirRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_rows(setting, query_param, item).await
    }
}

/// Dataset source that blocks reads until the gate is opened.
pub struct GatedSource {
    inner: BlobDatasetSource,
    gate: Arc<Semaphore>,
    /// Only this dataset waits when set
    only: Option<String>,
}

impl GatedSource {
    pub fn open(&self) {
        self.gate.add_permits(1024);
    }
}

#[async_trait]
impl DatasetSource for GatedSource {
    async fn read_rows(&self, dataset_id: &str) -> Result<Vec<SourceRow>> {
        if self.only.as_deref().map_or(true, |only| only == dataset_id) {
            let _permit = self.gate.acquire().await.unwrap();
        }
        self.inner.read_rows(dataset_id).await
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub transport: Arc<LocalTransport>,
    pub rows: Arc<CountingRowSource>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let blobs = Arc::new(MemoryBlobStore::new());
        seed_dataset(&*blobs, DATASET, &dataset_lines()).await;
        Self::over(Arc::new(MemoryStore::new()), blobs, config, None)
    }

    /// Harness whose dataset reads wait for `GatedSource::open`.
    pub async fn gated(config: Config) -> (Self, Arc<GatedSource>) {
        Self::gated_on(config, None).await
    }

    /// Like [`Harness::gated`], holding back reads of `dataset_id` only.
    pub async fn gated_on(config: Config, dataset_id: Option<&str>) -> (Self, Arc<GatedSource>) {
        let blobs = Arc::new(MemoryBlobStore::new());
        seed_dataset(&*blobs, DATASET, &dataset_lines()).await;
        let source = Arc::new(GatedSource {
            inner: BlobDatasetSource::new(blobs.clone(), "datasets"),
            gate: Arc::new(Semaphore::new(0)),
            only: dataset_id.map(String::from),
        });
        let harness = Self::over(
            Arc::new(MemoryStore::new()),
            blobs,
            config,
            Some(source.clone()),
        );
        (harness, source)
    }

    /// Fresh component graph over existing stores, as after a restart.
    pub fn over(
        store: Arc<MemoryStore>,
        blobs: Arc<MemoryBlobStore>,
        config: Config,
        source: Option<Arc<dyn DatasetSource>>,
    ) -> Self {
        let transport = Arc::new(LocalTransport::new());
        let mut backends = Backends::in_memory()
            .with_services(store.clone())
            .with_auths(store.clone())
            .with_blobs(blobs.clone())
            .with_transport(transport.clone());
        let rows = Arc::new(CountingRowSource {
            inner: ArtifactRowSource::new(backends.artifacts.clone()),
            calls: AtomicUsize::new(0),
        });
        backends = backends.with_row_source(rows.clone());
        if let Some(source) = source {
            backends = backends.with_dataset_source(source);
        }

        Self {
            state: AppState::new(config, backends),
            store,
            blobs,
            transport,
            rows,
        }
    }

    pub fn restart(&self) -> Self {
        Self::over(self.store.clone(), self.blobs.clone(), test_config(), None)
    }

    /// Publish and wait for the terminal status.
    pub async fn publish(&self, service_id: &str, setting: ServiceSetting) -> PublishStatus {
        match self.state.lifecycle.publish(service_id, setting).await.unwrap() {
            PublishOutcome::Accepted(task) => task.wait().await,
            PublishOutcome::Rejected(message) => panic!("publish rejected: {}", message),
        }
    }

    pub async fn grant(&self, service_id: &str) {
        self.store
            .grant(&ServiceAuth {
                service_id: service_id.to_string(),
                access_key_id: ACCESS_KEY.to_string(),
                access_secret: SECRET.to_string(),
                expire_at: None,
            })
            .await
            .unwrap();
    }

    /// Published, granted service ready for queries.
    pub async fn ready_service(&self, service_id: &str) {
        assert_eq!(
            self.publish(service_id, setting(DATASET)).await,
            PublishStatus::PublishSuccess
        );
        self.grant(service_id).await;
    }
}

pub fn query_param(service_id: &str, search_type: SearchType) -> QueryParam {
    QueryParam {
        service_id: service_id.to_string(),
        search_type,
        algorithm_type: String::new(),
        credential: CredentialInfo::sign(
            ACCESS_KEY,
            SECRET,
            service_id,
            Utc::now().timestamp(),
            uuid::Uuid::new_v4().to_string(),
        ),
    }
}

pub fn build_query(
    client: &PirClient,
    service_id: &str,
    search_type: SearchType,
    keys: &[&str],
) -> (QueryRequest, QuerySecrets) {
    client
        .build_query(query_param(service_id, search_type), keys)
        .unwrap()
}
