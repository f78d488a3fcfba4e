//! Application state module
//!
//! Wires the stores, the query pipeline, the registry and the publish
//! lifecycle into one clonable handle shared by every request handler.

use std::sync::Arc;

use pir_core::{ObfuscationEngine, Result};

use crate::artifacts::ArtifactStore;
use crate::auth::{CredentialVerifier, StoreCredentialVerifier};
use crate::blob::{BlobStore, LocalBlobStore, MemoryBlobStore};
use crate::config::Config;
use crate::constructor::{BlobDatasetSource, DatasetConstructor, DatasetSource};
use crate::lifecycle::LifecycleManager;
use crate::pipeline::QueryPipeline;
use crate::registry::ServiceRegistry;
use crate::row_source::{ArtifactRowSource, RowSource};
use crate::store::{AuthStore, MemoryStore, PostgresStore, ServiceStore};
use crate::transport::{LocalTransport, Transport};
use crate::worker::WorkerPool;

/// Storage and capability backends the state is assembled from.
///
/// The optional slots fall back to the artifact-backed defaults.
#[derive(Clone)]
pub struct Backends {
    pub services: Arc<dyn ServiceStore>,
    pub auths: Arc<dyn AuthStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub transport: Arc<dyn Transport>,
    pub artifacts: Arc<ArtifactStore>,
    pub row_source: Option<Arc<dyn RowSource>>,
    pub verifier: Option<Arc<dyn CredentialVerifier>>,
    pub dataset_source: Option<Arc<dyn DatasetSource>>,
}

impl Backends {
    /// Memory stores, memory blobs and a local transport.
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            services: store.clone(),
            auths: store,
            blobs: Arc::new(MemoryBlobStore::new()),
            transport: Arc::new(LocalTransport::new()),
            artifacts: Arc::new(ArtifactStore::new()),
            row_source: None,
            verifier: None,
            dataset_source: None,
        }
    }

    /// PostgreSQL when `database_url` is set, a blob directory when
    /// `storage_dir` is set; memory otherwise.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let mut backends = Self::in_memory();

        match &config.database_url {
            Some(url) => {
                let store = Arc::new(
                    PostgresStore::new(
                        url,
                        config.database_max_connections,
                        config.database_min_connections,
                    )
                    .await?,
                );
                backends.services = store.clone();
                backends.auths = store;
            }
            None => tracing::warn!("DATABASE_URL not set, service records are kept in memory"),
        }

        match &config.storage_dir {
            Some(dir) => {
                tracing::info!(path = %dir.display(), "Using local blob store");
                backends.blobs = Arc::new(LocalBlobStore::new(dir.clone()));
            }
            None => tracing::warn!("PIR_STORAGE_DIR not set, blobs are kept in memory"),
        }

        Ok(backends)
    }

    pub fn with_services(mut self, services: Arc<dyn ServiceStore>) -> Self {
        self.services = services;
        self
    }

    pub fn with_auths(mut self, auths: Arc<dyn AuthStore>) -> Self {
        self.auths = auths;
        self
    }

    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_row_source(mut self, rows: Arc<dyn RowSource>) -> Self {
        self.row_source = Some(rows);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_dataset_source(mut self, source: Arc<dyn DatasetSource>) -> Self {
        self.dataset_source = Some(source);
        self
    }
}

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub services: Arc<dyn ServiceStore>,
    pub auths: Arc<dyn AuthStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub transport: Arc<dyn Transport>,
    /// Installed lookup tables
    pub artifacts: Arc<ArtifactStore>,
    pub constructor: Arc<DatasetConstructor>,
    pub pipeline: Arc<QueryPipeline>,
    pub registry: Arc<ServiceRegistry>,
    pub lifecycle: Arc<LifecycleManager>,
    /// Construction workers
    pub pool: Arc<WorkerPool>,
}

impl AppState {
    pub fn new(config: Config, backends: Backends) -> Self {
        let Backends {
            services,
            auths,
            blobs,
            transport,
            artifacts,
            row_source,
            verifier,
            dataset_source,
        } = backends;

        let rows: Arc<dyn RowSource> = match row_source {
            Some(rows) => rows,
            None => Arc::new(ArtifactRowSource::new(artifacts.clone())),
        };
        let verifier: Arc<dyn CredentialVerifier> = match verifier {
            Some(verifier) => verifier,
            None => Arc::new(StoreCredentialVerifier::new(
                auths.clone(),
                config.credential_max_age(),
            )),
        };
        let source: Arc<dyn DatasetSource> = match dataset_source {
            Some(source) => source,
            None => Arc::new(BlobDatasetSource::new(
                blobs.clone(),
                config.dataset_prefix.clone(),
            )),
        };

        let constructor = Arc::new(DatasetConstructor::new(source, blobs.clone()));
        let pipeline = Arc::new(QueryPipeline::new(
            services.clone(),
            verifier,
            rows,
            Arc::new(ObfuscationEngine::default()),
            config.max_query_items,
            config.max_rows_per_item,
        ));
        let registry = Arc::new(ServiceRegistry::new(
            config.agency.clone(),
            transport.clone(),
            pipeline.clone(),
            services.clone(),
            constructor.clone(),
            artifacts.clone(),
        ));
        let pool = Arc::new(WorkerPool::new(
            config.publish_workers,
            config.publish_queue_capacity,
        ));
        let lifecycle = Arc::new(LifecycleManager::new(
            config.agency.clone(),
            services.clone(),
            constructor.clone(),
            artifacts.clone(),
            registry.clone(),
            pool.clone(),
            config.publish_timeout(),
        ));

        Self {
            config: Arc::new(config),
            services,
            auths,
            blobs,
            transport,
            artifacts,
            constructor,
            pipeline,
            registry,
            lifecycle,
            pool,
        }
    }

    /// Fail publishes interrupted by a restart, then re-register every
    /// successfully published service. Returns the number registered.
    pub async fn initialize(&self) -> Result<usize> {
        let interrupted = self.lifecycle.recover_interrupted().await?;
        if interrupted > 0 {
            tracing::warn!(count = interrupted, "Failed publishes interrupted by restart");
        }
        self.registry.initialize().await
    }
}
