//! PIR Server Library - publish and query private information retrieval services
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod artifacts;
pub mod auth;
pub mod blob;
pub mod config;
pub mod constructor;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod openapi;
pub mod pipeline;
pub mod registry;
pub mod routes;
pub mod row_source;
pub mod state;
pub mod store;
pub mod transport;
pub mod validation;
pub mod worker;

pub use artifacts::ArtifactStore;
pub use auth::{AuthDecision, CredentialVerifier, StoreCredentialVerifier};
pub use blob::{BlobError, BlobStore, LocalBlobStore, MemoryBlobStore};
pub use config::Config;
pub use constructor::{
    artifact_key, staged_artifact_key, BlobDatasetSource, DatasetConstructor, DatasetSource,
    SourceRow,
};
pub use error::ApiError;
pub use lifecycle::{LifecycleManager, PublishOutcome, PublishTask};
pub use openapi::ApiDoc;
pub use pipeline::QueryPipeline;
pub use registry::{service_topic, ServiceRegistry};
pub use routes::{create_router, create_router_with_config};
pub use row_source::{ArtifactRowSource, RowSource};
pub use state::{AppState, Backends};
pub use store::{
    AuthStore, InvokeRecord, InvokeStatus, MemoryStore, PostgresStore, PublishClaim,
    PublishStatus, PublishedServiceInfo, ServiceAuth, ServiceStore, StoreError,
};
pub use transport::{
    LocalTransport, SentResponse, TopicHandler, TopicMessage, Transport, TransportError,
};
pub use worker::{PoolError, WorkerPool};
