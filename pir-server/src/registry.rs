//! Service registry
//!
//! Binds each published service to the transport topic
//! `<agency>/PIR/<service_id>` and restores those bindings at startup from
//! the `PublishSuccess` records of the agency.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use pir_core::{PirError, QueryRequest, QueryResponse, Result};
use tokio::sync::Mutex;

use crate::artifacts::ArtifactStore;
use crate::constructor::DatasetConstructor;
use crate::pipeline::QueryPipeline;
use crate::store::{PublishStatus, ServiceStore};
use crate::transport::{TopicHandler, TopicMessage, Transport, TransportError};

/// Topic a service is reachable on.
pub fn service_topic(agency: &str, service_id: &str) -> String {
    format!("{}/PIR/{}", agency, service_id)
}

/// Answers query messages for one service.
struct QueryTopicHandler {
    service_id: String,
    pipeline: Arc<QueryPipeline>,
    transport: Weak<dyn Transport>,
}

impl QueryTopicHandler {
    async fn respond(&self, payload: &[u8]) -> QueryResponse {
        let request: QueryRequest = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(e) => {
                return QueryResponse::failure(
                    None,
                    &PirError::validation(format!("Malformed query message: {}", e)),
                )
            }
        };
        if request.query_param.service_id != self.service_id {
            return QueryResponse::failure(
                None,
                &PirError::validation(format!(
                    "Query for service {} received on the topic of {}",
                    request.query_param.service_id, self.service_id
                )),
            );
        }
        self.pipeline.query(&request).await
    }
}

#[async_trait]
impl TopicHandler for QueryTopicHandler {
    async fn on_message(&self, message: TopicMessage) {
        let response = self.respond(&message.payload).await;
        let payload = match serde_json::to_vec(&response) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(
                    service_id = %self.service_id,
                    error = %e,
                    "Failed to encode response"
                );
                return;
            }
        };

        let Some(transport) = self.transport.upgrade() else {
            tracing::warn!(service_id = %self.service_id, "Transport dropped, response discarded");
            return;
        };
        if let Err(e) = transport.send_response(&message, payload).await {
            tracing::warn!(
                service_id = %self.service_id,
                sender = %message.sender,
                error = %e,
                "Failed to send query response"
            );
        }
    }
}

/// Topic subscriptions of published services.
pub struct ServiceRegistry {
    agency: String,
    transport: Arc<dyn Transport>,
    pipeline: Arc<QueryPipeline>,
    services: Arc<dyn ServiceStore>,
    constructor: Arc<DatasetConstructor>,
    artifacts: Arc<ArtifactStore>,
    /// service_id -> topic, inserted once the topic is bound
    registered: DashMap<String, String>,
    /// Serializes topic binding
    registration: Mutex<()>,
}

impl ServiceRegistry {
    pub fn new(
        agency: impl Into<String>,
        transport: Arc<dyn Transport>,
        pipeline: Arc<QueryPipeline>,
        services: Arc<dyn ServiceStore>,
        constructor: Arc<DatasetConstructor>,
        artifacts: Arc<ArtifactStore>,
    ) -> Self {
        Self {
            agency: agency.into(),
            transport,
            pipeline,
            services,
            constructor,
            artifacts,
            registered: DashMap::new(),
            registration: Mutex::new(()),
        }
    }

    pub fn agency(&self) -> &str {
        &self.agency
    }

    pub fn topic(&self, service_id: &str) -> String {
        service_topic(&self.agency, service_id)
    }

    pub fn is_registered(&self, service_id: &str) -> bool {
        self.registered.contains_key(service_id)
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    /// Subscribe the topic of `service_id`; a second call is a no-op.
    ///
    /// Returns once the topic is bound, also for concurrent callers.
    pub async fn register_service(
        &self,
        service_id: &str,
    ) -> std::result::Result<(), TransportError> {
        let _guard = self.registration.lock().await;
        if self.registered.contains_key(service_id) {
            return Ok(());
        }

        let topic = self.topic(service_id);
        let handler = Arc::new(QueryTopicHandler {
            service_id: service_id.to_string(),
            pipeline: Arc::clone(&self.pipeline),
            transport: Arc::downgrade(&self.transport),
        });
        self.transport.register_topic(&topic, handler).await?;
        self.registered.insert(service_id.to_string(), topic.clone());

        tracing::info!(service_id = %service_id, topic = %topic, "PIR service registered");
        Ok(())
    }

    /// Restore subscriptions for every published service of the agency.
    ///
    /// Services whose table cannot be loaded or registered are skipped.
    pub async fn initialize(&self) -> Result<usize> {
        let published = self
            .services
            .list(&self.agency, Some(PublishStatus::PublishSuccess))
            .await?;
        tracing::info!(
            agency = %self.agency,
            services = published.len(),
            "Restoring published services"
        );

        let mut restored = 0;
        for info in published {
            let table = match self.constructor.load(&info.service_id).await {
                Ok(table) => table,
                Err(e) => {
                    tracing::warn!(
                        service_id = %info.service_id,
                        error = %e,
                        "Skipping service without a loadable table"
                    );
                    continue;
                }
            };
            self.artifacts.install(table);

            if let Err(e) = self.register_service(&info.service_id).await {
                tracing::warn!(
                    service_id = %info.service_id,
                    error = %e,
                    "Skipping service that failed to register"
                );
                continue;
            }
            restored += 1;
        }

        Ok(restored)
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("agency", &self.agency)
            .field("registered", &self.registered.len())
            .finish()
    }
}
