//! Publish lifecycle
//!
//! `publish` claims the service record and schedules construction on the
//! worker pool; the task commits exactly one terminal status:
//!
//! ```text
//! Publishing --construct+register--> PublishSuccess
//!            --invalid setting | pool full | error | timeout--> PublishFailed
//! ```
//!
//! Republishing a `PublishSuccess` service keeps the live setting and table
//! answering queries. The new setting waits as pending and the new table is
//! staged; both replace the live ones only once the success is committed. A
//! failed republish leaves the service as it was.

use std::sync::Arc;
use std::time::Duration;

use pir_core::{PirError, Result, ServiceSetting};
use tokio::task::JoinHandle;

use crate::artifacts::ArtifactStore;
use crate::constructor::DatasetConstructor;
use crate::registry::ServiceRegistry;
use crate::store::{PublishClaim, PublishStatus, PublishedServiceInfo, ServiceStore, StoreError};
use crate::worker::WorkerPool;

const SUCCESS_MSG: &str = "success";

/// Status writes attempted before a commit is given up.
const COMMIT_ATTEMPTS: u32 = 3;
const COMMIT_BACKOFF: Duration = Duration::from_millis(100);

fn failure_message(service_id: &str, cause: impl std::fmt::Display) -> String {
    format!("Publish PIR service {} failed for {}", service_id, cause)
}

/// Handle on a scheduled publish.
#[derive(Debug)]
pub struct PublishTask {
    service_id: String,
    handle: JoinHandle<PublishStatus>,
}

impl PublishTask {
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Wait for the outcome of this publish.
    ///
    /// `PublishSuccess` only when that status was stored. A failed republish
    /// reports `PublishFailed` while the record keeps serving as before.
    pub async fn wait(self) -> PublishStatus {
        match self.handle.await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(service_id = %self.service_id, error = %e, "Publish task aborted");
                PublishStatus::PublishFailed
            }
        }
    }
}

#[derive(Debug)]
pub enum PublishOutcome {
    /// Construction scheduled
    Accepted(PublishTask),
    /// Not scheduled; the reason is also the stored status message unless
    /// another publish was in flight
    Rejected(String),
}

impl PublishOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Everything a publish task needs, owned so it can move onto the pool.
#[derive(Clone)]
struct PublishJob {
    services: Arc<dyn ServiceStore>,
    constructor: Arc<DatasetConstructor>,
    artifacts: Arc<ArtifactStore>,
    registry: Arc<ServiceRegistry>,
    timeout: Duration,
}

impl PublishJob {
    async fn run(self, service_id: String, setting: ServiceSetting) -> PublishStatus {
        let work = async {
            let table = self.constructor.construct(&service_id, &setting).await?;
            self.registry
                .register_service(&service_id)
                .await
                .map_err(|e| PirError::construction(e.to_string()))?;
            Ok::<_, PirError>(table)
        };

        let result = match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(PirError::construction(format!(
                "construction timed out after {}s",
                self.timeout.as_secs()
            ))),
        };

        let table = match result {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(
                    service_id = %service_id,
                    dataset_id = %setting.dataset_id,
                    error = %e,
                    "Publish PIR service failed"
                );
                self.constructor.discard(&service_id).await;
                let message = failure_message(&service_id, &e);
                let status = PublishStatus::PublishFailed;
                if let Err(e) = commit(&*self.services, &service_id, status, &message).await {
                    log_lost_commit(&service_id, status, &e);
                }
                return PublishStatus::PublishFailed;
            }
        };

        let status = PublishStatus::PublishSuccess;
        if let Err(e) = commit(&*self.services, &service_id, status, SUCCESS_MSG).await {
            log_lost_commit(&service_id, status, &e);
            self.constructor.discard(&service_id).await;
            return PublishStatus::PublishFailed;
        }

        self.artifacts.install(table);
        if let Err(e) = self.constructor.promote(&service_id).await {
            tracing::error!(
                service_id = %service_id,
                error = %e,
                "Failed to persist published table, it will not survive a restart"
            );
        }
        tracing::info!(
            service_id = %service_id,
            dataset_id = %setting.dataset_id,
            "Publish PIR service success"
        );
        PublishStatus::PublishSuccess
    }
}

/// Single terminal status write, retried on transient store errors.
async fn commit(
    services: &dyn ServiceStore,
    service_id: &str,
    status: PublishStatus,
    message: &str,
) -> std::result::Result<PublishedServiceInfo, StoreError> {
    let mut attempt = 1;
    loop {
        match services.finish_publish(service_id, status, message).await {
            Ok(info) => return Ok(info),
            Err(e) if attempt < COMMIT_ATTEMPTS && !matches!(e, StoreError::NotFound(_)) => {
                tracing::warn!(
                    service_id = %service_id,
                    status = %status,
                    attempt,
                    error = %e,
                    "Retrying publish status commit"
                );
                tokio::time::sleep(COMMIT_BACKOFF * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn log_lost_commit(service_id: &str, status: PublishStatus, error: &StoreError) {
    tracing::error!(
        service_id = %service_id,
        status = %status,
        error = %error,
        "Failed to commit publish status, the record is failed on next startup"
    );
}

/// Publishes services and tracks their status.
pub struct LifecycleManager {
    agency: String,
    pool: Arc<WorkerPool>,
    job: PublishJob,
}

impl LifecycleManager {
    pub fn new(
        agency: impl Into<String>,
        services: Arc<dyn ServiceStore>,
        constructor: Arc<DatasetConstructor>,
        artifacts: Arc<ArtifactStore>,
        registry: Arc<ServiceRegistry>,
        pool: Arc<WorkerPool>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            agency: agency.into(),
            pool,
            job: PublishJob {
                services,
                constructor,
                artifacts,
                registry,
                timeout: publish_timeout,
            },
        }
    }

    /// Claim `service_id` for a publish of `setting` and schedule its construction.
    pub async fn publish(
        &self,
        service_id: &str,
        setting: ServiceSetting,
    ) -> Result<PublishOutcome> {
        if service_id.trim().is_empty() {
            return Err(PirError::validation("Must define the serviceId"));
        }
        let services = &self.job.services;
        let config = setting.serialize()?;
        let claim = services
            .begin_publish(&PublishedServiceInfo::publishing(service_id, &self.agency, config))
            .await?;
        if claim == PublishClaim::InProgress {
            return Ok(PublishOutcome::Rejected(format!(
                "The service {} is already publishing",
                service_id
            )));
        }

        tracing::info!(
            service_id = %service_id,
            dataset_id = %setting.dataset_id,
            republish = claim == PublishClaim::Staged,
            "Publish PIR service"
        );

        if let Err(e) = setting.check() {
            let message = failure_message(service_id, &e);
            commit(&**services, service_id, PublishStatus::PublishFailed, &message).await?;
            return Ok(PublishOutcome::Rejected(message));
        }

        let job = self.job.clone();
        let task = job.run(service_id.to_string(), setting);
        match self.pool.submit(task) {
            Ok(handle) => Ok(PublishOutcome::Accepted(PublishTask {
                service_id: service_id.to_string(),
                handle,
            })),
            Err(e) => {
                let message = failure_message(service_id, &e);
                commit(&**services, service_id, PublishStatus::PublishFailed, &message).await?;
                Ok(PublishOutcome::Rejected(message))
            }
        }
    }

    pub async fn status(&self, service_id: &str) -> Result<Option<PublishedServiceInfo>> {
        Ok(self.job.services.get(service_id).await?)
    }

    /// Fail publishes left uncommitted by a previous process.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let stale: Vec<PublishedServiceInfo> = self
            .job
            .services
            .list(&self.agency, None)
            .await?
            .into_iter()
            .filter(PublishedServiceInfo::is_publishing)
            .collect();
        for info in &stale {
            let message = failure_message(&info.service_id, "interrupted by restart");
            self.job.constructor.discard(&info.service_id).await;
            commit(
                &*self.job.services,
                &info.service_id,
                PublishStatus::PublishFailed,
                &message,
            )
            .await?;
        }
        Ok(stale.len())
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("agency", &self.agency)
            .field("pool", &self.pool)
            .field("timeout", &self.job.timeout)
            .finish()
    }
}
