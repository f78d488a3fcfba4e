//! Service store module
//!
//! Persists the records a PIR deployment needs across restarts:
//! - **Published services**: status and serialized setting per service
//! - **Access grants**: per-service credentials checked on every query
//! - **Invocations**: one audit row per authorized query
//!
//! Uses PostgreSQL when `DATABASE_URL` is configured, otherwise an in-memory
//! store (records are lost on restart).

pub mod error;
mod memory;
mod postgres;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Publish status of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublishStatus {
    Publishing,
    PublishSuccess,
    PublishFailed,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publishing => "Publishing",
            Self::PublishSuccess => "PublishSuccess",
            Self::PublishFailed => "PublishFailed",
        }
    }

    /// Only successfully published services answer queries.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::PublishSuccess)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Publishing)
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Publishing" => Ok(Self::Publishing),
            "PublishSuccess" => Ok(Self::PublishSuccess),
            "PublishFailed" => Ok(Self::PublishFailed),
            other => Err(StoreError::Serialization(format!(
                "Unknown publish status: {}",
                other
            ))),
        }
    }
}

/// Status record of one published service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedServiceInfo {
    pub service_id: String,
    /// Agency owning the service
    pub agency: String,
    pub status: PublishStatus,
    pub status_msg: String,
    /// Serialized `ServiceSetting` JSON
    pub service_config: String,
    /// Setting of a republish running over a live service
    #[serde(default)]
    pub pending_config: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PublishedServiceInfo {
    /// Fresh record entering `Publishing`.
    pub fn publishing(
        service_id: impl Into<String>,
        agency: impl Into<String>,
        service_config: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            service_id: service_id.into(),
            agency: agency.into(),
            status: PublishStatus::Publishing,
            status_msg: String::new(),
            service_config: service_config.into(),
            pending_config: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A publish of this service has not committed yet.
    pub fn is_publishing(&self) -> bool {
        self.status == PublishStatus::Publishing || self.pending_config.is_some()
    }
}

/// Result of claiming a service for a new publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishClaim {
    /// Record created or reset to `Publishing` with the new setting
    Started,
    /// Live record left serving; the new setting waits in `pending_config`
    Staged,
    /// Another publish of the service has not committed yet
    InProgress,
}

/// Access grant for one requester on one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAuth {
    pub service_id: String,
    pub access_key_id: String,
    #[serde(skip_serializing)]
    pub access_secret: String,
    /// No expiry when absent
    pub expire_at: Option<DateTime<Utc>>,
}

impl ServiceAuth {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvokeStatus {
    Success,
    Failed,
}

impl InvokeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
        }
    }
}

impl FromStr for InvokeStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Success" => Ok(Self::Success),
            "Failed" => Ok(Self::Failed),
            other => Err(StoreError::Serialization(format!(
                "Unknown invoke status: {}",
                other
            ))),
        }
    }
}

/// Audit record of one authorized query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeRecord {
    pub invoke_id: Uuid,
    pub service_id: String,
    /// Access key that issued the query
    pub invoker: String,
    pub status: InvokeStatus,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Published service records and invocation audit.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn get(&self, service_id: &str) -> Result<Option<PublishedServiceInfo>, StoreError>;

    /// Insert or fully replace a record.
    async fn upsert(&self, info: &PublishedServiceInfo) -> Result<(), StoreError>;

    /// Atomically claim `info.service_id` for a publish of `info.service_config`.
    ///
    /// Absent or failed records become `info`. A `PublishSuccess` record keeps
    /// its status and setting and stores the new one as pending. A record with
    /// an uncommitted publish is left alone.
    async fn begin_publish(
        &self,
        info: &PublishedServiceInfo,
    ) -> Result<PublishClaim, StoreError>;

    /// Single-write terminal transition; fails when the record is missing.
    ///
    /// With a pending setting, success promotes it and failure drops it; the
    /// record stays `PublishSuccess` either way. Returns the stored record.
    async fn finish_publish(
        &self,
        service_id: &str,
        status: PublishStatus,
        status_msg: &str,
    ) -> Result<PublishedServiceInfo, StoreError>;

    /// Records of `agency`, optionally restricted to one status.
    async fn list(
        &self,
        agency: &str,
        status: Option<PublishStatus>,
    ) -> Result<Vec<PublishedServiceInfo>, StoreError>;

    async fn record_invocation(&self, record: &InvokeRecord) -> Result<(), StoreError>;

    async fn invocations(&self, service_id: &str) -> Result<Vec<InvokeRecord>, StoreError>;

    /// Backend connectivity check (always Ok for memory backends).
    async fn check_health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Per-service access grants.
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn find_auth(
        &self,
        service_id: &str,
        access_key_id: &str,
    ) -> Result<Option<ServiceAuth>, StoreError>;

    async fn grant(&self, auth: &ServiceAuth) -> Result<(), StoreError>;
}
