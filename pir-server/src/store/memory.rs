//! In-memory store backed by `DashMap` (development and tests).

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{
    AuthStore, InvokeRecord, PublishClaim, PublishStatus, PublishedServiceInfo, ServiceAuth,
    ServiceStore, StoreError,
};

/// Thread-safe in-memory service, auth and invocation storage
#[derive(Default)]
pub struct MemoryStore {
    /// service_id -> status record
    services: DashMap<String, PublishedServiceInfo>,
    /// (service_id, access_key_id) -> grant
    auths: DashMap<(String, String), ServiceAuth>,
    /// service_id -> invocations in arrival order
    invocations: DashMap<String, Vec<InvokeRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceStore for MemoryStore {
    async fn get(&self, service_id: &str) -> Result<Option<PublishedServiceInfo>, StoreError> {
        Ok(self.services.get(service_id).map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, info: &PublishedServiceInfo) -> Result<(), StoreError> {
        let mut info = info.clone();
        if let Some(existing) = self.services.get(&info.service_id) {
            info.created_at = existing.created_at;
        }
        self.services.insert(info.service_id.clone(), info);
        Ok(())
    }

    async fn begin_publish(
        &self,
        info: &PublishedServiceInfo,
    ) -> Result<PublishClaim, StoreError> {
        match self.services.entry(info.service_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(info.clone());
                Ok(PublishClaim::Started)
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if existing.is_publishing() {
                    return Ok(PublishClaim::InProgress);
                }
                if existing.status == PublishStatus::PublishSuccess {
                    existing.pending_config = Some(info.service_config.clone());
                    existing.updated_at = Utc::now();
                    return Ok(PublishClaim::Staged);
                }
                *existing = PublishedServiceInfo {
                    created_at: existing.created_at,
                    ..info.clone()
                };
                Ok(PublishClaim::Started)
            }
        }
    }

    async fn finish_publish(
        &self,
        service_id: &str,
        status: PublishStatus,
        status_msg: &str,
    ) -> Result<PublishedServiceInfo, StoreError> {
        let mut entry = self
            .services
            .get_mut(service_id)
            .ok_or_else(|| StoreError::NotFound(service_id.to_string()))?;
        match entry.pending_config.take() {
            Some(config) if status == PublishStatus::PublishSuccess => {
                entry.service_config = config;
            }
            Some(_) => {}
            None => entry.status = status,
        }
        entry.status_msg = status_msg.to_string();
        entry.updated_at = Utc::now();
        Ok(entry.value().clone())
    }

    async fn list(
        &self,
        agency: &str,
        status: Option<PublishStatus>,
    ) -> Result<Vec<PublishedServiceInfo>, StoreError> {
        let mut services: Vec<_> = self
            .services
            .iter()
            .filter(|entry| entry.agency == agency)
            .filter(|entry| status.map_or(true, |s| entry.status == s))
            .map(|entry| entry.value().clone())
            .collect();
        services.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        Ok(services)
    }

    async fn record_invocation(&self, record: &InvokeRecord) -> Result<(), StoreError> {
        self.invocations
            .entry(record.service_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn invocations(&self, service_id: &str) -> Result<Vec<InvokeRecord>, StoreError> {
        Ok(self
            .invocations
            .get(service_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn find_auth(
        &self,
        service_id: &str,
        access_key_id: &str,
    ) -> Result<Option<ServiceAuth>, StoreError> {
        let key = (service_id.to_string(), access_key_id.to_string());
        Ok(self.auths.get(&key).map(|entry| entry.value().clone()))
    }

    async fn grant(&self, auth: &ServiceAuth) -> Result<(), StoreError> {
        let key = (auth.service_id.clone(), auth.access_key_id.clone());
        self.auths.insert(key, auth.clone());
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("services", &self.services.len())
            .field("auths", &self.auths.len())
            .field("invocations", &self.invocations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_finish_publish_requires_record() {
        let store = MemoryStore::new();
        let result = store
            .finish_publish("missing", PublishStatus::PublishSuccess, "")
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_begin_publish_claims_once() {
        let store = MemoryStore::new();
        let info = PublishedServiceInfo::publishing("svc", "agency", "{\"v\":1}");
        assert_eq!(store.begin_publish(&info).await.unwrap(), PublishClaim::Started);
        assert_eq!(store.begin_publish(&info).await.unwrap(), PublishClaim::InProgress);

        store
            .finish_publish("svc", PublishStatus::PublishFailed, "boom")
            .await
            .unwrap();
        assert_eq!(store.begin_publish(&info).await.unwrap(), PublishClaim::Started);
    }

    #[tokio::test]
    async fn test_republish_stages_setting_until_commit() {
        let store = MemoryStore::new();
        let v1 = PublishedServiceInfo::publishing("svc", "agency", "{\"v\":1}");
        store.begin_publish(&v1).await.unwrap();
        store
            .finish_publish("svc", PublishStatus::PublishSuccess, "success")
            .await
            .unwrap();

        let v2 = PublishedServiceInfo::publishing("svc", "agency", "{\"v\":2}");
        assert_eq!(store.begin_publish(&v2).await.unwrap(), PublishClaim::Staged);
        assert_eq!(store.begin_publish(&v2).await.unwrap(), PublishClaim::InProgress);

        let live = store.get("svc").await.unwrap().unwrap();
        assert_eq!(live.status, PublishStatus::PublishSuccess);
        assert_eq!(live.service_config, "{\"v\":1}");

        let failed = store
            .finish_publish("svc", PublishStatus::PublishFailed, "boom")
            .await
            .unwrap();
        assert_eq!(failed.status, PublishStatus::PublishSuccess);
        assert_eq!(failed.service_config, "{\"v\":1}");
        assert!(failed.pending_config.is_none());

        store.begin_publish(&v2).await.unwrap();
        let promoted = store
            .finish_publish("svc", PublishStatus::PublishSuccess, "success")
            .await
            .unwrap();
        assert_eq!(promoted.service_config, "{\"v\":2}");
        assert!(!promoted.is_publishing());
    }

    #[tokio::test]
    async fn test_upsert_keeps_created_at() {
        let store = MemoryStore::new();
        let first = PublishedServiceInfo::publishing("svc", "agency", "{}");
        store.upsert(&first).await.unwrap();

        let mut second = PublishedServiceInfo::publishing("svc", "agency", "{\"v\":2}");
        second.created_at = Utc::now() + chrono::Duration::hours(1);
        store.upsert(&second).await.unwrap();

        let stored = store.get("svc").await.unwrap().unwrap();
        assert_eq!(stored.created_at, first.created_at);
        assert_eq!(stored.service_config, "{\"v\":2}");
    }

    #[tokio::test]
    async fn test_list_filters_agency_and_status() {
        let store = MemoryStore::new();
        for (id, agency) in [("a", "agency-1"), ("b", "agency-1"), ("c", "agency-2")] {
            store
                .upsert(&PublishedServiceInfo::publishing(id, agency, "{}"))
                .await
                .unwrap();
        }
        store
            .finish_publish("b", PublishStatus::PublishSuccess, "success")
            .await
            .unwrap();

        let all = store.list("agency-1", None).await.unwrap();
        assert_eq!(all.len(), 2);
        let ready = store
            .list("agency-1", Some(PublishStatus::PublishSuccess))
            .await
            .unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].service_id, "b");
    }

    #[tokio::test]
    async fn test_grant_and_find() {
        let store = MemoryStore::new();
        let auth = ServiceAuth {
            service_id: "svc".into(),
            access_key_id: "ak".into(),
            access_secret: "secret".into(),
            expire_at: None,
        };
        store.grant(&auth).await.unwrap();
        assert_eq!(store.find_auth("svc", "ak").await.unwrap(), Some(auth));
        assert!(store.find_auth("svc", "other").await.unwrap().is_none());
        assert!(store.find_auth("other", "ak").await.unwrap().is_none());
    }
}
