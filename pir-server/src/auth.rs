//! Credential verification for query requests
//!
//! A requester signs each query with the secret of a per-service grant:
//! `signature = hex(SHA3-256(secret, service_id, nonce, timestamp))` (see
//! [`pir_core::credential_signature`]). A credential passes when its grant is
//! live, its timestamp is fresh, its signature matches and its nonce has not
//! been seen within the freshness window.
//!
//! Seen nonces are kept in process memory, so replay protection covers a
//! single node.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pir_core::{credential_signature, CredentialInfo};
use subtle::ConstantTimeEq;

use crate::store::AuthStore;

/// Outcome of a credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Authorized,
    Denied(String),
}

impl AuthDecision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized)
    }
}

/// Decides whether a credential may query a service.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, service_id: &str, credential: &CredentialInfo) -> AuthDecision;
}

/// Seen-nonce count above which expired entries are swept.
const NONCE_SWEEP_THRESHOLD: usize = 4096;

/// Verifier backed by the grants in an [`AuthStore`].
pub struct StoreCredentialVerifier {
    store: Arc<dyn AuthStore>,
    max_age: Duration,
    /// (access_key_id, nonce) -> credential timestamp
    seen_nonces: DashMap<(String, String), i64>,
}

impl StoreCredentialVerifier {
    pub fn new(store: Arc<dyn AuthStore>, max_age: Duration) -> Self {
        Self {
            store,
            max_age,
            seen_nonces: DashMap::new(),
        }
    }

    /// Record the nonce of an otherwise valid credential; false on reuse.
    fn claim_nonce(&self, credential: &CredentialInfo, now: i64) -> bool {
        if self.seen_nonces.len() >= NONCE_SWEEP_THRESHOLD {
            let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
            self.seen_nonces
                .retain(|_, timestamp| now.saturating_sub(*timestamp) <= max_age);
        }

        let key = (credential.access_key_id.clone(), credential.nonce.clone());
        match self.seen_nonces.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(credential.timestamp);
                true
            }
        }
    }
}

#[async_trait]
impl CredentialVerifier for StoreCredentialVerifier {
    async fn verify(&self, service_id: &str, credential: &CredentialInfo) -> AuthDecision {
        let auth = match self
            .store
            .find_auth(service_id, &credential.access_key_id)
            .await
        {
            Ok(Some(auth)) => auth,
            Ok(None) => {
                return AuthDecision::Denied(format!(
                    "No grant for access key {} on service {}",
                    credential.access_key_id, service_id
                ))
            }
            Err(e) => {
                tracing::error!(
                    service_id = %service_id,
                    access_key_id = %credential.access_key_id,
                    error = %e,
                    "Auth store lookup failed"
                );
                return AuthDecision::Denied("Credential could not be verified".to_string());
            }
        };

        let now = Utc::now();
        if auth.is_expired(now) {
            return AuthDecision::Denied(format!(
                "Grant for access key {} has expired",
                credential.access_key_id
            ));
        }

        let age = now.timestamp().abs_diff(credential.timestamp);
        if age > self.max_age.as_secs() {
            return AuthDecision::Denied(format!(
                "Credential timestamp is outside the {}s freshness window",
                self.max_age.as_secs()
            ));
        }

        let expected = credential_signature(
            &auth.access_secret,
            service_id,
            credential.timestamp,
            &credential.nonce,
        );
        let matches: bool = expected
            .as_bytes()
            .ct_eq(credential.signature.to_ascii_lowercase().as_bytes())
            .into();
        if !matches {
            return AuthDecision::Denied("Credential signature mismatch".to_string());
        }

        if !self.claim_nonce(credential, now.timestamp()) {
            return AuthDecision::Denied("Credential nonce has already been used".to_string());
        }

        AuthDecision::Authorized
    }
}

impl std::fmt::Debug for StoreCredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCredentialVerifier")
            .field("max_age", &self.max_age)
            .field("seen_nonces", &self.seen_nonces.len())
            .finish()
    }
}
