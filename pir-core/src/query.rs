//! Query request and response types exchanged with requesters.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::error::{ErrorKind, PirError, Result};
use crate::ot::{decode_point, OtResult, OT_PROTOCOL_VERSION};
use crate::setting::SearchType;

/// Requester credential presented with every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialInfo {
    pub access_key_id: String,
    /// Unix timestamp (seconds) at which the signature was produced
    pub timestamp: i64,
    pub nonce: String,
    /// Hex-encoded request signature
    pub signature: String,
}

/// Hex signature binding a credential to one service.
///
/// Every field is length-prefixed so no two inputs share an encoding.
pub fn credential_signature(
    access_secret: &str,
    service_id: &str,
    timestamp: i64,
    nonce: &str,
) -> String {
    let mut hasher = Sha3_256::new();
    for part in [access_secret.as_bytes(), service_id.as_bytes(), nonce.as_bytes()] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hasher.update(timestamp.to_be_bytes());
    hex::encode(hasher.finalize())
}

impl CredentialInfo {
    /// Build a signed credential for `service_id`.
    pub fn sign(
        access_key_id: impl Into<String>,
        access_secret: &str,
        service_id: &str,
        timestamp: i64,
        nonce: impl Into<String>,
    ) -> Self {
        let nonce = nonce.into();
        let signature = credential_signature(access_secret, service_id, timestamp, &nonce);
        Self {
            access_key_id: access_key_id.into(),
            timestamp,
            nonce,
            signature,
        }
    }

    fn check(&self) -> Result<()> {
        if self.access_key_id.trim().is_empty() {
            return Err(PirError::validation("Must define the accessKeyId"));
        }
        if self.nonce.is_empty() {
            return Err(PirError::validation("Must define the credential nonce"));
        }
        if self.signature.is_empty() {
            return Err(PirError::validation("Must define the credential signature"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParam {
    pub service_id: String,
    pub search_type: SearchType,
    /// Wire name of the obfuscation algorithm; parsed by the engine
    pub algorithm_type: String,
    pub credential: CredentialInfo,
}

/// Per-key query material supplied by the requester.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObfuscateDataItem {
    pub id_index: u32,
    /// Key-hash prefix (`idFilter`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Queried key shuffled among pool-drawn decoys (`idObfuscation`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
    /// Hex-encoded blinding point `Y = bG`
    pub point_y: String,
    /// Hex-encoded blinding point `Z = (ab - h(k))G`
    pub point_z: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObfuscateData {
    pub version: u8,
    /// Hex-encoded requester point `X = aG`
    pub point_x: String,
    pub items: Vec<ObfuscateDataItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query_param: QueryParam,
    pub obfuscate_data: ObfuscateData,
}

impl QueryRequest {
    /// Structural validation; no service state is consulted.
    pub fn check(&self, max_items: usize) -> Result<()> {
        if self.query_param.service_id.trim().is_empty() {
            return Err(PirError::validation("Must define the serviceId"));
        }
        self.query_param.credential.check()?;

        let data = &self.obfuscate_data;
        if data.version != OT_PROTOCOL_VERSION {
            return Err(PirError::obfuscation(format!(
                "Unsupported obfuscation protocol version {} (current: {})",
                data.version, OT_PROTOCOL_VERSION
            )));
        }
        if data.items.is_empty() {
            return Err(PirError::validation("Must define at least one query item"));
        }
        if data.items.len() > max_items {
            return Err(PirError::validation(format!(
                "Too many query items: {} exceeds maximum of {}",
                data.items.len(),
                max_items
            )));
        }

        decode_point(&data.point_x)?;
        for item in &data.items {
            decode_point(&item.point_y)?;
            decode_point(&item.point_z)?;
        }
        Ok(())
    }
}

/// Ordered per-item results of one successful query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObfuscateQueryResult {
    pub dataset_id: String,
    pub algorithm_type: String,
    pub ot_results: Vec<OtResult>,
}

impl ObfuscateQueryResult {
    pub fn new(dataset_id: impl Into<String>, algorithm_type: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            algorithm_type: algorithm_type.into(),
            ot_results: Vec::new(),
        }
    }
}

/// Outcome of one query, returned to direct callers and topic senders alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryResponse {
    Success {
        #[serde(flatten)]
        result: ObfuscateQueryResult,
    },
    Failure {
        #[serde(skip_serializing_if = "Option::is_none")]
        dataset_id: Option<String>,
        kind: ErrorKind,
        message: String,
    },
}

impl QueryResponse {
    pub fn failure(dataset_id: Option<String>, error: &PirError) -> Self {
        let message = match &dataset_id {
            Some(dataset_id) => {
                format!("Pir query failed for {}, datasetID: {}", error, dataset_id)
            }
            None => format!("Pir query failed for {}", error),
        };
        Self::Failure {
            dataset_id,
            kind: error.kind(),
            message,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn result(&self) -> Option<&ObfuscateQueryResult> {
        match self {
            Self::Success { result } => Some(result),
            Self::Failure { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }
}
