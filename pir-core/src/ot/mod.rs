//! Oblivious-transfer obfuscation engine.
//!
//! Every matched row is encrypted under a key that only the requester can
//! rebuild, and only for the row whose key it blinded into its query item.
//!
//! Group: Ristretto255 with generator `G`; `h(k)` maps a key to a scalar.
//!
//! - requester: `X = aG` per query, `Y = bG` and `Z = (ab - h(k))G` per item
//! - server, per matched row `k'` with fresh `r, s`:
//!   `W = sX + rG`, `K = sZ + s·h(k')G + rY`, `cipher = payload ⊕ KDF(K)`
//! - requester: `K = bW`, which equals the server key iff `k' = k`
//!
//! ## No-match policy
//!
//! An item with no matched row yields an empty [`OtResult`]. Under `idFilter`
//! the requester learns that its filter bucket is empty, which the filter
//! already bounds; under `idObfuscation` it learns that none of its candidates
//! exist. The same encoding is used for every item of every query.

mod client;
mod dh;

pub use client::{ItemSecret, PirClient, QuerySecrets};
pub use dh::{IdFilterObfuscator, IdObfuscationObfuscator};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::{Sha3_512, Shake256};

use crate::error::{PirError, Result};
use crate::query::{ObfuscateData, ObfuscateDataItem};
use crate::setting::SearchType;
use crate::table::PirRecord;

/// Version of the obfuscation wire protocol carried in `ObfuscateData`.
pub const OT_PROTOCOL_VERSION: u8 = 1;

const KDF_DOMAIN: &[u8] = b"pir-ot-v1";

/// Closed set of obfuscation algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmType {
    /// Rows are selected by a prefix of the key hash.
    #[serde(rename = "idFilter")]
    IdFilter,
    /// Rows are selected from a candidate key set of real-looking decoys.
    #[serde(rename = "idObfuscation")]
    IdObfuscation,
}

impl AlgorithmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdFilter => "idFilter",
            Self::IdObfuscation => "idObfuscation",
        }
    }
}

impl fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmType {
    type Err = PirError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "idFilter" => Ok(Self::IdFilter),
            "idObfuscation" => Ok(Self::IdObfuscation),
            other => Err(PirError::obfuscation(format!(
                "Unsupported algorithm type: {}",
                other
            ))),
        }
    }
}

/// One encrypted candidate row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtResultItem {
    /// Hex-encoded `W = sX + rG`
    pub point_w: String,
    /// Base64-encoded payload masked with `KDF(K)`
    pub cipher: String,
}

/// Obfuscated answer for one query item; empty means no row matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtResult {
    pub items: Vec<OtResultItem>,
}

impl OtResult {
    pub fn new(items: Vec<OtResultItem>) -> Self {
        Self { items }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Plaintext encrypted for each matched row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtPayload {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<BTreeMap<String, String>>,
}

impl OtPayload {
    pub fn from_record(record: &PirRecord, search_type: SearchType) -> Self {
        let values = match search_type {
            SearchType::SearchExist => None,
            SearchType::SearchValue => Some(record.values.clone()),
        };
        Self {
            key: record.key.clone(),
            values,
        }
    }
}

/// Obfuscation context for one query item.
#[derive(Debug, Clone)]
pub struct ObfuscationParam {
    point_x: RistrettoPoint,
    algorithm: AlgorithmType,
    search_type: SearchType,
    index: Option<u32>,
}

impl ObfuscationParam {
    pub fn new(
        data: &ObfuscateData,
        algorithm: AlgorithmType,
        search_type: SearchType,
    ) -> Result<Self> {
        Ok(Self {
            point_x: decode_point(&data.point_x)?,
            algorithm,
            search_type,
            index: None,
        })
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    pub fn point_x(&self) -> &RistrettoPoint {
        &self.point_x
    }

    pub fn algorithm(&self) -> AlgorithmType {
        self.algorithm
    }

    pub fn search_type(&self) -> SearchType {
        self.search_type
    }

    pub fn index(&self) -> Option<u32> {
        self.index
    }
}

/// One obfuscation algorithm.
///
/// Implementations must only read the rows and item they are handed.
pub trait Obfuscator: Send + Sync {
    fn algorithm(&self) -> AlgorithmType;

    /// Reject an item whose lookup material does not fit this algorithm.
    fn check_item(&self, item: &ObfuscateDataItem) -> Result<()>;

    fn obfuscate(
        &self,
        param: &ObfuscationParam,
        rows: &[PirRecord],
        item: &ObfuscateDataItem,
    ) -> Result<Vec<OtResultItem>>;
}

/// Registry of obfuscators keyed by algorithm.
#[derive(Clone)]
pub struct ObfuscationEngine {
    obfuscators: HashMap<AlgorithmType, Arc<dyn Obfuscator>>,
}

impl ObfuscationEngine {
    /// Engine with no algorithms registered.
    pub fn empty() -> Self {
        Self {
            obfuscators: HashMap::new(),
        }
    }

    pub fn register(mut self, obfuscator: Arc<dyn Obfuscator>) -> Self {
        self.obfuscators.insert(obfuscator.algorithm(), obfuscator);
        self
    }

    pub fn supports(&self, algorithm: AlgorithmType) -> bool {
        self.obfuscators.contains_key(&algorithm)
    }

    fn obfuscator(&self, algorithm: AlgorithmType) -> Result<&Arc<dyn Obfuscator>> {
        self.obfuscators.get(&algorithm).ok_or_else(|| {
            PirError::obfuscation(format!("No obfuscator registered for {}", algorithm))
        })
    }

    /// Parse a wire algorithm name and make sure it can be served.
    pub fn resolve(&self, algorithm_type: &str) -> Result<AlgorithmType> {
        let algorithm = algorithm_type.parse::<AlgorithmType>()?;
        self.obfuscator(algorithm)?;
        Ok(algorithm)
    }

    pub fn check_items(&self, algorithm: AlgorithmType, items: &[ObfuscateDataItem]) -> Result<()> {
        let obfuscator = self.obfuscator(algorithm)?;
        items.iter().try_for_each(|item| obfuscator.check_item(item))
    }

    /// Encode the rows matched for one item. No rows yields an empty result.
    pub fn obfuscate(
        &self,
        param: &ObfuscationParam,
        rows: &[PirRecord],
        item: &ObfuscateDataItem,
    ) -> Result<Vec<OtResultItem>> {
        let obfuscator = self.obfuscator(param.algorithm())?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(
            algorithm = %param.algorithm(),
            index = ?param.index(),
            rows = rows.len(),
            "Obfuscating matched rows"
        );
        obfuscator.obfuscate(param, rows, item)
    }
}

impl Default for ObfuscationEngine {
    fn default() -> Self {
        Self::empty()
            .register(Arc::new(IdFilterObfuscator))
            .register(Arc::new(IdObfuscationObfuscator))
    }
}

impl fmt::Debug for ObfuscationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut algorithms: Vec<_> = self.obfuscators.keys().map(|a| a.as_str()).collect();
        algorithms.sort_unstable();
        f.debug_struct("ObfuscationEngine")
            .field("algorithms", &algorithms)
            .finish()
    }
}

pub fn encode_point(point: &RistrettoPoint) -> String {
    hex::encode(point.compress().to_bytes())
}

pub fn decode_point(encoded: &str) -> Result<RistrettoPoint> {
    let bytes = hex::decode(encoded)
        .map_err(|e| PirError::validation(format!("Invalid point encoding: {}", e)))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| PirError::validation("Invalid point encoding: expected 32 bytes"))?;
    CompressedRistretto(bytes)
        .decompress()
        .ok_or_else(|| PirError::validation("Invalid point encoding: not a group element"))
}

/// Map a lookup key to a scalar.
pub(crate) fn hash_to_scalar(key: &str) -> Scalar {
    let digest = <Sha3_512 as sha3::Digest>::digest(key.as_bytes());
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&digest);
    Scalar::from_bytes_mod_order_wide(&wide)
}

pub(crate) fn random_scalar(rng: &mut impl RngCore) -> Scalar {
    let mut wide = [0u8; 64];
    rng.fill_bytes(&mut wide);
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// XOR `data` with a SHAKE256 stream derived from the shared point.
pub(crate) fn mask(shared: &RistrettoPoint, data: &[u8]) -> Vec<u8> {
    let mut hasher = Shake256::default();
    hasher.update(KDF_DOMAIN);
    hasher.update(&shared.compress().to_bytes());
    let mut reader = hasher.finalize_xof();

    let mut stream = vec![0u8; data.len()];
    reader.read(&mut stream);
    data.iter().zip(stream).map(|(d, s)| d ^ s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_type_parse() {
        assert_eq!("idFilter".parse::<AlgorithmType>().unwrap(), AlgorithmType::IdFilter);
        assert_eq!(
            "idObfuscation".parse::<AlgorithmType>().unwrap(),
            AlgorithmType::IdObfuscation
        );
        assert!(matches!(
            "IDFILTER".parse::<AlgorithmType>(),
            Err(PirError::Obfuscation(_))
        ));
    }

    #[test]
    fn test_engine_without_algorithm_rejects() {
        let engine = ObfuscationEngine::empty().register(Arc::new(IdFilterObfuscator));
        assert!(engine.resolve("idFilter").is_ok());
        assert!(matches!(
            engine.resolve("idObfuscation"),
            Err(PirError::Obfuscation(_))
        ));
    }

    #[test]
    fn test_point_encoding_roundtrip() {
        let point = RistrettoPoint::mul_base(&random_scalar(&mut rand::rngs::OsRng));
        let encoded = encode_point(&point);
        assert_eq!(decode_point(&encoded).unwrap(), point);
    }

    #[test]
    fn test_decode_point_rejects_garbage() {
        assert!(decode_point("zz").is_err());
        assert!(decode_point(&hex::encode([1u8; 31])).is_err());
        // Not a canonical ristretto encoding
        assert!(decode_point(&hex::encode([0xffu8; 32])).is_err());
    }

    #[test]
    fn test_mask_is_involution() {
        let point = RistrettoPoint::mul_base(&Scalar::from(7u64));
        let data = b"{\"key\":\"alice\"}";
        let masked = mask(&point, data);
        assert_ne!(masked.as_slice(), data.as_slice());
        assert_eq!(mask(&point, &masked), data.to_vec());
    }

    #[test]
    fn test_hash_to_scalar_is_deterministic() {
        assert_eq!(hash_to_scalar("alice"), hash_to_scalar("alice"));
        assert_ne!(hash_to_scalar("alice"), hash_to_scalar("bob"));
    }
}
