//! Requester side of the protocol.
//!
//! [`PirClient`] builds blinded query items for a list of keys and decodes the
//! server's answer with the secrets it kept. Services use it as the reference
//! decoder in tests; requesters embed it directly.
//!
//! `idObfuscation` candidates travel in plaintext, so decoys must be keys the
//! service is as likely to hold as the real one. They are drawn uniformly from
//! a requester-supplied decoy pool (for example a published key list or the
//! requester's own population); a client without a pool refuses to build
//! `idObfuscation` queries.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use zeroize::Zeroize;

use super::{
    decode_point, encode_point, hash_to_scalar, mask, random_scalar, AlgorithmType, OtPayload,
    OtResult, OT_PROTOCOL_VERSION,
};
use crate::error::{PirError, Result};
use crate::query::{
    ObfuscateData, ObfuscateDataItem, ObfuscateQueryResult, QueryParam, QueryRequest,
};
use crate::table::key_hash;

/// Default number of hex characters of the key hash sent as `idFilter`.
pub const DEFAULT_FILTER_LENGTH: usize = 4;

/// Default number of decoys drawn for each `idObfuscation` key.
pub const DEFAULT_DECOYS: usize = 7;

/// Secret kept by the requester for one item.
pub struct ItemSecret {
    key: String,
    b: Scalar,
}

impl ItemSecret {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Recover the addressed row from one item's answer, if present.
    pub fn decode(&self, result: &OtResult) -> Option<OtPayload> {
        result.items.iter().find_map(|item| {
            let w = decode_point(&item.point_w).ok()?;
            let cipher = BASE64.decode(&item.cipher).ok()?;
            let plaintext = mask(&(self.b * w), &cipher);
            let payload: OtPayload = serde_json::from_slice(&plaintext).ok()?;
            (payload.key == self.key).then_some(payload)
        })
    }
}

impl Drop for ItemSecret {
    fn drop(&mut self) {
        self.key.zeroize();
        self.b.zeroize();
    }
}

/// Secrets for one query, aligned with its items.
pub struct QuerySecrets {
    a: Scalar,
    items: Vec<ItemSecret>,
}

impl QuerySecrets {
    pub fn items(&self) -> &[ItemSecret] {
        &self.items
    }
}

impl Drop for QuerySecrets {
    fn drop(&mut self) {
        self.a.zeroize();
    }
}

impl std::fmt::Debug for QuerySecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySecrets")
            .field("items", &self.items.len())
            .field("scalars", &"[REDACTED]")
            .finish()
    }
}

/// Builds queries and decodes answers for one algorithm.
#[derive(Clone)]
pub struct PirClient {
    algorithm: AlgorithmType,
    filter_length: usize,
    decoys: usize,
    decoy_pool: Vec<String>,
}

impl PirClient {
    pub fn new(algorithm: AlgorithmType) -> Self {
        Self {
            algorithm,
            filter_length: DEFAULT_FILTER_LENGTH,
            decoys: DEFAULT_DECOYS,
            decoy_pool: Vec::new(),
        }
    }

    /// Number of key-hash hex characters revealed per `idFilter` item.
    pub fn with_filter_length(mut self, filter_length: usize) -> Self {
        self.filter_length = filter_length.clamp(1, 64);
        self
    }

    /// Number of decoys mixed into each `idObfuscation` item.
    pub fn with_decoys(mut self, decoys: usize) -> Self {
        self.decoys = decoys;
        self
    }

    /// Keys `idObfuscation` decoys are drawn from. Duplicates are ignored.
    pub fn with_decoy_pool<I, S>(mut self, pool: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pool: Vec<String> = pool
            .into_iter()
            .map(Into::into)
            .filter(|k| !k.is_empty())
            .collect();
        pool.sort();
        pool.dedup();
        self.decoy_pool = pool;
        self
    }

    pub fn algorithm(&self) -> AlgorithmType {
        self.algorithm
    }

    /// Blind `keys` into a request; `query_param.algorithm_type` is overwritten.
    pub fn build_query(
        &self,
        mut query_param: QueryParam,
        keys: &[&str],
    ) -> Result<(QueryRequest, QuerySecrets)> {
        if keys.is_empty() {
            return Err(PirError::validation("Must query at least one key"));
        }
        query_param.algorithm_type = self.algorithm.to_string();

        let mut rng = OsRng;
        let a = random_scalar(&mut rng);
        let point_x = RistrettoPoint::mul_base(&a);

        let mut items = Vec::with_capacity(keys.len());
        let mut secrets = Vec::with_capacity(keys.len());
        for (index, key) in keys.iter().enumerate() {
            let b = random_scalar(&mut rng);
            let point_y = RistrettoPoint::mul_base(&b);
            let point_z = RistrettoPoint::mul_base(&(a * b - hash_to_scalar(key)));

            let (filter, candidates) = match self.algorithm {
                AlgorithmType::IdFilter => {
                    let prefix = key_hash(key)[..self.filter_length].to_string();
                    (Some(prefix), Vec::new())
                }
                AlgorithmType::IdObfuscation => (None, self.candidates(key, &mut rng)?),
            };

            items.push(ObfuscateDataItem {
                id_index: index as u32,
                filter,
                candidates,
                point_y: encode_point(&point_y),
                point_z: encode_point(&point_z),
            });
            secrets.push(ItemSecret {
                key: key.to_string(),
                b,
            });
        }

        let request = QueryRequest {
            query_param,
            obfuscate_data: ObfuscateData {
                version: OT_PROTOCOL_VERSION,
                point_x: encode_point(&point_x),
                items,
            },
        };
        Ok((request, QuerySecrets { a, items: secrets }))
    }

    /// Decode an answer into one entry per queried key.
    pub fn decode(
        &self,
        secrets: &QuerySecrets,
        result: &ObfuscateQueryResult,
    ) -> Result<Vec<Option<OtPayload>>> {
        if result.ot_results.len() != secrets.items.len() {
            return Err(PirError::validation(format!(
                "Answer has {} results for {} queried keys",
                result.ot_results.len(),
                secrets.items.len()
            )));
        }
        Ok(secrets
            .items
            .iter()
            .zip(&result.ot_results)
            .map(|(secret, ot_result)| secret.decode(ot_result))
            .collect())
    }

    /// The key shuffled among up to `decoys` distinct pool keys.
    fn candidates(&self, key: &str, rng: &mut OsRng) -> Result<Vec<String>> {
        let pool: Vec<&String> = self.decoy_pool.iter().filter(|k| *k != key).collect();
        if pool.is_empty() || self.decoys == 0 {
            return Err(PirError::validation(
                "idObfuscation needs a decoy pool with keys besides the queried one",
            ));
        }

        let mut candidates: Vec<String> = pool
            .choose_multiple(rng, self.decoys)
            .map(|k| k.to_string())
            .collect();
        candidates.push(key.to_string());
        candidates.shuffle(rng);
        Ok(candidates)
    }
}

impl std::fmt::Debug for PirClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PirClient")
            .field("algorithm", &self.algorithm)
            .field("filter_length", &self.filter_length)
            .field("decoys", &self.decoys)
            .field("decoy_pool", &self.decoy_pool.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::CredentialInfo;
    use crate::setting::SearchType;

    fn param() -> QueryParam {
        QueryParam {
            service_id: "svc".into(),
            search_type: SearchType::SearchExist,
            algorithm_type: String::new(),
            credential: CredentialInfo {
                access_key_id: "ak".into(),
                timestamp: 0,
                nonce: "n".into(),
                signature: "00".into(),
            },
        }
    }

    #[test]
    fn test_filter_query_items() {
        let client = PirClient::new(AlgorithmType::IdFilter).with_filter_length(6);
        let (request, secrets) = client.build_query(param(), &["alice", "bob"]).unwrap();

        assert_eq!(request.query_param.algorithm_type, "idFilter");
        assert_eq!(request.obfuscate_data.items.len(), 2);
        assert_eq!(secrets.items().len(), 2);
        let item = &request.obfuscate_data.items[1];
        assert_eq!(item.id_index, 1);
        assert_eq!(item.filter.as_deref(), Some(&key_hash("bob")[..6]));
        assert!(item.candidates.is_empty());
        assert!(request.check(16).is_ok());
    }

    fn pool() -> Vec<String> {
        (0..20).map(|i| format!("user-{}", i)).collect()
    }

    #[test]
    fn test_obfuscation_decoys_come_from_pool() {
        let client = PirClient::new(AlgorithmType::IdObfuscation)
            .with_decoys(5)
            .with_decoy_pool(pool());
        let (request, _) = client.build_query(param(), &["user-3"]).unwrap();

        let item = &request.obfuscate_data.items[0];
        assert_eq!(item.candidates.len(), 6);
        assert!(item.filter.is_none());
        assert_eq!(item.candidates.iter().filter(|c| *c == "user-3").count(), 1);
        assert!(item.candidates.iter().all(|c| pool().contains(c)));
    }

    #[test]
    fn test_obfuscation_without_pool_rejected() {
        let client = PirClient::new(AlgorithmType::IdObfuscation);
        assert!(client.build_query(param(), &["alice"]).is_err());

        let only_self = PirClient::new(AlgorithmType::IdObfuscation).with_decoy_pool(["alice"]);
        assert!(only_self.build_query(param(), &["alice"]).is_err());
    }

    #[test]
    fn test_small_pool_uses_every_decoy() {
        let client = PirClient::new(AlgorithmType::IdObfuscation)
            .with_decoys(10)
            .with_decoy_pool(["a", "b", "b", "target"]);
        let (request, _) = client.build_query(param(), &["target"]).unwrap();

        let mut candidates = request.obfuscate_data.items[0].candidates.clone();
        candidates.sort();
        assert_eq!(candidates, vec!["a", "b", "target"]);
    }

    #[test]
    fn test_empty_keys_rejected() {
        let client = PirClient::new(AlgorithmType::IdFilter);
        assert!(client.build_query(param(), &[]).is_err());
    }

    #[test]
    fn test_decode_length_mismatch_rejected() {
        let client = PirClient::new(AlgorithmType::IdFilter);
        let (_, secrets) = client.build_query(param(), &["alice"]).unwrap();
        let result = ObfuscateQueryResult::new("ds", "idFilter");
        assert!(client.decode(&secrets, &result).is_err());
    }

    #[test]
    fn test_secrets_debug_is_redacted() {
        let client = PirClient::new(AlgorithmType::IdFilter);
        let (_, secrets) = client.build_query(param(), &["alice"]).unwrap();
        let rendered = format!("{:?}", secrets);
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("alice"));
    }
}
