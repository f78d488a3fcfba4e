//! PIR Core - Private information retrieval protocol library
//!
//! This crate provides the protocol types and the oblivious-transfer engine
//! shared by PIR services and their requesters.
//!
//! # Features
//!
//! - Service settings with structural validation
//! - Query request/response types with a stable JSON wire format
//! - `idFilter` and `idObfuscation` obfuscation over Ristretto255
//! - Hash-sorted lookup tables with CBOR persistence
//! - Requester-side query builder and decoder with zeroized secrets
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use pir_core::{
//!     AlgorithmType, CredentialInfo, ObfuscationEngine, ObfuscationParam, OtResult,
//!     PirClient, PirRecord, PirTable, QueryParam, SearchType,
//! };
//!
//! # fn main() -> pir_core::Result<()> {
//! let mut values = BTreeMap::new();
//! values.insert("score".to_string(), "42".to_string());
//! let table = PirTable::new(
//!     "svc-1",
//!     "ds-1",
//!     "id",
//!     vec!["score".into()],
//!     vec![PirRecord::new("alice", values)],
//! );
//!
//! // Requester blinds the key it wants
//! let client = PirClient::new(AlgorithmType::IdObfuscation).with_decoy_pool(["bob", "carol"]);
//! let param = QueryParam {
//!     service_id: "svc-1".into(),
//!     search_type: SearchType::SearchValue,
//!     algorithm_type: String::new(),
//!     credential: CredentialInfo::sign("ak", "secret", "svc-1", 0, "nonce"),
//! };
//! let (request, secrets) = client.build_query(param, &["alice"])?;
//!
//! // Service encrypts the rows addressed by the item
//! let engine = ObfuscationEngine::default();
//! let item = &request.obfuscate_data.items[0];
//! let rows = table.find_keys(&item.candidates);
//! let obf = ObfuscationParam::new(
//!     &request.obfuscate_data,
//!     AlgorithmType::IdObfuscation,
//!     SearchType::SearchValue,
//! )?;
//! let answer = OtResult::new(engine.obfuscate(&obf, &rows, item)?);
//!
//! // Only the requested row opens
//! let payload = secrets.items()[0].decode(&answer).expect("row recovered");
//! assert_eq!(payload.values.unwrap()["score"], "42");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod ot;
pub mod query;
pub mod setting;
pub mod table;

// Re-export main types for convenience
pub use error::{ErrorKind, PirError, Result};
pub use ot::{
    decode_point, encode_point, AlgorithmType, IdFilterObfuscator, IdObfuscationObfuscator,
    ItemSecret, ObfuscationEngine, ObfuscationParam, Obfuscator, OtPayload, OtResult,
    OtResultItem, PirClient, QuerySecrets, OT_PROTOCOL_VERSION,
};
pub use query::{
    credential_signature, CredentialInfo, ObfuscateData, ObfuscateDataItem,
    ObfuscateQueryResult, QueryParam, QueryRequest, QueryResponse,
};
pub use setting::{SearchType, ServiceSetting};
pub use table::{key_hash, PirRecord, PirTable};
