use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use curve25519_dalek::ristretto::RistrettoPoint;
use rand::rngs::OsRng;

use super::{
    decode_point, encode_point, hash_to_scalar, mask, random_scalar, AlgorithmType,
    ObfuscationParam, Obfuscator, OtPayload, OtResultItem,
};
use crate::error::{PirError, Result};
use crate::query::ObfuscateDataItem;
use crate::table::PirRecord;

/// Upper bound on decoys per `idObfuscation` item.
pub const MAX_CANDIDATES: usize = 256;

/// Encrypt every row under the key derived from the item's blinding points.
fn encrypt_rows(
    param: &ObfuscationParam,
    rows: &[PirRecord],
    item: &ObfuscateDataItem,
) -> Result<Vec<OtResultItem>> {
    let point_y = decode_point(&item.point_y)?;
    let point_z = decode_point(&item.point_z)?;
    let mut rng = OsRng;

    rows.iter()
        .map(|row| {
            let s = random_scalar(&mut rng);
            let r = random_scalar(&mut rng);

            let w = s * param.point_x() + RistrettoPoint::mul_base(&r);
            let blind = RistrettoPoint::mul_base(&(s * hash_to_scalar(&row.key)));
            let shared = s * point_z + blind + r * point_y;

            let payload = serde_json::to_vec(&OtPayload::from_record(row, param.search_type()))
                .map_err(|e| PirError::Serialization(e.to_string()))?;

            Ok(OtResultItem {
                point_w: encode_point(&w),
                cipher: BASE64.encode(mask(&shared, &payload)),
            })
        })
        .collect()
}

/// Rows selected by a prefix of the key hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdFilterObfuscator;

impl Obfuscator for IdFilterObfuscator {
    fn algorithm(&self) -> AlgorithmType {
        AlgorithmType::IdFilter
    }

    fn check_item(&self, item: &ObfuscateDataItem) -> Result<()> {
        let filter = item.filter.as_deref().unwrap_or_default();
        if filter.is_empty() {
            return Err(PirError::validation(format!(
                "Item {} must define a filter for idFilter",
                item.id_index
            )));
        }
        if filter.len() > 64
            || !filter
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(PirError::validation(format!(
                "Item {} filter must be a lowercase hex prefix of at most 64 characters",
                item.id_index
            )));
        }
        Ok(())
    }

    fn obfuscate(
        &self,
        param: &ObfuscationParam,
        rows: &[PirRecord],
        item: &ObfuscateDataItem,
    ) -> Result<Vec<OtResultItem>> {
        let filter = item.filter.as_deref().unwrap_or_default();
        if let Some(row) = rows.iter().find(|r| !r.key_hash.starts_with(filter)) {
            return Err(PirError::obfuscation(format!(
                "Row with hash {} is outside the filter of item {}",
                row.key_hash, item.id_index
            )));
        }
        encrypt_rows(param, rows, item)
    }
}

/// Rows selected from a candidate key set.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdObfuscationObfuscator;

impl Obfuscator for IdObfuscationObfuscator {
    fn algorithm(&self) -> AlgorithmType {
        AlgorithmType::IdObfuscation
    }

    fn check_item(&self, item: &ObfuscateDataItem) -> Result<()> {
        if item.candidates.is_empty() {
            return Err(PirError::validation(format!(
                "Item {} must define candidates for idObfuscation",
                item.id_index
            )));
        }
        if item.candidates.len() > MAX_CANDIDATES {
            return Err(PirError::validation(format!(
                "Item {} has {} candidates, maximum is {}",
                item.id_index,
                item.candidates.len(),
                MAX_CANDIDATES
            )));
        }
        if item.candidates.iter().any(|c| c.is_empty()) {
            return Err(PirError::validation(format!(
                "Item {} contains an empty candidate",
                item.id_index
            )));
        }
        Ok(())
    }

    fn obfuscate(
        &self,
        param: &ObfuscationParam,
        rows: &[PirRecord],
        item: &ObfuscateDataItem,
    ) -> Result<Vec<OtResultItem>> {
        let candidates: HashSet<&str> = item.candidates.iter().map(String::as_str).collect();
        if let Some(row) = rows.iter().find(|r| !candidates.contains(r.key.as_str())) {
            return Err(PirError::obfuscation(format!(
                "Row {} is not a candidate of item {}",
                row.key_hash, item.id_index
            )));
        }
        encrypt_rows(param, rows, item)
    }
}
