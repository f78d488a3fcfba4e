//! Published service settings.
//!
//! A [`ServiceSetting`] describes which dataset a PIR service exposes, the key
//! column requesters search by, the value columns they may retrieve, and the
//! search/algorithm selectors the service accepts.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PirError, Result};
use crate::ot::AlgorithmType;

/// What a requester learns about a matched key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchType {
    /// Only whether the key exists in the dataset.
    SearchExist,
    /// The key together with the accessible value columns.
    SearchValue,
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SearchExist => write!(f, "SearchExist"),
            Self::SearchValue => write!(f, "SearchValue"),
        }
    }
}

/// Configuration of one published PIR service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSetting {
    /// Source dataset identifier
    pub dataset_id: String,
    /// Column holding the lookup key
    pub id_field: String,
    /// Columns returned for `SearchValue` queries
    #[serde(default)]
    pub value_fields: Vec<String>,
    /// Search types the service answers
    pub search_types: Vec<SearchType>,
    /// Obfuscation algorithms the service accepts
    pub algorithm_types: Vec<AlgorithmType>,
}

impl ServiceSetting {
    /// Structural check run before a publish is scheduled.
    pub fn check(&self) -> Result<()> {
        if self.dataset_id.trim().is_empty() {
            return Err(PirError::validation("Must define the datasetId"));
        }
        if self.id_field.trim().is_empty() {
            return Err(PirError::validation("Must define the idField"));
        }
        if self.search_types.is_empty() {
            return Err(PirError::validation("Must define at least one searchType"));
        }
        if self.algorithm_types.is_empty() {
            return Err(PirError::validation(
                "Must define at least one algorithmType",
            ));
        }

        let mut seen = HashSet::new();
        for field in &self.value_fields {
            if field.trim().is_empty() {
                return Err(PirError::validation("Empty column in valueFields"));
            }
            if field == &self.id_field {
                return Err(PirError::validation(format!(
                    "The idField {} must not be listed in valueFields",
                    field
                )));
            }
            if !seen.insert(field.as_str()) {
                return Err(PirError::validation(format!(
                    "Duplicated column {} in valueFields",
                    field
                )));
            }
        }

        if self.search_types.contains(&SearchType::SearchValue) && self.value_fields.is_empty() {
            return Err(PirError::validation(
                "SearchValue requires at least one accessible valueField",
            ));
        }
        Ok(())
    }

    /// Reject a query whose search type the service was not published with.
    pub fn check_search_type(&self, service_id: &str, search_type: SearchType) -> Result<()> {
        if self.search_types.contains(&search_type) {
            Ok(())
        } else {
            Err(PirError::validation(format!(
                "The service {} does not support searchType {}",
                service_id, search_type
            )))
        }
    }

    /// Reject a query whose algorithm the service was not published with.
    pub fn check_algorithm_type(&self, service_id: &str, algorithm: AlgorithmType) -> Result<()> {
        if self.algorithm_types.contains(&algorithm) {
            Ok(())
        } else {
            Err(PirError::validation(format!(
                "The service {} does not support algorithmType {}",
                service_id, algorithm
            )))
        }
    }

    pub fn serialize(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| PirError::Serialization(e.to_string()))
    }

    pub fn deserialize(config: &str) -> Result<Self> {
        serde_json::from_str(config)
            .map_err(|e| PirError::Serialization(format!("Invalid service setting: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setting() -> ServiceSetting {
        ServiceSetting {
            dataset_id: "d-001".into(),
            id_field: "id".into(),
            value_fields: vec!["name".into(), "score".into()],
            search_types: vec![SearchType::SearchExist, SearchType::SearchValue],
            algorithm_types: vec![AlgorithmType::IdFilter],
        }
    }

    #[test]
    fn test_valid_setting_passes() {
        assert!(setting().check().is_ok());
    }

    #[test]
    fn test_missing_dataset_id_rejected() {
        let mut s = setting();
        s.dataset_id = "  ".into();
        assert!(matches!(s.check(), Err(PirError::Validation(_))));
    }

    #[test]
    fn test_id_field_in_value_fields_rejected() {
        let mut s = setting();
        s.value_fields.push("id".into());
        assert!(s.check().is_err());
    }

    #[test]
    fn test_duplicate_value_field_rejected() {
        let mut s = setting();
        s.value_fields.push("name".into());
        assert!(s.check().is_err());
    }

    #[test]
    fn test_search_value_without_value_fields_rejected() {
        let mut s = setting();
        s.value_fields.clear();
        assert!(s.check().is_err());

        s.search_types = vec![SearchType::SearchExist];
        assert!(s.check().is_ok());
    }

    #[test]
    fn test_check_search_type() {
        let mut s = setting();
        s.search_types = vec![SearchType::SearchExist];
        assert!(s.check_search_type("svc", SearchType::SearchExist).is_ok());
        assert!(s.check_search_type("svc", SearchType::SearchValue).is_err());
    }

    #[test]
    fn test_serialize_roundtrip_uses_camel_case() {
        let s = setting();
        let json = s.serialize().unwrap();
        assert!(json.contains("\"datasetId\""));
        assert!(json.contains("\"idFilter\""));
        assert_eq!(ServiceSetting::deserialize(&json).unwrap(), s);
    }

    #[test]
    fn test_deserialize_unknown_algorithm_fails() {
        let json = r#"{"datasetId":"d","idField":"id","searchTypes":["SearchExist"],
            "algorithmTypes":["rot13"]}"#;
        assert!(matches!(
            ServiceSetting::deserialize(json),
            Err(PirError::Serialization(_))
        ));
    }
}
