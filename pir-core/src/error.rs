use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PirError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("The service {0} not exists")]
    NotFound(String),

    #[error("The service {service_id} is not ready yet, status: {status}")]
    NotReady { service_id: String, status: String },

    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Lookup error: {0}")]
    Lookup(String),

    #[error("Obfuscation error: {0}")]
    Obfuscation(String),

    #[error("Construction error: {0}")]
    Construction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl PirError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn obfuscation(message: impl Into<String>) -> Self {
        Self::Obfuscation(message.into())
    }

    pub fn construction(message: impl Into<String>) -> Self {
        Self::Construction(message.into())
    }

    /// Wire-level category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Serialization(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotReady { .. } => ErrorKind::NotReady,
            Self::AuthorizationDenied(_) => ErrorKind::AuthorizationDenied,
            Self::Lookup(_) | Self::Storage(_) => ErrorKind::Lookup,
            Self::Obfuscation(_) => ErrorKind::Obfuscation,
            Self::Construction(_) => ErrorKind::Construction,
        }
    }
}

/// Error category carried by failure responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    NotReady,
    AuthorizationDenied,
    Lookup,
    Obfuscation,
    Construction,
}

impl ErrorKind {
    /// Whether a caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady | Self::Lookup)
    }
}

pub type Result<T> = std::result::Result<T, PirError>;
