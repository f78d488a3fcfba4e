//! Request validation module
//!
//! Checks identifiers supplied by HTTP callers before they reach the stores.

use crate::error::ApiError;

/// Maximum length of a service identifier
pub const MAX_SERVICE_ID_LEN: usize = 128;

/// Validates a service identifier
///
/// Service ids become the last segment of the service topic
/// (`<agency>/PIR/<service_id>`) and of artifact keys, so only
/// `[A-Za-z0-9_.-]` is accepted and the id may not start with a dot.
pub fn validate_service_id(service_id: &str) -> Result<(), ApiError> {
    if service_id.is_empty() {
        return Err(ApiError::bad_request("Must define the serviceId"));
    }
    if service_id.len() > MAX_SERVICE_ID_LEN {
        return Err(ApiError::bad_request(format!(
            "serviceId too long: {} exceeds maximum of {} characters",
            service_id.len(),
            MAX_SERVICE_ID_LEN
        )));
    }
    if service_id.starts_with('.')
        || !service_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ApiError::bad_request(format!(
            "Invalid serviceId '{}': allowed characters are A-Z, a-z, 0-9, '_', '-' and '.'",
            service_id
        )));
    }
    Ok(())
}
