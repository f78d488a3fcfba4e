//! Service status handler

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::state::AppState;
use crate::store::PublishedServiceInfo;
use crate::validation::validate_service_id;

/// Publish status of one service.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatusResponse {
    pub service_id: String,
    pub agency: String,
    /// `Publishing`, `PublishSuccess` or `PublishFailed`
    #[schema(example = "PublishSuccess")]
    pub status: String,
    pub status_msg: String,
    /// Topic the service answers on, once registered
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "default/PIR/loan-blacklist")]
    pub topic: Option<String>,
    #[schema(example = "2026-01-07T10:00:00Z")]
    pub created_at: String,
    #[schema(example = "2026-01-07T10:00:05Z")]
    pub updated_at: String,
}

impl ServiceStatusResponse {
    fn new(info: PublishedServiceInfo, topic: Option<String>) -> Self {
        Self {
            service_id: info.service_id,
            agency: info.agency,
            status: info.status.to_string(),
            status_msg: info.status_msg,
            topic,
            created_at: info.created_at.to_rfc3339(),
            updated_at: info.updated_at.to_rfc3339(),
        }
    }
}

/// Get the publish status of a service.
#[utoipa::path(
    get,
    path = "/api/pir/services/{service_id}",
    tag = "Publish",
    params(
        ("service_id" = String, Path, description = "Service identifier")
    ),
    responses(
        (status = 200, description = "Service status", body = ServiceStatusResponse),
        (status = 400, description = "Invalid service id"),
        (status = 404, description = "Service not found"),
        (status = 503, description = "Service store unavailable")
    )
)]
pub async fn service_status_handler(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
) -> Result<Json<ServiceStatusResponse>, ApiError> {
    validate_service_id(&service_id)?;

    let info = state
        .lifecycle
        .status(&service_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Service {} not found", service_id)))?;

    let topic = state
        .registry
        .is_registered(&service_id)
        .then(|| state.registry.topic(&service_id));

    Ok(Json(ServiceStatusResponse::new(info, topic)))
}
