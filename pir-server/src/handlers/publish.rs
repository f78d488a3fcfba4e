//! Service publish handler
//!
//! Handles POST /api/pir/publish. Construction runs in the background; the
//! response only says whether the publish was scheduled.

use axum::{extract::State, http::StatusCode, Json};
use pir_core::ServiceSetting;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::lifecycle::PublishOutcome;
use crate::state::AppState;
use crate::validation::validate_service_id;

/// Request to publish (or republish) a PIR service.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    #[schema(example = "loan-blacklist")]
    pub service_id: String,
    /// Dataset, id field, value fields and allowed search/algorithm types
    #[schema(value_type = Object)]
    pub setting: ServiceSetting,
}

/// Publish scheduling result.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub service_id: String,
    /// Whether construction was scheduled
    pub accepted: bool,
    /// Current status of the service record
    #[schema(example = "Publishing")]
    pub status: String,
    pub message: String,
}

/// Publish a PIR service.
///
/// The service is recorded as `Publishing` and its dataset is constructed on
/// the worker pool. Poll `GET /api/pir/services/{service_id}` for the outcome.
#[utoipa::path(
    post,
    path = "/api/pir/publish",
    tag = "Publish",
    request_body = PublishRequest,
    responses(
        (status = 202, description = "Construction scheduled", body = PublishResponse),
        (status = 400, description = "Invalid service id"),
        (status = 409, description = "Publish rejected: in progress, invalid setting or pool full"),
        (status = 503, description = "Service store unavailable")
    )
)]
pub async fn publish_handler(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    validate_service_id(&request.service_id)?;

    let outcome = state
        .lifecycle
        .publish(&request.service_id, request.setting)
        .await?;

    match outcome {
        PublishOutcome::Accepted(task) => {
            tracing::info!(service_id = %task.service_id(), "Publish scheduled");
            // The task commits its own status; the handle is not awaited here
            drop(task);
            Ok((
                StatusCode::ACCEPTED,
                Json(PublishResponse {
                    service_id: request.service_id,
                    accepted: true,
                    status: "Publishing".to_string(),
                    message: "construction scheduled".to_string(),
                }),
            ))
        }
        PublishOutcome::Rejected(message) => Err(ApiError::conflict(message)),
    }
}
