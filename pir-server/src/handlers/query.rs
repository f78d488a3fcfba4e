//! Query handler
//!
//! Handles POST /api/pir/query. Query failures are part of the answer: the
//! body is a `QueryResponse` with `status` set to `success` or `failure`,
//! identical to what topic senders receive.

use axum::{extract::State, Json};
use pir_core::{QueryRequest, QueryResponse};

use crate::state::AppState;

/// Answer a PIR query.
#[utoipa::path(
    post,
    path = "/api/pir/query",
    tag = "Query",
    request_body(
        content = String,
        content_type = "application/json",
        description = "QueryRequest: queryParam (serviceId, searchType, algorithmType, \
            credential) and obfuscateData (version, pointX, items)"
    ),
    responses(
        (status = 200, description = "QueryResponse with status `success` or `failure`"),
        (status = 400, description = "Malformed JSON body"),
        (status = 422, description = "Body does not match QueryRequest")
    )
)]
pub async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Json<QueryResponse> {
    Json(state.pipeline.query(&request).await)
}
