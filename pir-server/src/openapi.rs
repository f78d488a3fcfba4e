//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3.0 document served at `/api-docs/openapi.json`.

use utoipa::OpenApi;

use crate::handlers::{
    HealthResponse, PublishRequest, PublishResponse, ReadyResponse, ServiceStatusResponse,
};

/// PIR Server - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "PIR Server",
        version = "0.1.0",
        description = r#"
## Private Information Retrieval API

Answers keyed lookups over published datasets without learning which key
was asked for:

- **Publish** a dataset as a PIR service via `POST /api/pir/publish`
- **Poll** its status via `GET /api/pir/services/{service_id}`
- **Query** it via `POST /api/pir/query` with blinded Ristretto255 points

Every row the query addresses comes back encrypted; the requester can open
only the row of the key it blinded.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Publish", description = "Publish PIR services and track their status"),
        (name = "Query", description = "Oblivious keyed lookups"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::publish::publish_handler,
        crate::handlers::services::service_status_handler,
        crate::handlers::query::query_handler,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            PublishRequest,
            PublishResponse,
            ServiceStatusResponse,
        )
    )
)]
pub struct ApiDoc;
