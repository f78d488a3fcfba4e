//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod health;
pub mod publish;
pub mod query;
pub mod services;

pub use crate::state::AppState;
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use publish::{publish_handler, PublishRequest, PublishResponse};
pub use query::query_handler;
pub use services::{service_status_handler, ServiceStatusResponse};
