//! Axum Router Configuration
//!
//! This module defines the HTTP routing for the stub and its OpenAPI
//! document.

use crate::{
    handlers,
    models::{ErrorResponse, ReceivedRequest, ReplyBody, RequestKind, Transport},
    state::AppState,
};

use axum::{
    Json, Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::receive_webhook,
        handlers::list_requests,
    ),
    components(
        schemas(ReceivedRequest, RequestKind, Transport, ReplyBody, ErrorResponse)
    ),
    tags(
        (name = "Webhook Stub", description = "Local stand-in for the lead chat webhook")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the stub.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(handlers::receive_webhook))
        .route("/requests", get(handlers::list_requests))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .with_state(app_state)
}
