//! Embedded web application.
//!
//! This module provides the HTTP application that both binaries serve:
//! - `GET /health` for liveness checks
//! - `GET /setup` to register the product webhooks with the shop
//! - `POST /webhook/products/{create,update}` for signed product events
//!
//! The router is built once per process. On Lambda it is driven by the
//! invocation adapter; locally it is served directly by `shoptag-web`.

pub mod handlers;
pub mod hooks;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};

pub use handlers::{
    health, products_create, products_update, setup, AppState, HealthResponse, ProductTopic,
    UNAUTHORIZED_MESSAGE,
};
pub use hooks::{LoggingHooks, ProductHooks, WebhookSubscription, WEBHOOK_TOPICS};
pub use signature::{
    compute_signature, Verification, WebhookAuthenticator, WebhookError, HMAC_HEADER,
};

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/setup", get(setup))
        .route("/webhook/products/create", post(products_create))
        .route("/webhook/products/update", post(products_update))
        .with_state(state)
}
