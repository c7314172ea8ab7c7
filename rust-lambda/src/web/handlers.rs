//! Webhook endpoint handlers.
//!
//! Product webhooks are handled in three steps:
//! 1. Verify the HMAC signature over the raw body
//! 2. Hand the parsed product to the [`ProductHooks`] collaborator
//! 3. Return a plain-text acknowledgement
//!
//! A failed signature check is answered with 403 before any hook runs.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::web::hooks::{ProductHooks, WebhookSubscription};
use crate::web::signature::{Verification, WebhookAuthenticator, WebhookError, HMAC_HEADER};
use crate::Config;

/// Body of the 403 response for unauthenticated deliveries.
pub const UNAUTHORIZED_MESSAGE: &str = "You are not authorized to perform this action.";

/// Shared application state.
///
/// Built once per process; every request gets a cheap clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub authenticator: Arc<WebhookAuthenticator>,
    pub hooks: Arc<dyn ProductHooks>,
}

impl AppState {
    pub fn new(config: Config, hooks: Arc<dyn ProductHooks>) -> Self {
        let authenticator = WebhookAuthenticator::new(config.shared_secret.as_bytes());
        Self {
            config: Arc::new(config),
            authenticator: Arc::new(authenticator),
            hooks,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Setup
// =============================================================================

/// (Re)create the shop's webhook subscriptions so they point at this app.
pub async fn setup(State(state): State<AppState>) -> Response {
    let Some(app_url) = state.config.app_url.as_deref() else {
        warn!("setup_app_url_not_configured");
        return (StatusCode::SERVICE_UNAVAILABLE, "APP_URL is not configured").into_response();
    };

    let subscriptions = WebhookSubscription::for_app(app_url);

    if let Err(e) = state.hooks.register_webhooks(&subscriptions).await {
        error!(error = %e, "setup_register_webhooks_failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to create webhooks").into_response();
    }

    info!(count = subscriptions.len(), "setup_webhooks_created");

    (StatusCode::OK, "created webhooks").into_response()
}

// =============================================================================
// Product Webhooks
// =============================================================================

/// Product topics this app receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductTopic {
    Create,
    Update,
}

impl ProductTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductTopic::Create => "products/create",
            ProductTopic::Update => "products/update",
        }
    }

    fn acknowledgement(&self) -> String {
        format!(
            "Webhook notification received successfully. (/{})",
            self.as_str()
        )
    }
}

/// `POST /webhook/products/create`
pub async fn products_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    product_webhook(&state, ProductTopic::Create, &headers, &body).await
}

/// `POST /webhook/products/update`
pub async fn products_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    product_webhook(&state, ProductTopic::Update, &headers, &body).await
}

async fn product_webhook(
    state: &AppState,
    topic: ProductTopic,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    // A header that is not visible ASCII cannot be a base64 digest.
    let signature = headers.get(HMAC_HEADER).and_then(|v| v.to_str().ok());

    info!(
        topic = topic.as_str(),
        body_length = body.len(),
        has_signature = signature.is_some(),
        "product_webhook_received"
    );

    let product = match state.authenticator.verify(body, signature) {
        Ok(Verification::Authenticated(product)) => product,
        Ok(Verification::Rejected) => {
            warn!(topic = topic.as_str(), "product_webhook_unauthorized");
            return (StatusCode::FORBIDDEN, UNAUTHORIZED_MESSAGE).into_response();
        }
        Err(e @ WebhookError::InvalidKey) => {
            error!(topic = topic.as_str(), error = %e, "product_webhook_misconfigured");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to process webhook").into_response();
        }
        Err(e) => {
            warn!(topic = topic.as_str(), error = %e, "product_webhook_malformed");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let result = match topic {
        ProductTopic::Create => state.hooks.product_created(product).await,
        ProductTopic::Update => state.hooks.product_updated(product).await,
    };

    if let Err(e) = result {
        error!(topic = topic.as_str(), error = %e, "product_hook_failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to process webhook").into_response();
    }

    info!(topic = topic.as_str(), "product_webhook_processed");

    (StatusCode::OK, topic.acknowledgement()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_acknowledgement() {
        assert_eq!(
            ProductTopic::Update.acknowledgement(),
            "Webhook notification received successfully. (/products/update)"
        );
        assert_eq!(
            ProductTopic::Create.acknowledgement(),
            "Webhook notification received successfully. (/products/create)"
        );
    }
}
