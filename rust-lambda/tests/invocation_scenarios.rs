//! End-to-end tests: invocation events through the adapter into the app.
//!
//! These drive the real router with recording hooks and check the
//! invocation results the platform would receive.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use shoptag::web::{compute_signature, WebhookSubscription, UNAUTHORIZED_MESSAGE};
use shoptag::{
    create_router, Adapter, AppState, Config, InvocationEvent, InvocationResult, ProductHooks,
};

const SECRET: &str = "integration-secret";

#[derive(Default)]
struct RecordingHooks {
    updated: Mutex<Vec<Value>>,
    created: Mutex<Vec<Value>>,
}

#[async_trait]
impl ProductHooks for RecordingHooks {
    async fn product_created(&self, product: Value) -> Result<()> {
        self.created.lock().unwrap().push(product);
        Ok(())
    }

    async fn product_updated(&self, product: Value) -> Result<()> {
        self.updated.lock().unwrap().push(product);
        Ok(())
    }

    async fn register_webhooks(&self, _subscriptions: &[WebhookSubscription]) -> Result<()> {
        Ok(())
    }
}

fn setup() -> (Adapter<axum::Router>, Arc<RecordingHooks>) {
    let hooks = Arc::new(RecordingHooks::default());
    let state = AppState::new(Config::for_secret(SECRET), hooks.clone());
    (Adapter::new(create_router(state)), hooks)
}

fn webhook_event(path: &str, body: &str, signature: &str) -> InvocationEvent {
    serde_json::from_value(json!({
        "httpMethod": "POST",
        "path": path,
        "headers": {
            "Content-Type": "application/json",
            "x-shopify-hmac-sha256": signature,
        },
        "body": body,
        "isBase64Encoded": false,
        "requestContext": {"stage": "prod"}
    }))
    .unwrap()
}

#[tokio::test]
async fn test_signed_update_is_accepted() {
    let (adapter, hooks) = setup();
    let body = r#"{"id":1}"#;
    let signature = compute_signature(SECRET.as_bytes(), body.as_bytes()).unwrap();

    let result = adapter
        .handle(webhook_event("/webhook/products/update", body, &signature))
        .await;

    assert_eq!(result.status_code, 200);
    assert_eq!(
        result.body,
        "Webhook notification received successfully. (/products/update)"
    );
    assert_eq!(result.is_base64_encoded, None);
    assert_eq!(*hooks.updated.lock().unwrap(), vec![json!({"id": 1})]);
}

#[tokio::test]
async fn test_bad_signature_is_forbidden_without_dispatch() {
    let (adapter, hooks) = setup();
    let body = r#"{"id":1}"#;
    let signature = compute_signature(b"wrong-secret", body.as_bytes()).unwrap();

    let result = adapter
        .handle(webhook_event("/webhook/products/update", body, &signature))
        .await;

    assert_eq!(result.status_code, 403);
    assert!(result.body.contains(UNAUTHORIZED_MESSAGE));
    assert!(hooks.updated.lock().unwrap().is_empty());
    assert!(hooks.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_base64_body_is_verified_over_decoded_bytes() {
    let (adapter, hooks) = setup();
    let body = r#"{"id":9,"title":"Nina Simone - Pastel Blues (LP)"}"#;
    let signature = compute_signature(SECRET.as_bytes(), body.as_bytes()).unwrap();
    let mut event = webhook_event("/webhook/products/create", &STANDARD.encode(body), &signature);
    event.is_base64_encoded = true;

    let result = adapter.handle(event).await;

    assert_eq!(result.status_code, 200);
    assert_eq!(hooks.created.lock().unwrap()[0]["id"], 9);
}

#[tokio::test]
async fn test_empty_base64_body_is_rejected_not_crashed() {
    let (adapter, hooks) = setup();
    let mut event = webhook_event("/webhook/products/create", "", "bm9wZQ==");
    event.is_base64_encoded = true;

    let result = adapter.handle(event).await;

    assert_eq!(result.status_code, 403);
    assert!(hooks.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_header_casing_does_not_matter() {
    let (adapter, _) = setup();
    let body = r#"{"id":3}"#;
    let signature = compute_signature(SECRET.as_bytes(), body.as_bytes()).unwrap();
    let mut event = webhook_event("/webhook/products/update", body, &signature);
    event.headers = Some(BTreeMap::from([
        ("CONTENT-TYPE".to_string(), "application/json".to_string()),
        ("X-Shopify-Hmac-SHA256".to_string(), signature.clone()),
    ]));

    let result = adapter.handle(event).await;

    assert_eq!(result.status_code, 200);
}

#[tokio::test]
async fn test_load_balancer_and_gateway_response_shapes() {
    let (adapter, _) = setup();

    let elb: InvocationEvent = serde_json::from_value(json!({
        "httpMethod": "GET",
        "path": "/health",
        "requestContext": {"elb": {"targetGroupArn": "arn:aws:elasticloadbalancing:tg"}}
    }))
    .unwrap();
    let gateway: InvocationEvent = serde_json::from_value(json!({
        "httpMethod": "GET",
        "path": "/health",
        "requestContext": {"stage": "prod"}
    }))
    .unwrap();

    let elb_result = serde_json::to_value(adapter.handle(elb).await).unwrap();
    let gateway_result = serde_json::to_value(adapter.handle(gateway).await).unwrap();

    assert_eq!(elb_result["statusCode"], 200);
    assert_eq!(elb_result["isBase64Encoded"], false);
    assert_eq!(gateway_result["statusCode"], 200);
    assert!(gateway_result.get("isBase64Encoded").is_none());
    assert_eq!(gateway_result["body"], r#"{"status":"ok"}"#);
}

#[tokio::test]
async fn test_unknown_route_passes_status_through() {
    let (adapter, _) = setup();
    let event: InvocationEvent =
        serde_json::from_value(json!({"httpMethod": "GET", "path": "/nope"})).unwrap();

    let result: InvocationResult = adapter.handle(event).await;

    assert_eq!(result.status_code, 404);
}

#[tokio::test]
async fn test_undecodable_body_yields_500() {
    let (adapter, hooks) = setup();
    let mut event = webhook_event("/webhook/products/update", "!!not-base64!!", "sig");
    event.is_base64_encoded = true;

    let result = adapter.handle(event).await;

    assert_eq!(result.status_code, 500);
    assert!(result.headers.is_empty());
    assert!(hooks.updated.lock().unwrap().is_empty());
}
