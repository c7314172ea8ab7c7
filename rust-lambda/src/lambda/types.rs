//! Invocation event and result types.
//!
//! These are the JSON shapes Lambda exchanges with a function fronted by
//! API Gateway (REST proxy integration) or an Application Load Balancer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which kind of trigger delivered the invocation.
///
/// The two differ only in the response shape: a load balancer requires an
/// explicit `isBase64Encoded` flag, a gateway does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Gateway,
    LoadBalancer,
}

/// HTTP request as delivered to the function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    /// HTTP method (`GET`, `POST`, ...)
    pub http_method: String,
    /// Request path, without query string
    #[serde(default)]
    pub path: Option<String>,
    /// Query parameters, already split by the platform
    #[serde(default)]
    pub query_string_parameters: Option<BTreeMap<String, String>>,
    /// Request headers; key casing is whatever the platform forwarded
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    /// Request body, possibly base64
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
    /// Trigger metadata; only inspected for the load balancer marker
    #[serde(default)]
    pub request_context: Option<Map<String, Value>>,
}

impl InvocationEvent {
    /// Load balancer events carry an `elb` entry in their request context.
    pub fn trigger(&self) -> Trigger {
        match &self.request_context {
            Some(context) if context.contains_key("elb") => Trigger::LoadBalancer,
            _ => Trigger::Gateway,
        }
    }
}

/// Response handed back to the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Headers the response repeats, such as several `set-cookie` lines
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub multi_value_headers: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub body: String,
    /// Present for load balancer triggers and for base64 bodies only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_base64_encoded: Option<bool>,
}

impl InvocationResult {
    /// The fallback result for a failed invocation.
    pub fn error(trigger: Trigger, message: impl Into<String>) -> Self {
        Self {
            status_code: 500,
            headers: BTreeMap::new(),
            multi_value_headers: BTreeMap::new(),
            body: message.into(),
            is_base64_encoded: match trigger {
                Trigger::LoadBalancer => Some(false),
                Trigger::Gateway => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gateway_event_deserialization() {
        let event: InvocationEvent = serde_json::from_value(json!({
            "httpMethod": "POST",
            "path": "/webhook/products/update",
            "queryStringParameters": null,
            "headers": {"Content-Type": "application/json"},
            "body": "{\"id\":1}",
            "isBase64Encoded": false,
            "requestContext": {"stage": "prod", "requestId": "abc"}
        }))
        .unwrap();

        assert_eq!(event.http_method, "POST");
        assert_eq!(event.path.as_deref(), Some("/webhook/products/update"));
        assert!(event.query_string_parameters.is_none());
        assert_eq!(event.body.as_deref(), Some("{\"id\":1}"));
        assert_eq!(event.trigger(), Trigger::Gateway);
    }

    #[test]
    fn test_load_balancer_event_trigger() {
        let event: InvocationEvent = serde_json::from_value(json!({
            "httpMethod": "GET",
            "path": "/health",
            "requestContext": {"elb": {"targetGroupArn": "arn:aws:elasticloadbalancing:..."}}
        }))
        .unwrap();

        assert_eq!(event.trigger(), Trigger::LoadBalancer);
        assert!(!event.is_base64_encoded);
        assert!(event.headers.is_none());
    }

    #[test]
    fn test_missing_request_context_is_gateway() {
        let event: InvocationEvent =
            serde_json::from_value(json!({"httpMethod": "GET"})).unwrap();
        assert_eq!(event.trigger(), Trigger::Gateway);
    }

    #[test]
    fn test_result_serialization_omits_flag_for_gateway() {
        let result = InvocationResult {
            status_code: 200,
            headers: BTreeMap::from([("content-type".to_string(), "text/plain".to_string())]),
            multi_value_headers: BTreeMap::new(),
            body: "ok".to_string(),
            is_base64_encoded: None,
        };

        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(
            value,
            json!({"statusCode": 200, "headers": {"content-type": "text/plain"}, "body": "ok"})
        );
    }

    #[test]
    fn test_error_result_shape() {
        let value =
            serde_json::to_value(InvocationResult::error(Trigger::Gateway, "boom")).unwrap();
        assert_eq!(value, json!({"statusCode": 500, "body": "boom"}));

        let value =
            serde_json::to_value(InvocationResult::error(Trigger::LoadBalancer, "boom")).unwrap();
        assert_eq!(
            value,
            json!({"statusCode": 500, "body": "boom", "isBase64Encoded": false})
        );
    }

    #[test]
    fn test_result_serializes_multi_value_headers() {
        let result = InvocationResult {
            status_code: 200,
            headers: BTreeMap::new(),
            multi_value_headers: BTreeMap::from([(
                "set-cookie".to_string(),
                vec!["a=1".to_string(), "b=2".to_string()],
            )]),
            body: String::new(),
            is_base64_encoded: Some(false),
        };

        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(
            value,
            json!({
                "statusCode": 200,
                "multiValueHeaders": {"set-cookie": ["a=1", "b=2"]},
                "body": "",
                "isBase64Encoded": false
            })
        );
    }
}
