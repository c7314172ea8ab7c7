//! Invocation adapter.
//!
//! Turns an [`InvocationEvent`] into an `http::Request`, drives the embedded
//! application with it, and folds the `http::Response` back into an
//! [`InvocationResult`]. Every failure on the way, including a panicking
//! handler and an expired deadline, comes out as a 500 result.
//!
//! ```text
//! Received → Translated → Dispatched → Serialized → Returned
//!                 └────────────┴────────────┴──→ Error fallback (500)
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use axum::body::{Body, HttpBody};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, Uri};
use axum::BoxError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::FutureExt;
use http_body_util::BodyExt;
use thiserror::Error;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info};
use url::{form_urlencoded, Url};

use super::types::{InvocationEvent, InvocationResult, Trigger};

/// Scheme and authority given to every translated request. The gateway owns
/// the public hostname, so this is a placeholder.
const BASE_URL: &str = "https://localhost";

/// Failures while translating or dispatching one invocation.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("request body is not valid base64: {0}")]
    InvalidBody(#[from] base64::DecodeError),

    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    #[error("invalid request target: {0}")]
    InvalidTarget(String),

    #[error("invalid request header {0:?}")]
    InvalidHeader(String),

    #[error("handler failed: {0}")]
    Dispatch(BoxError),

    #[error("failed to read response body: {0}")]
    ResponseBody(BoxError),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("invocation deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

/// Drives an HTTP service from invocation events.
///
/// Build one per process around the application and share it; the service is
/// cloned per invocation, which for an axum `Router` is a reference count
/// bump.
#[derive(Debug, Clone)]
pub struct Adapter<S> {
    service: S,
    timeout: Option<Duration>,
}

impl<S> Adapter<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            timeout: None,
        }
    }

    /// Bound every invocation by `timeout`, in addition to any per-call
    /// deadline.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<S, B> Adapter<S>
where
    S: Service<Request<Body>, Response = Response<B>> + Clone,
    S::Error: Into<BoxError>,
    B: HttpBody,
    B::Error: Into<BoxError>,
{
    /// Handle one invocation. Never fails.
    pub async fn handle(&self, event: InvocationEvent) -> InvocationResult {
        self.handle_with_deadline(event, None).await
    }

    /// Handle one invocation, giving up after `deadline` (or the adapter's
    /// own timeout, whichever is shorter).
    pub async fn handle_with_deadline(
        &self,
        event: InvocationEvent,
        deadline: Option<Duration>,
    ) -> InvocationResult {
        let trigger = event.trigger();
        let limit = match (self.timeout, deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let invocation = AssertUnwindSafe(self.invoke(&event)).catch_unwind();

        let outcome = match limit {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(AdapterError::DeadlineExceeded(limit))),
            },
            None => invocation.await,
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(panic) => Err(AdapterError::Panicked(panic_message(panic.as_ref()))),
        };

        match outcome {
            Ok(result) => {
                info!(
                    method = %event.http_method,
                    path = event.path.as_deref().unwrap_or(""),
                    status = result.status_code,
                    "invocation_complete"
                );
                result
            }
            Err(e) => {
                error!(
                    method = %event.http_method,
                    path = event.path.as_deref().unwrap_or(""),
                    error = %e,
                    "invocation_failed"
                );
                InvocationResult::error(trigger, e.to_string())
            }
        }
    }

    async fn invoke(&self, event: &InvocationEvent) -> Result<InvocationResult, AdapterError> {
        let request = build_request(event)?;

        debug!(
            method = %request.method(),
            uri = %request.uri(),
            header_count = request.headers().len(),
            "invocation_translated"
        );

        let response = self
            .service
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| AdapterError::Dispatch(e.into()))?;

        into_result(response, event.trigger()).await
    }
}

/// Decode the event body. A missing body is empty.
pub fn decode_body(event: &InvocationEvent) -> Result<Vec<u8>, AdapterError> {
    match event.body.as_deref() {
        None => Ok(Vec::new()),
        Some(body) if event.is_base64_encoded => Ok(STANDARD.decode(body)?),
        Some(body) => Ok(body.as_bytes().to_vec()),
    }
}

/// Serialize query parameters as `key=value&key=value`, form-encoded.
///
/// Keys come out in sorted order, so the same map always yields the same
/// string.
pub fn build_query_string(params: Option<&BTreeMap<String, String>>) -> String {
    match params {
        Some(params) if !params.is_empty() => form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish(),
        _ => String::new(),
    }
}

/// Build the request the embedded application sees.
pub fn build_request(event: &InvocationEvent) -> Result<Request<Body>, AdapterError> {
    let body = decode_body(event)?;

    let method = Method::from_bytes(event.http_method.as_bytes())
        .map_err(|_| AdapterError::InvalidMethod(event.http_method.clone()))?;

    let uri = build_uri(
        event.path.as_deref().unwrap_or(""),
        &build_query_string(event.query_string_parameters.as_ref()),
    )?;

    let mut request = Request::new(Body::from(body));
    *request.method_mut() = method;
    *request.uri_mut() = uri;
    if let Some(headers) = &event.headers {
        *request.headers_mut() = build_headers(headers)?;
    }

    Ok(request)
}

fn build_uri(path: &str, query: &str) -> Result<Uri, AdapterError> {
    let mut url = Url::parse(BASE_URL).map_err(|e| AdapterError::InvalidTarget(e.to_string()))?;
    if !path.is_empty() {
        url.set_path(path);
    }
    if !query.is_empty() {
        url.set_query(Some(query));
    }

    url.as_str()
        .parse::<Uri>()
        .map_err(|e| AdapterError::InvalidTarget(format!("{}: {}", url, e)))
}

/// Copy inbound headers into a case-insensitive header map.
fn build_headers(headers: &BTreeMap<String, String>) -> Result<HeaderMap, AdapterError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| AdapterError::InvalidHeader(name.clone()))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| AdapterError::InvalidHeader(name.clone()))?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

/// Collect the response into an invocation result.
///
/// Body chunks are concatenated in order. A body that is not UTF-8 is sent
/// base64-encoded with `isBase64Encoded: true`.
async fn into_result<B>(
    response: Response<B>,
    trigger: Trigger,
) -> Result<InvocationResult, AdapterError>
where
    B: HttpBody,
    B::Error: Into<BoxError>,
{
    let (parts, body) = response.into_parts();

    let bytes = body
        .collect()
        .await
        .map_err(|e| AdapterError::ResponseBody(e.into()))?
        .to_bytes();

    let (body, is_binary) = match std::str::from_utf8(&bytes) {
        Ok(text) => (text.to_string(), false),
        Err(_) => (STANDARD.encode(&bytes), true),
    };

    let is_base64_encoded = match (trigger, is_binary) {
        (_, true) => Some(true),
        (Trigger::LoadBalancer, false) => Some(false),
        (Trigger::Gateway, false) => None,
    };

    let (headers, multi_value_headers) = split_headers(&parts.headers);

    Ok(InvocationResult {
        status_code: parts.status.as_u16(),
        headers,
        multi_value_headers,
        body,
        is_base64_encoded,
    })
}

/// Split a header map into single-valued and repeated headers.
///
/// Repeated headers cannot be joined into one value safely (cookie `Expires`
/// attributes contain commas), so they go out as `multiValueHeaders`.
fn split_headers(
    headers: &HeaderMap,
) -> (BTreeMap<String, String>, BTreeMap<String, Vec<String>>) {
    let mut single = BTreeMap::new();
    let mut multi = BTreeMap::new();

    for name in headers.keys() {
        let mut values: Vec<String> = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();

        if values.len() == 1 {
            single.insert(name.as_str().to_string(), values.remove(0));
        } else {
            multi.insert(name.as_str().to_string(), values);
        }
    }

    (single, multi)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
