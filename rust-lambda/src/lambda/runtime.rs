//! Lambda Runtime API client.
//!
//! The function process long-polls the runtime for the next invocation,
//! hands it to the [`Adapter`], and posts the result back. The loop only
//! stops when the runtime itself cannot be reached.
//! Reference: https://docs.aws.amazon.com/lambda/latest/dg/runtimes-api.html

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use axum::body::{Body, Bytes, HttpBody};
use axum::http::{Request, Response};
use axum::BoxError;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tower::Service;
use tracing::{error, info, info_span, warn, Instrument};

use super::adapter::Adapter;
use super::types::{InvocationEvent, InvocationResult};

/// Runtime API version prefix.
pub const RUNTIME_API_VERSION: &str = "2018-06-01";

const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
const DEADLINE_HEADER: &str = "lambda-runtime-deadline-ms";

/// Time held back from the platform deadline so a timed-out invocation can
/// still post its 500 result.
pub const DEADLINE_MARGIN: Duration = Duration::from_millis(300);

/// Failures while fetching the next invocation.
#[derive(Debug, Error)]
pub enum NextInvocationError {
    #[error("failed to poll for the next invocation: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("runtime API returned {0} for next invocation")]
    Status(StatusCode),

    #[error("invocation is missing its request id")]
    MissingRequestId,

    #[error("failed to read invocation payload: {0}")]
    Payload(#[source] reqwest::Error),
}

impl NextInvocationError {
    /// Whether only this invocation is lost and the runtime is still usable.
    pub fn is_per_invocation(&self) -> bool {
        matches!(
            self,
            NextInvocationError::MissingRequestId | NextInvocationError::Payload(_)
        )
    }
}

/// A single invocation pulled from the runtime.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub request_id: String,
    /// Time left before the platform kills the invocation
    pub remaining: Option<Duration>,
    pub payload: Bytes,
}

/// Error document accepted by the runtime's error endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeError {
    pub error_message: String,
    pub error_type: String,
}

impl RuntimeError {
    pub fn new(error_type: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            error_type: error_type.into(),
        }
    }
}

/// HTTP client for the Lambda Runtime API.
#[derive(Clone)]
pub struct RuntimeClient {
    client: Client,
    base_url: String,
}

impl RuntimeClient {
    /// `runtime_api` is the `host:port` from `AWS_LAMBDA_RUNTIME_API`.
    pub fn new(runtime_api: &str) -> Result<Self> {
        // No request timeout: /next blocks until an invocation arrives.
        let client = Client::builder()
            .build()
            .context("Failed to create runtime HTTP client")?;

        let base = runtime_api.trim_end_matches('/');
        let base = if base.starts_with("http://") || base.starts_with("https://") {
            base.to_string()
        } else {
            format!("http://{}", base)
        };

        Ok(Self {
            client,
            base_url: format!("{}/{}/runtime", base, RUNTIME_API_VERSION),
        })
    }

    /// Block until the runtime delivers the next invocation.
    pub async fn next_invocation(&self) -> Result<Invocation, NextInvocationError> {
        let response = self
            .client
            .get(format!("{}/invocation/next", self.base_url))
            .send()
            .await
            .map_err(NextInvocationError::Transport)?;

        if !response.status().is_success() {
            return Err(NextInvocationError::Status(response.status()));
        }

        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(String::from)
            .ok_or(NextInvocationError::MissingRequestId)?;

        let remaining = response
            .headers()
            .get(DEADLINE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(remaining_until);

        let payload = response
            .bytes()
            .await
            .map_err(NextInvocationError::Payload)?;

        Ok(Invocation {
            request_id,
            remaining,
            payload,
        })
    }

    /// Post the result of an invocation.
    pub async fn send_response(&self, request_id: &str, result: &InvocationResult) -> Result<()> {
        let url = format!("{}/invocation/{}/response", self.base_url, request_id);
        self.post(&url, result).await
    }

    /// Report an invocation the function could not process at all.
    pub async fn send_error(&self, request_id: &str, error: &RuntimeError) -> Result<()> {
        let url = format!("{}/invocation/{}/error", self.base_url, request_id);
        self.post(&url, error).await
    }

    /// Report a failure during function initialization.
    pub async fn init_error(&self, error: &RuntimeError) -> Result<()> {
        let url = format!("{}/init/error", self.base_url);
        self.post(&url, error).await
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to post to {}", url))?;

        if !response.status().is_success() {
            bail!("Runtime API returned {} for {}", response.status(), url);
        }

        Ok(())
    }
}

/// Turn an absolute deadline in epoch milliseconds into time left from now.
fn remaining_until(deadline_ms: u64) -> Duration {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;

    Duration::from_millis(deadline_ms.saturating_sub(now_ms))
}

/// Process invocations until the runtime becomes unreachable.
pub async fn run<S, B>(client: &RuntimeClient, adapter: &Adapter<S>) -> Result<()>
where
    S: Service<Request<Body>, Response = Response<B>> + Clone,
    S::Error: Into<BoxError>,
    B: HttpBody,
    B::Error: Into<BoxError>,
{
    info!("runtime_loop_starting");

    loop {
        poll_once(client, adapter).await?;
    }
}

/// Fetch and handle one invocation.
///
/// Only a failure to talk to the runtime at all is returned; a broken
/// invocation or a failed report is logged and skipped.
pub async fn poll_once<S, B>(client: &RuntimeClient, adapter: &Adapter<S>) -> Result<()>
where
    S: Service<Request<Body>, Response = Response<B>> + Clone,
    S::Error: Into<BoxError>,
    B: HttpBody,
    B::Error: Into<BoxError>,
{
    let invocation = match client.next_invocation().await {
        Ok(invocation) => invocation,
        Err(e) if e.is_per_invocation() => {
            warn!(error = %e, "invocation_skipped");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let span = info_span!("invocation", request_id = %invocation.request_id);

    if let Err(e) = process_invocation(client, adapter, invocation)
        .instrument(span)
        .await
    {
        // The runtime will time the invocation out; keep serving others.
        error!(error = %e, "invocation_report_failed");
    }

    Ok(())
}

/// Handle one invocation and report its outcome to the runtime.
pub async fn process_invocation<S, B>(
    client: &RuntimeClient,
    adapter: &Adapter<S>,
    invocation: Invocation,
) -> Result<()>
where
    S: Service<Request<Body>, Response = Response<B>> + Clone,
    S::Error: Into<BoxError>,
    B: HttpBody,
    B::Error: Into<BoxError>,
{
    info!(
        payload_length = invocation.payload.len(),
        remaining_ms = invocation.remaining.map(|d| d.as_millis() as u64),
        "invocation_received"
    );

    let event: InvocationEvent = match serde_json::from_slice(&invocation.payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "invocation_event_invalid");
            let error = RuntimeError::new("InvalidEvent", e.to_string());
            return client.send_error(&invocation.request_id, &error).await;
        }
    };

    let deadline = invocation
        .remaining
        .map(|remaining| remaining.saturating_sub(DEADLINE_MARGIN));

    let result = adapter.handle_with_deadline(event, deadline).await;

    client
        .send_response(&invocation.request_id, &result)
        .await
}
