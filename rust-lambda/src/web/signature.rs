//! Shopify webhook signature verification.
//!
//! Shopify signs every webhook delivery with HMAC-SHA256 over the raw request
//! body, keyed with the app's shared secret, and sends the base64 digest in the
//! `X-Shopify-Hmac-Sha256` header.
//! Reference: https://shopify.dev/docs/apps/build/webhooks/subscribe/https#step-5-verify-the-webhook

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the base64 HMAC-SHA256 digest of the body.
pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";

/// Outcome of checking a webhook delivery.
///
/// A rejected delivery is an expected outcome, so it is a variant here rather
/// than an error. The payload of an authenticated delivery may itself be empty
/// or falsy (`{}`, `null`, `false`) and is still distinguishable from a
/// rejection.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    /// Signature matched; carries the parsed JSON body.
    Authenticated(Value),
    /// Signature missing or wrong.
    Rejected,
}

impl Verification {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Verification::Authenticated(_))
    }
}

/// Hard failures of an authenticated body.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook body is not valid UTF-8: {0}")]
    NonUtf8(#[from] std::str::Utf8Error),

    #[error("webhook body is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("shared secret is not a usable HMAC key")]
    InvalidKey,
}

/// Compute the base64 HMAC-SHA256 signature Shopify would send for `body`.
pub fn compute_signature(secret: &[u8], body: &[u8]) -> Result<String, WebhookError> {
    let mut mac = match <HmacSha256 as Mac>::new_from_slice(secret) {
        Ok(m) => m,
        Err(_) => {
            warn!("webhook_signature_invalid_key");
            return Err(WebhookError::InvalidKey);
        }
    };
    mac.update(body);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
///
/// Only the length is compared eagerly; the expected digest length is public.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Verifies webhook deliveries against the process-wide shared secret.
#[derive(Clone)]
pub struct WebhookAuthenticator {
    secret: Vec<u8>,
}

impl WebhookAuthenticator {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Check `body` against the signature taken from the request header.
    ///
    /// # Arguments
    ///
    /// * `body` - The raw request body, exactly as transmitted
    /// * `signature` - The `X-Shopify-Hmac-Sha256` header value, if present
    ///
    /// # Returns
    ///
    /// `Verification::Authenticated` with the parsed body when the signature
    /// matches, `Verification::Rejected` otherwise. An error is returned when
    /// an authenticated body cannot be decoded as JSON, or when the secret
    /// cannot key the HMAC.
    pub fn verify(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<Verification, WebhookError> {
        // Digest is computed even when the header is missing so both paths do
        // the same work.
        let expected = compute_signature(&self.secret, body)?;

        let Some(provided) = signature else {
            warn!(body_length = body.len(), "webhook_signature_missing");
            return Ok(Verification::Rejected);
        };

        if !constant_time_compare(&expected, provided) {
            warn!(
                expected_length = expected.len(),
                actual_length = provided.len(),
                "webhook_signature_mismatch"
            );
            return Ok(Verification::Rejected);
        }

        let text = std::str::from_utf8(body)?;
        let payload: Value = serde_json::from_str(text)?;

        debug!(body_length = body.len(), "webhook_signature_valid");

        Ok(Verification::Authenticated(payload))
    }
}

// Keep the secret out of debug output.
impl fmt::Debug for WebhookAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookAuthenticator")
            .field("secret", &"<REDACTED>")
            .finish()
    }
}
