//! Configuration module for environment variable parsing.
//!
//! Everything is read once at startup. Secrets can come straight from the
//! environment (`SHOPIFY_SHARED_SECRET`, `SHOPIFY_API_KEY`, ...) or from the
//! JSON secret document the deployment injects (`APP_SECRETS`, or base64 of it
//! in `APP_SECRETS_BINARY`). A variable set in the environment wins over the
//! same key in the document.

use std::env;
use std::fmt;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Startup configuration failures. These are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no shared secret: set SHOPIFY_SHARED_SECRET or provide shopify-shared-secret in APP_SECRETS")]
    MissingSharedSecret,

    #[error("APP_SECRETS is not a valid secret document: {0}")]
    InvalidSecrets(#[from] serde_json::Error),

    #[error("APP_SECRETS_BINARY is not valid base64: {0}")]
    InvalidSecretsEncoding(#[from] base64::DecodeError),
}

/// Secret document as stored in the deployment's secret store.
#[derive(Default, Deserialize)]
pub struct Secrets {
    #[serde(default, rename = "shopify-shared-secret")]
    pub shopify_shared_secret: Option<String>,
    #[serde(default, rename = "shopify-api-key")]
    pub shopify_api_key: Option<String>,
    #[serde(default, rename = "shopify-api-secret")]
    pub shopify_api_secret: Option<String>,
    #[serde(default, rename = "discogs-api-key")]
    pub discogs_api_key: Option<String>,
}

impl Secrets {
    /// Parse a secret document delivered as a JSON string.
    pub fn from_secret_string(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Parse a secret document delivered as base64-encoded JSON.
    pub fn from_secret_binary(raw: &str) -> Result<Self, ConfigError> {
        let decoded = STANDARD.decode(raw.trim())?;
        Ok(serde_json::from_slice(&decoded)?)
    }
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Shared secret used to sign webhook deliveries
    pub shared_secret: String,

    /// Public hostname webhooks are delivered to (used by `/setup`)
    pub app_url: Option<String>,

    /// Shop name (`{shop}.myshopify.com`)
    pub shop_name: Option<String>,

    /// Shopify Admin API key for the private app
    pub shopify_api_key: Option<String>,

    /// Shopify Admin API password for the private app
    pub shopify_api_secret: Option<String>,

    /// Discogs API token used to look up release tags
    pub discogs_api_key: Option<String>,

    /// Port for the local web server to listen on
    pub port: u16,

    /// Upper bound on a single invocation, on top of the platform deadline
    pub invocation_timeout: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secrets = load_secrets()?;

        let shared_secret = secret_value("SHOPIFY_SHARED_SECRET", secrets.shopify_shared_secret)
            .ok_or(ConfigError::MissingSharedSecret)?;

        Ok(Config {
            shared_secret,

            app_url: non_empty("APP_URL"),

            shop_name: non_empty("SHOP_NAME"),

            shopify_api_key: secret_value("SHOPIFY_API_KEY", secrets.shopify_api_key),

            shopify_api_secret: secret_value("SHOPIFY_API_SECRET", secrets.shopify_api_secret),

            discogs_api_key: secret_value("DISCOGS_API_KEY", secrets.discogs_api_key),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),

            invocation_timeout: parse_millis("INVOCATION_TIMEOUT_MS"),
        })
    }

    /// Configuration with only the shared secret set.
    pub fn for_secret(shared_secret: impl Into<String>) -> Self {
        Config {
            shared_secret: shared_secret.into(),
            app_url: None,
            shop_name: None,
            shopify_api_key: None,
            shopify_api_secret: None,
            discogs_api_key: None,
            port: 8080,
            invocation_timeout: None,
        }
    }

    /// The shop's `myshopify.com` domain, if a shop name is configured.
    ///
    /// A name that already is a domain is returned as is.
    pub fn shop_domain(&self) -> Option<String> {
        let name = self.shop_name.as_deref()?;
        if name.contains('.') {
            Some(name.to_string())
        } else {
            Some(format!("{}.myshopify.com", name))
        }
    }

    /// Whether both halves of the Shopify Admin API credentials are present.
    pub fn has_shop_credentials(&self) -> bool {
        self.shopify_api_key.is_some() && self.shopify_api_secret.is_some()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("shared_secret", &"<REDACTED>")
            .field("app_url", &self.app_url)
            .field("shop_name", &self.shop_name)
            .field("shopify_api_key", &redacted(&self.shopify_api_key))
            .field("shopify_api_secret", &redacted(&self.shopify_api_secret))
            .field("discogs_api_key", &redacted(&self.discogs_api_key))
            .field("port", &self.port)
            .field("invocation_timeout", &self.invocation_timeout)
            .finish()
    }
}

fn redacted(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<REDACTED>")
}

/// Read the secret document from `APP_SECRETS` or `APP_SECRETS_BINARY`.
fn load_secrets() -> Result<Secrets, ConfigError> {
    if let Some(raw) = non_empty("APP_SECRETS") {
        return Secrets::from_secret_string(&raw);
    }
    if let Some(raw) = non_empty("APP_SECRETS_BINARY") {
        return Secrets::from_secret_binary(&raw);
    }
    Ok(Secrets::default())
}

/// Read an environment variable, treating blank values as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a secret from the environment, falling back to the secret document.
///
/// Blank values count as unset, but a secret is otherwise kept byte for
/// byte; surrounding whitespace is part of the key.
fn secret_value(name: &str, fallback: Option<String>) -> Option<String> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| fallback.filter(|v| !v.trim().is_empty()))
}

/// Parse a millisecond count into a duration.
fn parse_millis(name: &str) -> Option<Duration> {
    let raw = non_empty(name)?;
    match raw.parse::<u64>() {
        Ok(0) => None,
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid millisecond value, ignoring");
            None
        }
    }
}
