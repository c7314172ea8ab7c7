//! Shoptag - Shopify product webhooks on AWS Lambda.
//!
//! This library provides shared modules for the two binaries:
//! - `bootstrap`: Lambda custom runtime driving the app from invocation events
//! - `shoptag-web`: Plain HTTP server for running the same app locally
//!
//! ## Architecture
//!
//! ```text
//! Lambda Runtime API → Adapter → Router → signature check → ProductHooks
//! ```

pub mod config;
pub mod lambda;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use lambda::{Adapter, InvocationEvent, InvocationResult, RuntimeClient, Trigger};
pub use web::{create_router, AppState, LoggingHooks, ProductHooks, WebhookAuthenticator};
