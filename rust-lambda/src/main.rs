//! Shoptag Lambda bootstrap - custom runtime entry point.
//!
//! Builds the web application once, then serves invocations from the Lambda
//! Runtime API until the platform shuts the environment down.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shoptag::lambda::{runtime, RuntimeError};
use shoptag::{create_router, Adapter, AppState, Config, LoggingHooks, RuntimeClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("lambda_starting");

    let runtime_api =
        env::var("AWS_LAMBDA_RUNTIME_API").context("AWS_LAMBDA_RUNTIME_API is not set")?;
    let client = RuntimeClient::new(&runtime_api)?;

    // Load configuration; a missing secret is fatal and reported to the runtime
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "config_invalid");
            let report = RuntimeError::new("ConfigError", e.to_string());
            if let Err(report_err) = client.init_error(&report).await {
                error!(error = %report_err, "init_error_report_failed");
            }
            return Err(e.into());
        }
    };
    info!(
        app_url = ?config.app_url,
        shop_name = ?config.shop_name,
        invocation_timeout_ms = config.invocation_timeout.map(|d| d.as_millis() as u64),
        "config_loaded"
    );

    // Build the app once and reuse it for every invocation
    let timeout = config.invocation_timeout;
    let hooks = Arc::new(LoggingHooks::from_config(&config));
    let state = AppState::new(config, hooks);
    let adapter = Adapter::new(create_router(state)).with_timeout(timeout);

    runtime::run(&client, &adapter).await
}
