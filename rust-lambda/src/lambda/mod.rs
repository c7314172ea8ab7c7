//! Lambda integration.
//!
//! This module provides:
//! - Invocation event and result types for API Gateway and ALB triggers
//! - The adapter that drives an HTTP service from invocation events
//! - A client for the Lambda Runtime API that feeds the adapter
//!
//! ## Flow
//!
//! ```text
//! Runtime API → RuntimeClient → Adapter → Router → RuntimeClient → Runtime API
//! ```

pub mod adapter;
pub mod runtime;
pub mod types;

pub use adapter::{build_query_string, build_request, decode_body, Adapter, AdapterError};
pub use runtime::{
    poll_once, Invocation, NextInvocationError, RuntimeClient, RuntimeError, DEADLINE_MARGIN,
    RUNTIME_API_VERSION,
};
pub use types::{InvocationEvent, InvocationResult, Trigger};
