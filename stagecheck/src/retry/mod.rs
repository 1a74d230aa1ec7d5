//! Retry engine.
//!
//! This module provides:
//! - A bounded, fixed-interval retry executor
//! - Retrying only errors known to be transient
//! - HTTP polling with pluggable validation predicates

mod engine;
mod http;
pub mod predicates;

pub use engine::{
    do_with_retry, do_with_retryable_errors, RetryConfig, RetryState, RetryableErrors,
};
pub use http::{
    http_get_with_retry, http_get_with_retry_with_custom_validation, http_post_form_with_retry,
    redact_credentials, HttpClient, HttpResponse,
};

#[cfg(feature = "http")]
pub use http::ReqwestHttpClient;

#[cfg(test)]
pub(crate) use http::MockHttpClient;
