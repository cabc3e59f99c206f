//! Metrics definitions for the Todo API.
//!
//! All metrics follow Prometheus naming conventions:
//! - `todo_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: 4 values (`/health`, `/metrics`, `/api/todolist`, `/other`)
//! - `outcome`: `authorized` plus the `AuthFailure` reason codes
//! - `stage`: `token` or `secret`
//!
//! Subject identifiers are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // HTTP request buckets, end to end including a possible exchange
        .set_buckets_for_metric(
            Matcher::Prefix("todo_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Local validation is CPU-bound except for the first key-set fetch
        .set_buckets_for_metric(
            Matcher::Prefix("todo_token_validation".to_string()),
            &[
                0.0005, 0.001, 0.002, 0.005, 0.010, 0.050, 0.100, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set token validation buckets: {e}"))?
        // Identity provider and vault round trips
        .set_buckets_for_metric(
            Matcher::Prefix("todo_token_exchange".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set token exchange buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `todo_http_requests_total`, `todo_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// This captures ALL HTTP responses including framework-level errors like
/// 404 Not Found and 405 Method Not Allowed.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("todo_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("todo_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/api/todolist" | "/api/todolist/" => "/api/todolist",
        _ => "/other",
    }
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record the final outcome of an authorization attempt
///
/// Metric: `todo_auth_outcomes_total`
/// Labels: `outcome` (`authorized` or an `AuthFailure` reason code)
pub fn record_auth_outcome(outcome: &'static str) {
    counter!("todo_auth_outcomes_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Record local token validation
///
/// Metric: `todo_token_validation_duration_seconds`, `todo_token_validations_total`
/// Labels: `status` (`success` or an `AuthFailure` reason code)
pub fn record_token_validation(status: &'static str, duration: Duration) {
    histogram!("todo_token_validation_duration_seconds").record(duration.as_secs_f64());

    counter!("todo_token_validations_total",
        "status" => status
    )
    .increment(1);
}

/// Record a signing key set fetch
///
/// Metric: `todo_jwks_refresh_total`
/// Labels: `trigger` (`initial`, `unknown_kid`), `status` (`success`, `error`)
pub fn record_jwks_refresh(trigger: &'static str, status: &'static str) {
    counter!("todo_jwks_refresh_total",
        "trigger" => trigger,
        "status" => status
    )
    .increment(1);
}

// ============================================================================
// Subject Cache Metrics
// ============================================================================

/// Record a subject cache lookup
///
/// Metric: `todo_subject_cache_lookups_total`
/// Labels: `result` (`hit`, `miss`)
pub fn record_subject_cache_lookup(result: &'static str) {
    counter!("todo_subject_cache_lookups_total",
        "result" => result
    )
    .increment(1);
}

/// Record an entry removed to make room
///
/// Metric: `todo_subject_cache_evictions_total`
/// Labels: `cause` (`expired`, `capacity`)
pub fn record_subject_cache_eviction(cause: &'static str, count: u64) {
    counter!("todo_subject_cache_evictions_total",
        "cause" => cause
    )
    .increment(count);
}

/// Set current subject cache size
///
/// Metric: `todo_subject_cache_entries`
pub fn set_subject_cache_entries(count: usize) {
    gauge!("todo_subject_cache_entries").set(count as f64);
}

// ============================================================================
// Token Exchange Metrics
// ============================================================================

/// Record one stage of the on-behalf-of flow
///
/// Metric: `todo_token_exchange_duration_seconds`, `todo_token_exchange_total`
/// Labels: `stage` (`token`, `secret`), `status` (`success`, `error`)
pub fn record_token_exchange(stage: &'static str, status: &'static str, duration: Duration) {
    histogram!("todo_token_exchange_duration_seconds",
        "stage" => stage
    )
    .record(duration.as_secs_f64());

    counter!("todo_token_exchange_total",
        "stage" => stage,
        "status" => status
    )
    .increment(1);
}
