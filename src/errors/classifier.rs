//! # Service Error Classification
//!
//! Classifiers that map raw failures from the pipeline's external
//! dependencies into [`TypedError`] instances with the retryability and
//! severity decision already made.
//!
//! ## Architecture
//!
//! Classification uses a strategy pattern with trait-based classifiers:
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ RawFailure      │────▶│ ErrorClassifier │────▶│ TypedError      │
//! │ + job name      │     │ strategy        │     │ (retryable set) │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! One classifier exists per dependency: [`LlmErrorClassifier`] for the LLM
//! API, [`SearchErrorClassifier`] for the search API, and
//! [`BrowserErrorClassifier`] for browser-automation targets.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use super::typed::{detail, ErrorKind, ErrorSeverity, TypedError};

/// Dependency-agnostic capture of a raw failure
///
/// Callers build one of these at the point where the external dependency
/// failed, preserving the signals classifiers inspect: HTTP status, message
/// text, the `Retry-After` header, and the timeout that was in effect.
#[derive(Debug, Clone, Default)]
pub struct RawFailure {
    /// Raw error message from the dependency
    pub message: String,

    /// HTTP status code, when the failure came from an HTTP response
    pub status_code: Option<u16>,

    /// Server-suggested wait taken from a `Retry-After` header
    pub retry_after: Option<Duration>,

    /// Timeout that was in effect when the operation failed
    pub timeout: Option<Duration>,

    /// Caller hint that an otherwise-unclassifiable failure is worth one retry
    pub retryable_hint: Option<bool>,

    /// Additional context carried into the typed error's details
    pub metadata: HashMap<String, Value>,
}

impl RawFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retryable_hint(mut self, retryable: bool) -> Self {
        self.retryable_hint = Some(retryable);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn message_lower(&self) -> String {
        self.message.to_lowercase()
    }
}

/// Trait for dependency-specific classification strategies
pub trait ErrorClassifier: Send + Sync {
    /// Classify a raw failure into a typed error for the given job
    fn classify(&self, raw: &RawFailure, job_name: &str) -> TypedError;

    /// Get the classifier name for identification
    fn classifier_name(&self) -> &'static str;

    /// Check if this classifier can handle the given failure
    fn can_classify(&self, raw: &RawFailure) -> bool;
}

/// Shared HTTP-shaped classification used by the LLM and search classifiers
fn classify_http(
    raw: &RawFailure,
    job_name: &str,
    service: &str,
    default_retry_after: Duration,
) -> TypedError {
    let msg = raw.message_lower();
    let status = raw.status_code;

    let base = |kind: ErrorKind| {
        let mut err = TypedError::new(kind, job_name, format!("{service}: {}", raw.message));
        if let Some(code) = status {
            err = err.with_detail(detail::STATUS_CODE, code);
        }
        for (key, value) in &raw.metadata {
            err = err.with_detail(key.clone(), value.clone());
        }
        err
    };

    if status == Some(429) || msg.contains("rate limit") || msg.contains("too many requests") {
        let retry_after_ms = raw
            .retry_after
            .unwrap_or(default_retry_after)
            .as_millis() as u64;
        return base(ErrorKind::RateLimitError).with_detail(detail::RETRY_AFTER_MS, retry_after_ms);
    }

    if status == Some(402)
        || msg.contains("quota")
        || msg.contains("billing")
        || msg.contains("insufficient credit")
    {
        return base(ErrorKind::QuotaExceededError);
    }

    if matches!(status, Some(401) | Some(403))
        || msg.contains("unauthorized")
        || msg.contains("invalid api key")
        || msg.contains("forbidden")
    {
        return base(ErrorKind::AuthenticationError);
    }

    if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline") {
        let mut err = base(ErrorKind::TimeoutError);
        if let Some(timeout) = raw.timeout {
            err = err.with_detail(detail::TIMEOUT_MS, timeout.as_millis() as u64);
        }
        return err;
    }

    if status == Some(503) {
        return base(ErrorKind::ServiceUnavailableError);
    }

    if let Some(code) = status {
        if code >= 500 {
            return base(ErrorKind::ApiError);
        }
        if code == 400 {
            return base(ErrorKind::ValidationError);
        }
    }

    if msg.contains("connection")
        || msg.contains("network")
        || msg.contains("dns")
        || msg.contains("socket")
    {
        return base(ErrorKind::NetworkError);
    }

    let err = base(ErrorKind::UnknownError);
    match raw.retryable_hint {
        Some(retryable) => err.with_retryable(retryable),
        None => err,
    }
}

/// Classifier for failures from the LLM completion API
pub struct LlmErrorClassifier {
    /// Default wait applied to rate limits with no `Retry-After` header
    default_retry_after: Duration,
}

impl LlmErrorClassifier {
    pub fn new() -> Self {
        Self {
            default_retry_after: Duration::from_secs(60),
        }
    }

    pub fn with_default_retry_after(default_retry_after: Duration) -> Self {
        Self { default_retry_after }
    }
}

impl Default for LlmErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier for LlmErrorClassifier {
    fn classify(&self, raw: &RawFailure, job_name: &str) -> TypedError {
        let msg = raw.message_lower();

        // Context-window overruns are validation failures, not API faults
        if msg.contains("context length") || msg.contains("maximum context") {
            return TypedError::new(
                ErrorKind::ValidationError,
                job_name,
                format!("llm: {}", raw.message),
            );
        }

        classify_http(raw, job_name, "llm", self.default_retry_after)
    }

    fn classifier_name(&self) -> &'static str {
        "LlmErrorClassifier"
    }

    fn can_classify(&self, _raw: &RawFailure) -> bool {
        true
    }
}

/// Classifier for failures from the search API
pub struct SearchErrorClassifier {
    default_retry_after: Duration,
}

impl SearchErrorClassifier {
    pub fn new() -> Self {
        Self {
            default_retry_after: Duration::from_secs(30),
        }
    }
}

impl Default for SearchErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier for SearchErrorClassifier {
    fn classify(&self, raw: &RawFailure, job_name: &str) -> TypedError {
        classify_http(raw, job_name, "search", self.default_retry_after)
    }

    fn classifier_name(&self) -> &'static str {
        "SearchErrorClassifier"
    }

    fn can_classify(&self, _raw: &RawFailure) -> bool {
        true
    }
}

/// Classifier for browser-automation failures
///
/// Browser failures are retryable in general, but a dead session (closed
/// target, disconnected browser) additionally requests a session restart
/// through the `requires_restart` detail flag.
pub struct BrowserErrorClassifier;

impl BrowserErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    fn is_dead_session(msg: &str) -> bool {
        msg.contains("target closed")
            || msg.contains("session closed")
            || msg.contains("browser has disconnected")
            || msg.contains("execution context was destroyed")
    }
}

impl Default for BrowserErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier for BrowserErrorClassifier {
    fn classify(&self, raw: &RawFailure, job_name: &str) -> TypedError {
        let msg = raw.message_lower();
        let base = TypedError::new(
            ErrorKind::BrowserError,
            job_name,
            format!("browser: {}", raw.message),
        );

        if Self::is_dead_session(&msg) {
            return base.with_detail(detail::REQUIRES_RESTART, true);
        }

        if msg.contains("timeout") || msg.contains("timed out") {
            let mut err = TypedError::new(
                ErrorKind::TimeoutError,
                job_name,
                format!("browser: {}", raw.message),
            );
            if let Some(timeout) = raw.timeout {
                err = err.with_detail(detail::TIMEOUT_MS, timeout.as_millis() as u64);
            }
            return err;
        }

        if msg.contains("net::") || msg.contains("navigation failed") || msg.contains("connection")
        {
            return TypedError::new(
                ErrorKind::NetworkError,
                job_name,
                format!("browser: {}", raw.message),
            );
        }

        // Element-not-found and redirect-to-login stay retryable: the page may
        // simply not have settled yet
        if msg.contains("element not found")
            || msg.contains("no node found")
            || msg.contains("selector")
            || msg.contains("redirected to login")
        {
            return base;
        }

        match raw.retryable_hint {
            Some(retryable) => base.with_retryable(retryable),
            None => base,
        }
    }

    fn classifier_name(&self) -> &'static str {
        "BrowserErrorClassifier"
    }

    fn can_classify(&self, _raw: &RawFailure) -> bool {
        true
    }
}
