//! # Typed Pipeline Errors
//!
//! The normalized failure model shared by every pipeline stage. Raw failures
//! from external dependencies (LLM APIs, search APIs, browser automation) are
//! classified into a [`TypedError`] carrying a kind, severity, and a
//! retryability decision made once at classification time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Well-known keys for [`TypedError::details`].
///
/// The details map is open-ended, but certain kinds require certain keys:
/// rate-limit errors carry [`RETRY_AFTER_MS`], timeout errors carry
/// [`TIMEOUT_MS`], browser errors may carry [`REQUIRES_RESTART`], and errors
/// wrapped during a retry chain carry [`PRIOR_ERROR_ID`] and [`ATTEMPT`].
pub mod detail {
    /// Server-suggested wait before retrying, in milliseconds (rate limits).
    pub const RETRY_AFTER_MS: &str = "retry_after_ms";
    /// Timeout that was in effect when the operation timed out, in milliseconds.
    pub const TIMEOUT_MS: &str = "timeout_ms";
    /// Browser session is dead and must be restarted before retrying.
    pub const REQUIRES_RESTART: &str = "requires_restart";
    /// HTTP status observed on the raw failure.
    pub const STATUS_CODE: &str = "status_code";
    /// Id of the error that preceded this one in a retry chain.
    pub const PRIOR_ERROR_ID: &str = "prior_error_id";
    /// Attempt number (1-based) at which this error was observed.
    pub const ATTEMPT: &str = "attempt";
    /// Troubleshooting hints attached when an error is escalated as terminal.
    pub const TROUBLESHOOTING: &str = "troubleshooting";
}

/// Failure categories covering every external dependency of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Generic upstream API failure (5xx or unexpected response)
    ApiError,
    /// Connection or navigation failure
    NetworkError,
    /// Credentials rejected (401/403)
    AuthenticationError,
    /// Request rejected as malformed (400)
    ValidationError,
    /// Operation exceeded its deadline
    TimeoutError,
    /// Short-term throughput cap hit (429)
    RateLimitError,
    /// Billing or quota allotment exhausted (402)
    QuotaExceededError,
    /// Upstream explicitly unavailable (503)
    ServiceUnavailableError,
    /// Browser-automation failure (element not found, dead session)
    BrowserError,
    /// Local filesystem failure
    FileError,
    /// Unclassified failure
    UnknownError,
}

impl ErrorKind {
    /// Default retryability for this kind, before any classifier override
    pub fn default_retryable(&self) -> bool {
        matches!(
            self,
            Self::ApiError
                | Self::NetworkError
                | Self::TimeoutError
                | Self::RateLimitError
                | Self::ServiceUnavailableError
                | Self::BrowserError
        )
    }

    /// Default severity for this kind
    pub fn default_severity(&self) -> ErrorSeverity {
        match self {
            Self::AuthenticationError | Self::QuotaExceededError => ErrorSeverity::Critical,
            Self::ApiError | Self::ServiceUnavailableError => ErrorSeverity::High,
            Self::FileError | Self::UnknownError => ErrorSeverity::High,
            Self::NetworkError
            | Self::ValidationError
            | Self::TimeoutError
            | Self::RateLimitError
            | Self::BrowserError => ErrorSeverity::Medium,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiError => write!(f, "api_error"),
            Self::NetworkError => write!(f, "network_error"),
            Self::AuthenticationError => write!(f, "authentication_error"),
            Self::ValidationError => write!(f, "validation_error"),
            Self::TimeoutError => write!(f, "timeout_error"),
            Self::RateLimitError => write!(f, "rate_limit_error"),
            Self::QuotaExceededError => write!(f, "quota_exceeded_error"),
            Self::ServiceUnavailableError => write!(f, "service_unavailable_error"),
            Self::BrowserError => write!(f, "browser_error"),
            Self::FileError => write!(f, "file_error"),
            Self::UnknownError => write!(f, "unknown_error"),
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api_error" => Ok(Self::ApiError),
            "network_error" => Ok(Self::NetworkError),
            "authentication_error" => Ok(Self::AuthenticationError),
            "validation_error" => Ok(Self::ValidationError),
            "timeout_error" => Ok(Self::TimeoutError),
            "rate_limit_error" => Ok(Self::RateLimitError),
            "quota_exceeded_error" => Ok(Self::QuotaExceededError),
            "service_unavailable_error" => Ok(Self::ServiceUnavailableError),
            "browser_error" => Ok(Self::BrowserError),
            "file_error" => Ok(Self::FileError),
            "unknown_error" => Ok(Self::UnknownError),
            _ => Err(format!("Invalid error kind: {s}")),
        }
    }
}

/// Severity used for operator triage and recommendation thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Normalized, classified representation of any pipeline failure
///
/// Instances are created only by classifiers or the retry policy engine and
/// are immutable once constructed; `retryable` is decided at classification
/// time and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedError {
    /// Unique identifier derived from job name, kind, and creation time
    pub id: String,

    /// Name of the job that raised the failure
    pub job_name: String,

    /// Failure category
    pub kind: ErrorKind,

    /// Human-readable error message
    pub message: String,

    /// Open key-value payload; see [`detail`] for required keys per kind
    pub details: HashMap<String, Value>,

    /// Whether the retry policy engine may attempt recovery
    pub retryable: bool,

    /// Severity for triage and reporting
    pub severity: ErrorSeverity,

    /// When the error was classified
    pub created_at: DateTime<Utc>,
}

impl TypedError {
    /// Create a typed error with the kind's default severity and retryability
    pub fn new(kind: ErrorKind, job_name: impl Into<String>, message: impl Into<String>) -> Self {
        let job_name = job_name.into();
        let created_at = Utc::now();
        Self {
            id: Self::derive_id(&job_name, kind, created_at),
            job_name,
            kind,
            message: message.into(),
            details: HashMap::new(),
            retryable: kind.default_retryable(),
            severity: kind.default_severity(),
            created_at,
        }
    }

    /// Override the retryability decision (classification time only)
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Override the severity
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach a detail entry
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Server-suggested retry delay in milliseconds, if present
    pub fn retry_after_ms(&self) -> Option<u64> {
        self.details.get(detail::RETRY_AFTER_MS).and_then(Value::as_u64)
    }

    /// Timeout in effect when a timeout error occurred, in milliseconds
    pub fn timeout_ms(&self) -> Option<u64> {
        self.details.get(detail::TIMEOUT_MS).and_then(Value::as_u64)
    }

    /// Whether a browser session restart was requested by the classifier
    pub fn requires_restart(&self) -> bool {
        self.details
            .get(detail::REQUIRES_RESTART)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn derive_id(job_name: &str, kind: ErrorKind, created_at: DateTime<Utc>) -> String {
        // Random suffix keeps ids unique for same-millisecond errors
        let slug: String = job_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        format!(
            "{}_{}_{}_{:04x}",
            slug,
            kind,
            created_at.timestamp_millis(),
            fastrand::u16(..)
        )
    }
}

impl fmt::Display for TypedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} in job '{}': {}",
            self.severity, self.kind, self.job_name, self.message
        )
    }
}

impl std::error::Error for TypedError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_defaults() {
        assert!(ErrorKind::RateLimitError.default_retryable());
        assert!(ErrorKind::NetworkError.default_retryable());
        assert!(!ErrorKind::AuthenticationError.default_retryable());
        assert!(!ErrorKind::QuotaExceededError.default_retryable());
        assert!(!ErrorKind::ValidationError.default_retryable());

        assert_eq!(
            ErrorKind::AuthenticationError.default_severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(ErrorKind::ApiError.default_severity(), ErrorSeverity::High);
        assert_eq!(
            ErrorKind::TimeoutError.default_severity(),
            ErrorSeverity::Medium
        );
    }

    #[test]
    fn test_kind_string_conversion() {
        assert_eq!(ErrorKind::RateLimitError.to_string(), "rate_limit_error");
        assert_eq!(
            "service_unavailable_error".parse::<ErrorKind>().unwrap(),
            ErrorKind::ServiceUnavailableError
        );
        assert!("not_a_kind".parse::<ErrorKind>().is_err());
    }

    #[test]
    fn test_kind_serde() {
        let json = serde_json::to_string(&ErrorKind::QuotaExceededError).unwrap();
        assert_eq!(json, "\"quota_exceeded_error\"");
        let parsed: ErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ErrorKind::QuotaExceededError);
    }

    #[test]
    fn test_typed_error_construction() {
        let err = TypedError::new(ErrorKind::RateLimitError, "Research", "429 from LLM API")
            .with_detail(detail::RETRY_AFTER_MS, 2000u64);

        assert!(err.retryable);
        assert_eq!(err.severity, ErrorSeverity::Medium);
        assert_eq!(err.retry_after_ms(), Some(2000));
        assert!(err.id.starts_with("research_rate_limit_error_"));
    }

    #[test]
    fn test_error_ids_unique() {
        let a = TypedError::new(ErrorKind::ApiError, "Write", "boom");
        let b = TypedError::new(ErrorKind::ApiError, "Write", "boom");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_restart_flag() {
        let err = TypedError::new(ErrorKind::BrowserError, "Publish", "session dead")
            .with_detail(detail::REQUIRES_RESTART, true);
        assert!(err.requires_restart());

        let err = TypedError::new(ErrorKind::BrowserError, "Publish", "element not found");
        assert!(!err.requires_restart());
    }
}
