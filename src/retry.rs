//! # Retry Policy Engine
//!
//! Decides whether and when a classified failure is retried. The engine never
//! performs the operation itself; callers supply the retry callback and the
//! engine bounds attempts, computes backoff, and escalates terminal errors
//! enriched with troubleshooting hints.
//!
//! Retries run as a loop scoped to the failing step: a failing retry is
//! wrapped with provenance of the prior error and fed back through the same
//! decision table, so total invocations stay bounded by `max_retries` no
//! matter how many distinct error kinds are observed across attempts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::{detail, ErrorKind, TypedError};
use crate::lifecycle::JobTracker;
use crate::metrics::MetricsAggregator;
use crate::report::ErrorReporter;

/// Backoff and retry bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum retry invocations per handled failure
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_delay_ms: u64,
    /// Ceiling on any computed delay
    pub max_delay_ms: u64,
    /// Upper bound of the uniform jitter added to each delay
    pub jitter_max_ms: u64,
    /// Growth factor applied to the timeout handed to the next attempt
    /// after a timeout failure
    pub timeout_backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_max_ms: 1000,
            timeout_backoff_multiplier: 1.5,
        }
    }
}

impl RetryConfig {
    /// Jittered exponential backoff for a 0-indexed attempt
    ///
    /// `min(base * 2^attempt + uniform(0, jitter_max), max_delay)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        let jitter = fastrand::u64(0..=self.jitter_max_ms);
        Duration::from_millis(exponential.saturating_add(jitter).min(self.max_delay_ms))
    }
}

/// Parameters handed to the caller's retry callback
#[derive(Debug, Clone, Copy)]
pub struct RetryAttempt {
    /// 1-based retry invocation count
    pub attempt: u32,
    /// Timeout the attempt should run under; escalated after timeout failures
    pub timeout: Option<Duration>,
}

/// Seam for restarting a dead browser-automation session before a retry
#[async_trait]
pub trait SessionControl: Send + Sync {
    async fn restart_session(&self) -> Result<(), TypedError>;
}

/// Caller-supplied context for one handled failure
pub struct RetryContext {
    /// Lifecycle record to update on retries, when the caller tracks one
    pub job_id: Option<Uuid>,
    pub job_name: String,
    /// Timeout in effect for the failing operation
    pub timeout: Option<Duration>,
    /// Session restart hook for browser-automation failures
    pub session: Option<Arc<dyn SessionControl>>,
}

impl RetryContext {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_id: None,
            job_name: job_name.into(),
            timeout: None,
            session: None,
        }
    }

    pub fn with_job_id(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_session(mut self, session: Arc<dyn SessionControl>) -> Self {
        self.session = Some(session);
        self
    }
}

/// The decision engine: audit, gate, back off, retry
pub struct RetryPolicy {
    config: RetryConfig,
    tracker: Arc<JobTracker>,
    metrics: Arc<MetricsAggregator>,
    reporter: Arc<ErrorReporter>,
}

impl RetryPolicy {
    pub fn new(
        config: RetryConfig,
        tracker: Arc<JobTracker>,
        metrics: Arc<MetricsAggregator>,
        reporter: Arc<ErrorReporter>,
    ) -> Self {
        Self {
            config,
            tracker,
            metrics,
            reporter,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Handle a classified failure: retry under the bounded policy or
    /// escalate a terminal error enriched with diagnostics
    ///
    /// Every error seen here is persisted to the audit trail before the
    /// decision is acted on. Unknown-kind errors that were hinted retryable
    /// get a single cautious attempt regardless of `max_retries`.
    pub async fn handle<T, F, Fut>(
        &self,
        initial_error: TypedError,
        ctx: &RetryContext,
        mut retry_fn: F,
    ) -> Result<T, TypedError>
    where
        F: FnMut(RetryAttempt) -> Fut,
        Fut: Future<Output = Result<T, TypedError>>,
    {
        let mut current = initial_error;
        let mut attempts: u32 = 0;
        let mut timeout = ctx.timeout;

        loop {
            self.audit(&current);

            if !current.retryable {
                return Err(self.escalate(current, attempts));
            }

            let budget = if current.kind == ErrorKind::UnknownError {
                self.config.max_retries.min(1)
            } else {
                self.config.max_retries
            };
            if attempts >= budget {
                warn!(
                    error_id = %current.id,
                    job_name = %ctx.job_name,
                    attempts = attempts,
                    "Retry budget exhausted"
                );
                return Err(self.escalate(current, attempts));
            }

            // Rate limits prefer the server-suggested wait
            let delay = match (current.kind, current.retry_after_ms()) {
                (ErrorKind::RateLimitError, Some(ms)) => Duration::from_millis(ms),
                _ => self.config.backoff_delay(attempts),
            };

            // Timeouts hand a longer deadline to the next attempt
            if current.kind == ErrorKind::TimeoutError {
                let prior = current.timeout_ms().map(Duration::from_millis).or(timeout);
                timeout = prior.map(|t| t.mul_f64(self.config.timeout_backoff_multiplier));
            }

            if current.requires_restart() {
                if let Some(session) = &ctx.session {
                    info!(job_name = %ctx.job_name, "Restarting browser session before retry");
                    if let Err(restart_error) = session.restart_session().await {
                        let wrapped = self.wrap(restart_error, &current, attempts);
                        self.audit(&wrapped);
                        return Err(self.escalate(wrapped, attempts));
                    }
                }
            }

            attempts += 1;
            if let Some(job_id) = ctx.job_id {
                // Lifecycle tracking is best-effort here: a missing record
                // must not turn a recoverable failure terminal
                if let Err(e) = self.tracker.record_job_retry(job_id, &current.message) {
                    warn!(job_id = %job_id, error = %e, "Could not record retry on job");
                }
            }
            self.metrics.record_sample("retry", "attempts", 1.0);

            info!(
                error_id = %current.id,
                job_name = %ctx.job_name,
                kind = %current.kind,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "Retrying after backoff"
            );
            tokio::time::sleep(delay).await;

            // Back to Running for the re-invocation itself
            if let Some(job_id) = ctx.job_id {
                let _ = self.tracker.resume_job(job_id);
            }

            match retry_fn(RetryAttempt {
                attempt: attempts,
                timeout,
            })
            .await
            {
                Ok(value) => {
                    info!(
                        job_name = %ctx.job_name,
                        attempts = attempts,
                        "Operation recovered after retry"
                    );
                    return Ok(value);
                }
                Err(next_error) => {
                    current = self.wrap(next_error, &current, attempts);
                }
            }
        }
    }

    /// Persist an error to the audit trail; failures are logged, not raised,
    /// so a full report directory cannot mask the underlying failure
    fn audit(&self, err: &TypedError) {
        self.metrics
            .record_sample("errors", &err.kind.to_string(), 1.0);
        if let Err(io_err) = self.reporter.report(err) {
            error!(error_id = %err.id, error = %io_err, "Failed to persist error report");
        }
    }

    /// Wrap a retry-attempt failure with provenance of the error it replaced
    fn wrap(&self, next: TypedError, prior: &TypedError, attempt: u32) -> TypedError {
        next.with_detail(detail::PRIOR_ERROR_ID, prior.id.clone())
            .with_detail(detail::ATTEMPT, attempt)
    }

    /// Enrich a terminal error with diagnostics and log it for the operator
    fn escalate(&self, err: TypedError, attempts: u32) -> TypedError {
        let hints = troubleshooting_hints(&err.job_name, err.kind);
        let enriched = err.with_detail(detail::TROUBLESHOOTING, hints);
        error!(
            error_id = %enriched.id,
            job_name = %enriched.job_name,
            kind = %enriched.kind,
            severity = %enriched.severity,
            attempts = attempts,
            message = %enriched.message,
            "Terminal pipeline error"
        );
        enriched
    }
}

/// Run an operation under a deadline, classifying expiry as a timeout error
///
/// The losing future is dropped, so the in-flight work is cancelled rather
/// than abandoned.
pub async fn run_with_timeout<T, Fut>(
    job_name: &str,
    timeout: Duration,
    operation: Fut,
) -> Result<T, TypedError>
where
    Fut: Future<Output = Result<T, TypedError>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(TypedError::new(
            ErrorKind::TimeoutError,
            job_name,
            format!("operation exceeded its {}ms deadline", timeout.as_millis()),
        )
        .with_detail(detail::TIMEOUT_MS, timeout.as_millis() as u64)),
    }
}

/// Actionable hints attached to terminal errors, keyed by job and kind
fn troubleshooting_hints(job_name: &str, kind: ErrorKind) -> Vec<String> {
    let mut hints: Vec<String> = match kind {
        ErrorKind::AuthenticationError => vec![
            "Verify the service API key is present and unexpired".to_string(),
            "Check that the credential grants access to the requested endpoint".to_string(),
        ],
        ErrorKind::QuotaExceededError => vec![
            "Check the provider billing dashboard for the current allotment".to_string(),
            "Request a quota increase or reduce per-run call volume".to_string(),
        ],
        ErrorKind::ValidationError => vec![
            "Review the request payload against the provider's schema".to_string(),
            "Check for prompt or query inputs exceeding provider limits".to_string(),
        ],
        ErrorKind::RateLimitError => vec![
            "Lower the pipeline's request concurrency".to_string(),
            "Honor the provider's Retry-After header on future calls".to_string(),
        ],
        ErrorKind::TimeoutError => vec![
            "Increase the operation timeout configuration".to_string(),
            "Check the provider status page for degraded latency".to_string(),
        ],
        ErrorKind::NetworkError => vec![
            "Check network connectivity and DNS resolution".to_string(),
            "Verify the service endpoint URL".to_string(),
        ],
        ErrorKind::BrowserError => vec![
            "Verify the target page layout has not changed".to_string(),
            "Check whether the publishing session cookie expired".to_string(),
        ],
        ErrorKind::FileError => vec![
            "Check output directory permissions and free disk space".to_string(),
        ],
        ErrorKind::ApiError | ErrorKind::ServiceUnavailableError => vec![
            "Check the provider status page for an ongoing incident".to_string(),
            "Retry the workflow once the upstream recovers".to_string(),
        ],
        ErrorKind::UnknownError => vec![
            "Review the error report and recent logs for this job".to_string(),
        ],
    };

    let stage_hint = match job_name.to_lowercase() {
        n if n.contains("research") => Some("Research stage: verify search API access and result quotas"),
        n if n.contains("write") => Some("Write stage: verify the LLM model name and token limits"),
        n if n.contains("fact") => Some("Fact-check stage: verify claim sources are reachable"),
        n if n.contains("publish") => Some("Publish stage: verify the CMS login flow still matches the automation script"),
        _ => None,
    };
    if let Some(hint) = stage_hint {
        hints.push(hint.to_string());
    }
    hints
}
