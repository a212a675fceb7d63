//! # Retry Mechanics Tests
//!
//! Tests proving retry mechanics work through the full core surface:
//! 1. A retryable failure waits out its backoff and re-invokes the callback
//! 2. A non-retryable failure escalates immediately with diagnostics
//! 3. Persistent failures exhaust the retry budget and rethrow

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tempfile::TempDir;

use pressroom_core::config::PressroomConfig;
use pressroom_core::errors::detail;
use pressroom_core::report::ReportConfig;
use pressroom_core::retry::RetryContext;
use pressroom_core::{ErrorKind, JobStatus, PressroomCore, TypedError};

fn test_core(dir: &TempDir) -> PressroomCore {
    let mut config = PressroomConfig::default();
    config.report = ReportConfig {
        output_dir: dir.path().join("reports"),
        error_dir: dir.path().join("errors"),
        ..Default::default()
    };
    config.retry.base_delay_ms = 1;
    config.retry.jitter_max_ms = 1;
    config.retry.max_delay_ms = 50;
    PressroomCore::new(config)
}

/// Research job hits a 429 with a server-suggested wait: one wait of that
/// length, one retry invocation, retry count becomes 1
#[tokio::test]
async fn test_rate_limit_retry_honors_server_wait() -> Result<()> {
    let dir = TempDir::new()?;
    let core = test_core(&dir);

    let job_id = core.start_job("Research");
    core.update_job_progress(job_id, 10.0, Some("searching"), None)?;
    core.update_job_progress(job_id, 50.0, Some("reading"), None)?;

    let error = TypedError::new(ErrorKind::RateLimitError, "Research", "429 Too Many Requests")
        .with_detail(detail::RETRY_AFTER_MS, 50u64);
    let ctx = RetryContext::new("Research").with_job_id(job_id);

    let invocations = Arc::new(AtomicU32::new(0));
    let counter = invocations.clone();
    let started = Instant::now();
    let value = core
        .handle_error(error, &ctx, move |_attempt| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TypedError>("sources gathered")
            }
        })
        .await
        .expect("retry should recover");

    assert_eq!(value, "sources gathered");
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() >= Duration::from_millis(50));

    let record = core.tracker().job(job_id).unwrap();
    assert_eq!(record.retry_count, 1);
    assert_eq!(record.status, JobStatus::Running);
    // Progress survives the retry untouched
    assert_eq!(record.progress.percent, 50.0);
    Ok(())
}

/// Publish job raises an authentication error: zero retry invocations and an
/// immediate terminal rethrow with diagnostics attached
#[tokio::test]
async fn test_authentication_error_is_terminal() -> Result<()> {
    let dir = TempDir::new()?;
    let core = test_core(&dir);

    let job_id = core.start_job("Publish");
    let error = TypedError::new(ErrorKind::AuthenticationError, "Publish", "401 Unauthorized");
    let ctx = RetryContext::new("Publish").with_job_id(job_id);

    let invocations = Arc::new(AtomicU32::new(0));
    let counter = invocations.clone();
    let terminal = core
        .handle_error(error, &ctx, move |_attempt| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TypedError>(())
            }
        })
        .await
        .expect_err("authentication failures must not be retried");

    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    assert_eq!(terminal.kind, ErrorKind::AuthenticationError);
    assert!(terminal.details.contains_key(detail::TROUBLESHOOTING));

    // The job seals as failed and the workflow reflects it
    core.complete_job(job_id, None, Some(terminal))?;
    assert_eq!(core.workflow_status().status, JobStatus::Failed);
    Ok(())
}

/// Three consecutive 5xx failures with max_retries=3: exactly 3 retry
/// invocations, then a terminal rethrow on the 4th failure
#[tokio::test]
async fn test_service_unavailable_exhausts_budget() -> Result<()> {
    let dir = TempDir::new()?;
    let core = test_core(&dir);

    let error = TypedError::new(ErrorKind::ServiceUnavailableError, "FactCheck", "503");
    let ctx = RetryContext::new("FactCheck");

    let invocations = Arc::new(AtomicU32::new(0));
    let counter = invocations.clone();
    let terminal = core
        .handle_error(error, &ctx, move |_attempt| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), TypedError>(TypedError::new(
                    ErrorKind::ServiceUnavailableError,
                    "FactCheck",
                    "503 still down",
                ))
            }
        })
        .await
        .expect_err("budget exhaustion must rethrow");

    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    assert_eq!(terminal.kind, ErrorKind::ServiceUnavailableError);
    // Provenance of the retry chain survives on the terminal error
    assert!(terminal.details.contains_key(detail::PRIOR_ERROR_ID));

    // Every error in the chain left an audit file before any decision:
    // the initial error plus one per failed retry
    let audit_files = dir.path().join("errors").read_dir()?.count();
    assert_eq!(audit_files, 4);
    Ok(())
}
