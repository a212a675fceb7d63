#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pressroom Core
//!
//! Job resilience and observability core for the Pressroom content-production
//! pipeline (research → write → fact-check → publish).
//!
//! ## Overview
//!
//! Each pipeline stage is an independent job calling an unreliable external
//! dependency: an LLM API, a search API, or a browser-automation target. This
//! crate normalizes their heterogeneous failures into one typed error model,
//! decides whether a failure is recoverable and retries it under a bounded
//! backoff policy, and tracks the lifecycle, progress, and performance of
//! every job so a consolidated report can be produced at any time.
//!
//! The core never performs the retried operation itself; callers supply the
//! retry callback and the core only decides whether and when to invoke it
//! again.
//!
//! ## Module Organization
//!
//! - [`errors`] - Typed error taxonomy and per-dependency classifiers
//! - [`retry`] - Bounded backoff retry policy engine
//! - [`lifecycle`] - Job state machine, progress, and workflow status
//! - [`metrics`] - Running statistics, API-call ledger, trend detection
//! - [`report`] - Consolidated snapshot assembly and JSON persistence
//! - [`core`] - The explicit composition root injected into jobs
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging setup
//! - [`error`] - Operational errors of the core itself
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pressroom_core::config::PressroomConfig;
//! use pressroom_core::PressroomCore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let core = PressroomCore::new(PressroomConfig::default());
//!
//! let job_id = core.start_job("Research");
//! core.update_job_progress(job_id, 50.0, Some("reading sources"), None)?;
//! core.track_api_call("search", "/search", Some(120), true, None);
//! core.complete_job(job_id, None, None)?;
//!
//! let report = core.generate_comprehensive_report()?;
//! println!("workflow status: {}", report.workflow.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod report;
pub mod retry;

pub use self::config::{ConfigManager, PressroomConfig};
pub use self::core::{exit_code_for, report_terminal_failure, PressroomCore};
pub use self::error::{CoreError, Result};
pub use self::errors::{
    BrowserErrorClassifier, ErrorClassifier, ErrorKind, ErrorSeverity, LlmErrorClassifier,
    RawFailure, SearchErrorClassifier, TypedError,
};
pub use self::lifecycle::{JobRecord, JobStatus, JobTracker, WorkflowStatus};
pub use self::metrics::{ApiCallDetails, ApiUsageRecord, MetricsAggregator, Trend};
pub use self::report::{ErrorReporter, PipelineReport, ReportGenerator};
pub use self::retry::{
    run_with_timeout, RetryAttempt, RetryConfig, RetryContext, RetryPolicy, SessionControl,
};
