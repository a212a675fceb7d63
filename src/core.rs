//! # Core Context
//!
//! [`PressroomCore`] is the explicit composition root for the resilience
//! core: one instance is constructed at process entry from configuration and
//! injected into each pipeline job. It wires the lifecycle tracker, metrics
//! aggregator, retry policy engine, and report generator together and exposes
//! the operation surface jobs call.
//!
//! There is deliberately no global instance; tests construct a fresh core per
//! test and hosting binaries own exactly one.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use crate::config::PressroomConfig;
use crate::error::Result;
use crate::errors::{ErrorSeverity, TypedError};
use crate::lifecycle::{JobRecord, JobTracker, WorkflowStatus};
use crate::metrics::{ApiCallDetails, MetricsAggregator, Trend};
use crate::report::{ErrorReporter, PipelineReport, ReportGenerator};
use crate::retry::{RetryContext, RetryPolicy};

/// Composition root owning every subsystem of the resilience core
pub struct PressroomCore {
    config: PressroomConfig,
    tracker: Arc<JobTracker>,
    metrics: Arc<MetricsAggregator>,
    policy: RetryPolicy,
    generator: ReportGenerator,
}

impl PressroomCore {
    /// Build a core from explicit configuration
    pub fn new(config: PressroomConfig) -> Self {
        let tracker = Arc::new(JobTracker::new());
        let metrics = Arc::new(MetricsAggregator::new());
        let reporter = Arc::new(ErrorReporter::new(config.report.error_dir.clone()));
        let policy = RetryPolicy::new(
            config.retry.clone(),
            tracker.clone(),
            metrics.clone(),
            reporter,
        );
        let generator = ReportGenerator::new(config.report.clone());

        Self {
            config,
            tracker,
            metrics,
            policy,
            generator,
        }
    }

    /// Build a core from the loaded environment configuration
    ///
    /// Also installs the structured logging subscriber; explicit `new` leaves
    /// logging to the hosting process.
    pub fn from_env() -> Result<Self> {
        let manager = crate::config::ConfigManager::load()?;
        crate::logging::init_structured_logging(&manager.config().logging);
        Ok(Self::new(manager.config().clone()))
    }

    pub fn config(&self) -> &PressroomConfig {
        &self.config
    }

    /// Lifecycle tracker handle, for callers composing their own wiring
    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Metrics aggregator handle
    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    // ---- Job lifecycle surface ----

    pub fn start_job(&self, name: impl Into<String>) -> Uuid {
        self.tracker.start_job(name)
    }

    pub fn update_job_progress(
        &self,
        job_id: Uuid,
        percent: f64,
        stage: Option<&str>,
        message: Option<&str>,
    ) -> Result<()> {
        self.tracker.update_job_progress(job_id, percent, stage, message)
    }

    pub fn record_job_retry(&self, job_id: Uuid, reason: &str) -> Result<u32> {
        self.tracker.record_job_retry(job_id, reason)
    }

    pub fn complete_job(
        &self,
        job_id: Uuid,
        outputs: Option<Value>,
        error: Option<TypedError>,
    ) -> Result<JobRecord> {
        self.tracker.complete_job(job_id, outputs, error)
    }

    pub fn workflow_status(&self) -> WorkflowStatus {
        self.tracker.workflow_status()
    }

    // ---- Metrics surface ----

    pub fn record_sample(&self, component: &str, metric: &str, value: f64) {
        self.metrics.record_sample(component, metric, value);
    }

    pub fn track_api_call(
        &self,
        service: &str,
        endpoint: &str,
        response_time_ms: Option<u64>,
        success: bool,
        details: Option<ApiCallDetails>,
    ) {
        self.metrics
            .track_api_call(service, endpoint, response_time_ms, success, details);
    }

    pub fn trend(&self, component: &str, metric: &str) -> Trend {
        self.metrics.trend(component, metric)
    }

    // ---- Error handling surface ----

    /// Hand a classified failure to the retry policy engine
    ///
    /// Returns the retried operation's value, or the enriched terminal error.
    pub async fn handle_error<T, F, Fut>(
        &self,
        error: TypedError,
        ctx: &RetryContext,
        retry_fn: F,
    ) -> std::result::Result<T, TypedError>
    where
        F: FnMut(crate::retry::RetryAttempt) -> Fut,
        Fut: Future<Output = std::result::Result<T, TypedError>>,
    {
        self.policy.handle(error, ctx, retry_fn).await
    }

    /// Time an external call and record it in the API ledger
    ///
    /// Explicit instrumentation wrapper composed at call sites; the
    /// operation's result passes through untouched.
    pub async fn track_operation<T, E, Fut>(
        &self,
        service: &str,
        endpoint: &str,
        operation: Fut,
    ) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let started = Instant::now();
        let result = operation.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.metrics
            .track_api_call(service, endpoint, Some(elapsed_ms), result.is_ok(), None);
        result
    }

    // ---- Reporting surface ----

    /// Assemble the consolidated snapshot and persist it
    ///
    /// Writes a timestamped JSON file plus the overwritten `latest.json`
    /// pointer, then returns the report.
    pub fn generate_comprehensive_report(&self) -> Result<PipelineReport> {
        let report = self.generator.build(&self.tracker, &self.metrics);
        self.generator.persist(&report)?;
        Ok(report)
    }
}

/// Exit code a hosting job process should terminate with after an
/// unrecovered failure
pub fn exit_code_for(error: &TypedError) -> i32 {
    match error.severity {
        ErrorSeverity::Critical => 2,
        _ => 1,
    }
}

/// Log a terminal failure in the structured form operators expect, then
/// return the exit code for the hosting process
pub fn report_terminal_failure(error: &TypedError) -> i32 {
    error!(
        error_id = %error.id,
        job_name = %error.job_name,
        kind = %error.kind,
        severity = %error.severity,
        message = %error.message,
        "Pipeline job terminated with unrecovered failure"
    );
    exit_code_for(error)
}
