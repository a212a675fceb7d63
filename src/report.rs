//! # Report Generation
//!
//! Assembles consolidated snapshots from the lifecycle tracker and metrics
//! aggregator and persists them as JSON. Two outputs exist: point-in-time
//! pipeline reports (timestamped file plus an overwritten `latest.json`
//! pointer) and per-error audit files written by the retry engine before any
//! retry decision is acted on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::errors::{ErrorKind, ErrorSeverity, TypedError};
use crate::lifecycle::{JobRecord, JobStatus, JobTracker, WorkflowStatus};
use crate::metrics::{ApiUsageRecord, MetricsAggregator};

/// Output locations and recommendation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory for pipeline report snapshots
    pub output_dir: PathBuf,
    /// Directory for per-error audit files
    pub error_dir: PathBuf,
    /// Flag services whose success rate drops below this fraction
    pub min_success_rate: f64,
    /// Flag services whose quota usage exceeds this fraction
    pub max_quota_usage: f64,
    /// Flag services whose average response time exceeds this
    pub max_avg_response_time_ms: f64,
    /// Flag workflows running longer than this
    pub max_workflow_duration_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("reports"),
            error_dir: PathBuf::from("reports/errors"),
            min_success_rate: 0.95,
            max_quota_usage: 0.80,
            max_avg_response_time_ms: 5000.0,
            max_workflow_duration_secs: 30 * 60,
        }
    }
}

/// Sanitized error view carried in job summaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub id: String,
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
}

impl From<&TypedError> for ErrorSummary {
    fn from(error: &TypedError) -> Self {
        Self {
            id: error.id.clone(),
            kind: error.kind,
            severity: error.severity,
            message: error.message.clone(),
        }
    }
}

/// Per-job entry in a pipeline report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub name: String,
    pub status: JobStatus,
    pub duration_ms: Option<u64>,
    pub retry_count: u32,
    pub error: Option<ErrorSummary>,
}

impl From<&JobRecord> for JobSummary {
    fn from(record: &JobRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            status: record.status,
            duration_ms: record.duration_ms,
            retry_count: record.retry_count,
            error: record.error.as_ref().map(ErrorSummary::from),
        }
    }
}

/// Per-service entry in a pipeline report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUsageSummary {
    pub service: String,
    pub endpoint: String,
    pub total_calls: u64,
    pub success_rate: f64,
    pub average_response_time_ms: f64,
    pub min_response_time_ms: Option<u64>,
    pub max_response_time_ms: Option<u64>,
    pub quota_used: Option<u64>,
    pub quota_limit: Option<u64>,
    pub rate_limit_remaining: Option<u64>,
    pub rate_limit_reset_at: Option<DateTime<Utc>>,
}

impl From<&ApiUsageRecord> for ServiceUsageSummary {
    fn from(record: &ApiUsageRecord) -> Self {
        Self {
            service: record.service.clone(),
            endpoint: record.endpoint.clone(),
            total_calls: record.total_calls,
            success_rate: record.success_rate(),
            average_response_time_ms: record.average_response_time_ms(),
            min_response_time_ms: record.min_response_time_ms,
            max_response_time_ms: record.max_response_time_ms,
            quota_used: record.quota_used,
            quota_limit: record.quota_limit,
            rate_limit_remaining: record.rate_limit_remaining,
            rate_limit_reset_at: record.rate_limit_reset_at,
        }
    }
}

/// Consolidated point-in-time snapshot of the whole pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub generated_at: DateTime<Utc>,
    pub workflow: WorkflowStatus,
    pub workflow_duration_secs: u64,
    pub jobs: Vec<JobSummary>,
    pub api_usage: Vec<ServiceUsageSummary>,
    pub recommendations: Vec<String>,
}

/// Writes per-error JSON audit files, one per error id
pub struct ErrorReporter {
    error_dir: PathBuf,
}

impl ErrorReporter {
    pub fn new(error_dir: impl Into<PathBuf>) -> Self {
        Self {
            error_dir: error_dir.into(),
        }
    }

    /// Persist one error as `{error_id}.json`; called before retry decisions
    /// so the audit trail survives a later crash
    pub fn report(&self, error: &TypedError) -> Result<PathBuf> {
        fs::create_dir_all(&self.error_dir)
            .map_err(|e| CoreError::report_io(self.error_dir.display().to_string(), e.to_string()))?;

        let path = self.error_dir.join(format!("{}.json", error.id));
        let body = serde_json::to_string_pretty(error)?;
        fs::write(&path, body)
            .map_err(|e| CoreError::report_io(path.display().to_string(), e.to_string()))?;
        Ok(path)
    }
}

/// Assembles and persists pipeline reports
pub struct ReportGenerator {
    config: ReportConfig,
}

impl ReportGenerator {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    /// Build a consolidated report from the tracker and aggregator
    pub fn build(&self, tracker: &JobTracker, metrics: &MetricsAggregator) -> PipelineReport {
        let workflow = tracker.workflow_status();
        let jobs = tracker.jobs();
        let api_usage = metrics.api_usage();

        let workflow_duration_secs = workflow_duration_secs(&jobs);
        let job_summaries: Vec<JobSummary> = jobs.iter().map(JobSummary::from).collect();
        let usage_summaries: Vec<ServiceUsageSummary> =
            api_usage.iter().map(ServiceUsageSummary::from).collect();
        let recommendations =
            self.recommendations(&job_summaries, &usage_summaries, workflow_duration_secs);

        PipelineReport {
            generated_at: Utc::now(),
            workflow,
            workflow_duration_secs,
            jobs: job_summaries,
            api_usage: usage_summaries,
            recommendations,
        }
    }

    /// Persist a report as a timestamped snapshot plus the `latest.json` pointer
    ///
    /// Returns (timestamped path, latest path).
    pub fn persist(&self, report: &PipelineReport) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(&self.config.output_dir).map_err(|e| {
            CoreError::report_io(self.config.output_dir.display().to_string(), e.to_string())
        })?;

        let body = serde_json::to_string_pretty(report)?;
        let stamped = self.config.output_dir.join(format!(
            "report_{}.json",
            report.generated_at.format("%Y%m%d_%H%M%S%3f")
        ));
        write_file(&stamped, &body)?;

        let latest = self.config.output_dir.join("latest.json");
        write_file(&latest, &body)?;

        info!(
            report_path = %stamped.display(),
            jobs = report.jobs.len(),
            recommendations = report.recommendations.len(),
            "Pipeline report persisted"
        );
        Ok((stamped, latest))
    }

    fn recommendations(
        &self,
        jobs: &[JobSummary],
        usage: &[ServiceUsageSummary],
        workflow_duration_secs: u64,
    ) -> Vec<String> {
        let mut recommendations = Vec::new();

        for record in usage {
            if record.total_calls > 0 && record.success_rate < self.config.min_success_rate {
                recommendations.push(format!(
                    "{}/{} success rate is {:.1}% (below {:.0}%); inspect recent failures",
                    record.service,
                    record.endpoint,
                    record.success_rate * 100.0,
                    self.config.min_success_rate * 100.0
                ));
            }

            if let (Some(used), Some(limit)) = (record.quota_used, record.quota_limit) {
                if limit > 0 && used as f64 / limit as f64 > self.config.max_quota_usage {
                    recommendations.push(format!(
                        "{} quota usage at {}/{}; request a limit increase or reduce call volume",
                        record.service, used, limit
                    ));
                }
            }

            if record.total_calls > 0
                && record.average_response_time_ms > self.config.max_avg_response_time_ms
            {
                recommendations.push(format!(
                    "{}/{} average response time is {:.0}ms; consider tighter timeouts or a different provider tier",
                    record.service, record.endpoint, record.average_response_time_ms
                ));
            }
        }

        for job in jobs {
            if job.status == JobStatus::Failed {
                let kind = job
                    .error
                    .as_ref()
                    .map(|e| e.kind.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                recommendations.push(format!(
                    "Job '{}' failed ({kind}); see its error report for diagnostics",
                    job.name
                ));
            }
        }

        if workflow_duration_secs > self.config.max_workflow_duration_secs {
            recommendations.push(format!(
                "Workflow has run {workflow_duration_secs}s (over {}s); review slow stages",
                self.config.max_workflow_duration_secs
            ));
        }

        recommendations
    }
}

fn workflow_duration_secs(jobs: &[JobRecord]) -> u64 {
    let Some(earliest) = jobs.iter().map(|j| j.started_at).min() else {
        return 0;
    };
    let end = jobs
        .iter()
        .filter_map(|j| j.ended_at)
        .max()
        .filter(|_| jobs.iter().all(|j| j.status.is_terminal()))
        .unwrap_or_else(Utc::now);
    (end - earliest).num_seconds().max(0) as u64
}

fn write_file(path: &Path, body: &str) -> Result<()> {
    fs::write(path, body)
        .map_err(|e| CoreError::report_io(path.display().to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, TypedError};
    use serde_json::json;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> ReportConfig {
        ReportConfig {
            output_dir: dir.path().join("reports"),
            error_dir: dir.path().join("errors"),
            ..Default::default()
        }
    }

    #[test]
    fn test_error_reporter_writes_audit_file() {
        let dir = TempDir::new().unwrap();
        let reporter = ErrorReporter::new(dir.path().join("errors"));

        let error = TypedError::new(ErrorKind::RateLimitError, "Research", "429");
        let path = reporter.report(&error).unwrap();

        assert!(path.exists());
        let body: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(body["kind"], "rate_limit_error");
        assert_eq!(body["job_name"], "Research");
        assert_eq!(path.file_stem().unwrap().to_str().unwrap(), error.id);
    }

    #[test]
    fn test_report_build_and_persist() {
        let dir = TempDir::new().unwrap();
        let generator = ReportGenerator::new(test_config(&dir));

        let tracker = JobTracker::new();
        let metrics = MetricsAggregator::new();
        let a = tracker.start_job("Research");
        tracker.complete_job(a, Some(json!({"sources": 4})), None).unwrap();
        metrics.track_api_call("llm", "/v1/completions", Some(250), true, None);

        let report = generator.build(&tracker, &metrics);
        assert_eq!(report.jobs.len(), 1);
        assert_eq!(report.api_usage.len(), 1);
        assert_eq!(report.workflow.status, JobStatus::Completed);
        assert!(report.recommendations.is_empty());

        let (stamped, latest) = generator.persist(&report).unwrap();
        assert!(stamped.exists());
        assert!(latest.exists());
        assert!(latest.ends_with("latest.json"));

        let parsed: PipelineReport =
            serde_json::from_str(&fs::read_to_string(&latest).unwrap()).unwrap();
        assert_eq!(parsed.jobs[0].name, "Research");
    }

    #[test]
    fn test_latest_pointer_overwritten() {
        let dir = TempDir::new().unwrap();
        let generator = ReportGenerator::new(test_config(&dir));
        let tracker = JobTracker::new();
        let metrics = MetricsAggregator::new();

        tracker.start_job("A");
        let first = generator.build(&tracker, &metrics);
        generator.persist(&first).unwrap();

        tracker.start_job("B");
        let second = generator.build(&tracker, &metrics);
        let (_, latest) = generator.persist(&second).unwrap();

        let parsed: PipelineReport =
            serde_json::from_str(&fs::read_to_string(&latest).unwrap()).unwrap();
        assert_eq!(parsed.jobs.len(), 2);
    }

    #[test]
    fn test_recommendations_fire_on_thresholds() {
        let dir = TempDir::new().unwrap();
        let generator = ReportGenerator::new(test_config(&dir));
        let tracker = JobTracker::new();
        let metrics = MetricsAggregator::new();

        // Low success rate and slow responses
        for i in 0..10 {
            metrics.track_api_call("llm", "/v1/completions", Some(8000), i % 2 == 0, None);
        }
        // Quota nearly exhausted
        metrics.track_api_call(
            "search",
            "/search",
            Some(100),
            true,
            Some(crate::metrics::ApiCallDetails {
                quota_used: Some(90),
                quota_limit: Some(100),
                ..Default::default()
            }),
        );
        // A failed job
        let id = tracker.start_job("Publish");
        tracker
            .complete_job(
                id,
                None,
                Some(TypedError::new(ErrorKind::AuthenticationError, "Publish", "401")),
            )
            .unwrap();

        let report = generator.build(&tracker, &metrics);
        let joined = report.recommendations.join("\n");
        assert!(joined.contains("success rate"));
        assert!(joined.contains("quota"));
        assert!(joined.contains("response time"));
        assert!(joined.contains("Job 'Publish' failed"));
    }

    #[test]
    fn test_error_summary_sanitized() {
        let error = TypedError::new(ErrorKind::ApiError, "Write", "500")
            .with_detail("api_key", "sk-secret");
        let summary = ErrorSummary::from(&error);
        let body = serde_json::to_value(&summary).unwrap();
        // Summaries carry no details payload at all
        assert!(body.get("details").is_none());
        assert_eq!(body["kind"], "api_error");
    }
}
