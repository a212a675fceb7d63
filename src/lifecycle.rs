//! # Job Lifecycle Tracking
//!
//! Owns per-job state records, progress reporting, retry counting, and the
//! derived workflow-level status. Jobs move through a small state machine:
//!
//! ```text
//! (start_job) ──▶ Running ◀──▶ Retrying
//!                    │
//!                    ▼
//!          Completed │ Failed    (terminal, sealed)
//! ```
//!
//! A record exists only from `start_job` onward, so jobs are created already
//! `Running`; `Pending` exists for the aggregate view before any job starts.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::errors::TypedError;

/// Job state definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// No work has started (aggregate view only; records start as Running)
    Pending,
    /// Job is currently executing
    Running,
    /// Job hit a recoverable failure and is waiting to re-execute
    Retrying,
    /// Job finished successfully
    Completed,
    /// Job finished with a terminal error
    Failed,
}

impl JobStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if this is an active state (job is being processed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Retrying)
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Retrying => write!(f, "retrying"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "retrying" => Ok(Self::Retrying),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

/// Progress reported by a running job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobProgress {
    /// Completion percentage, clamped to [0, 100]
    pub percent: f64,
    /// Current stage label
    pub stage: Option<String>,
    /// Free-form progress message
    pub message: Option<String>,
}

/// Resident-memory samples taken at job boundaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSample {
    pub memory_at_start_kb: Option<u64>,
    pub memory_at_end_kb: Option<u64>,
}

/// Per-job state record, created by `start_job` and sealed by `complete_job`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub name: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    /// None until the job reaches a terminal state
    pub ended_at: Option<DateTime<Utc>>,
    /// Derived as `ended_at - started_at`, set only at the terminal transition
    pub duration_ms: Option<u64>,
    /// Monotonically non-decreasing; +1 per recorded retry
    pub retry_count: u32,
    pub progress: JobProgress,
    pub resources: ResourceSample,
    /// Opaque, sanitized job outputs
    pub outputs: Option<Value>,
    pub error: Option<TypedError>,
}

/// Aggregate view over all tracked jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub status: JobStatus,
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub retrying_jobs: usize,
    /// Mean of all job percentages
    pub overall_progress: f64,
    /// Extrapolated from completed-job durations; None when unknowable
    pub estimated_remaining_secs: Option<u64>,
    pub generated_at: DateTime<Utc>,
}

/// Tracker owning every job record for the process
///
/// The record map is guarded by a single RwLock; jobs run one pipeline stage
/// at a time, so contention is negligible, but the lock keeps the map safe
/// under real OS threads.
pub struct JobTracker {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
    /// Insertion order, for stable report output
    order: RwLock<Vec<Uuid>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Create a job record in `Running` state and return its id
    pub fn start_job(&self, name: impl Into<String>) -> Uuid {
        let name = name.into();
        let id = Uuid::new_v4();
        let record = JobRecord {
            id,
            name: name.clone(),
            status: JobStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            retry_count: 0,
            progress: JobProgress::default(),
            resources: ResourceSample {
                memory_at_start_kb: current_rss_kb(),
                memory_at_end_kb: None,
            },
            outputs: None,
            error: None,
        };

        self.jobs.write().insert(id, record);
        self.order.write().push(id);

        info!(job_id = %id, job_name = %name, "Job started");
        id
    }

    /// Update progress for a running or retrying job
    ///
    /// Percent is clamped to [0, 100]; stage and message are updated only
    /// when provided.
    pub fn update_job_progress(
        &self,
        id: Uuid,
        percent: f64,
        stage: Option<&str>,
        message: Option<&str>,
    ) -> Result<()> {
        let mut jobs = self.jobs.write();
        let record = jobs
            .get_mut(&id)
            .ok_or_else(|| CoreError::unknown_job(id.to_string()))?;

        if record.status.is_terminal() {
            return Err(CoreError::job_sealed(id.to_string(), record.status.to_string()));
        }

        record.progress.percent = percent.clamp(0.0, 100.0);
        if let Some(stage) = stage {
            record.progress.stage = Some(stage.to_string());
        }
        if let Some(message) = message {
            record.progress.message = Some(message.to_string());
        }

        Ok(())
    }

    /// Transition a job to `Retrying` and increment its retry count
    ///
    /// Progress percent is left untouched. Returns the new retry count.
    pub fn record_job_retry(&self, id: Uuid, reason: &str) -> Result<u32> {
        let mut jobs = self.jobs.write();
        let record = jobs
            .get_mut(&id)
            .ok_or_else(|| CoreError::unknown_job(id.to_string()))?;

        if record.status.is_terminal() {
            return Err(CoreError::job_sealed(id.to_string(), record.status.to_string()));
        }

        record.status = JobStatus::Retrying;
        record.retry_count += 1;
        record.progress.message = Some(format!("Retrying: {reason}"));

        warn!(
            job_id = %id,
            job_name = %record.name,
            retry_count = record.retry_count,
            reason = %reason,
            "Job retry recorded"
        );
        Ok(record.retry_count)
    }

    /// Return a `Retrying` job to `Running` after its retry attempt begins
    pub fn resume_job(&self, id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.write();
        let record = jobs
            .get_mut(&id)
            .ok_or_else(|| CoreError::unknown_job(id.to_string()))?;

        if record.status.is_terminal() {
            return Err(CoreError::job_sealed(id.to_string(), record.status.to_string()));
        }

        record.status = JobStatus::Running;
        Ok(())
    }

    /// Seal a job record with a terminal status
    ///
    /// Sets `ended_at`, derives `duration_ms`, samples ending memory, and
    /// forces percent to 100 on success (left as-is on failure). Outputs are
    /// sanitized before being stored.
    pub fn complete_job(
        &self,
        id: Uuid,
        outputs: Option<Value>,
        error: Option<TypedError>,
    ) -> Result<JobRecord> {
        let mut jobs = self.jobs.write();
        let record = jobs
            .get_mut(&id)
            .ok_or_else(|| CoreError::unknown_job(id.to_string()))?;

        if record.status.is_terminal() {
            return Err(CoreError::job_sealed(id.to_string(), record.status.to_string()));
        }

        let ended_at = Utc::now();
        record.ended_at = Some(ended_at);
        record.duration_ms = Some(
            (ended_at - record.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        record.resources.memory_at_end_kb = current_rss_kb();
        record.outputs = outputs.map(sanitize_outputs);

        if let Some(error) = error {
            record.status = JobStatus::Failed;
            info!(
                job_id = %id,
                job_name = %record.name,
                duration_ms = record.duration_ms,
                error_kind = %error.kind,
                "Job failed"
            );
            record.error = Some(error);
        } else {
            record.status = JobStatus::Completed;
            record.progress.percent = 100.0;
            info!(
                job_id = %id,
                job_name = %record.name,
                duration_ms = record.duration_ms,
                retry_count = record.retry_count,
                "Job completed"
            );
        }

        Ok(record.clone())
    }

    /// Fetch a snapshot of one job record
    pub fn job(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.read().get(&id).cloned()
    }

    /// Snapshot all job records in start order
    pub fn jobs(&self) -> Vec<JobRecord> {
        let jobs = self.jobs.read();
        self.order
            .read()
            .iter()
            .filter_map(|id| jobs.get(id).cloned())
            .collect()
    }

    /// Derive the workflow-level aggregate status
    ///
    /// Overall status: failed if any job failed, completed if all completed,
    /// retrying if any is retrying, else running (pending with no jobs).
    /// Estimated remaining time extrapolates the mean completed-job duration
    /// over the unfinished progress fraction; it is None until at least one
    /// job has completed and at least one is still active.
    pub fn workflow_status(&self) -> WorkflowStatus {
        let jobs = self.jobs();
        let total_jobs = jobs.len();
        let completed_jobs = jobs.iter().filter(|j| j.status == JobStatus::Completed).count();
        let failed_jobs = jobs.iter().filter(|j| j.status == JobStatus::Failed).count();
        let retrying_jobs = jobs.iter().filter(|j| j.status == JobStatus::Retrying).count();
        let active_jobs = jobs.iter().filter(|j| j.status.is_active()).count();

        let status = if total_jobs == 0 {
            JobStatus::Pending
        } else if failed_jobs > 0 {
            JobStatus::Failed
        } else if completed_jobs == total_jobs {
            JobStatus::Completed
        } else if retrying_jobs > 0 {
            JobStatus::Retrying
        } else {
            JobStatus::Running
        };

        let overall_progress = if total_jobs == 0 {
            0.0
        } else {
            jobs.iter().map(|j| j.progress.percent).sum::<f64>() / total_jobs as f64
        };

        let estimated_remaining_secs = if completed_jobs == 0 || active_jobs == 0 {
            None
        } else {
            let avg_duration_ms = jobs
                .iter()
                .filter_map(|j| {
                    (j.status == JobStatus::Completed).then_some(j.duration_ms.unwrap_or(0))
                })
                .sum::<u64>() as f64
                / completed_jobs as f64;
            let remaining_fraction: f64 = jobs
                .iter()
                .filter(|j| j.status.is_active())
                .map(|j| (100.0 - j.progress.percent) / 100.0)
                .sum();
            Some((avg_duration_ms * remaining_fraction / 1000.0).round() as u64)
        };

        WorkflowStatus {
            status,
            total_jobs,
            completed_jobs,
            failed_jobs,
            retrying_jobs,
            overall_progress,
            estimated_remaining_secs,
            generated_at: Utc::now(),
        }
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Redact credential-bearing keys from job outputs before storage
pub fn sanitize_outputs(value: Value) -> Value {
    const SENSITIVE: [&str; 6] = ["key", "token", "secret", "password", "authorization", "cookie"];

    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let lower = k.to_lowercase();
                    if SENSITIVE.iter().any(|s| lower.contains(s)) {
                        (k, Value::String("[REDACTED]".to_string()))
                    } else {
                        (k, sanitize_outputs(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_outputs).collect()),
        other => other,
    }
}

/// Current resident set size in kilobytes, when the platform exposes it
#[cfg(target_os = "linux")]
pub fn current_rss_kb() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * 4)
}

#[cfg(not(target_os = "linux"))]
pub fn current_rss_kb() -> Option<u64> {
    None
}
