//! # Workflow Status and Report Tests
//!
//! Exercises the aggregate view over a multi-stage pipeline run and the
//! persisted report outputs.

use anyhow::Result;
use serde_json::json;
use tempfile::TempDir;

use pressroom_core::config::PressroomConfig;
use pressroom_core::report::{PipelineReport, ReportConfig};
use pressroom_core::{ErrorKind, JobStatus, PressroomCore, TypedError};

fn test_core(dir: &TempDir) -> PressroomCore {
    let mut config = PressroomConfig::default();
    config.report = ReportConfig {
        output_dir: dir.path().join("reports"),
        error_dir: dir.path().join("errors"),
        ..Default::default()
    };
    PressroomCore::new(config)
}

/// Jobs {A: completed, B: running at 40%}: overall status "running",
/// overall progress 70 (mean of 100 and 40)
#[tokio::test]
async fn test_workflow_status_mean_progress() -> Result<()> {
    let dir = TempDir::new()?;
    let core = test_core(&dir);

    let a = core.start_job("Research");
    core.complete_job(a, Some(json!({"sources": 3})), None)?;

    let b = core.start_job("Write");
    core.update_job_progress(b, 40.0, Some("drafting"), None)?;

    let status = core.workflow_status();
    assert_eq!(status.status, JobStatus::Running);
    assert_eq!(status.overall_progress, 70.0);
    assert_eq!(status.completed_jobs, 1);
    assert_eq!(status.total_jobs, 2);
    // One completed job plus one active job gives an extrapolated estimate
    assert!(status.estimated_remaining_secs.is_some());
    Ok(())
}

/// A full four-stage run produces a consistent persisted report
#[tokio::test]
async fn test_full_pipeline_report() -> Result<()> {
    let dir = TempDir::new()?;
    let core = test_core(&dir);

    for (stage, service, endpoint) in [
        ("Research", "search", "/search"),
        ("Write", "llm", "/v1/completions"),
        ("FactCheck", "search", "/search"),
    ] {
        let id = core.start_job(stage);
        core.update_job_progress(id, 50.0, Some("working"), None)?;
        core.track_api_call(service, endpoint, Some(150), true, None);
        core.complete_job(id, Some(json!({"stage": stage})), None)?;
    }

    // Publish fails terminally on a dead login
    let id = core.start_job("Publish");
    core.track_api_call("browser", "/cms/login", Some(900), false, None);
    core.complete_job(
        id,
        None,
        Some(TypedError::new(
            ErrorKind::AuthenticationError,
            "Publish",
            "redirected to login",
        )),
    )?;

    let report = core.generate_comprehensive_report()?;
    assert_eq!(report.workflow.status, JobStatus::Failed);
    assert_eq!(report.jobs.len(), 4);
    assert_eq!(report.workflow.failed_jobs, 1);

    // Failed job produces a recommendation
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("Job 'Publish' failed")));

    // Persisted twice: one timestamped snapshot plus the latest pointer
    let report_dir = dir.path().join("reports");
    let files: Vec<_> = report_dir.read_dir()?.collect();
    assert_eq!(files.len(), 2);

    let latest = std::fs::read_to_string(report_dir.join("latest.json"))?;
    let parsed: PipelineReport = serde_json::from_str(&latest)?;
    assert_eq!(parsed.jobs.len(), 4);
    assert_eq!(
        parsed.jobs.iter().map(|j| j.name.as_str()).collect::<Vec<_>>(),
        vec!["Research", "Write", "FactCheck", "Publish"]
    );

    // The ledger aggregated both search-stage calls under one key
    let search = parsed
        .api_usage
        .iter()
        .find(|u| u.service == "search")
        .unwrap();
    assert_eq!(search.total_calls, 2);
    assert_eq!(search.success_rate, 1.0);
    Ok(())
}
