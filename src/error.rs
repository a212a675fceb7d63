//! # Core Error Types
//!
//! Operational errors raised by the resilience core itself (as opposed to the
//! classified pipeline failures in [`crate::errors`]), using thiserror for
//! structured error types instead of `Box<dyn Error>` patterns.

use thiserror::Error;

/// Errors raised by core operations (tracking, reporting, configuration)
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown job: {job_id}")]
    UnknownJob { job_id: String },

    #[error("Job {job_id} is already sealed in terminal state {status}")]
    JobSealed { job_id: String, status: String },

    #[error("Report persistence failed: {path}: {message}")]
    ReportIo { path: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },
}

impl CoreError {
    /// Create an unknown-job error
    pub fn unknown_job(job_id: impl Into<String>) -> Self {
        Self::UnknownJob {
            job_id: job_id.into(),
        }
    }

    /// Create a sealed-job error
    pub fn job_sealed(job_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self::JobSealed {
            job_id: job_id.into(),
            status: status.into(),
        }
    }

    /// Create a report persistence error
    pub fn report_io(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReportIo {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
