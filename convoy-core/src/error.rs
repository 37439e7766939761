//! Error types for Convoy

use thiserror::Error;

use crate::domain::outcome::{GroupReport, JobFailure};

/// Job validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("Job name cannot be empty")]
    EmptyName,

    #[error("Invalid job name '{0}': only ASCII letters, digits, '_', '.' and '-' are allowed")]
    InvalidName(String),

    #[error("Job '{0}' has no image")]
    MissingImage(String),

    #[error("Job '{job}' mount path '{path}' must be absolute")]
    RelativeMountPath { job: String, path: String },

    #[error("Invalid environment variable name '{0}'")]
    InvalidEnvKey(String),

    #[error("Job '{0}' has no tasks")]
    NoTasks(String),

    #[error("Job '{job}' task {index} is empty")]
    EmptyTask { job: String, index: usize },
}

/// Group registration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    #[error("Group '{group}' already has a job named '{job}'")]
    DuplicateName { group: String, job: String },
}

/// Every job of a concurrent run that did not succeed
#[derive(Debug, Clone, Error)]
#[error("{} of {} job(s) failed in group '{}': {}", .failures.len(), .report.jobs.len(), .report.group, summary(.failures))]
pub struct AggregateFailure {
    /// Failed jobs in registration order
    pub failures: Vec<(String, JobFailure)>,
    /// Full report, including jobs that succeeded
    pub report: GroupReport,
}

fn summary(failures: &[(String, JobFailure)]) -> String {
    failures
        .iter()
        .map(|(name, failure)| format!("{} ({})", name, failure))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure surfaced by running a group
#[derive(Debug, Clone, Error)]
pub enum RunError {
    /// Sequential mode: the first failing job, later jobs were not started
    #[error("Job '{name}' failed: {failure}")]
    JobFailed {
        name: String,
        failure: JobFailure,
        report: GroupReport,
    },

    /// Concurrent mode: all failures, collected after the barrier
    #[error(transparent)]
    Aggregate(#[from] AggregateFailure),
}

impl RunError {
    /// Report of the run that produced this error
    pub fn report(&self) -> &GroupReport {
        match self {
            RunError::JobFailed { report, .. } => report,
            RunError::Aggregate(aggregate) => &aggregate.report,
        }
    }

    /// Names of the jobs that failed
    pub fn failed_jobs(&self) -> Vec<&str> {
        match self {
            RunError::JobFailed { name, .. } => vec![name.as_str()],
            RunError::Aggregate(aggregate) => {
                aggregate.failures.iter().map(|(n, _)| n.as_str()).collect()
            }
        }
    }
}
