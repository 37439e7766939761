//! Job and group outcomes
//!
//! Produced by the runner once a job reaches a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::group::ExecutionMode;

/// Terminal state of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Succeeded,
    Failed(JobFailure),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            JobOutcome::Succeeded => None,
            JobOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// Why a job did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobFailure {
    /// A command exited non-zero; later commands of the job were skipped
    Task {
        index: usize,
        command: String,
        exit_code: i32,
        stderr: String,
    },
    /// The backend could not start the job's container
    Start { reason: String },
    /// The overall deadline passed before the job finished
    DeadlineExceeded,
    /// The backend lost track of the job while it was running
    Backend { reason: String },
}

impl JobFailure {
    /// Process-style exit code for the failure
    pub fn exit_code(&self) -> i32 {
        match self {
            JobFailure::Task { exit_code, .. } => *exit_code,
            JobFailure::DeadlineExceeded => 124, // Standard timeout exit code
            JobFailure::Start { .. } | JobFailure::Backend { .. } => 1,
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFailure::Task {
                index,
                command,
                exit_code,
                stderr,
            } => {
                write!(
                    f,
                    "task {} `{}` exited with code {}",
                    index + 1,
                    command,
                    exit_code
                )?;
                if !stderr.trim().is_empty() {
                    write!(f, ": {}", stderr.trim())?;
                }
                Ok(())
            }
            JobFailure::Start { reason } => write!(f, "failed to start: {}", reason),
            JobFailure::DeadlineExceeded => write!(f, "deadline exceeded"),
            JobFailure::Backend { reason } => write!(f, "backend error: {}", reason),
        }
    }
}

/// Final record of one job's execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub name: String,
    pub outcome: JobOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Final record of a group run, jobs in registration order
///
/// In sequential mode jobs that were never started are absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupReport {
    pub group: String,
    pub mode: ExecutionMode,
    pub jobs: Vec<JobReport>,
}

impl GroupReport {
    pub fn is_success(&self) -> bool {
        self.jobs.iter().all(|j| j.outcome.is_success())
    }

    /// Every job that did not succeed, with its failure detail
    pub fn failures(&self) -> Vec<(&str, &JobFailure)> {
        self.jobs
            .iter()
            .filter_map(|j| j.outcome.failure().map(|f| (j.name.as_str(), f)))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.name == name)
    }
}
