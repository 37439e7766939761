//! Job group domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::job::Job;
use crate::error::GroupError;

/// How the jobs of a group are executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One job at a time in registration order, stopping at the first failure
    #[default]
    Sequential,
    /// All jobs started at once, then a barrier until every job is terminal
    Concurrent,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => write!(f, "sequential"),
            ExecutionMode::Concurrent => write!(f, "concurrent"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "concurrent" | "parallel" => Ok(ExecutionMode::Concurrent),
            other => Err(format!(
                "unknown execution mode '{}' (expected 'sequential' or 'concurrent')",
                other
            )),
        }
    }
}

/// A set of jobs, unique by name, executed together under one mode
///
/// Jobs are frozen on [`JobGroup::add`]: the group keeps them behind an
/// `Arc` and never hands out mutable access. Running a group consumes it.
#[derive(Debug, Clone)]
pub struct JobGroup {
    name: String,
    mode: ExecutionMode,
    jobs: Vec<Arc<Job>>,
}

impl JobGroup {
    /// Creates an empty group
    pub fn new(name: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            name: name.into(),
            mode,
            jobs: Vec::new(),
        }
    }

    /// Registers a job
    ///
    /// Fails with [`GroupError::DuplicateName`] if a job with the same name is
    /// already registered; the group is left unchanged in that case.
    pub fn add(&mut self, job: Job) -> Result<(), GroupError> {
        if self.contains(job.name()) {
            return Err(GroupError::DuplicateName {
                group: self.name.clone(),
                job: job.name().to_string(),
            });
        }

        self.jobs.push(Arc::new(job));
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.iter().any(|j| j.name() == name)
    }

    /// Registered jobs in registration order
    pub fn jobs(&self) -> &[Arc<Job>] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Consumes the group, yielding its name, mode and frozen jobs
    pub fn into_parts(self) -> (String, ExecutionMode, Vec<Arc<Job>>) {
        (self.name, self.mode, self.jobs)
    }
}
