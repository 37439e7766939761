//! Container execution backend
//!
//! The runner only issues start requests and waits for terminal states; the
//! platform that actually schedules containers sits behind this trait.

use async_trait::async_trait;
use convoy_core::{Job, JobOutcome};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::poll::PollPolicy;

/// Reference to a job started on a backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    pub id: Uuid,
    pub job: String,
}

impl JobHandle {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job: job.into(),
        }
    }
}

/// Errors reported by a backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// A backend command ran but reported failure
    #[error("{command} failed (exit code {exit_code}): {stderr}")]
    Command {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The handle does not belong to this backend or was already collected
    #[error("Unknown job handle {0}")]
    UnknownHandle(Uuid),

    /// The job's executor went away without reporting an outcome
    #[error("Lost track of job '{0}'")]
    Lost(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Service trait for running jobs in containers
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Starts the job's container and begins executing its tasks
    ///
    /// Returns once the container is launched, not when it finishes. An error
    /// means the job could not be started at all.
    async fn start(&self, job: Arc<Job>) -> Result<JobHandle, BackendError>;

    /// Non-blocking status query; `None` while the job is still running
    async fn poll(&self, handle: &JobHandle) -> Result<Option<JobOutcome>, BackendError>;

    /// Best-effort request to stop a running job
    async fn cancel(&self, _handle: &JobHandle) -> Result<(), BackendError> {
        Ok(())
    }

    /// Waits until the job is terminal or `deadline` passes
    ///
    /// Returns `Ok(None)` on deadline breach. The default implementation
    /// sleeps according to `policy` between calls to [`ContainerBackend::poll`];
    /// backends with a completion signal can override it.
    async fn await_completion(
        &self,
        handle: &JobHandle,
        deadline: Option<Instant>,
        policy: &PollPolicy,
    ) -> Result<Option<JobOutcome>, BackendError> {
        let mut delays = policy.delays();

        loop {
            let delay = delays.next().unwrap_or(std::time::Duration::ZERO);

            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    tokio::time::sleep(delay.min(deadline - now)).await;
                }
                None => tokio::time::sleep(delay).await,
            }

            if let Some(outcome) = self.poll(handle).await? {
                return Ok(Some(outcome));
            }
        }
    }
}
