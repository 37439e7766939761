//! Podman container backend
//!
//! Handles container lifecycle for job execution:
//! - Checking podman availability
//! - Starting one detached container per job with its env, mount and privileges
//! - Executing the job's tasks in order with `podman exec`, stopping at the first failure
//! - Removing the container once the job is terminal or cancelled

use anyhow::Context;
use async_trait::async_trait;
use convoy_core::{Job, JobFailure, JobOutcome};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, ContainerBackend, JobHandle};
use crate::config::RunnerConfig;
use crate::poll::PollPolicy;

/// Lines of stderr kept in a task failure
const STDERR_TAIL_LINES: usize = 20;

/// Checks if podman is installed and available
pub async fn check_podman_available(podman_bin: &str) -> anyhow::Result<()> {
    let output = Command::new(podman_bin)
        .arg("--version")
        .output()
        .await
        .with_context(|| format!("Failed to execute '{} --version'. Is podman installed?", podman_bin))?;

    if !output.status.success() {
        anyhow::bail!("Podman is not working correctly");
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Podman is available: {}", version.trim());

    Ok(())
}

struct RunningJob {
    container: String,
    outcome: watch::Receiver<Option<JobOutcome>>,
    executor: JoinHandle<()>,
}

/// Backend running each job in its own podman container
///
/// Completion is signalled by the task executor, so the poll policy passed to
/// [`ContainerBackend::await_completion`] is not used.
pub struct PodmanBackend {
    podman_bin: String,
    workspace: PathBuf,
    running: Mutex<HashMap<uuid::Uuid, RunningJob>>,
}

impl PodmanBackend {
    pub fn new(podman_bin: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            podman_bin: podman_bin.into(),
            workspace: workspace.into(),
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.podman_bin.clone(), config.workspace.clone())
    }

    /// Arguments for `podman run` starting the job's long-lived container
    ///
    /// The entrypoint is overridden so images with custom entrypoints still
    /// idle until tasks are exec'd into them.
    fn run_args(&self, job: &Job, container: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            container.to_string(),
        ];

        if job.privileged() {
            args.push("--privileged".to_string());
        }

        for (key, value) in job.env() {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        if let Some(mount_path) = job.mount_path() {
            args.push("-v".to_string());
            args.push(format!("{}:{}", self.workspace.display(), mount_path));
            args.push("-w".to_string());
            args.push(mount_path.to_string());
        }

        args.extend([
            "--entrypoint".to_string(),
            "/bin/sh".to_string(),
            job.image().to_string(),
            "-c".to_string(),
            "sleep infinity".to_string(),
        ]);

        args
    }

    /// Stops every job still tracked by this backend and removes its container
    ///
    /// Call before dropping the backend; [`Drop`] only covers what is left.
    pub async fn shutdown(&self) {
        let leftover: Vec<RunningJob> = match self.running.lock() {
            Ok(mut running) => running.drain().map(|(_, job)| job).collect(),
            Err(_) => return,
        };

        for job in leftover {
            job.executor.abort();
            debug!("Removing container {} on shutdown", job.container);
            remove_container(&self.podman_bin, &job.container).await;
        }
    }

    fn take_running(&self, handle: &JobHandle) -> Option<RunningJob> {
        self.running
            .lock()
            .ok()
            .and_then(|mut running| running.remove(&handle.id))
    }

    fn outcome_receiver(
        &self,
        handle: &JobHandle,
    ) -> Result<watch::Receiver<Option<JobOutcome>>, BackendError> {
        let running = self
            .running
            .lock()
            .map_err(|_| BackendError::Lost(handle.job.clone()))?;
        running
            .get(&handle.id)
            .map(|job| job.outcome.clone())
            .ok_or(BackendError::UnknownHandle(handle.id))
    }
}

#[async_trait]
impl ContainerBackend for PodmanBackend {
    async fn start(&self, job: Arc<Job>) -> Result<JobHandle, BackendError> {
        let handle = JobHandle::new(job.name());
        let container = container_name(job.name(), &handle);

        if job.mount_path().is_some() {
            tokio::fs::create_dir_all(&self.workspace).await?;
        }

        info!(
            "Creating container {} for job '{}' (image {})",
            container,
            job.name(),
            job.image()
        );

        let args = self.run_args(&job, &container);
        let output = Command::new(&self.podman_bin).args(&args).output().await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stdout.trim().is_empty() {
            debug!("podman run stdout: {}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("podman run stderr: {}", stderr.trim());
        }

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            error!(
                "Failed to start container for job '{}': exit_code={}, stderr='{}'",
                job.name(),
                exit_code,
                stderr.trim()
            );
            // podman may leave a created-but-not-running container behind
            remove_container(&self.podman_bin, &container).await;
            return Err(BackendError::Command {
                command: "podman run".to_string(),
                exit_code,
                stderr: stderr.trim().to_string(),
            });
        }

        info!(
            "Container {} started with ID: {}",
            container,
            stdout.trim()
        );

        let (tx, rx) = watch::channel(None);
        let executor = tokio::spawn(execute_tasks(
            self.podman_bin.clone(),
            container.clone(),
            job,
            tx,
        ));

        let mut running = self
            .running
            .lock()
            .map_err(|_| BackendError::Lost(handle.job.clone()))?;
        running.insert(
            handle.id,
            RunningJob {
                container,
                outcome: rx,
                executor,
            },
        );

        Ok(handle)
    }

    async fn poll(&self, handle: &JobHandle) -> Result<Option<JobOutcome>, BackendError> {
        let outcome = self.outcome_receiver(handle)?.borrow().clone();
        if outcome.is_some() {
            self.take_running(handle);
        }
        Ok(outcome)
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), BackendError> {
        let Some(job) = self.take_running(handle) else {
            return Err(BackendError::UnknownHandle(handle.id));
        };

        warn!(
            "Cancelling job '{}' (container {})",
            handle.job, job.container
        );
        job.executor.abort();
        remove_container(&self.podman_bin, &job.container).await;

        Ok(())
    }

    /// Waits on the executor's completion signal instead of polling
    async fn await_completion(
        &self,
        handle: &JobHandle,
        deadline: Option<Instant>,
        _policy: &PollPolicy,
    ) -> Result<Option<JobOutcome>, BackendError> {
        let mut rx = self.outcome_receiver(handle)?;

        let outcome = {
            let wait = rx.wait_for(|outcome| outcome.is_some());
            let result = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, wait).await {
                    Ok(result) => result,
                    Err(_) => return Ok(None),
                },
                None => wait.await,
            };

            match result {
                Ok(outcome) => (*outcome).clone(),
                Err(_) => return Err(BackendError::Lost(handle.job.clone())),
            }
        };

        self.take_running(handle);
        Ok(outcome)
    }
}

impl Drop for PodmanBackend {
    fn drop(&mut self) {
        let Ok(running) = self.running.get_mut() else {
            return;
        };

        for (_, job) in running.drain() {
            job.executor.abort();
            warn!(
                "Container {} still tracked on drop, removing it synchronously",
                job.container
            );
            if let Err(e) = std::process::Command::new(&self.podman_bin)
                .args(["rm", "-f", job.container.as_str()])
                .output()
            {
                warn!("Failed to remove container {}: {}", job.container, e);
            }
        }
    }
}

/// Container name derived from the job name and a slice of the handle id
fn container_name(job: &str, handle: &JobHandle) -> String {
    let id = handle.id.simple().to_string();
    format!("convoy-{}-{}", job.to_lowercase(), &id[..12])
}

fn exec_args(container: &str, workdir: Option<&str>, command: &str) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    if let Some(dir) = workdir {
        args.push("-w".to_string());
        args.push(dir.to_string());
    }
    args.extend([
        container.to_string(),
        "/bin/sh".to_string(),
        "-c".to_string(),
        command.to_string(),
    ]);
    args
}

/// Runs the job's tasks in order and publishes the outcome
///
/// The container is removed before the outcome is sent.
async fn execute_tasks(
    podman_bin: String,
    container: String,
    job: Arc<Job>,
    outcome_tx: watch::Sender<Option<JobOutcome>>,
) {
    let outcome = run_tasks(&podman_bin, &container, &job).await;

    match &outcome {
        JobOutcome::Succeeded => info!("Job '{}' succeeded", job.name()),
        JobOutcome::Failed(failure) => warn!("Job '{}' failed: {}", job.name(), failure),
    }

    remove_container(&podman_bin, &container).await;
    let _ = outcome_tx.send(Some(outcome));
}

async fn run_tasks(podman_bin: &str, container: &str, job: &Job) -> JobOutcome {
    let total = job.tasks().len();

    for (index, command) in job.tasks().iter().enumerate() {
        info!(
            "[{}] Task {}/{}: {}",
            job.name(),
            index + 1,
            total,
            command
        );

        let output = match Command::new(podman_bin)
            .args(exec_args(container, job.mount_path(), command))
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                return JobOutcome::Failed(JobFailure::Backend {
                    reason: format!("Failed to execute podman exec: {}", e),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        for line in stdout.lines() {
            info!("[{}] {}", job.name(), line);
        }
        for line in stderr.lines() {
            debug!("[{}] stderr: {}", job.name(), line);
        }

        if !output.status.success() {
            return JobOutcome::Failed(JobFailure::Task {
                index,
                command: command.clone(),
                exit_code: output.status.code().unwrap_or(1),
                stderr: tail_lines(&stderr, STDERR_TAIL_LINES),
            });
        }
    }

    JobOutcome::Succeeded
}

/// Stops and removes a container, logging instead of failing
async fn remove_container(podman_bin: &str, container: &str) {
    match Command::new(podman_bin)
        .args(["rm", "-f", container])
        .output()
        .await
    {
        Ok(output) if output.status.success() => {
            debug!("Container {} removed", container);
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Failed to remove container {}: {}", container, stderr.trim());
        }
        Err(e) => {
            warn!("Failed to remove container {}: {}", container, e);
        }
    }
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}
