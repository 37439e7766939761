//! Job group runner
//!
//! Executes a [`JobGroup`] against a [`ContainerBackend`]:
//! - Sequential: jobs run one after another in registration order; the first
//!   failure is propagated and later jobs are never started
//! - Concurrent: every job is started at once, then the runner waits for all
//!   of them to reach a terminal state and reports every failure together
//!
//! A failing job never cancels its siblings. Cancellation is only requested
//! when the configured overall deadline passes.

use chrono::Utc;
use convoy_core::{
    AggregateFailure, ExecutionMode, GroupReport, Job, JobFailure, JobGroup, JobOutcome,
    JobReport, RunError,
};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::backend::ContainerBackend;
use crate::config::RunnerConfig;
use crate::poll::PollPolicy;

/// Runs job groups on a container backend
pub struct GroupRunner {
    backend: Arc<dyn ContainerBackend>,
    config: RunnerConfig,
}

impl GroupRunner {
    pub fn new(backend: Arc<dyn ContainerBackend>, config: RunnerConfig) -> Self {
        Self { backend, config }
    }

    /// Runs every job of the group and consumes it
    ///
    /// # Returns
    /// The group report when all jobs succeeded, otherwise a [`RunError`]
    /// carrying the report: the first failure in sequential mode, every
    /// failure in concurrent mode.
    pub async fn run(&self, group: JobGroup) -> Result<GroupReport, RunError> {
        let (name, mode, jobs) = group.into_parts();
        let deadline = self.config.deadline.map(|d| Instant::now() + d);

        if jobs.is_empty() {
            warn!("Group '{}' has no jobs", name);
        }

        info!(
            "Running group '{}' with {} job(s) in {} mode",
            name,
            jobs.len(),
            mode
        );

        match mode {
            ExecutionMode::Sequential => self.run_sequential(name, jobs, deadline).await,
            ExecutionMode::Concurrent => self.run_concurrent(name, jobs, deadline).await,
        }
    }

    async fn run_sequential(
        &self,
        name: String,
        jobs: Vec<Arc<Job>>,
        deadline: Option<Instant>,
    ) -> Result<GroupReport, RunError> {
        let total = jobs.len();
        let mut reports = Vec::with_capacity(total);

        for (idx, job) in jobs.into_iter().enumerate() {
            info!("Job {}/{}: {}", idx + 1, total, job.name());

            let report = run_job(
                self.backend.clone(),
                job,
                deadline,
                self.config.poll.clone(),
            )
            .await;

            let failure = report.outcome.failure().cloned();
            let job_name = report.name.clone();
            reports.push(report);

            if let Some(failure) = failure {
                if idx + 1 < total {
                    warn!(
                        "Skipping {} remaining job(s) after '{}' failed",
                        total - idx - 1,
                        job_name
                    );
                }

                return Err(RunError::JobFailed {
                    name: job_name,
                    failure,
                    report: GroupReport {
                        group: name,
                        mode: ExecutionMode::Sequential,
                        jobs: reports,
                    },
                });
            }
        }

        info!("Group '{}' completed successfully", name);
        Ok(GroupReport {
            group: name,
            mode: ExecutionMode::Sequential,
            jobs: reports,
        })
    }

    async fn run_concurrent(
        &self,
        name: String,
        jobs: Vec<Arc<Job>>,
        deadline: Option<Instant>,
    ) -> Result<GroupReport, RunError> {
        let run_started = Utc::now();
        let mut set = JoinSet::new();

        for (idx, job) in jobs.iter().enumerate() {
            let backend = self.backend.clone();
            let job = job.clone();
            let poll = self.config.poll.clone();
            set.spawn(async move { (idx, run_job(backend, job, deadline, poll).await) });
        }

        // Barrier: every job reaches a terminal state before we report
        let mut slots: Vec<Option<JobReport>> = vec![None; jobs.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, report)) => slots[idx] = Some(report),
                Err(e) => error!("Job task panicked: {}", e),
            }
        }

        let reports: Vec<JobReport> = slots
            .into_iter()
            .zip(jobs.iter())
            .map(|(slot, job)| {
                slot.unwrap_or_else(|| JobReport {
                    name: job.name().to_string(),
                    outcome: JobOutcome::Failed(JobFailure::Backend {
                        reason: "job task panicked".to_string(),
                    }),
                    started_at: run_started,
                    finished_at: Utc::now(),
                })
            })
            .collect();

        let report = GroupReport {
            group: name,
            mode: ExecutionMode::Concurrent,
            jobs: reports,
        };

        let failures: Vec<(String, JobFailure)> = report
            .failures()
            .into_iter()
            .map(|(name, failure)| (name.to_string(), failure.clone()))
            .collect();

        if failures.is_empty() {
            info!("Group '{}' completed successfully", report.group);
            return Ok(report);
        }

        error!(
            "Group '{}' finished with {} failed job(s)",
            report.group,
            failures.len()
        );
        Err(RunError::Aggregate(AggregateFailure { failures, report }))
    }
}

/// Starts one job and waits for its terminal state
///
/// Never fails: every problem is recorded in the report's outcome.
async fn run_job(
    backend: Arc<dyn ContainerBackend>,
    job: Arc<Job>,
    deadline: Option<Instant>,
    poll: PollPolicy,
) -> JobReport {
    let started_at = Utc::now();
    let name = job.name().to_string();

    let mut start = backend.start(job);
    let started = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, &mut start).await {
            Ok(started) => Some(started),
            Err(_) => {
                // the backend may still be creating the container; let it
                // settle so whatever it created can be cancelled
                warn!(
                    "Deadline passed while starting job '{}', cancelling once started",
                    name
                );
                if let Ok(handle) = start.await {
                    if let Err(e) = backend.cancel(&handle).await {
                        warn!("Failed to cancel job '{}': {}", name, e);
                    }
                }
                None
            }
        },
        None => Some(start.await),
    };

    let outcome = match started {
        None => JobOutcome::Failed(JobFailure::DeadlineExceeded),
        Some(Err(e)) => {
            error!("Failed to start job '{}': {}", name, e);
            JobOutcome::Failed(JobFailure::Start {
                reason: e.to_string(),
            })
        }
        Some(Ok(handle)) => match backend.await_completion(&handle, deadline, &poll).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                warn!("Deadline exceeded for job '{}', requesting cancellation", name);
                if let Err(e) = backend.cancel(&handle).await {
                    warn!("Failed to cancel job '{}': {}", name, e);
                }
                JobOutcome::Failed(JobFailure::DeadlineExceeded)
            }
            Err(e) => {
                error!("Lost job '{}': {}", name, e);
                JobOutcome::Failed(JobFailure::Backend {
                    reason: e.to_string(),
                })
            }
        },
    };

    JobReport {
        name,
        outcome,
        started_at,
        finished_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, JobHandle};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;
    use std::time::Duration;

    /// What the mock does with a job
    #[derive(Clone)]
    enum Script {
        Succeed { after: Duration },
        FailTask { index: usize, exit_code: i32 },
        RefuseStart,
        Hang,
        /// `start` itself takes this long, then the job succeeds at once
        SlowStart { delay: Duration },
    }

    #[derive(Default)]
    struct MockState {
        started: Vec<String>,
        started_env: HashMap<String, BTreeMap<String, String>>,
        cancelled: Vec<String>,
        finished_at: HashMap<uuid::Uuid, Option<(Instant, JobOutcome)>>,
    }

    /// Backend that records calls and resolves jobs from a script
    struct MockBackend {
        scripts: HashMap<String, Script>,
        state: Mutex<MockState>,
    }

    impl MockBackend {
        fn new(scripts: &[(&str, Script)]) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts
                    .iter()
                    .map(|(name, script)| (name.to_string(), script.clone()))
                    .collect(),
                state: Mutex::new(MockState::default()),
            })
        }

        fn started(&self) -> Vec<String> {
            self.state.lock().unwrap().started.clone()
        }

        fn cancelled(&self) -> Vec<String> {
            self.state.lock().unwrap().cancelled.clone()
        }

        fn started_env(&self, job: &str) -> BTreeMap<String, String> {
            self.state.lock().unwrap().started_env[job].clone()
        }
    }

    #[async_trait]
    impl ContainerBackend for MockBackend {
        async fn start(&self, job: Arc<Job>) -> Result<JobHandle, BackendError> {
            let script = self.scripts[job.name()].clone();
            if let Script::SlowStart { delay } = script {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.state.lock().unwrap();
            state.started.push(job.name().to_string());
            state
                .started_env
                .insert(job.name().to_string(), job.env().clone());

            let handle = JobHandle::new(job.name());
            let finish = match script {
                Script::RefuseStart => {
                    return Err(BackendError::Command {
                        command: "podman run".to_string(),
                        exit_code: 125,
                        stderr: "image not known".to_string(),
                    });
                }
                Script::Succeed { after } => Some((Instant::now() + after, JobOutcome::Succeeded)),
                Script::FailTask { index, exit_code } => Some((
                    Instant::now(),
                    JobOutcome::Failed(JobFailure::Task {
                        index,
                        command: job.tasks()[index].clone(),
                        exit_code,
                        stderr: "boom".to_string(),
                    }),
                )),
                Script::Hang => None,
                Script::SlowStart { .. } => Some((Instant::now(), JobOutcome::Succeeded)),
            };
            state.finished_at.insert(handle.id, finish);
            Ok(handle)
        }

        async fn poll(&self, handle: &JobHandle) -> Result<Option<JobOutcome>, BackendError> {
            let state = self.state.lock().unwrap();
            match state.finished_at.get(&handle.id) {
                None => Err(BackendError::UnknownHandle(handle.id)),
                Some(Some((at, outcome))) if Instant::now() >= *at => Ok(Some(outcome.clone())),
                Some(_) => Ok(None),
            }
        }

        async fn cancel(&self, handle: &JobHandle) -> Result<(), BackendError> {
            self.state.lock().unwrap().cancelled.push(handle.job.clone());
            Ok(())
        }
    }

    fn job(name: &str) -> Job {
        Job::builder(name)
            .image("alpine")
            .tasks(["make build", "make test"])
            .build()
            .unwrap()
    }

    fn group(mode: ExecutionMode, names: &[&str]) -> JobGroup {
        let mut group = JobGroup::new("ci", mode);
        for name in names {
            group.add(job(name)).unwrap();
        }
        group
    }

    fn fast_config() -> RunnerConfig {
        RunnerConfig::default()
            .with_poll(PollPolicy::fixed(Duration::ZERO, Duration::from_millis(5)))
    }

    fn runner(backend: Arc<MockBackend>, config: RunnerConfig) -> GroupRunner {
        GroupRunner::new(backend, config)
    }

    fn ok() -> Script {
        Script::Succeed {
            after: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_all_jobs_succeed() {
        let backend = MockBackend::new(&[("lint", ok()), ("test", ok()), ("build", ok())]);

        for mode in [ExecutionMode::Sequential, ExecutionMode::Concurrent] {
            let report = runner(backend.clone(), fast_config())
                .run(group(mode, &["lint", "test", "build"]))
                .await
                .unwrap();

            assert!(report.is_success());
            assert!(report.failures().is_empty());
            assert_eq!(report.mode, mode);
            let names: Vec<&str> = report.jobs.iter().map(|j| j.name.as_str()).collect();
            assert_eq!(names, vec!["lint", "test", "build"]);
        }
    }

    #[tokio::test]
    async fn test_sequential_stops_at_first_failure() {
        let backend = MockBackend::new(&[
            ("lint", ok()),
            (
                "test",
                Script::FailTask {
                    index: 1,
                    exit_code: 2,
                },
            ),
            ("build", ok()),
            ("deploy", ok()),
        ]);

        let err = runner(backend.clone(), fast_config())
            .run(group(
                ExecutionMode::Sequential,
                &["lint", "test", "build", "deploy"],
            ))
            .await
            .unwrap_err();

        assert_eq!(backend.started(), vec!["lint", "test"]);

        match err {
            RunError::JobFailed {
                name,
                failure,
                report,
            } => {
                assert_eq!(name, "test");
                assert!(matches!(
                    failure,
                    JobFailure::Task {
                        index: 1,
                        exit_code: 2,
                        ref command,
                        ..
                    } if command == "make test"
                ));
                assert_eq!(report.jobs.len(), 2);
                assert!(report.jobs[0].outcome.is_success());
            }
            other => panic!("expected JobFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sequential_start_failure_propagates() {
        let backend = MockBackend::new(&[("lint", Script::RefuseStart), ("test", ok())]);

        let err = runner(backend.clone(), fast_config())
            .run(group(ExecutionMode::Sequential, &["lint", "test"]))
            .await
            .unwrap_err();

        assert_eq!(backend.started(), vec!["lint"]);
        assert_eq!(err.failed_jobs(), vec!["lint"]);
        assert!(err.to_string().contains("image not known"));
    }

    #[tokio::test]
    async fn test_concurrent_collects_exactly_the_failed_job() {
        let backend = MockBackend::new(&[
            ("lint", ok()),
            (
                "test",
                Script::FailTask {
                    index: 0,
                    exit_code: 1,
                },
            ),
            ("build", ok()),
        ]);

        let err = runner(backend.clone(), fast_config())
            .run(group(ExecutionMode::Concurrent, &["lint", "test", "build"]))
            .await
            .unwrap_err();

        let mut started = backend.started();
        started.sort();
        assert_eq!(started, vec!["build", "lint", "test"]);

        let RunError::Aggregate(aggregate) = err else {
            panic!("expected aggregate failure");
        };
        assert_eq!(aggregate.failures.len(), 1);
        assert_eq!(aggregate.failures[0].0, "test");
        assert_eq!(aggregate.failures[0].1.exit_code(), 1);

        assert_eq!(aggregate.report.jobs.len(), 3);
        assert!(aggregate.report.get("lint").unwrap().outcome.is_success());
        assert!(aggregate.report.get("build").unwrap().outcome.is_success());
        assert!(backend.cancelled().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_waits_for_every_job_despite_start_failures() {
        let backend = MockBackend::new(&[
            ("lint", Script::RefuseStart),
            (
                "test",
                Script::Succeed {
                    after: Duration::from_millis(80),
                },
            ),
            (
                "build",
                Script::FailTask {
                    index: 0,
                    exit_code: 3,
                },
            ),
        ]);

        let err = runner(backend.clone(), fast_config())
            .run(group(ExecutionMode::Concurrent, &["lint", "test", "build"]))
            .await
            .unwrap_err();

        assert_eq!(backend.started().len(), 3);

        let report = err.report();
        // the slow job was observed terminal before run() returned
        assert!(report.get("test").unwrap().outcome.is_success());
        assert_eq!(err.failed_jobs(), vec!["lint", "build"]);
        assert!(matches!(
            report.get("lint").unwrap().outcome,
            JobOutcome::Failed(JobFailure::Start { .. })
        ));
    }

    #[tokio::test]
    async fn test_no_retries() {
        let backend = MockBackend::new(&[("flaky", Script::RefuseStart)]);

        for mode in [ExecutionMode::Sequential, ExecutionMode::Concurrent] {
            let _ = runner(backend.clone(), fast_config())
                .run(group(mode, &["flaky"]))
                .await;
        }

        assert_eq!(backend.started(), vec!["flaky", "flaky"]);
    }

    #[tokio::test]
    async fn test_backend_sees_env_frozen_at_submission() {
        let backend = MockBackend::new(&[("test", ok())]);

        let mut job = job("test");
        job.set_env("X", "a").unwrap();

        let mut group = JobGroup::new("ci", ExecutionMode::Concurrent);
        group.add(job.clone()).unwrap();
        job.set_env("X", "b").unwrap();

        runner(backend.clone(), fast_config())
            .run(group)
            .await
            .unwrap();

        assert_eq!(backend.started_env("test")["X"], "a");
    }

    #[tokio::test]
    async fn test_deadline_cancels_unfinished_jobs() {
        let backend = MockBackend::new(&[("quick", ok()), ("stuck", Script::Hang)]);
        let config = fast_config().with_deadline(Duration::from_millis(100));

        let err = runner(backend.clone(), config)
            .run(group(ExecutionMode::Concurrent, &["quick", "stuck"]))
            .await
            .unwrap_err();

        assert_eq!(err.failed_jobs(), vec!["stuck"]);
        assert!(matches!(
            err.report().get("stuck").unwrap().outcome,
            JobOutcome::Failed(JobFailure::DeadlineExceeded)
        ));
        assert_eq!(backend.cancelled(), vec!["stuck"]);
    }

    #[tokio::test]
    async fn test_sequential_deadline_propagates() {
        let backend = MockBackend::new(&[("stuck", Script::Hang), ("after", ok())]);
        let config = fast_config().with_deadline(Duration::from_millis(100));

        let err = runner(backend.clone(), config)
            .run(group(ExecutionMode::Sequential, &["stuck", "after"]))
            .await
            .unwrap_err();

        match err {
            RunError::JobFailed { name, failure, .. } => {
                assert_eq!(name, "stuck");
                assert_eq!(failure, JobFailure::DeadlineExceeded);
            }
            other => panic!("expected JobFailed, got {:?}", other),
        }
        assert_eq!(backend.started(), vec!["stuck"]);
        assert_eq!(backend.cancelled(), vec!["stuck"]);
    }

    #[tokio::test]
    async fn test_job_started_after_deadline_is_cancelled() {
        let backend = MockBackend::new(&[(
            "slowpull",
            Script::SlowStart {
                delay: Duration::from_millis(150),
            },
        )]);
        let config = fast_config().with_deadline(Duration::from_millis(50));

        let err = runner(backend.clone(), config)
            .run(group(ExecutionMode::Concurrent, &["slowpull"]))
            .await
            .unwrap_err();

        assert_eq!(err.failed_jobs(), vec!["slowpull"]);
        assert!(matches!(
            err.report().get("slowpull").unwrap().outcome,
            JobOutcome::Failed(JobFailure::DeadlineExceeded)
        ));
        assert_eq!(backend.started(), vec!["slowpull"]);
        assert_eq!(backend.cancelled(), vec!["slowpull"]);
    }

    #[tokio::test]
    async fn test_initial_delay_before_first_poll() {
        let backend = MockBackend::new(&[("test", ok())]);
        let config = RunnerConfig::default().with_poll(PollPolicy::fixed(
            Duration::from_millis(50),
            Duration::from_millis(5),
        ));

        let started = Instant::now();
        runner(backend, config)
            .run(group(ExecutionMode::Sequential, &["test"]))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_empty_group_succeeds() {
        let backend = MockBackend::new(&[]);

        let report = runner(backend.clone(), fast_config())
            .run(JobGroup::new("empty", ExecutionMode::Concurrent))
            .await
            .unwrap();

        assert!(report.jobs.is_empty());
        assert!(backend.started().is_empty());
    }
}
