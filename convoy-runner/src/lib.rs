//! Convoy Runner
//!
//! Executes job groups against a container backend.
//!
//! Architecture:
//! - Backend: the two operations the runner needs from a container platform
//!   (start a job, observe its terminal state) plus best-effort cancellation
//! - Podman: a backend driving the local `podman` binary
//! - Poll: injectable wait policies used while awaiting completion
//! - Runner: sequential and concurrent-with-barrier group execution
//! - Config: runner settings from environment variables or defaults

pub mod backend;
pub mod config;
pub mod podman;
pub mod poll;
pub mod runner;

pub use backend::{BackendError, ContainerBackend, JobHandle};
pub use config::RunnerConfig;
pub use podman::{PodmanBackend, check_podman_available};
pub use poll::{PollDelays, PollPolicy};
pub use runner::GroupRunner;
