//! Convoy Core
//!
//! Core types for the Convoy job group runner.
//!
//! This crate contains:
//! - Domain types: jobs, job groups, execution modes and outcomes
//! - Errors: validation, registration and run failures

pub mod domain;
pub mod error;

pub use domain::group::{ExecutionMode, JobGroup};
pub use domain::job::{Job, JobBuilder};
pub use domain::outcome::{GroupReport, JobFailure, JobOutcome, JobReport};
pub use error::{AggregateFailure, GroupError, JobError, RunError};
