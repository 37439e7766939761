//! Core domain types
//!
//! These types are shared between the Lua definition layer (which builds jobs)
//! and the runner (which executes them).

pub mod group;
pub mod job;
pub mod log;
pub mod outcome;
