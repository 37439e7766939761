//! Convoy Lua Definitions
//!
//! Job groups are described in Lua scripts evaluated inside a restricted
//! sandbox. This crate provides:
//! - Module trait and registry for host-provided Lua modules
//! - The `env` and `log` modules, generic over their backing providers
//! - The sandbox with `job` and `group` definition helpers
//! - Parsing of a script into a validated [`GroupDefinition`]

pub mod module;
pub mod modules;
pub mod parser;
pub mod sandbox;

pub use module::{ConvoyModule, ModuleRegistry};
pub use modules::{EnvModule, LogModule, LogSink, MapVarProvider, VarProvider};
pub use parser::{GroupDefinition, parse_group_definition};
pub use sandbox::{create_sandbox, helper_stubs};
