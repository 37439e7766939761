//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod check;
mod run;
mod stubs;

pub use check::CheckArgs;
pub use run::RunArgs;
pub use stubs::StubsArgs;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use convoy_lua::{
    EnvModule, GroupDefinition, LogModule, MapVarProvider, ModuleRegistry, VarProvider,
    parse_group_definition,
};
use std::fs;
use std::path::{Path, PathBuf};

use crate::sinks::TracingLogSink;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a job group
    Run(RunArgs),
    /// Parse and validate a job group without running it
    Check(CheckArgs),
    /// Generate Lua development files (.luarc.json and stubs)
    Stubs(StubsArgs),
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run(args) => run::handle_run_command(args).await,
        Commands::Check(args) => check::handle_check_command(args),
        Commands::Stubs(args) => stubs::handle_stubs_command(args),
    }
}

/// Script location and the variables exposed to it through `env`
#[derive(Args)]
pub struct ScriptArgs {
    /// Path to the Lua definition script
    pub script: PathBuf,

    /// Variable for the script's `env` module (KEY=value, repeatable)
    #[arg(long = "var", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,

    /// Forward a host environment variable to the script's `env` module
    #[arg(long = "pass-env", value_name = "NAME")]
    pub pass_env: Vec<String>,
}

impl ScriptArgs {
    /// Collects `--var` and `--pass-env` into a provider; `--var` wins on conflict
    pub fn vars(&self) -> MapVarProvider {
        self.pass_env
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|value| (name.clone(), value)))
            .chain(self.vars.iter().cloned())
            .collect()
    }
}

/// Parse a single key=value pair
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Reads and evaluates a definition script with `env` and `log` available
fn load_definition<V: VarProvider + 'static>(
    script: &Path,
    vars: V,
) -> Result<GroupDefinition> {
    let source = fs::read_to_string(script)
        .with_context(|| format!("Failed to read definition script {:?}", script))?;

    let mut registry = ModuleRegistry::new();
    registry.register(EnvModule::new(vars))?;
    registry.register(LogModule::new(TracingLogSink))?;

    parse_group_definition(&source, &registry)
        .with_context(|| format!("Invalid definition in {:?}", script))
}
