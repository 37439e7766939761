//! Check command handler

use anyhow::Result;
use clap::Args;
use colored::*;
use convoy_core::Job;

use super::{ScriptArgs, load_definition};
use crate::sinks::PlaceholderVarProvider;

#[derive(Args)]
pub struct CheckArgs {
    #[command(flatten)]
    script: ScriptArgs,

    /// Show environment values instead of masking them
    #[arg(long)]
    show_env: bool,
}

/// Parses and validates the group, then prints it
///
/// Variables that were not supplied resolve to `<NAME>` placeholders, so
/// `env.require` never fails here.
pub fn handle_check_command(args: CheckArgs) -> Result<()> {
    let definition = load_definition(
        &args.script.script,
        PlaceholderVarProvider::new(args.script.vars()),
    )?;
    let group = definition.into_group()?;

    println!("{}", "✓ Definition is valid".green().bold());
    println!();
    println!("{} {}", "Group:".bold(), group.name().cyan());
    println!("{} {}", "Mode:".bold(), group.mode());
    println!("{} {}", "Jobs:".bold(), group.len());

    for job in group.jobs() {
        print_job(job, args.show_env);
    }

    Ok(())
}

fn print_job(job: &Job, show_env: bool) {
    println!();
    println!("  {} {}", job.name().bold(), format!("[{}]", job.image()).cyan());

    if let Some(path) = job.mount_path() {
        println!("    {} {}", "mount:".dimmed(), path);
    }
    if job.privileged() {
        println!("    {}", "privileged".yellow());
    }
    for (key, value) in job.env() {
        let shown = if show_env { value.as_str() } else { "****" };
        println!("    {} {}={}", "env:".dimmed(), key, shown);
    }
    for (idx, task) in job.tasks().iter().enumerate() {
        println!("    {} {}", format!("{}.", idx + 1).dimmed(), task);
    }
}
