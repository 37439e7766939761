//! Run command handler
//!
//! Parses the definition, runs the group on podman and prints a summary.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use convoy_core::{ExecutionMode, GroupReport, JobOutcome};
use convoy_runner::{GroupRunner, PodmanBackend, RunnerConfig, check_podman_available};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{ScriptArgs, load_definition};

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    script: ScriptArgs,

    /// Override the group's execution mode (sequential | concurrent)
    #[arg(short, long)]
    mode: Option<ExecutionMode>,

    /// Overall deadline for the run, in seconds
    #[arg(short, long)]
    deadline: Option<u64>,

    /// Host directory mounted into jobs that declare a mount path
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Write the run report as JSON to this file
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

pub async fn handle_run_command(args: RunArgs) -> Result<()> {
    let mut definition = load_definition(&args.script.script, args.script.vars())?;
    if let Some(mode) = args.mode {
        definition.mode = mode;
    }
    let group = definition.into_group()?;

    let mut config = RunnerConfig::from_env()?;
    if let Some(workspace) = args.workspace {
        config.workspace = workspace;
    }
    if let Some(secs) = args.deadline {
        config = config.with_deadline(Duration::from_secs(secs));
    }
    config.validate().context("Invalid runner configuration")?;

    check_podman_available(&config.podman_bin).await?;

    println!(
        "{} {} ({} job(s), {})",
        "Running".green().bold(),
        group.name().cyan(),
        group.len(),
        group.mode()
    );

    let backend = Arc::new(PodmanBackend::from_config(&config));
    let runner = GroupRunner::new(backend.clone(), config);

    let result = runner.run(group).await;
    backend.shutdown().await;
    let report = match &result {
        Ok(report) => report,
        Err(err) => err.report(),
    };

    print_report(report);

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(report)?;
        fs::write(path, json).with_context(|| format!("Failed to write report to {:?}", path))?;
        println!("  {} {}", "Report".green(), path.display().to_string().cyan());
    }

    match result {
        Ok(_) => {
            println!("{}", "✓ All jobs succeeded".green().bold());
            Ok(())
        }
        Err(err) => {
            println!("{}", "✗ Group failed".red().bold());
            Err(err.into())
        }
    }
}

fn print_report(report: &GroupReport) {
    println!();
    for job in &report.jobs {
        let elapsed = (job.finished_at - job.started_at)
            .to_std()
            .unwrap_or_default();

        match &job.outcome {
            JobOutcome::Succeeded => println!(
                "  {} {} {}",
                "✓".green(),
                job.name.bold(),
                format!("({:.1}s)", elapsed.as_secs_f64()).dimmed()
            ),
            JobOutcome::Failed(failure) => {
                println!(
                    "  {} {} {}",
                    "✗".red(),
                    job.name.bold(),
                    format!("({:.1}s)", elapsed.as_secs_f64()).dimmed()
                );
                println!("      {}", failure.to_string().red());
            }
        }
    }
    println!();
}
