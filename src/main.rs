//! Idea-to-live-app implementation worker.
//!
//! Drives a coding agent through one job: parses a plan from the agent's
//! first message, publishes every recognized step to the job's branch, and
//! narrates progress to the callback receiver.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use shipwright::driver::run_job;
use shipwright::io::agent::CliAgentStream;
use shipwright::io::config::load_config;
use shipwright::io::notifier::HttpNotifier;
use shipwright::io::prompt::PromptEngine;
use shipwright::io::request::{JobRequest, load_request, request_from_env};
use shipwright::io::workspace::prepare_working_tree;
use shipwright::{core, logging};

#[derive(Parser)]
#[command(
    name = "shipwright",
    version,
    about = "Implementation worker: turns a product idea into a live, incrementally published app"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one job to completion.
    Run {
        /// JSON file with the job request.
        #[arg(long, conflicts_with = "from_env")]
        request: Option<PathBuf>,
        /// Read the job request from environment variables (sandbox mode).
        #[arg(long)]
        from_env: bool,
        /// Working tree for the build.
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
        /// Worker config TOML (defaults apply if missing).
        #[arg(long, default_value = "shipwright.toml")]
        config: PathBuf,
    },
    /// Parse a plan from a transcript file and print the extracted labels.
    Plan { file: PathBuf },
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            request,
            from_env,
            workdir,
            config,
        } => cmd_run(request, from_env, &workdir, &config),
        Command::Plan { file } => cmd_plan(&file),
    }
}

fn cmd_run(
    request_path: Option<PathBuf>,
    from_env: bool,
    workdir: &PathBuf,
    config_path: &PathBuf,
) -> Result<()> {
    let request: JobRequest = match (&request_path, from_env) {
        (Some(path), false) => load_request(path)?,
        (None, true) => request_from_env()?,
        (None, false) => return Err(anyhow!("pass --request <file> or --from-env")),
        (Some(_), true) => unreachable!("clap rejects --request with --from-env"),
    };
    request.validate()?;
    let config = load_config(config_path)?;

    let prompts = PromptEngine::new();
    let system_prompt = prompts.render_system(&request)?;
    let task_prompt = prompts.render_task(&request)?;

    // The working tree must be complete before the agent spawns: the agent
    // starts editing files as soon as its prompt lands, so the template copy
    // has to happen first.
    prepare_working_tree(workdir, config.template_dir.as_deref())
        .context("prepare working tree")?;
    let mut agent = CliAgentStream::spawn(&config.agent, workdir, &system_prompt, &task_prompt)
        .context("start agent")?;
    let mut sink = HttpNotifier::new(
        &request.callback_base_url,
        &request.job_id,
        Duration::from_secs(config.callback_timeout_secs),
    );

    let outcome = run_job(workdir, &request, &config, &mut agent, &mut sink)?;
    println!(
        "job {}: {} steps dispatched ({} planned), published={}, success={}",
        request.job_id,
        outcome.steps_dispatched,
        outcome.total_steps,
        outcome.published,
        outcome.success
    );
    Ok(())
}

fn cmd_plan(file: &PathBuf) -> Result<()> {
    let text =
        std::fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let plan = core::plan::parse_plan(&text);
    for (index, label) in plan.labels.iter().enumerate() {
        println!("{index}. {label}");
    }
    println!("total: {}", plan.total);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_request_file() {
        let cli = Cli::parse_from(["shipwright", "run", "--request", "job.json"]);
        let Command::Run {
            request, from_env, ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(request, Some(PathBuf::from("job.json")));
        assert!(!from_env);
    }

    #[test]
    fn parse_run_from_env() {
        let cli = Cli::parse_from(["shipwright", "run", "--from-env", "--workdir", "/out"]);
        let Command::Run {
            from_env, workdir, ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert!(from_env);
        assert_eq!(workdir, PathBuf::from("/out"));
    }

    #[test]
    fn request_and_from_env_conflict() {
        let result =
            Cli::try_parse_from(["shipwright", "run", "--request", "job.json", "--from-env"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_plan_command() {
        let cli = Cli::parse_from(["shipwright", "plan", "transcript.txt"]);
        assert!(matches!(cli.command, Command::Plan { .. }));
    }
}
