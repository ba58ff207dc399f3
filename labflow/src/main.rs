//! Labflow: natural-language requests in, planned and executed scripts out.
//!
//! `labflow run` plans the request against the files on the compute node,
//! dispatches each step to a specialist, runs the generated scripts through
//! the configured executor, and retries failed steps up to the cap.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use labflow::core::state_update::ControllerUpdate;
use labflow::core::types::WorkflowState;
use labflow::exit_codes;
use labflow::gateway::Gateway;
use labflow::graph::{Node, Transition};
use labflow::io::config::{LabflowConfig, load_config, write_config};
use labflow::io::llm::OpenAiClient;
use labflow::logging;
use labflow::session::{build_executor, load_retriever, open_sink, with_workflow};

#[derive(Parser)]
#[command(
    name = "labflow",
    version,
    about = "Plan and execute multi-step lab workflows from a natural-language request"
)]
struct Cli {
    /// Path to the TOML config (defaults apply when the file is missing).
    #[arg(long, global = true, default_value = "labflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan and execute a request until it completes or fails.
    Run {
        request: String,
        /// Override the step budget from the config.
        #[arg(long)]
        max_steps: Option<u32>,
        /// Print each transition as one JSON object per line.
        #[arg(long)]
        json: bool,
    },
    /// Synthesize and print the plan for a request without executing it.
    Plan { request: String },
    /// Check that the executor can run a trivial command.
    Check,
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            request,
            max_steps,
            json,
        } => cmd_run(&cli.config, &request, max_steps, json),
        Command::Plan { request } => cmd_plan(&cli.config, &request),
        Command::Check => cmd_check(&cli.config),
        Command::Init { force } => cmd_init(&cli.config, force),
    }
}

fn cmd_run(config_path: &Path, request: &str, max_steps: Option<u32>, json: bool) -> Result<i32> {
    let config = load_config(config_path)?;
    let generator = OpenAiClient::from_config(&config.llm)?;
    let retriever = load_retriever(&config)?;
    let sink = open_sink(&config.executor)?;
    let executor = build_executor(&config.executor, sink.as_ref());

    with_workflow(
        &config,
        &generator,
        retriever.as_ref(),
        executor.as_ref(),
        max_steps,
        |workflow| -> Result<i32> {
            let mut steps = workflow.steps(request);
            let mut last: Option<Transition> = None;
            for (index, transition) in steps.by_ref().enumerate() {
                print_transition(index + 1, &transition, json)?;
                last = Some(transition);
            }
            let Some(last) = last else {
                return Ok(exit_codes::INVALID);
            };
            if !json {
                print_outcome(&last.state);
            }
            Ok(outcome_code(&last.state, steps.budget_exhausted()))
        },
    )?
}

fn cmd_plan(config_path: &Path, request: &str) -> Result<i32> {
    let config = load_config(config_path)?;
    let generator = OpenAiClient::from_config(&config.llm)?;
    let retriever = load_retriever(&config)?;
    let sink = open_sink(&config.executor)?;
    let executor = build_executor(&config.executor, sink.as_ref());

    let update = with_workflow(
        &config,
        &generator,
        retriever.as_ref(),
        executor.as_ref(),
        None,
        |workflow| workflow.controller().step(&WorkflowState::new(request)),
    )?;

    match update {
        ControllerUpdate::Planned { plan, snapshot, .. } => {
            if let Some(root) = &snapshot.root {
                let note = if snapshot.truncated { " (truncated)" } else { "" };
                println!("resources: {}{note}", root.display());
            }
            for step in &plan {
                println!("[{}] {}", step.agent, step.description);
            }
            Ok(exit_codes::OK)
        }
        ControllerUpdate::Fatal { error } => {
            eprintln!("{error}");
            Ok(exit_codes::FAILED)
        }
        other => {
            eprintln!("unexpected planning outcome: {other:?}");
            Ok(exit_codes::FAILED)
        }
    }
}

fn cmd_check(config_path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
    let routes = config.routing_table()?;
    let sink = open_sink(&config.executor)?;
    let executor = build_executor(&config.executor, sink.as_ref());

    Gateway::new(executor.as_ref(), &routes)
        .health_check()
        .context("executor health check")?;
    println!("executor reachable");
    Ok(exit_codes::OK)
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        println!("{} already exists", config_path.display());
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &LabflowConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

#[derive(Serialize)]
struct TransitionLine<'a> {
    index: usize,
    #[serde(flatten)]
    transition: &'a Transition,
}

fn print_transition(index: usize, transition: &Transition, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(&TransitionLine { index, transition })
            .context("serialize transition")?;
        println!("{line}");
        return Ok(());
    }

    let state = &transition.state;
    let step = state
        .current_step
        .as_ref()
        .map(|step| step.description.as_str())
        .unwrap_or("-");
    match &transition.node {
        Node::Controller => println!("[{index}] controller: {step} (retry {})", state.retry_count),
        Node::Specialist(agent) => {
            let generated = if state.generated_script.is_some() {
                "script ready"
            } else {
                "no script"
            };
            println!("[{index}] {agent}: {generated}");
        }
        Node::Executor => {
            let status = state
                .last_execution
                .as_ref()
                .map(|result| result.exit_status)
                .unwrap_or_default();
            println!("[{index}] executor: exit {status}");
        }
        Node::BudgetExhausted => println!("[{index}] step budget exhausted"),
    }
    Ok(())
}

fn print_outcome(state: &WorkflowState) {
    if let Some(answer) = &state.final_answer {
        println!("{answer}");
    }
    if let Some(error) = &state.fatal_error {
        eprintln!("{error}");
    }
    if let Some(workspace) = &state.workspace {
        println!("workspace: {}", workspace.display());
    }
}

fn outcome_code(state: &WorkflowState, budget_exhausted: bool) -> i32 {
    if state.final_answer.is_some() {
        exit_codes::OK
    } else if budget_exhausted {
        exit_codes::BUDGET_EXHAUSTED
    } else {
        exit_codes::FAILED
    }
}
