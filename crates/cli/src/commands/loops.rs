// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dl loop` - loop engine commands

use anyhow::{anyhow, bail, Result};
use clap::{Args, Subcommand};
use dl_adapters::checkpoint::{backend_for, detect_backend, BackendKind};
use dl_adapters::{detect_agent, get_agent, AgentAdapter, DesktopNotifier};
use dl_engine::{
    run_best_of_n, BestOfN, LoopOptions, LoopRunner, LoopState, LoopStatus, Orchestrator,
    OrchestratorConfig, SelectionMode,
};
use dl_gates::{Gate, GateChecker, GateContext};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args)]
pub struct LoopArgs {
    #[command(subcommand)]
    pub command: LoopCommand,
}

#[derive(Subcommand)]
pub enum LoopCommand {
    /// Start a loop: iterate an agent until the promise passes
    Start {
        /// Natural-language task for the agent
        task: String,
        /// Shell command that must exit 0 for the task to count as done
        #[arg(short, long)]
        promise: String,
        /// Maximum iterations before giving up
        #[arg(short = 'n', long, default_value = "10")]
        iterations: u32,
        /// Agent to drive: opencode, claude, aider, custom, noop (default: auto-detect)
        #[arg(long)]
        agent: Option<String>,
        /// Command for --agent custom (receives the prompt on stdin)
        #[arg(long)]
        agent_cmd: Option<String>,
        /// Checkpoint backend: auto, snapshot, vcs, none
        #[arg(long, default_value = "auto")]
        checkpoint: String,
        /// Per-iteration agent timeout in seconds
        #[arg(long, default_value = "300")]
        timeout: u64,
        /// Explore N parallel branches and keep the best
        #[arg(long)]
        best_of: Option<usize>,
        /// Dispatch subagents through the orchestrator instead of a single loop
        #[arg(long)]
        orchestrate: bool,
        /// Working directory (default: current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Show a loop's status (latest when no ID is given)
    Status { id: Option<String> },
    /// Cancel a running loop
    Stop { id: String },
    /// List saved loops
    List,
    /// Resume a paused or interrupted loop
    Resume { id: String },
}

pub async fn run(args: LoopArgs) -> Result<()> {
    match args.command {
        LoopCommand::Start {
            task,
            promise,
            iterations,
            agent,
            agent_cmd,
            checkpoint,
            timeout,
            best_of,
            orchestrate,
            dir,
        } => {
            let working_dir = match dir {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            start(StartParams {
                task,
                promise,
                iterations,
                agent,
                agent_cmd,
                checkpoint,
                timeout: Duration::from_secs(timeout),
                best_of,
                orchestrate,
                working_dir,
            })
            .await
        }
        LoopCommand::Status { id } => status(id),
        LoopCommand::Stop { id } => stop(&id),
        LoopCommand::List => list(),
        LoopCommand::Resume { id } => resume(&id),
    }
}

struct StartParams {
    task: String,
    promise: String,
    iterations: u32,
    agent: Option<String>,
    agent_cmd: Option<String>,
    checkpoint: String,
    timeout: Duration,
    best_of: Option<usize>,
    orchestrate: bool,
    working_dir: PathBuf,
}

fn select_agent(
    name: Option<&str>,
    custom_cmd: Option<&str>,
) -> Result<Box<dyn AgentAdapter>> {
    match name {
        Some(name) => Ok(get_agent(name, custom_cmd)?),
        None => detect_agent().ok_or_else(|| {
            anyhow!("no agent CLI detected; install opencode/aider/claude or pass --agent")
        }),
    }
}

fn backend_kind(choice: &str, dir: &std::path::Path) -> Result<BackendKind> {
    match choice {
        "auto" => Ok(detect_backend(dir)),
        "snapshot" | "btrfs" => Ok(BackendKind::Snapshot),
        "vcs" | "git" => Ok(BackendKind::VcsBranch),
        "none" => Ok(BackendKind::None),
        other => bail!("unknown checkpoint backend: {other}"),
    }
}

async fn start(params: StartParams) -> Result<()> {
    // Starting a loop is itself a gated action.
    let checker = GateChecker::for_project(&params.working_dir);
    let mut context = GateContext::new();
    context.insert("description".into(), serde_json::Value::String(params.task.clone()));
    let gate_result = checker.check(Gate::LoopStart, context, "loop");
    if !gate_result.allowed {
        bail!("loop_start gate denied: {}", gate_result.reason);
    }

    if let Some(n) = params.best_of {
        return best_of(&params, n).await;
    }
    if params.orchestrate {
        return orchestrate(&params, checker).await;
    }

    let agent = select_agent(params.agent.as_deref(), params.agent_cmd.as_deref())?;
    let kind = backend_kind(&params.checkpoint, &params.working_dir)?;
    let backend = backend_for(kind, &params.working_dir);

    let mut runner = LoopRunner::new(
        &params.task,
        &params.promise,
        &params.working_dir,
        agent,
        backend,
        LoopOptions {
            max_iterations: params.iterations,
            timeout: params.timeout,
            ..Default::default()
        },
    )
    .with_notifier(Box::new(DesktopNotifier::new()))
    .with_on_iteration(|iteration| {
        let result = match iteration.promise_result {
            Some(true) => "pass",
            Some(false) => "fail",
            None => "pending",
        };
        println!(
            "iteration {}: promise {result} ({} ms)",
            iteration.number, iteration.duration_ms
        );
    });

    println!("loop {} started", runner.state().id);
    let met = runner.run()?;
    let state = runner.state();

    match state.status {
        LoopStatus::Completed => {
            println!("completed: promise met after {} iterations", state.current_iteration);
            Ok(())
        }
        _ => {
            let reason = state
                .error_message
                .clone()
                .unwrap_or_else(|| format!("loop ended with status {}", state.status));
            if met {
                Ok(())
            } else {
                Err(anyhow!(reason))
            }
        }
    }
}

async fn best_of(params: &StartParams, n: usize) -> Result<()> {
    let agent_name = params.agent.clone();
    let agent_cmd = params.agent_cmd.clone();

    let opts = BestOfN {
        n,
        max_iterations: params.iterations,
        timeout: params.timeout,
        selection: SelectionMode::Auto,
        ..BestOfN::new(&params.task, &params.promise, &params.working_dir)
    };

    let factory = move || match agent_name.as_deref() {
        Some(name) => get_agent(name, agent_cmd.as_deref()),
        None => detect_agent().ok_or(dl_adapters::AgentError::NoneAvailable),
    };

    let result = run_best_of_n(&opts, &factory)?;
    println!("{}", dl_engine::compare_branches(&result.all_results));
    println!("{}", result.selection_reason);
    println!("total iterations across branches: {}", result.total_iterations);

    match result.winning_branch() {
        Some(winner) if winner.success => Ok(()),
        _ => Err(anyhow!("no branch met the promise")),
    }
}

async fn orchestrate(params: &StartParams, checker: GateChecker) -> Result<()> {
    let agent: Arc<dyn AgentAdapter> =
        Arc::from(select_agent(params.agent.as_deref(), params.agent_cmd.as_deref())?);

    let mut orchestrator = Orchestrator::new(
        &params.task,
        &params.promise,
        &params.working_dir,
        agent,
        OrchestratorConfig { gate: Some(checker), ..Default::default() },
        None,
    )?;

    println!("orchestrated loop {} started", orchestrator.loop_id());
    if orchestrator.run()? {
        println!("completed: promise met");
        Ok(())
    } else {
        Err(anyhow!("orchestration ended without meeting the promise"))
    }
}

fn load_state(id: &str) -> Result<LoopState> {
    Ok(LoopState::load(&LoopState::default_state_dir(), id)?)
}

fn status(id: Option<String>) -> Result<()> {
    let state = match id {
        Some(id) => load_state(&id)?,
        None => LoopState::list_all(&LoopState::default_state_dir())
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no loops recorded"))?,
    };

    println!("loop:       {}", state.id);
    println!("status:     {}", state.status);
    println!("task:       {}", state.task);
    println!("promise:    {}", state.promise_cmd);
    println!("agent:      {}", state.agent_name);
    println!("iterations: {}/{}", state.current_iteration, state.max_iterations);
    println!("updated:    {}", state.updated_at);
    if let Some(error) = &state.error_message {
        println!("error:      {error}");
    }
    Ok(())
}

fn stop(id: &str) -> Result<()> {
    dl_engine::request_cancel(&LoopState::default_state_dir(), id)?;
    println!("cancel requested for {id}");
    Ok(())
}

fn list() -> Result<()> {
    let states = LoopState::list_all(&LoopState::default_state_dir());
    if states.is_empty() {
        println!("no loops recorded");
        return Ok(());
    }
    for state in states {
        println!(
            "{}  {:9}  {:>2}/{:<2}  {}",
            state.id,
            state.status,
            state.current_iteration,
            state.max_iterations,
            dl_core::id::short(&state.task, 48),
        );
    }
    Ok(())
}

fn resume(id: &str) -> Result<()> {
    let mut state = load_state(id)?;
    match state.status {
        LoopStatus::Paused | LoopStatus::Running | LoopStatus::Pending => {}
        other => bail!("loop {id} is {other} and cannot be resumed"),
    }
    // A paused loop resumes; anything else continues from where it stopped.
    // Persist the transition so the runner's state re-read sees `running`.
    state.transition(LoopStatus::Running);
    state.save(&LoopState::default_state_dir())?;

    let agent = get_agent(&state.agent_name, None)
        .or_else(|_| {
            detect_agent().ok_or(dl_adapters::AgentError::NoneAvailable)
        })?;
    let backend = backend_for(detect_backend(&state.working_dir), &state.working_dir);
    let max_iterations = state.max_iterations;

    let mut runner = LoopRunner::resume_from(
        state,
        agent,
        backend,
        LoopOptions { max_iterations, ..Default::default() },
    )
    .with_notifier(Box::new(DesktopNotifier::new()));

    println!("resuming loop {id}");
    if runner.run()? {
        println!("completed: promise met");
        Ok(())
    } else {
        let reason = runner
            .state()
            .error_message
            .clone()
            .unwrap_or_else(|| "loop did not meet its promise".to_string());
        Err(anyhow!(reason))
    }
}
