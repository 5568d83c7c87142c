// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dl gate` - supervision gate commands

use anyhow::{anyhow, bail, Result};
use clap::{Args, Subcommand};
use dl_gates::{
    check_autonomy_limits, Gate, GateAction, GateChecker, GateContext, RunCounters,
    SupervisionConfig, SupervisionLevel,
};

#[derive(Args)]
pub struct GateArgs {
    #[command(subcommand)]
    pub command: GateCommand,
}

#[derive(Subcommand)]
pub enum GateCommand {
    /// Check whether an action may proceed; exits 0 iff allowed
    Check {
        /// Gate name, e.g. file_delete, git_push, shell_command
        gate: String,
        /// Context as a JSON object, e.g. '{"path": "/tmp/x"}'
        context: Option<String>,
        /// Label of the requesting tool
        #[arg(default_value = "cli")]
        source: String,
    },
    /// Show or set the supervision level
    Level { name: Option<String> },
    /// Set a gate's action in the user config
    Set { gate: String, action: String },
    /// Print the effective configuration
    Config,
    /// Show recent gate decisions
    History {
        /// Only this gate
        #[arg(long)]
        gate: Option<String>,
        /// Days of audit logs to read
        #[arg(long, default_value = "7")]
        days: u32,
        /// Maximum events to show
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Check run counters against the autonomy limits
    Limits {
        #[arg(long, default_value = "0")]
        iterations: u64,
        #[arg(long, default_value = "0")]
        file_changes: u64,
        #[arg(long, default_value = "0")]
        lines_changed: u64,
    },
}

pub fn run(args: GateArgs) -> Result<()> {
    match args.command {
        GateCommand::Check { gate, context, source } => check(&gate, context.as_deref(), &source),
        GateCommand::Level { name } => level(name.as_deref()),
        GateCommand::Set { gate, action } => set(&gate, &action),
        GateCommand::Config => config(),
        GateCommand::History { gate, days, limit } => history(gate.as_deref(), days, limit),
        GateCommand::Limits { iterations, file_changes, lines_changed } => {
            limits(RunCounters { iterations, file_changes, lines_changed })
        }
    }
}

fn parse_context(raw: Option<&str>) -> Result<GateContext> {
    let Some(raw) = raw else {
        return Ok(GateContext::new());
    };
    match serde_json::from_str::<serde_json::Value>(raw)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => bail!("context must be a JSON object"),
    }
}

fn check(gate: &str, context: Option<&str>, source: &str) -> Result<()> {
    let gate: Gate = gate.parse()?;
    let context = parse_context(context)?;
    let project = std::env::current_dir()?;

    let checker = GateChecker::for_project(&project);
    let result = checker.check(gate, context, source);

    if result.allowed {
        println!("allowed ({}): {}", result.action, result.reason);
        Ok(())
    } else {
        Err(anyhow!("denied ({}): {}", result.action, result.reason))
    }
}

fn level(name: Option<&str>) -> Result<()> {
    match name {
        None => {
            let config = SupervisionConfig::load_user();
            println!("{}", config.level);
            Ok(())
        }
        Some(name) => {
            let level: SupervisionLevel = name.parse()?;
            let mut config = SupervisionConfig::load_user();
            config.level = level;
            config.save_user()?;
            println!("supervision level set to {level}");
            Ok(())
        }
    }
}

fn set(gate: &str, action: &str) -> Result<()> {
    let gate: Gate = gate.parse()?;
    let action: GateAction = action.parse()?;

    let mut config = SupervisionConfig::load_user();
    config.gates.insert(gate, action);
    config.save_user()?;
    println!("{gate} = {action}");
    Ok(())
}

fn config() -> Result<()> {
    let project = std::env::current_dir()?;
    let config = SupervisionConfig::load_project(&project);
    print!("{}", serde_yaml::to_string(&config)?);
    println!("# effective actions");
    for gate in Gate::ALL {
        println!("# {gate}: {}", config.gate_action(gate));
    }
    Ok(())
}

fn history(gate: Option<&str>, days: u32, limit: usize) -> Result<()> {
    let gate = gate.map(|g| g.parse::<Gate>()).transpose()?;
    let checker = GateChecker::new(SupervisionConfig::load_user());
    let events = checker.history(gate, days, limit)?;

    if events.is_empty() {
        println!("no gate decisions recorded");
        return Ok(());
    }
    for event in events {
        let allowed = event
            .pointer("/result/allowed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        println!(
            "{}  {:14}  {:7}  {}  {}",
            event.get("timestamp").and_then(|v| v.as_str()).unwrap_or("-"),
            event.get("gate").and_then(|v| v.as_str()).unwrap_or("-"),
            if allowed { "allow" } else { "deny" },
            event.pointer("/result/action").and_then(|v| v.as_str()).unwrap_or("-"),
            event.get("source").and_then(|v| v.as_str()).unwrap_or("-"),
        );
    }
    Ok(())
}

fn limits(counters: RunCounters) -> Result<()> {
    let config = SupervisionConfig::load_project(&std::env::current_dir()?);
    match check_autonomy_limits(&config, counters) {
        None => {
            println!("within autonomy limits");
            Ok(())
        }
        Some(reason) => Err(anyhow!(reason)),
    }
}
