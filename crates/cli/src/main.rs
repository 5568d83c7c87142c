// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dl` - the Daedalos command line.
//!
//! Subcommand groups: `loop` (the loop engine), `undo` (the undo daemon),
//! `gate` (supervision gates), `hub` and `pool` (the process-pool daemons).

mod client;
mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dl", about = "Daedalos: safe, observable AI-driven code modification")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run iterate-until-promise-met loops
    #[command(name = "loop")]
    Loop(commands::loops::LoopArgs),

    /// Inspect and restore the undo timeline
    Undo(commands::undo::UndoArgs),

    /// Check and configure supervision gates
    Gate(commands::gate::GateArgs),

    /// Manage the tool-server hub daemon
    Hub(commands::pool::PoolArgs),

    /// Manage the language-server pool daemon
    Pool(commands::pool::PoolArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Loop(args) => commands::loops::run(args).await,
        Commands::Undo(args) => commands::undo::run(args).await,
        Commands::Gate(args) => commands::gate::run(args),
        Commands::Hub(args) => commands::pool::run(args, commands::pool::PoolTarget::Hub).await,
        Commands::Pool(args) => {
            commands::pool::run(args, commands::pool::PoolTarget::LspPool).await
        }
    };

    match outcome {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("dl: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(args)
    }

    #[test]
    fn loop_start_parses_with_promise_and_iterations() {
        let cli = parse(&[
            "dl", "loop", "start", "make tests pass", "--promise", "cargo test", "-n", "5",
        ])
        .unwrap();
        let Commands::Loop(args) = cli.command else { panic!("expected loop") };
        let commands::loops::LoopCommand::Start { task, promise, iterations, .. } = args.command
        else {
            panic!("expected start");
        };
        assert_eq!(task, "make tests pass");
        assert_eq!(promise, "cargo test");
        assert_eq!(iterations, 5);
    }

    #[test]
    fn loop_start_requires_a_promise() {
        assert!(parse(&["dl", "loop", "start", "task"]).is_err());
    }

    #[test]
    fn undo_timeline_defaults_limit() {
        let cli = parse(&["dl", "undo", "timeline"]).unwrap();
        let Commands::Undo(args) = cli.command else { panic!("expected undo") };
        let commands::undo::UndoCommand::Timeline { limit, file } = args.command else {
            panic!("expected timeline");
        };
        assert_eq!(limit, 20);
        assert!(file.is_none());
    }

    #[test]
    fn gate_check_accepts_context_and_source() {
        let cli = parse(&["dl", "gate", "check", "file_delete", r#"{"path": "/tmp/x"}"#, "loop"])
            .unwrap();
        let Commands::Gate(args) = cli.command else { panic!("expected gate") };
        let commands::gate::GateCommand::Check { gate, context, source } = args.command else {
            panic!("expected check");
        };
        assert_eq!(gate, "file_delete");
        assert!(context.unwrap().contains("/tmp/x"));
        assert_eq!(source, "loop");
    }

    #[test]
    fn hub_and_pool_share_the_command_set() {
        for group in ["hub", "pool"] {
            let cli = parse(&["dl", group, "warm", "filesystem", "github"]).unwrap();
            let (Commands::Hub(args) | Commands::Pool(args)) = cli.command else {
                panic!("expected a pool group");
            };
            let commands::pool::PoolCommand::Warm { servers } = args.command else {
                panic!("expected warm");
            };
            assert_eq!(servers, vec!["filesystem".to_string(), "github".to_string()]);
        }
    }

    #[test]
    fn pool_logs_takes_line_count() {
        let cli = parse(&["dl", "pool", "logs", "rust", "-n", "10"]).unwrap();
        let Commands::Pool(args) = cli.command else { panic!("expected pool") };
        let commands::pool::PoolCommand::Logs { server, lines } = args.command else {
            panic!("expected logs");
        };
        assert_eq!(server, "rust");
        assert_eq!(lines, 10);
    }
}
