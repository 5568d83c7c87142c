// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dl undo` - undo daemon commands

use crate::client;
use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use dl_wire::{UndoRequest, UndoResponse};
use std::path::PathBuf;

#[derive(Args)]
pub struct UndoArgs {
    #[command(subcommand)]
    pub command: UndoCommand,
}

#[derive(Subcommand)]
pub enum UndoCommand {
    /// Start the undo daemon watching the given paths
    Start {
        /// Paths to watch (default: current directory)
        paths: Vec<PathBuf>,
    },
    /// Stop the undo daemon
    Stop,
    /// Show daemon status
    Status,
    /// Show the undo timeline
    Timeline {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        /// Only entries for this file
        #[arg(long)]
        file: Option<String>,
    },
    /// Undo the most recent change(s)
    Last {
        #[arg(default_value = "1")]
        count: usize,
    },
    /// Create a named checkpoint
    Checkpoint {
        name: String,
        #[arg(default_value = "")]
        description: String,
    },
    /// Restore a timeline entry by ID
    To { id: String },
}

fn socket() -> PathBuf {
    dl_core::paths::runtime_dir().join("undod.sock")
}

async fn send(request: UndoRequest) -> Result<UndoResponse> {
    let response: UndoResponse = client::request(&socket(), &request).await?;
    if let UndoResponse::Error { message } = response {
        return Err(anyhow!(message));
    }
    Ok(response)
}

pub async fn run(args: UndoArgs) -> Result<()> {
    match args.command {
        UndoCommand::Start { paths } => {
            let args: Vec<String> = paths
                .iter()
                .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()).display().to_string())
                .collect();
            client::spawn_daemon("dl-undod", &socket(), &args).await
        }

        UndoCommand::Stop => {
            match send(UndoRequest::Stop).await? {
                UndoResponse::ShuttingDown => println!("stop signal sent"),
                other => println!("unexpected response: {other:?}"),
            }
            Ok(())
        }

        UndoCommand::Status => {
            let UndoResponse::Status(stats) = send(UndoRequest::Status).await? else {
                return Err(anyhow!("unexpected response"));
            };
            println!("running:          {}", stats.running);
            println!("since:            {}", stats.started_at);
            println!("changes recorded: {}", stats.changes_recorded);
            println!("files backed up:  {}", stats.files_backed_up);
            println!("backup errors:    {}", stats.backup_errors);
            println!("watch paths:      {}", stats.watch_paths.join(", "));
            Ok(())
        }

        UndoCommand::Timeline { limit, file } => {
            let UndoResponse::Timeline { entries } =
                send(UndoRequest::Timeline { limit, file }).await?
            else {
                return Err(anyhow!("unexpected response"));
            };
            if entries.is_empty() {
                println!("timeline is empty");
                return Ok(());
            }
            for entry in entries {
                let name = if entry.file_path.is_empty() {
                    entry.description.clone()
                } else {
                    entry.file_path.clone()
                };
                println!(
                    "{}  {}  {:10}  {}",
                    entry.id,
                    entry.timestamp,
                    entry.change_type,
                    name,
                );
            }
            Ok(())
        }

        UndoCommand::Last { count } => {
            let UndoResponse::Restored { restored, requested } =
                send(UndoRequest::UndoLast { count }).await?
            else {
                return Err(anyhow!("unexpected response"));
            };
            println!("restored {restored}/{requested} change(s)");
            Ok(())
        }

        UndoCommand::Checkpoint { name, description } => {
            let UndoResponse::CheckpointCreated { id } =
                send(UndoRequest::Checkpoint { name: name.clone(), description }).await?
            else {
                return Err(anyhow!("unexpected response"));
            };
            println!("checkpoint '{name}' created ({id})");
            Ok(())
        }

        UndoCommand::To { id } => {
            let UndoResponse::RestoredFile { file } =
                send(UndoRequest::Restore { entry_id: id }).await?
            else {
                return Err(anyhow!("unexpected response"));
            };
            println!("restored {file}");
            Ok(())
        }
    }
}
