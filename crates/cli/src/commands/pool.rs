// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dl hub` / `dl pool` - process-pool daemon commands
//!
//! Both groups share one command set; the target picks the daemon binary
//! and socket.

use crate::client;
use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use dl_wire::{PoolRequest, PoolResponse};
use std::path::PathBuf;

/// Which pool daemon a command group talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolTarget {
    Hub,
    LspPool,
}

impl PoolTarget {
    fn binary(&self) -> &'static str {
        match self {
            PoolTarget::Hub => "dl-hubd",
            PoolTarget::LspPool => "dl-lspd",
        }
    }

    fn socket(&self) -> PathBuf {
        let name = match self {
            PoolTarget::Hub => "hub.sock",
            PoolTarget::LspPool => "lsp-pool.sock",
        };
        dl_core::paths::runtime_dir().join(name)
    }
}

#[derive(Args)]
pub struct PoolArgs {
    #[command(subcommand)]
    pub command: PoolCommand,
}

#[derive(Subcommand)]
pub enum PoolCommand {
    /// Start the daemon
    Start,
    /// Stop the daemon
    Stop,
    /// Show daemon and server status
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Pre-start servers (language pool names are language[:project-root])
    Warm { servers: Vec<String> },
    /// Show recent stderr from a server
    Logs {
        server: String,
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
    /// Restart a server
    Restart { server: String },
    /// Re-read the daemon configuration
    Reload,
}

async fn send(target: PoolTarget, request: PoolRequest) -> Result<PoolResponse> {
    let response: PoolResponse = client::request(&target.socket(), &request).await?;
    if let PoolResponse::Error { message } = response {
        return Err(anyhow!(message));
    }
    Ok(response)
}

pub async fn run(args: PoolArgs, target: PoolTarget) -> Result<()> {
    match args.command {
        PoolCommand::Start => client::spawn_daemon(target.binary(), &target.socket(), &[]).await,

        PoolCommand::Stop => {
            match send(target, PoolRequest::Stop).await? {
                PoolResponse::ShuttingDown => println!("stop signal sent"),
                other => println!("unexpected response: {other:?}"),
            }
            Ok(())
        }

        PoolCommand::Status { json } => {
            let PoolResponse::Status(status) = send(target, PoolRequest::Status).await? else {
                return Err(anyhow!("unexpected response"));
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }

            println!("{} daemon", status.profile);
            println!("max servers:  {}", status.max_servers);
            println!("memory limit: {} MB", status.memory_limit_mb);
            if status.servers.is_empty() {
                println!("no servers running");
                return Ok(());
            }
            println!();
            for server in &status.servers {
                let mut extras = Vec::new();
                if server.tools > 0 {
                    extras.push(format!("tools:{}", server.tools));
                }
                if server.health_failures > 0 {
                    extras.push(format!("health-failures:{}", server.health_failures));
                }
                if server.restart_count > 0 {
                    extras.push(format!("restarts:{}", server.restart_count));
                }
                println!(
                    "  {:24} {:9} {:>5} MB  up {:>5}s  idle {:>5}s  {}",
                    server.name,
                    server.status,
                    server.memory_mb,
                    server.uptime_seconds,
                    server.idle_seconds,
                    extras.join(" "),
                );
            }
            Ok(())
        }

        PoolCommand::Warm { servers } => {
            let PoolResponse::Warmed { results } =
                send(target, PoolRequest::Warm { servers }).await?
            else {
                return Err(anyhow!("unexpected response"));
            };
            let mut failed = false;
            for (name, ok) in results {
                println!("  {name}: {}", if ok { "started" } else { "failed" });
                failed |= !ok;
            }
            if failed {
                Err(anyhow!("some servers failed to warm"))
            } else {
                Ok(())
            }
        }

        PoolCommand::Logs { server, lines } => {
            let PoolResponse::Logs { lines } =
                send(target, PoolRequest::Logs { server: server.clone(), lines }).await?
            else {
                return Err(anyhow!("unexpected response"));
            };
            if lines.is_empty() {
                println!("no logs for {server}");
            } else {
                for line in lines {
                    println!("{line}");
                }
            }
            Ok(())
        }

        PoolCommand::Restart { server } => {
            send(target, PoolRequest::RestartServer { server: server.clone() }).await?;
            println!("restarted: {server}");
            Ok(())
        }

        PoolCommand::Reload => {
            send(target, PoolRequest::Reload).await?;
            println!("configuration reloaded");
            Ok(())
        }
    }
}
