// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task: accepts client connections and dispatches requests.
//!
//! One JSON request per connection, read to close; one JSON response back.

use crate::supervisor::Supervisor;
use crate::PoolError;
use dl_wire::{PoolRequest, PoolResponse};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{debug, error, info};

/// Shared context for connection handlers.
pub struct ListenCtx {
    pub supervisor: Arc<Supervisor>,
    pub shutdown: Arc<Notify>,
}

/// Accept loop. Runs until the daemon shuts down.
pub async fn run_listener(listener: UnixListener, ctx: Arc<ListenCtx>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &ctx).await {
                        debug!(error = %e, "connection ended with error");
                    }
                });
            }
            Err(e) => error!(error = %e, "accept failed"),
        }
    }
}

async fn handle_connection(mut stream: UnixStream, ctx: &ListenCtx) -> Result<(), PoolError> {
    let request: PoolRequest = match dl_wire::read_json(&mut stream).await {
        Ok(request) => request,
        Err(e) => {
            let response = PoolResponse::Error { message: format!("invalid request: {e}") };
            let _ = dl_wire::write_json(&mut stream, &response).await;
            return Ok(());
        }
    };

    debug!(request = ?request, "received request");
    let response = dispatch(request, ctx).await;
    if let Err(e) = dl_wire::write_json(&mut stream, &response).await {
        debug!(error = %e, "failed to write response");
    }
    Ok(())
}

async fn dispatch(request: PoolRequest, ctx: &ListenCtx) -> PoolResponse {
    let supervisor = &ctx.supervisor;
    match request {
        PoolRequest::Status => PoolResponse::Status(supervisor.status().await),

        PoolRequest::ListTools => PoolResponse::Tools { tools: supervisor.list_tools() },

        PoolRequest::ListResources => {
            PoolResponse::Resources { resources: supervisor.list_resources() }
        }

        PoolRequest::CallTool { tool, arguments, server } => {
            match supervisor.call_tool(&tool, arguments, server.as_deref()).await {
                Ok(result) => PoolResponse::ToolResult { result },
                Err(e) => error_response(e),
            }
        }

        PoolRequest::StartServer { server } => match supervisor.start_server(&server).await {
            Ok(()) => PoolResponse::Ok,
            Err(e) => error_response(e),
        },

        PoolRequest::StopServer { server } => match supervisor.stop_server(&server).await {
            Ok(()) => PoolResponse::Ok,
            Err(e) => error_response(e),
        },

        PoolRequest::RestartServer { server } => match supervisor.restart_server(&server).await {
            Ok(()) => PoolResponse::Ok,
            Err(e) => error_response(e),
        },

        PoolRequest::Warm { servers } => {
            PoolResponse::Warmed { results: supervisor.warm(&servers).await }
        }

        PoolRequest::Logs { server, lines } => match supervisor.logs(&server, lines) {
            Ok(lines) => PoolResponse::Logs { lines },
            Err(e) => error_response(e),
        },

        PoolRequest::Query { command, file, line, col } => {
            match supervisor.query(command, &file, line, col).await {
                Ok(result) => PoolResponse::QueryResult { result },
                Err(e) => error_response(e),
            }
        }

        PoolRequest::Reload => match supervisor.reload() {
            Ok(()) => PoolResponse::Ok,
            Err(e) => error_response(e),
        },

        PoolRequest::Stop => {
            info!("stop requested over socket");
            ctx.shutdown.notify_one();
            PoolResponse::ShuttingDown
        }
    }
}

fn error_response(e: PoolError) -> PoolResponse {
    PoolResponse::Error { message: e.to_string() }
}
