// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dl-undod` - the undo daemon.
//!
//! Usage: `dl-undod [paths...]` to watch the given paths (default: the
//! configured watch paths, or the current directory).

use dl_undo::{run_daemon, UndoConfig};

fn main() -> std::process::ExitCode {
    init_logging();

    let mut config = match UndoConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("dl-undod: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    // Positional paths override the configured watch list.
    let args: Vec<std::path::PathBuf> = std::env::args_os()
        .skip(1)
        .map(std::path::PathBuf::from)
        .collect();
    if !args.is_empty() {
        config.watch_paths = args
            .into_iter()
            .map(|p| p.canonicalize().unwrap_or(p))
            .collect();
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("dl-undod: failed to build runtime: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_daemon(config)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("dl-undod: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let log_dir = UndoConfig::data_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let appender = tracing_appender::rolling::never(log_dir, "daemon.log");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(appender)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
