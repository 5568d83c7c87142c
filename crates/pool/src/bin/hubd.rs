// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dl-hubd` - the tool-server hub daemon.

use dl_pool::{lifecycle, PoolProfile};

fn main() -> std::process::ExitCode {
    let profile = PoolProfile::hub();
    let paths = lifecycle::DaemonPaths::for_profile(&profile);
    lifecycle::init_logging(&paths);

    // Single-threaded cooperative scheduler: every concern is a task on one
    // runtime thread.
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("dl-hubd: failed to build runtime: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dl_pool::run_daemon(profile)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("dl-hubd: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
