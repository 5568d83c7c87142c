// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dl-lspd` - the language-server pool daemon.

use dl_pool::{lifecycle, PoolProfile};

fn main() -> std::process::ExitCode {
    let profile = PoolProfile::lsp_pool();
    let paths = lifecycle::DaemonPaths::for_profile(&profile);
    lifecycle::init_logging(&paths);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("dl-lspd: failed to build runtime: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dl_pool::run_daemon(profile)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("dl-lspd: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
