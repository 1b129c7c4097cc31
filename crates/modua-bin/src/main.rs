// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! ModUA gateway entry point.

use std::process::ExitCode;

use tracing::error;

use modua_bin::cli::{Cli, Commands};
use modua_bin::{commands, init_logging};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.effective_log_level(), cli.log_format);

    let result = match cli.effective_command() {
        Commands::Run(args) => commands::run::execute(&cli, &args).await,
        Commands::Validate(args) => commands::validate::execute(&cli, &args),
        Commands::Version => {
            commands::version::execute();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
