// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `validate` command: check a project file and report every
//! problem found.

use modua_config::load_project;

use crate::cli::{Cli, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Loads and validates the project without opening any connection.
pub fn execute(cli: &Cli, args: &ValidateArgs) -> BinResult<()> {
    let project = load_project(&cli.project)?;

    if args.show_config {
        let rendered =
            serde_yaml::to_string(&project).map_err(|e| BinError::Runtime(e.to_string()))?;
        println!("{rendered}");
    }

    let problems = project.validate();
    if problems.is_empty() {
        println!(
            "{}: OK ({} channels, {} tags)",
            cli.project.display(),
            project.channels.len(),
            project.tag_count()
        );
        Ok(())
    } else {
        for problem in &problems {
            eprintln!("error: {problem}");
        }
        Err(BinError::InvalidProject(problems.len()))
    }
}
