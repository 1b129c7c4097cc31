// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: start the gateway (default)
//! - `validate`: check a project file without starting anything
//! - `version`: show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// ModUA - Modbus to OPC UA gateway
///
/// Polls Modbus devices (TCP, RTU-over-TCP, serial RTU) and serves their
/// tags through an embedded OPC UA server.
#[derive(Parser, Debug)]
#[command(
    name = "modua",
    author = "Sylvex <contact@sylvex.io>",
    version = modua_core::VERSION,
    about = "Modbus to OPC UA gateway",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Project file path (YAML or JSON)
    #[arg(
        short,
        long,
        default_value = "modua.yaml",
        env = "MODUA_PROJECT",
        global = true
    )]
    pub project: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        default_value = "info",
        env = "MODUA_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json, compact)
    #[arg(long, default_value = "text", env = "MODUA_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Enable quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands for the ModUA CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the gateway
    ///
    /// This is the default command when no subcommand is specified.
    /// Starts the polling engine and the embedded OPC UA server.
    Run(RunArgs),

    /// Validate a project file
    ///
    /// Parses and validates the project file without opening any
    /// connection. Exits non-zero when problems are found.
    Validate(ValidateArgs),

    /// Show detailed version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Start polling devices before the OPC UA server is up
    ///
    /// By default the OPC UA endpoint is opened first so clients can
    /// connect before the first device cycle runs.
    #[arg(long)]
    pub auto_start: bool,

    /// Override the configured OPC UA endpoint (host:port)
    #[arg(long, value_name = "HOST:PORT")]
    pub opcua_endpoint: Option<String>,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    /// Print the parsed project after validation
    #[arg(short, long)]
    pub show_config: bool,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Get the effective log level based on flags.
    pub fn effective_log_level(&self) -> &str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["modua"]);
        assert!(cli.command.is_none());
        matches!(cli.effective_command(), Commands::Run(_));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["modua", "run", "--auto-start"]);
        if let Some(Commands::Run(args)) = cli.command {
            assert!(args.auto_start);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_endpoint_override() {
        let cli = Cli::parse_from(["modua", "run", "--opcua-endpoint", "0.0.0.0:4841"]);
        if let Some(Commands::Run(args)) = cli.command {
            assert_eq!(args.opcua_endpoint.as_deref(), Some("0.0.0.0:4841"));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["modua", "validate", "--show-config"]);
        if let Some(Commands::Validate(args)) = cli.command {
            assert!(args.show_config);
        } else {
            panic!("Expected Validate command");
        }
    }

    #[test]
    fn test_project_path() {
        let cli = Cli::parse_from(["modua", "-p", "/etc/modua/plant.yaml"]);
        assert_eq!(cli.project, PathBuf::from("/etc/modua/plant.yaml"));
    }

    #[test]
    fn test_quiet_mode() {
        let cli = Cli::parse_from(["modua", "-q"]);
        assert!(cli.quiet);
        assert_eq!(cli.effective_log_level(), "warn");
    }

    #[test]
    fn test_verbose_mode() {
        let cli = Cli::parse_from(["modua", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.effective_log_level(), "debug");
    }
}
