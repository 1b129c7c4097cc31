// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # modua-bin
//!
//! CLI binary for the ModUA Modbus ⇄ OPC UA gateway.
//!
//! - CLI argument parsing with clap
//! - Logging initialization
//! - Graceful shutdown handling
//! - Command implementations (run, validate, version)
//!
//! ## Usage
//!
//! ```bash
//! # Start the gateway
//! modua run --project plant.yaml
//!
//! # Check a project file without starting anything
//! modua validate --project plant.yaml
//!
//! # Show version
//! modua version
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod shutdown;

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
