// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the ModUA binary.

use thiserror::Error;

/// Result type alias for modua-bin operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors that can occur in the ModUA binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// Project loading or field validation error.
    #[error("Configuration error: {0}")]
    Config(#[from] modua_core::error::ConfigError),

    /// The project contains validation problems.
    #[error("Project has {0} configuration problem(s)")]
    InvalidProject(usize),

    /// OPC UA server error.
    #[error("OPC UA error: {0}")]
    Bridge(#[from] modua_opcua::BridgeError),

    /// Runtime error.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
