// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bridge error types.

use thiserror::Error;

/// Errors raised while building or running the OPC UA server.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The server configuration was rejected by the OPC UA stack.
    #[error("Invalid OPC UA server configuration: {0}")]
    InvalidConfig(String),

    /// The namespace could not be registered.
    #[error("Failed to register namespace '{0}'")]
    Namespace(String),

    /// A folder or variable node could not be inserted.
    #[error("Failed to build address space node '{0}'")]
    NodeInsert(String),
}

impl BridgeError {
    /// Creates an invalid-config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Creates a node insertion error.
    pub fn node_insert(node: impl Into<String>) -> Self {
        Self::NodeInsert(node.into())
    }
}
