// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration and Modbus error types.
//!
//! # Examples
//!
//! ```
//! use modua_core::error::ModbusError;
//! use std::time::Duration;
//!
//! let error = ModbusError::timeout(Duration::from_millis(1000));
//! assert!(error.is_retryable());
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// ConfigError
// =============================================================================

/// Configuration-related errors.
///
/// A `ConfigError` for a single tag or device excludes that item from the
/// running project; it never brings down already-configured parts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse the project file.
    #[error("Failed to parse project file '{path}': {message}")]
    Parse {
        /// Path to the project file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// File I/O error.
    #[error("Failed to read project file '{path}': {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Validation failed for a field.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Required field is missing.
    #[error("Missing required field: {field}")]
    MissingField {
        /// The missing field name.
        field: String,
    },

    /// Invalid tag address.
    #[error("Invalid address '{address}': {message}")]
    InvalidAddress {
        /// The invalid address string.
        address: String,
        /// Error message.
        message: String,
    },

    /// Duplicate name within a scope that requires uniqueness.
    #[error("Duplicate name: {name}")]
    DuplicateName {
        /// The duplicated name.
        name: String,
    },

    /// A single tag is wider than the device's block size ceiling.
    #[error("Tag '{tag}' spans {units} units, exceeding the block limit of {limit}")]
    BlockOverflow {
        /// The offending tag.
        tag: String,
        /// Units the tag occupies.
        units: u16,
        /// The configured block limit.
        limit: u16,
    },
}

impl ConfigError {
    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }

    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid address error.
    pub fn invalid_address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates a duplicate name error.
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }
}

// =============================================================================
// ModbusError
// =============================================================================

/// Modbus transport and protocol errors.
#[derive(Debug, Error)]
pub enum ModbusError {
    /// Connection could not be established.
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The transport is not connected.
    #[error("Not connected")]
    NotConnected,

    /// The device did not answer within the request timeout.
    #[error("Request timed out after {duration:?}")]
    Timeout {
        /// The timeout duration.
        duration: Duration,
    },

    /// The device answered with a Modbus exception.
    #[error("Modbus exception 0x{code:02X} ({name}) for function 0x{function:02X}")]
    Exception {
        /// The function code of the request.
        function: u8,
        /// The exception code from the device.
        code: u8,
        /// Human-readable exception name.
        name: &'static str,
    },

    /// The response frame was malformed or did not match the request.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },

    /// A write was rejected before reaching the wire.
    #[error("Write rejected: {reason}")]
    WriteRejected {
        /// Rejection reason.
        reason: String,
    },
}

impl ModbusError {
    /// Creates a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a connection failed error with a source.
    pub fn connection_failed_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Creates an exception error from a raw exception code.
    pub fn exception(function: u8, code: u8) -> Self {
        Self::Exception {
            function,
            code,
            name: exception_name(code),
        }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse { message: message.into() }
    }

    /// Creates a write rejected error.
    pub fn write_rejected(reason: impl Into<String>) -> Self {
        Self::WriteRejected { reason: reason.into() }
    }

    /// Returns `true` if this error is retryable.
    ///
    /// Exceptions are deterministic answers from the device and are never
    /// retried; timeouts and connection failures are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModbusError::Timeout { .. }
                | ModbusError::ConnectionFailed { .. }
                | ModbusError::NotConnected
        )
    }

    /// Returns the error type for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            ModbusError::ConnectionFailed { .. } => "connection_failed",
            ModbusError::NotConnected => "not_connected",
            ModbusError::Timeout { .. } => "timeout",
            ModbusError::Exception { .. } => "exception",
            ModbusError::InvalidResponse { .. } => "invalid_response",
            ModbusError::WriteRejected { .. } => "write_rejected",
        }
    }
}

impl Clone for ModbusError {
    fn clone(&self) -> Self {
        match self {
            ModbusError::ConnectionFailed { message, .. } => ModbusError::ConnectionFailed {
                message: message.clone(),
                source: None,
            },
            ModbusError::NotConnected => ModbusError::NotConnected,
            ModbusError::Timeout { duration } => ModbusError::Timeout { duration: *duration },
            ModbusError::Exception { function, code, name } => ModbusError::Exception {
                function: *function,
                code: *code,
                name,
            },
            ModbusError::InvalidResponse { message } => {
                ModbusError::InvalidResponse { message: message.clone() }
            }
            ModbusError::WriteRejected { reason } => {
                ModbusError::WriteRejected { reason: reason.clone() }
            }
        }
    }
}

/// Maps a Modbus exception code to its standard name.
pub fn exception_name(code: u8) -> &'static str {
    match code {
        0x01 => "IllegalFunction",
        0x02 => "IllegalDataAddress",
        0x03 => "IllegalDataValue",
        0x04 => "ServerDeviceFailure",
        0x05 => "Acknowledge",
        0x06 => "ServerDeviceBusy",
        0x08 => "MemoryParityError",
        0x0A => "GatewayPathUnavailable",
        0x0B => "GatewayTargetDeviceFailedToRespond",
        _ => "Unknown",
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// A Result type with ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A Result type with ModbusError.
pub type ModbusResult<T> = Result<T, ModbusError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modbus_error_retryable() {
        assert!(ModbusError::timeout(Duration::from_secs(1)).is_retryable());
        assert!(ModbusError::connection_failed("refused").is_retryable());
        assert!(ModbusError::NotConnected.is_retryable());
        assert!(!ModbusError::exception(0x03, 0x02).is_retryable());
        assert!(!ModbusError::write_rejected("read only").is_retryable());
    }

    #[test]
    fn test_exception_names() {
        assert_eq!(exception_name(0x01), "IllegalFunction");
        assert_eq!(exception_name(0x02), "IllegalDataAddress");
        assert_eq!(exception_name(0x0B), "GatewayTargetDeviceFailedToRespond");
        assert_eq!(exception_name(0xFF), "Unknown");
    }

    #[test]
    fn test_config_error_ctors() {
        let error = ConfigError::validation("unit", "must be 1-247");
        assert!(matches!(error, ConfigError::Validation { .. }));

        let error = ConfigError::invalid_address("999999", "out of range");
        assert!(error.to_string().contains("999999"));
    }
}
