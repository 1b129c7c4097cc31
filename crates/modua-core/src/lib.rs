// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core types for ModUA.
//!
//! ModUA bridges Modbus field devices to an OPC UA server. This crate holds
//! the protocol-agnostic building blocks shared by every other crate:
//!
//! - [`types`] - identifiers, tag values, data quality, live values
//! - [`error`] - configuration and Modbus error types
//! - [`address`] - 6-digit IEC 61131 address parsing
//! - [`scaling`] - linear and square-root engineering-unit scaling
//! - [`diag`] - the ADU-level diagnostics event stream
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   read blocks    ┌──────────────┐   snapshots   ┌─────────────┐
//! │ Modbus device │ ───────────────► │ poll engine  │ ────────────► │ OPC UA node │
//! │  (TCP/RTU)    │ ◄─────────────── │ (scheduler)  │ ◄──────────── │   space     │
//! └──────────────┘   write queue    └──────────────┘  write queue  └─────────────┘
//! ```

pub mod address;
pub mod diag;
pub mod error;
pub mod scaling;
pub mod types;

pub use error::{ConfigError, ModbusError};
pub use types::{ChannelId, DataQuality, DeviceId, LiveValue, TagId, TagValue};

/// Workspace version, shared by every crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
