// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus protocol layer for ModUA.
//!
//! This crate turns tag definitions into batched wire operations:
//!
//! - [`blocks`] - groups tags into contiguous read blocks
//! - [`codec`] - register/bit encoding and decoding per device policy
//! - [`transport`] - the transport abstraction (TCP, RTU-over-TCP, serial)
//! - [`client`] - timeout, retry and diagnostics around a transport
//!
//! ```text
//! tags ──► blocks::plan_blocks ──► client::read_block ──► codec::decode ──► TagValue
//! ```

pub mod blocks;
pub mod client;
pub mod codec;
pub mod serial;
pub mod tcp;
pub mod transport;

pub use client::{ClientStats, DeviceWrite, ModbusClient, TimingPolicy};
pub use codec::{BitOrder, ByteOrder, EncodingConfig, WordOrder};
pub use transport::{BlockData, ModbusTransport};
