// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA server bridge.
//!
//! Exposes the engine's live data as an OPC UA address space: one folder
//! per channel, device and group, one variable node per tag. A periodic
//! publish task pushes buffer changes into the nodes; writes from OPC UA
//! clients are intercepted and queued toward the device instead of
//! touching the node directly, so a node only ever shows values the
//! device confirmed.

pub mod bridge;
pub mod error;
pub mod variant;

pub use bridge::OpcUaBridge;
pub use error::BridgeError;
