// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Project file schema, loading and validation for ModUA.
//!
//! A project file declares the OPC UA server settings and the Modbus side
//! of the gateway as a channel / device / group / tag hierarchy:
//!
//! ```text
//! ProjectConfig
//! ├── opcua: OpcUaServerConfig
//! └── channels: Vec<ChannelConfig>
//!     └── devices: Vec<DeviceConfig>
//!         └── groups: Vec<GroupConfig>
//!             └── tags: Vec<TagConfig>
//! ```
//!
//! Validation is collecting, not fail-fast: [`ProjectConfig::validate`]
//! returns every problem it finds, and the engine excludes only the
//! offending tags or devices instead of refusing to start.

pub mod loader;
pub mod schema;

pub use loader::{load_project, load_project_str, ProjectFormat};
pub use schema::{
    AccessConfig, ChannelConfig, DeviceConfig, GroupConfig, OpcUaServerConfig, ProjectConfig,
    ResolvedTag, SecurityPolicyConfig, TagAccess, TagConfig, TransportConfig, UserConfig,
};
