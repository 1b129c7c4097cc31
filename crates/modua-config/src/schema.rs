// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Project file schema for ModUA.
//!
//! The schema mirrors the configuration hierarchy the engine runs:
//! channels own a transport, devices own timing / access / encoding
//! settings, groups own tags. Every tag resolves to one OPC UA variable
//! node and one slice of a planned Modbus read block.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use modua_core::address::{parse_address, TagAddress};
use modua_core::error::ConfigError;
use modua_core::scaling::Scaling;
use modua_core::types::{TagDataType, TagId};
use modua_modbus::blocks::BlockLimits;
use modua_modbus::client::TimingPolicy;
use modua_modbus::codec::EncodingConfig;
use modua_modbus::serial::SerialParams;

// =============================================================================
// Constants
// =============================================================================

/// Default OPC UA endpoint port.
pub const DEFAULT_OPCUA_PORT: u16 = 4840;

/// Default Modbus TCP port.
pub const DEFAULT_MODBUS_PORT: u16 = 502;

/// Default tag scan rate in milliseconds.
pub const DEFAULT_SCAN_MS: u64 = 1000;

/// Default OPC UA publish interval in milliseconds.
pub const DEFAULT_PUBLISH_INTERVAL_MS: u64 = 250;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project name, used as the OPC UA application folder name.
    #[serde(default = "default_project_name")]
    pub name: String,

    /// Embedded OPC UA server settings.
    #[serde(default)]
    pub opcua: OpcUaServerConfig,

    /// Modbus channels.
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

fn default_project_name() -> String {
    "ModUA".to_string()
}

impl ProjectConfig {
    /// Validates the whole project, collecting every problem found.
    ///
    /// An empty result means the project is clean. The engine treats tag
    /// and device level errors as exclusions, not fatal failures, so the
    /// caller decides how strict to be.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push(ConfigError::validation("name", "cannot be empty"));
        }

        self.opcua.validate(&mut errors);

        let mut channel_names = std::collections::HashSet::new();
        for channel in &self.channels {
            if !channel_names.insert(&channel.name) {
                errors.push(ConfigError::duplicate_name(&channel.name));
            }
            channel.validate(&mut errors);
        }

        errors
    }

    /// Total number of tags across all channels.
    pub fn tag_count(&self) -> usize {
        self.channels
            .iter()
            .flat_map(|c| &c.devices)
            .flat_map(|d| &d.groups)
            .map(|g| g.tags.len())
            .sum()
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            opcua: OpcUaServerConfig::default(),
            channels: Vec::new(),
        }
    }
}

// =============================================================================
// OPC UA Server Configuration
// =============================================================================

/// Settings for the embedded OPC UA server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpcUaServerConfig {
    /// Bind address.
    #[serde(default = "default_opcua_host")]
    pub host: String,

    /// Endpoint port.
    #[serde(default = "default_opcua_port")]
    pub port: u16,

    /// Namespace URI registered for the gateway's nodes.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// OPC UA application name.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// OPC UA application URI.
    #[serde(default = "default_application_uri")]
    pub application_uri: String,

    /// Interval at which buffer changes are pushed into the address space.
    #[serde(default = "default_publish_interval")]
    pub publish_interval_ms: u64,

    /// Directory for the server certificate store.
    #[serde(default = "default_pki_dir")]
    pub pki_dir: String,

    /// Security policies offered as endpoints.
    #[serde(default = "default_security_policies")]
    pub security_policies: Vec<SecurityPolicyConfig>,

    /// Whether anonymous sessions are accepted.
    #[serde(default = "default_true")]
    pub allow_anonymous: bool,

    /// Username/password identities accepted by the server.
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

fn default_opcua_host() -> String {
    "0.0.0.0".to_string()
}

fn default_opcua_port() -> u16 {
    DEFAULT_OPCUA_PORT
}

fn default_namespace() -> String {
    "urn:modua:tags".to_string()
}

fn default_application_name() -> String {
    "ModUA Gateway".to_string()
}

fn default_application_uri() -> String {
    "urn:modua:gateway".to_string()
}

fn default_publish_interval() -> u64 {
    DEFAULT_PUBLISH_INTERVAL_MS
}

fn default_pki_dir() -> String {
    "./pki".to_string()
}

fn default_security_policies() -> Vec<SecurityPolicyConfig> {
    vec![SecurityPolicyConfig::None]
}

fn default_true() -> bool {
    true
}

impl OpcUaServerConfig {
    fn validate(&self, errors: &mut Vec<ConfigError>) {
        if self.port == 0 {
            errors.push(ConfigError::validation("opcua.port", "cannot be zero"));
        }
        if self.publish_interval_ms == 0 {
            errors.push(ConfigError::validation(
                "opcua.publish_interval_ms",
                "cannot be zero",
            ));
        }
        if self.security_policies.is_empty() {
            errors.push(ConfigError::validation(
                "opcua.security_policies",
                "at least one policy is required",
            ));
        }
        if !self.allow_anonymous && self.users.is_empty() {
            errors.push(ConfigError::validation(
                "opcua.users",
                "at least one user is required when anonymous access is disabled",
            ));
        }
        let mut usernames = std::collections::HashSet::new();
        for user in &self.users {
            if user.username.is_empty() {
                errors.push(ConfigError::validation(
                    "opcua.users.username",
                    "cannot be empty",
                ));
            }
            if !usernames.insert(&user.username) {
                errors.push(ConfigError::duplicate_name(&user.username));
            }
        }
    }

    /// Endpoint URL clients connect to.
    pub fn endpoint_url(&self) -> String {
        format!("opc.tcp://{}:{}", self.host, self.port)
    }

    /// Publish interval as a duration.
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    /// Returns `true` if any endpoint requires signing or encryption.
    pub fn has_secure_endpoint(&self) -> bool {
        self.security_policies
            .iter()
            .any(|p| *p != SecurityPolicyConfig::None)
    }
}

impl Default for OpcUaServerConfig {
    fn default() -> Self {
        Self {
            host: default_opcua_host(),
            port: DEFAULT_OPCUA_PORT,
            namespace: default_namespace(),
            application_name: default_application_name(),
            application_uri: default_application_uri(),
            publish_interval_ms: DEFAULT_PUBLISH_INTERVAL_MS,
            pki_dir: default_pki_dir(),
            security_policies: default_security_policies(),
            allow_anonymous: true,
            users: Vec::new(),
        }
    }
}

/// OPC UA security policies the server can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecurityPolicyConfig {
    /// Unsecured endpoint.
    #[default]
    None,
    /// Basic128Rsa15 (deprecated, kept for legacy clients).
    Basic128Rsa15,
    /// Basic256 (deprecated, kept for legacy clients).
    Basic256,
    /// Basic256Sha256.
    Basic256Sha256,
}

/// A username/password identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    /// Login name.
    pub username: String,

    /// Password, in plain text in the project file.
    pub password: String,
}

// =============================================================================
// Channel Configuration
// =============================================================================

/// One communication line and the devices behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// Channel name, unique within the project.
    pub name: String,

    /// The physical or logical transport.
    pub transport: TransportConfig,

    /// Devices reachable through this channel.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl ChannelConfig {
    fn validate(&self, errors: &mut Vec<ConfigError>) {
        if self.name.is_empty() {
            errors.push(ConfigError::validation("channel.name", "cannot be empty"));
        }
        self.transport.validate(&self.name, errors);

        let mut device_names = std::collections::HashSet::new();
        for device in &self.devices {
            if !device_names.insert(&device.name) {
                errors.push(ConfigError::duplicate_name(&device.name));
            }
            device.validate(&self.name, errors);
        }
    }
}

/// Transport variants for a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Modbus TCP (MBAP framing).
    Tcp {
        /// Host name or IP address.
        host: String,
        /// TCP port.
        #[serde(default = "default_modbus_port")]
        port: u16,
    },

    /// Modbus RTU frames tunneled over a TCP socket.
    RtuOverTcp {
        /// Host name or IP address.
        host: String,
        /// TCP port.
        #[serde(default = "default_modbus_port")]
        port: u16,
    },

    /// Modbus RTU over a local serial port.
    Serial(SerialParams),
}

fn default_modbus_port() -> u16 {
    DEFAULT_MODBUS_PORT
}

impl TransportConfig {
    fn validate(&self, channel: &str, errors: &mut Vec<ConfigError>) {
        match self {
            TransportConfig::Tcp { host, .. } | TransportConfig::RtuOverTcp { host, .. } => {
                if host.is_empty() {
                    errors.push(ConfigError::validation(
                        format!("channels.{channel}.transport.host"),
                        "cannot be empty",
                    ));
                }
            }
            TransportConfig::Serial(params) => {
                if params.port.is_empty() {
                    errors.push(ConfigError::validation(
                        format!("channels.{channel}.transport.port"),
                        "cannot be empty",
                    ));
                }
                if !(5..=8).contains(&params.data_bits) {
                    errors.push(ConfigError::validation(
                        format!("channels.{channel}.transport.data_bits"),
                        "must be between 5 and 8",
                    ));
                }
            }
        }
    }

    /// Human-readable endpoint description.
    pub fn display_name(&self) -> String {
        match self {
            TransportConfig::Tcp { host, port } => format!("tcp://{host}:{port}"),
            TransportConfig::RtuOverTcp { host, port } => format!("rtu+tcp://{host}:{port}"),
            TransportConfig::Serial(params) => format!("serial://{}", params.port),
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// One Modbus server (slave) behind a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Device name, unique within the channel.
    pub name: String,

    /// Unit identifier (1-247).
    #[serde(default = "default_unit")]
    pub unit: u8,

    /// Disabled devices are skipped entirely; their tags get no nodes.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Timing policy.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Addressing and function-code options.
    #[serde(default)]
    pub access: AccessConfig,

    /// Multi-register value encoding.
    #[serde(default)]
    pub encoding: EncodingConfig,

    /// Per-space read block size limits.
    #[serde(default)]
    pub blocks: BlockLimits,

    /// Tag groups.
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

fn default_unit() -> u8 {
    1
}

impl DeviceConfig {
    fn validate(&self, channel: &str, errors: &mut Vec<ConfigError>) {
        if self.name.is_empty() {
            errors.push(ConfigError::validation(
                format!("channels.{channel}.devices.name"),
                "cannot be empty",
            ));
        }
        if self.unit == 0 || self.unit > 247 {
            errors.push(ConfigError::validation(
                format!("channels.{channel}.devices.{}.unit", self.name),
                "must be between 1 and 247",
            ));
        }
        self.timing.validate(channel, &self.name, errors);

        let mut group_names = std::collections::HashSet::new();
        for group in &self.groups {
            if !group_names.insert(&group.name) {
                errors.push(ConfigError::duplicate_name(&group.name));
            }
            group.validate(channel, self, errors);
        }
    }

    /// Resolves all tags of this device, with one error per bad tag.
    ///
    /// Tag identifiers are full paths (`channel/device/group/tag`), which
    /// keeps them unique across the whole project.
    pub fn resolve_tags(&self, channel: &str) -> (Vec<ResolvedTag>, Vec<ConfigError>) {
        let mut tags = Vec::new();
        let mut errors = Vec::new();
        for group in &self.groups {
            for tag in &group.tags {
                let path = tag_path(channel, &self.name, &group.name, &tag.name);
                match tag.resolve(&path, &self.access) {
                    Ok(resolved) => tags.push(resolved),
                    Err(e) => errors.push(e),
                }
            }
        }
        (tags, errors)
    }
}

/// Per-device timing settings, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Connection timeout.
    pub connect_timeout_ms: u64,

    /// Connection attempts before the device faults.
    pub connect_attempts: u32,

    /// Per-request timeout.
    pub request_timeout_ms: u64,

    /// Attempts per request (1 = no retry).
    pub request_attempts: u32,

    /// Minimum gap between consecutive requests on the line.
    pub inter_request_delay_ms: u64,

    /// Pending writes drained per polling cycle.
    pub max_writes_per_cycle: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let policy = TimingPolicy::default();
        Self {
            connect_timeout_ms: policy.connect_timeout.as_millis() as u64,
            connect_attempts: policy.connect_attempts,
            request_timeout_ms: policy.request_timeout.as_millis() as u64,
            request_attempts: policy.request_attempts,
            inter_request_delay_ms: policy.inter_request_delay.as_millis() as u64,
            max_writes_per_cycle: policy.max_writes_per_cycle,
        }
    }
}

impl TimingConfig {
    fn validate(&self, channel: &str, device: &str, errors: &mut Vec<ConfigError>) {
        let field = |name: &str| format!("channels.{channel}.devices.{device}.timing.{name}");
        if self.connect_timeout_ms == 0 {
            errors.push(ConfigError::validation(field("connect_timeout_ms"), "cannot be zero"));
        }
        if self.request_timeout_ms == 0 {
            errors.push(ConfigError::validation(field("request_timeout_ms"), "cannot be zero"));
        }
        if self.connect_attempts == 0 {
            errors.push(ConfigError::validation(field("connect_attempts"), "cannot be zero"));
        }
        if self.request_attempts == 0 {
            errors.push(ConfigError::validation(field("request_attempts"), "cannot be zero"));
        }
        if self.max_writes_per_cycle == 0 {
            errors.push(ConfigError::validation(
                field("max_writes_per_cycle"),
                "cannot be zero",
            ));
        }
    }

    /// Converts to the runtime timing policy.
    pub fn to_policy(self) -> TimingPolicy {
        TimingPolicy {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            connect_attempts: self.connect_attempts,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            request_attempts: self.request_attempts,
            inter_request_delay: Duration::from_millis(self.inter_request_delay_ms),
            max_writes_per_cycle: self.max_writes_per_cycle,
        }
    }
}

/// Addressing and write function-code options for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessConfig {
    /// Interpret register addresses as 0-based instead of 1-based.
    pub zero_based: bool,

    /// Interpret coil / discrete input addresses as 0-based.
    pub zero_based_bit: bool,

    /// Allow writing coils at all.
    pub bit_writes: bool,

    /// Use FC 5 for single-coil writes; otherwise FC 15 with one bit.
    pub func_05: bool,

    /// Use FC 6 for single-register writes; otherwise FC 16 with one word.
    pub func_06: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            zero_based: false,
            zero_based_bit: false,
            bit_writes: true,
            func_05: true,
            func_06: true,
        }
    }
}

// =============================================================================
// Group and Tag Configuration
// =============================================================================

/// A named group of tags; groups become folders in the OPC UA space.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupConfig {
    /// Group name, unique within the device.
    pub name: String,

    /// Tags in this group.
    #[serde(default)]
    pub tags: Vec<TagConfig>,
}

impl GroupConfig {
    fn validate(&self, channel: &str, device: &DeviceConfig, errors: &mut Vec<ConfigError>) {
        if self.name.is_empty() {
            errors.push(ConfigError::validation(
                format!("channels.{channel}.devices.{}.groups.name", device.name),
                "cannot be empty",
            ));
        }
        let mut tag_names = std::collections::HashSet::new();
        for tag in &self.tags {
            if !tag_names.insert(&tag.name) {
                errors.push(ConfigError::duplicate_name(&tag.name));
            }
            let path = tag_path(channel, &device.name, &self.name, &tag.name);
            if let Err(e) = tag.resolve(&path, &device.access) {
                errors.push(e);
            }
        }
    }
}

/// Read/write access declared for a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagAccess {
    /// Polled only; OPC UA writes are rejected.
    #[default]
    ReadOnly,

    /// Polled, and OPC UA writes are queued to the device.
    ReadWrite,
}

/// One data point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagConfig {
    /// Tag name, unique within the group.
    pub name: String,

    /// Address string, 6-digit IEC or prefixed (`HR:`, `IR:`, `C:`, `DI:`),
    /// with an optional ` [N]` array suffix.
    pub address: String,

    /// Declared data type.
    pub data_type: TagDataType,

    /// Access mode.
    #[serde(default)]
    pub access: TagAccess,

    /// Scan rate in milliseconds.
    #[serde(default = "default_scan_ms")]
    pub scan_ms: u64,

    /// Optional engineering-unit scaling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling: Option<Scaling>,

    /// Free-form description, surfaced on the OPC UA node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_scan_ms() -> u64 {
    DEFAULT_SCAN_MS
}

impl TagConfig {
    /// Resolves the tag against the device's addressing options.
    pub fn resolve(&self, path: &str, access: &AccessConfig) -> Result<ResolvedTag, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::missing_field(format!("{path}.name")));
        }
        if self.scan_ms == 0 {
            return Err(ConfigError::validation(
                format!("{path}.scan_ms"),
                "cannot be zero",
            ));
        }

        let address = parse_address(&self.address, !access.zero_based, !access.zero_based_bit)?;

        if address.space.is_bit() != (self.data_type == TagDataType::Boolean) {
            return Err(ConfigError::validation(
                format!("{path}.data_type"),
                "bit spaces require boolean tags and register spaces require register tags",
            ));
        }

        if self.access == TagAccess::ReadWrite {
            if !address.space.is_writable() {
                return Err(ConfigError::validation(
                    format!("{path}.access"),
                    format!("{} space is read-only", address.space.as_str()),
                ));
            }
            if address.space.is_bit() && !access.bit_writes {
                return Err(ConfigError::validation(
                    format!("{path}.access"),
                    "coil writes are disabled for this device",
                ));
            }
        }

        if let Some(scaling) = &self.scaling {
            if matches!(self.data_type, TagDataType::Boolean | TagDataType::String) {
                return Err(ConfigError::validation(
                    format!("{path}.scaling"),
                    "scaling applies to numeric tags only",
                ));
            }
            if scaling.is_degenerate() {
                return Err(ConfigError::validation(
                    format!("{path}.scaling"),
                    "raw and scaled ranges must have non-zero width",
                ));
            }
        }

        Ok(ResolvedTag {
            id: TagId::new(path),
            name: self.name.clone(),
            address,
            data_type: self.data_type,
            access: self.access,
            scan_ms: self.scan_ms,
            scaling: self.scaling.clone(),
            description: self.description.clone(),
        })
    }
}

/// A tag after address parsing and compatibility checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTag {
    /// Full-path identifier, unique across the project.
    pub id: TagId,

    /// Short name within the group.
    pub name: String,

    /// Parsed protocol address.
    pub address: TagAddress,

    /// Declared data type.
    pub data_type: TagDataType,

    /// Access mode.
    pub access: TagAccess,

    /// Scan rate in milliseconds.
    pub scan_ms: u64,

    /// Optional scaling.
    pub scaling: Option<Scaling>,

    /// Optional description.
    pub description: Option<String>,
}

impl ResolvedTag {
    /// Returns `true` if OPC UA clients may write this tag.
    pub fn is_writable(&self) -> bool {
        self.access == TagAccess::ReadWrite
    }
}

/// Builds the full tag path used as the project-wide tag identifier.
pub fn tag_path(channel: &str, device: &str, group: &str, tag: &str) -> String {
    format!("{channel}/{device}/{group}/{tag}")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use modua_core::address::RegisterSpace;

    fn sample_device() -> DeviceConfig {
        DeviceConfig {
            name: "plc1".to_string(),
            unit: 1,
            enabled: true,
            timing: TimingConfig::default(),
            access: AccessConfig::default(),
            encoding: EncodingConfig::default(),
            blocks: BlockLimits::default(),
            groups: vec![GroupConfig {
                name: "line".to_string(),
                tags: vec![
                    TagConfig {
                        name: "speed".to_string(),
                        address: "400001".to_string(),
                        data_type: TagDataType::Word,
                        access: TagAccess::ReadWrite,
                        scan_ms: 500,
                        scaling: None,
                        description: None,
                    },
                    TagConfig {
                        name: "running".to_string(),
                        address: "100001".to_string(),
                        data_type: TagDataType::Boolean,
                        access: TagAccess::ReadOnly,
                        scan_ms: 1000,
                        scaling: None,
                        description: None,
                    },
                ],
            }],
        }
    }

    fn sample_project() -> ProjectConfig {
        ProjectConfig {
            name: "Plant".to_string(),
            opcua: OpcUaServerConfig::default(),
            channels: vec![ChannelConfig {
                name: "ch1".to_string(),
                transport: TransportConfig::Tcp {
                    host: "10.0.0.5".to_string(),
                    port: 502,
                },
                devices: vec![sample_device()],
            }],
        }
    }

    #[test]
    fn test_valid_project() {
        let project = sample_project();
        let errors = project.validate();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        assert_eq!(project.tag_count(), 2);
    }

    #[test]
    fn test_resolve_tags() {
        let device = sample_device();
        let (tags, errors) = device.resolve_tags("ch1");
        assert!(errors.is_empty());
        assert_eq!(tags.len(), 2);

        assert_eq!(tags[0].id.as_ref(), "ch1/plc1/line/speed");
        assert_eq!(tags[0].address.space, RegisterSpace::HoldingRegister);
        assert_eq!(tags[0].address.offset, 0);
        assert!(tags[0].is_writable());

        assert_eq!(tags[1].address.space, RegisterSpace::DiscreteInput);
        assert!(!tags[1].is_writable());
    }

    #[test]
    fn test_unit_out_of_range() {
        let mut project = sample_project();
        project.channels[0].devices[0].unit = 0;
        let errors = project.validate();
        assert!(errors.iter().any(|e| e.to_string().contains("1 and 247")));
    }

    #[test]
    fn test_duplicate_tag_name() {
        let mut project = sample_project();
        let dup = project.channels[0].devices[0].groups[0].tags[0].clone();
        project.channels[0].devices[0].groups[0].tags.push(dup);
        let errors = project.validate();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::DuplicateName { .. })));
    }

    #[test]
    fn test_boolean_in_register_space_rejected() {
        let mut project = sample_project();
        project.channels[0].devices[0].groups[0].tags[0].data_type = TagDataType::Boolean;
        let errors = project.validate();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_write_to_input_register_rejected() {
        let mut project = sample_project();
        let tag = &mut project.channels[0].devices[0].groups[0].tags[0];
        tag.address = "300001".to_string();
        let errors = project.validate();
        assert!(errors.iter().any(|e| e.to_string().contains("read-only")));
    }

    #[test]
    fn test_coil_write_requires_bit_writes() {
        let mut project = sample_project();
        project.channels[0].devices[0].access.bit_writes = false;
        let tag = &mut project.channels[0].devices[0].groups[0].tags[1];
        tag.address = "000001".to_string();
        tag.access = TagAccess::ReadWrite;
        let errors = project.validate();
        assert!(errors.iter().any(|e| e.to_string().contains("disabled")));
    }

    #[test]
    fn test_degenerate_scaling_rejected() {
        let mut project = sample_project();
        project.channels[0].devices[0].groups[0].tags[0].scaling =
            Some(Scaling::linear(0.0, 0.0, 0.0, 100.0));
        let errors = project.validate();
        assert!(errors.iter().any(|e| e.to_string().contains("non-zero width")));
    }

    #[test]
    fn test_anonymous_disabled_needs_users() {
        let mut project = sample_project();
        project.opcua.allow_anonymous = false;
        let errors = project.validate();
        assert!(!errors.is_empty());

        project.opcua.users.push(UserConfig {
            username: "operator".to_string(),
            password: "secret".to_string(),
        });
        assert!(project.validate().is_empty());
    }

    #[test]
    fn test_zero_based_addressing() {
        let mut device = sample_device();
        device.access.zero_based = true;
        device.groups[0].tags[0].address = "400000".to_string();
        let (tags, errors) = device.resolve_tags("ch1");
        assert!(errors.is_empty());
        assert_eq!(tags[0].address.offset, 0);
    }

    #[test]
    fn test_timing_to_policy() {
        let timing = TimingConfig {
            request_timeout_ms: 750,
            request_attempts: 2,
            ..TimingConfig::default()
        };
        let policy = timing.to_policy();
        assert_eq!(policy.request_timeout, Duration::from_millis(750));
        assert_eq!(policy.request_attempts, 2);
        assert_eq!(policy.max_writes_per_cycle, 5);
    }

    #[test]
    fn test_endpoint_url() {
        let opcua = OpcUaServerConfig::default();
        assert_eq!(opcua.endpoint_url(), "opc.tcp://0.0.0.0:4840");
        assert!(!opcua.has_secure_endpoint());
    }
}
