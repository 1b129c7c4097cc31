// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data types for ModUA.
//!
//! This module provides the protocol-agnostic types that flow between the
//! Modbus polling engine and the OPC UA bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Identifiers
// =============================================================================

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[inline]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier and returns the inner string.
            #[inline]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// A unique identifier for a communication channel (one physical or
    /// logical Modbus line).
    ChannelId
}

string_id! {
    /// A unique identifier for a device (one Modbus unit on a channel).
    ///
    /// Device IDs are stable across restarts and unique within a project.
    ///
    /// # Examples
    ///
    /// ```
    /// use modua_core::types::DeviceId;
    ///
    /// let id = DeviceId::new("plc-001");
    /// assert_eq!(id.as_str(), "plc-001");
    /// ```
    DeviceId
}

string_id! {
    /// A unique identifier for a tag.
    ///
    /// Tag IDs are project-wide unique and encode the full path through the
    /// project tree, e.g. `line-a/plc-001/motors/speed`.
    TagId
}

// =============================================================================
// Data Types
// =============================================================================

/// The declared data type of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagDataType {
    /// Single bit (coils and discrete inputs).
    Boolean,

    /// Unsigned 16-bit integer, one register.
    Word,

    /// IEEE 754 single precision, two registers.
    Float,

    /// IEEE 754 double precision, four registers.
    Double,

    /// Character string, two characters per register.
    String,

    /// Packed binary-coded decimal, one register (0-9999).
    Bcd,
}

impl TagDataType {
    /// Number of 16-bit registers one element occupies.
    ///
    /// Boolean tags live in bit spaces; an element there occupies one bit,
    /// which this method reports as one addressing unit.
    #[inline]
    pub fn units_per_element(&self) -> u16 {
        match self {
            TagDataType::Boolean => 1,
            TagDataType::Word | TagDataType::Bcd | TagDataType::String => 1,
            TagDataType::Float => 2,
            TagDataType::Double => 4,
        }
    }

    /// Returns `true` if this type only makes sense in a bit space.
    #[inline]
    pub fn is_bit(&self) -> bool {
        matches!(self, TagDataType::Boolean)
    }

    /// Returns `true` if the raw wire representation is integral.
    ///
    /// Reverse scaling rounds to the nearest integer for these types.
    #[inline]
    pub fn is_integral(&self) -> bool {
        matches!(self, TagDataType::Word | TagDataType::Bcd)
    }

    /// Returns the type name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TagDataType::Boolean => "boolean",
            TagDataType::Word => "word",
            TagDataType::Float => "float",
            TagDataType::Double => "double",
            TagDataType::String => "string",
            TagDataType::Bcd => "bcd",
        }
    }
}

impl fmt::Display for TagDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Tag Values
// =============================================================================

/// A decoded tag value.
///
/// Scaled tags carry the engineering-unit value as `Double` regardless of
/// the raw wire type.
///
/// # Examples
///
/// ```
/// use modua_core::types::TagValue;
///
/// let v = TagValue::Double(25.5);
/// assert_eq!(v.as_f64(), Some(25.5));
/// assert!(!v.is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TagValue {
    /// Boolean value.
    Bool(bool),

    /// Unsigned 16-bit integer (Word and BCD tags).
    Word(u16),

    /// 32-bit floating point.
    Float(f32),

    /// 64-bit floating point (Double tags and scaled values).
    Double(f64),

    /// UTF-8 string.
    Text(String),

    /// Array of values. Elements the device response did not cover are
    /// `Null`.
    Array(Vec<TagValue>),

    /// No value (never read, or last decode failed).
    Null,
}

impl TagValue {
    /// Returns the type name of this value.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        match self {
            TagValue::Bool(_) => "bool",
            TagValue::Word(_) => "word",
            TagValue::Float(_) => "float",
            TagValue::Double(_) => "double",
            TagValue::Text(_) => "text",
            TagValue::Array(_) => "array",
            TagValue::Null => "null",
        }
    }

    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, TagValue::Null)
    }

    /// Attempts to convert this value to a boolean.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TagValue::Bool(v) => Some(*v),
            TagValue::Word(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Attempts to convert this value to an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            TagValue::Word(v) => Some(*v as f64),
            TagValue::Float(v) => Some(*v as f64),
            TagValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempts to get this value as a string reference.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Attempts to get this value as an array reference.
    #[inline]
    pub fn as_array(&self) -> Option<&[TagValue]> {
        match self {
            TagValue::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Converts this value to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            TagValue::Bool(v) => serde_json::Value::Bool(*v),
            TagValue::Word(v) => serde_json::json!(*v),
            TagValue::Float(v) => serde_json::json!(*v),
            TagValue::Double(v) => serde_json::json!(*v),
            TagValue::Text(v) => serde_json::Value::String(v.clone()),
            TagValue::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(|v| v.to_json()).collect())
            }
            TagValue::Null => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(v) => write!(f, "{}", v),
            TagValue::Word(v) => write!(f, "{}", v),
            TagValue::Float(v) => write!(f, "{}", v),
            TagValue::Double(v) => write!(f, "{}", v),
            TagValue::Text(v) => write!(f, "{}", v),
            TagValue::Array(v) => write!(f, "[{} elements]", v.len()),
            TagValue::Null => write!(f, "null"),
        }
    }
}

impl Default for TagValue {
    fn default() -> Self {
        TagValue::Null
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

impl From<u16> for TagValue {
    fn from(v: u16) -> Self {
        TagValue::Word(v)
    }
}

impl From<f32> for TagValue {
    fn from(v: f32) -> Self {
        TagValue::Float(v)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Double(v)
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Text(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Text(v.to_string())
    }
}

// =============================================================================
// Data Quality
// =============================================================================

/// The quality status of a live value.
///
/// Mirrors OPC UA quality concepts without depending on the OPC UA stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "status", content = "reason")]
pub enum DataQuality {
    /// The value is good and current.
    #[default]
    Good,

    /// The value may be stale but is still usable.
    Uncertain(UncertainReason),

    /// The value must not be used.
    Bad(BadReason),
}

impl DataQuality {
    /// Returns `true` if the quality is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        matches!(self, DataQuality::Good)
    }

    /// Returns `true` if the quality is usable (good or uncertain).
    #[inline]
    pub fn is_usable(&self) -> bool {
        matches!(self, DataQuality::Good | DataQuality::Uncertain(_))
    }

    /// Returns `true` if the quality is bad.
    #[inline]
    pub fn is_bad(&self) -> bool {
        matches!(self, DataQuality::Bad(_))
    }
}

impl fmt::Display for DataQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQuality::Good => write!(f, "Good"),
            DataQuality::Uncertain(reason) => write!(f, "Uncertain: {:?}", reason),
            DataQuality::Bad(reason) => write!(f, "Bad: {:?}", reason),
        }
    }
}

/// Reasons for uncertain quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum UncertainReason {
    /// Holding the last value read before communication degraded.
    LastKnownValue,

    /// No read has completed since startup.
    #[default]
    InitialValue,
}

/// Reasons for bad quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BadReason {
    /// The tag or device configuration is invalid.
    ConfigurationError,

    /// The device is not connected.
    NotConnected,

    /// A read or write for this tag failed.
    #[default]
    CommunicationFailure,

    /// The device answered but the payload could not be decoded.
    DecodeFailure,

    /// The device scheduler has been stopped.
    OutOfService,
}

// =============================================================================
// Live Values
// =============================================================================

/// The current value of a tag as held in the data buffer.
///
/// A `LiveValue` is replaced wholesale on every update; readers never
/// observe a partially written entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveValue {
    /// The decoded value. `Null` until the first successful read.
    pub value: TagValue,

    /// The quality of the value.
    pub quality: DataQuality,

    /// When the value was produced (read completion time).
    pub timestamp: DateTime<Utc>,

    /// Monotonic update counter, bumped on every store.
    pub update_count: u64,
}

impl LiveValue {
    /// Creates the initial entry for a tag (null value, uncertain quality).
    pub fn initial() -> Self {
        Self {
            value: TagValue::Null,
            quality: DataQuality::Uncertain(UncertainReason::InitialValue),
            timestamp: Utc::now(),
            update_count: 0,
        }
    }

    /// Creates a good-quality value with the current timestamp.
    pub fn good(value: TagValue) -> Self {
        Self {
            value,
            quality: DataQuality::Good,
            timestamp: Utc::now(),
            update_count: 0,
        }
    }
}

// =============================================================================
// Write Requests
// =============================================================================

/// Where a write request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOrigin {
    /// An OPC UA client wrote to a node.
    OpcUa,

    /// The gateway itself issued the write.
    Internal,
}

/// A pending write to a device, queued until the device scheduler drains it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// The tag being written.
    pub tag: TagId,

    /// The device that owns the tag.
    pub device: DeviceId,

    /// The engineering-unit value to write.
    pub value: TagValue,

    /// Who requested the write.
    pub origin: WriteOrigin,

    /// When the request was submitted.
    pub submitted_at: DateTime<Utc>,
}

impl WriteRequest {
    /// Creates a new write request with the current timestamp.
    pub fn new(tag: TagId, device: DeviceId, value: TagValue, origin: WriteOrigin) -> Self {
        Self {
            tag,
            device,
            value,
            origin,
            submitted_at: Utc::now(),
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
    fn test_identifiers() {
        let dev = DeviceId::new("plc-001");
        assert_eq!(dev.as_str(), "plc-001");
        assert_eq!(format!("{}", dev), "plc-001");

        let tag = TagId::from("line-a/plc-001/speed");
        assert_eq!(tag.as_str(), "line-a/plc-001/speed");
    }

    #[test]
    fn test_tag_value_conversions() {
        assert_eq!(TagValue::Word(42).as_f64(), Some(42.0));
        assert_eq!(TagValue::Double(3.25).as_f64(), Some(3.25));
        assert_eq!(TagValue::Bool(true).as_bool(), Some(true));
        assert_eq!(TagValue::Word(1).as_bool(), Some(true));
        assert_eq!(TagValue::Text("hi".into()).as_str(), Some("hi"));
        assert_eq!(TagValue::Null.as_f64(), None);
        assert!(TagValue::Null.is_null());
    }

    #[test]
    fn test_tag_value_json() {
        let v = TagValue::Array(vec![TagValue::Bool(true), TagValue::Null]);
        let json = v.to_json();
        assert!(json.is_array());
        assert_eq!(json[0], serde_json::Value::Bool(true));
        assert!(json[1].is_null());
    }

    #[test]
    fn test_data_quality() {
        assert!(DataQuality::Good.is_usable());

        let stale = DataQuality::Uncertain(UncertainReason::LastKnownValue);
        assert!(stale.is_usable());
        assert!(!stale.is_good());

        let bad = DataQuality::Bad(BadReason::NotConnected);
        assert!(bad.is_bad());
        assert!(!bad.is_usable());
    }

    #[test]
    fn test_units_per_element() {
        assert_eq!(TagDataType::Word.units_per_element(), 1);
        assert_eq!(TagDataType::Float.units_per_element(), 2);
        assert_eq!(TagDataType::Double.units_per_element(), 4);
        assert_eq!(TagDataType::Bcd.units_per_element(), 1);
        assert!(TagDataType::Boolean.is_bit());
        assert!(TagDataType::Word.is_integral());
        assert!(!TagDataType::Float.is_integral());
    }

    #[test]
    fn test_live_value_initial() {
        let lv = LiveValue::initial();
        assert!(lv.value.is_null());
        assert_eq!(
            lv.quality,
            DataQuality::Uncertain(UncertainReason::InitialValue)
        );
        assert_eq!(lv.update_count, 0);
    }
}
