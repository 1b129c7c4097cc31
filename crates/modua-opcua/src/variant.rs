// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Tag value ⇄ OPC UA `Variant` conversion.
//!
//! Outbound, buffer entries become variants plus a status code derived
//! from the tag quality. Inbound, client-written variants are coerced to
//! the tag's declared type; scaled tags accept any numeric variant as an
//! engineering-unit double, reverse scaling happens in the engine when
//! the write is encoded for the wire.

use opcua::types::{Array, DataTypeId, StatusCode, UAString, Variant, VariantTypeId};

use modua_config::schema::ResolvedTag;
use modua_core::types::{BadReason, DataQuality, TagDataType, TagValue, UncertainReason};

// =============================================================================
// Outbound (buffer → node)
// =============================================================================

/// The OPC UA data type a tag's variable node is declared with.
///
/// Scaled numeric tags always surface as `Double` because the publish
/// path emits engineering units.
pub fn node_data_type(tag: &ResolvedTag) -> DataTypeId {
    if tag.scaling.is_some() {
        return DataTypeId::Double;
    }
    match tag.data_type {
        TagDataType::Boolean => DataTypeId::Boolean,
        TagDataType::Word | TagDataType::Bcd => DataTypeId::UInt16,
        TagDataType::Float => DataTypeId::Float,
        TagDataType::Double => DataTypeId::Double,
        TagDataType::String => DataTypeId::String,
    }
}

/// Converts a buffer value into a variant.
pub fn value_to_variant(value: &TagValue) -> Variant {
    match value {
        TagValue::Null => Variant::Empty,
        TagValue::Bool(v) => Variant::Boolean(*v),
        TagValue::Word(v) => Variant::UInt16(*v),
        TagValue::Float(v) => Variant::Float(*v),
        TagValue::Double(v) => Variant::Double(*v),
        TagValue::Text(v) => Variant::String(UAString::from(v.as_str())),
        TagValue::Array(items) => {
            let converted: Vec<Variant> = items.iter().map(value_to_variant).collect();
            let element_type = converted
                .iter()
                .find(|v| !matches!(v, Variant::Empty))
                .map(|v| v.type_id())
                .unwrap_or(VariantTypeId::Boolean);
            match Array::new(element_type, converted) {
                Ok(array) => Variant::Array(Box::new(array)),
                Err(_) => Variant::Empty,
            }
        }
    }
}

/// Maps a tag quality onto the OPC UA status code published with the
/// value.
pub fn quality_status(quality: &DataQuality) -> StatusCode {
    match quality {
        DataQuality::Good => StatusCode::Good,
        DataQuality::Uncertain(UncertainReason::InitialValue) => StatusCode::UncertainInitialValue,
        DataQuality::Uncertain(UncertainReason::LastKnownValue) => {
            StatusCode::UncertainLastUsableValue
        }
        DataQuality::Bad(BadReason::ConfigurationError) => StatusCode::BadConfigurationError,
        DataQuality::Bad(BadReason::NotConnected) => StatusCode::BadNotConnected,
        DataQuality::Bad(BadReason::CommunicationFailure) => StatusCode::BadCommunicationError,
        DataQuality::Bad(BadReason::DecodeFailure) => StatusCode::BadDecodingError,
        DataQuality::Bad(BadReason::OutOfService) => StatusCode::BadOutOfService,
    }
}

// =============================================================================
// Inbound (client write → tag value)
// =============================================================================

/// Coerces a client-written variant to the tag's value type.
///
/// Returns `None` when the variant cannot represent the tag's type or
/// the value is out of range for it.
pub fn variant_to_value(variant: &Variant, tag: &ResolvedTag) -> Option<TagValue> {
    if tag.address.is_array() && tag.data_type != TagDataType::String {
        let items = match variant {
            Variant::Array(array) => &array.values,
            _ => return None,
        };
        let converted = items
            .iter()
            .map(|item| scalar_value(item, tag))
            .collect::<Option<Vec<_>>>()?;
        return Some(TagValue::Array(converted));
    }
    scalar_value(variant, tag)
}

fn scalar_value(variant: &Variant, tag: &ResolvedTag) -> Option<TagValue> {
    // Scaled writes arrive in engineering units; keep them as doubles so
    // the encoder can unscale against the raw range.
    if tag.scaling.is_some() {
        return variant_f64(variant).map(TagValue::Double);
    }

    match tag.data_type {
        TagDataType::Boolean => match variant {
            Variant::Boolean(v) => Some(TagValue::Bool(*v)),
            other => variant_f64(other).map(|f| TagValue::Bool(f != 0.0)),
        },
        TagDataType::Word | TagDataType::Bcd => {
            let rounded = variant_f64(variant)?.round();
            if (0.0..=f64::from(u16::MAX)).contains(&rounded) {
                Some(TagValue::Word(rounded as u16))
            } else {
                None
            }
        }
        TagDataType::Float => variant_f64(variant).map(|f| TagValue::Float(f as f32)),
        TagDataType::Double => variant_f64(variant).map(TagValue::Double),
        TagDataType::String => match variant {
            Variant::String(s) => Some(TagValue::Text(s.value().clone().unwrap_or_default())),
            _ => None,
        },
    }
}

fn variant_f64(variant: &Variant) -> Option<f64> {
    match variant {
        Variant::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
        Variant::SByte(v) => Some(f64::from(*v)),
        Variant::Byte(v) => Some(f64::from(*v)),
        Variant::Int16(v) => Some(f64::from(*v)),
        Variant::UInt16(v) => Some(f64::from(*v)),
        Variant::Int32(v) => Some(f64::from(*v)),
        Variant::UInt32(v) => Some(f64::from(*v)),
        Variant::Int64(v) => Some(*v as f64),
        Variant::UInt64(v) => Some(*v as f64),
        Variant::Float(v) => Some(f64::from(*v)),
        Variant::Double(v) => Some(*v),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
