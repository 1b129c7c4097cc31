// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Register and bit codec.
//!
//! Modbus delivers 16-bit registers; how multi-register values map onto
//! them varies by vendor. Each device declares an [`EncodingConfig`] and
//! every decode/encode goes through it:
//!
//! - byte order within a register (big or little endian)
//! - word order across 32-bit values (high-word-first or low-word-first)
//! - dword order across 64-bit values
//! - Modicon bit order (bit significance reversed within a register)
//! - 64-bit values carried as paired 4-digit decimals
//!
//! Decode failures (e.g. an invalid BCD nibble) surface as errors; the
//! scheduler maps them to a null value with bad quality for the affected
//! tag only.

use serde::{Deserialize, Serialize};

use modua_core::error::{ModbusError, ModbusResult};
use modua_core::types::{TagDataType, TagValue};

// =============================================================================
// Encoding Configuration
// =============================================================================

/// Byte order within a 16-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Most significant byte first (Modbus default).
    #[default]
    Big,

    /// Least significant byte first.
    Little,
}

/// Word order across multi-register values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WordOrder {
    /// Most significant word first.
    #[default]
    HighLow,

    /// Least significant word first.
    LowHigh,
}

/// Bit significance within a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BitOrder {
    /// Bit 0 is least significant (standard).
    #[default]
    Lsb,

    /// Bit 0 is most significant (Modicon convention).
    Msb,
}

/// Per-device register encoding policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EncodingConfig {
    /// Byte order within each register.
    pub byte_order: ByteOrder,

    /// Word order for 32-bit values.
    pub word_order: WordOrder,

    /// 32-bit-half order for 64-bit values.
    pub dword_order: WordOrder,

    /// Bit significance within registers.
    pub bit_order: BitOrder,

    /// Decode 64-bit values as `[0, high, 0, low]` decimal pairs
    /// (`value = high * 10000 + low`).
    pub treat_longs_as_decimals: bool,
}

// =============================================================================
// Register Normalization
// =============================================================================

/// Applies byte and bit order to bring one register to canonical form.
#[inline]
fn normalize_word(word: u16, enc: &EncodingConfig) -> u16 {
    let word = match enc.byte_order {
        ByteOrder::Big => word,
        ByteOrder::Little => word.swap_bytes(),
    };
    match enc.bit_order {
        BitOrder::Lsb => word,
        BitOrder::Msb => word.reverse_bits(),
    }
}

/// Inverse of [`normalize_word`] for encoding.
#[inline]
fn denormalize_word(word: u16, enc: &EncodingConfig) -> u16 {
    // Byte swap and bit reversal are both involutions; applying them in
    // reverse order undoes normalization.
    let word = match enc.bit_order {
        BitOrder::Lsb => word,
        BitOrder::Msb => word.reverse_bits(),
    };
    match enc.byte_order {
        ByteOrder::Big => word,
        ByteOrder::Little => word.swap_bytes(),
    }
}

fn u32_from_words(words: [u16; 2], order: WordOrder) -> u32 {
    let (hi, lo) = match order {
        WordOrder::HighLow => (words[0], words[1]),
        WordOrder::LowHigh => (words[1], words[0]),
    };
    ((hi as u32) << 16) | lo as u32
}

fn words_from_u32(value: u32, order: WordOrder) -> [u16; 2] {
    let hi = (value >> 16) as u16;
    let lo = value as u16;
    match order {
        WordOrder::HighLow => [hi, lo],
        WordOrder::LowHigh => [lo, hi],
    }
}

fn u64_from_words(words: [u16; 4], enc: &EncodingConfig) -> u64 {
    let first = u32_from_words([words[0], words[1]], enc.word_order);
    let second = u32_from_words([words[2], words[3]], enc.word_order);
    let (hi, lo) = match enc.dword_order {
        WordOrder::HighLow => (first, second),
        WordOrder::LowHigh => (second, first),
    };
    ((hi as u64) << 32) | lo as u64
}

fn words_from_u64(value: u64, enc: &EncodingConfig) -> [u16; 4] {
    let hi = (value >> 32) as u32;
    let lo = value as u32;
    let (first, second) = match enc.dword_order {
        WordOrder::HighLow => (hi, lo),
        WordOrder::LowHigh => (lo, hi),
    };
    let a = words_from_u32(first, enc.word_order);
    let b = words_from_u32(second, enc.word_order);
    [a[0], a[1], b[0], b[1]]
}

// =============================================================================
// BCD
// =============================================================================

/// Decodes a packed-BCD register (0-9999).
pub fn decode_bcd(word: u16) -> ModbusResult<u16> {
    let mut value = 0u16;
    for shift in [12, 8, 4, 0] {
        let nibble = (word >> shift) & 0xF;
        if nibble > 9 {
            return Err(ModbusError::invalid_response(format!(
                "invalid BCD nibble 0x{:X} in 0x{:04X}",
                nibble, word
            )));
        }
        value = value * 10 + nibble;
    }
    Ok(value)
}

/// Encodes a value (0-9999) as packed BCD.
pub fn encode_bcd(value: u16) -> ModbusResult<u16> {
    if value > 9999 {
        return Err(ModbusError::write_rejected(format!(
            "{} does not fit in a BCD register (0-9999)",
            value
        )));
    }
    let mut word = 0u16;
    let mut rest = value;
    for shift in [0, 4, 8, 12] {
        word |= (rest % 10) << shift;
        rest /= 10;
    }
    Ok(word)
}

// =============================================================================
// Element Decode / Encode
// =============================================================================

fn decode_element(words: &[u16], data_type: TagDataType, enc: &EncodingConfig) -> ModbusResult<TagValue> {
    match data_type {
        TagDataType::Word => Ok(TagValue::Word(normalize_word(words[0], enc))),
        TagDataType::Bcd => decode_bcd(normalize_word(words[0], enc)).map(TagValue::Word),
        TagDataType::Float => {
            let norm = [normalize_word(words[0], enc), normalize_word(words[1], enc)];
            Ok(TagValue::Float(f32::from_bits(u32_from_words(
                norm,
                enc.word_order,
            ))))
        }
        TagDataType::Double => {
            let norm = [
                normalize_word(words[0], enc),
                normalize_word(words[1], enc),
                normalize_word(words[2], enc),
                normalize_word(words[3], enc),
            ];
            if enc.treat_longs_as_decimals {
                decode_decimal_pair(norm, enc)
            } else {
                Ok(TagValue::Double(f64::from_bits(u64_from_words(norm, enc))))
            }
        }
        TagDataType::Boolean | TagDataType::String => Err(ModbusError::invalid_response(format!(
            "{} is not a register element type",
            data_type
        ))),
    }
}

/// Decodes the `[0, high, 0, low]` decimal-pair representation.
fn decode_decimal_pair(words: [u16; 4], enc: &EncodingConfig) -> ModbusResult<TagValue> {
    // Canonical order first, then read the low word of each half.
    let bits = u64_from_words(words, enc);
    let hi_half = (bits >> 32) as u32;
    let lo_half = bits as u32;
    let high = (hi_half & 0xFFFF) as u64;
    let low = (lo_half & 0xFFFF) as u64;
    if high > 9999 || low > 9999 {
        return Err(ModbusError::invalid_response(format!(
            "decimal pair out of range: high={} low={}",
            high, low
        )));
    }
    Ok(TagValue::Double((high * 10_000 + low) as f64))
}

fn encode_decimal_pair(value: f64, enc: &EncodingConfig) -> ModbusResult<[u16; 4]> {
    let rounded = value.round();
    if !(0.0..=99_999_999.0).contains(&rounded) {
        return Err(ModbusError::write_rejected(format!(
            "{} does not fit the decimal-pair range (0-99999999)",
            value
        )));
    }
    let rounded = rounded as u64;
    let high = (rounded / 10_000) as u64;
    let low = (rounded % 10_000) as u64;
    let bits = (high << 32) | low;
    Ok(words_from_u64(bits, enc))
}

fn encode_element(
    value: &TagValue,
    data_type: TagDataType,
    enc: &EncodingConfig,
) -> ModbusResult<Vec<u16>> {
    let words: Vec<u16> = match data_type {
        TagDataType::Word => {
            let v = numeric(value)?;
            let rounded = v.round();
            if !(0.0..=65_535.0).contains(&rounded) {
                return Err(ModbusError::write_rejected(format!(
                    "{} does not fit in a 16-bit register",
                    v
                )));
            }
            vec![rounded as u16]
        }
        TagDataType::Bcd => {
            let v = numeric(value)?.round();
            if !(0.0..=9999.0).contains(&v) {
                return Err(ModbusError::write_rejected(format!(
                    "{} does not fit in a BCD register",
                    v
                )));
            }
            vec![encode_bcd(v as u16)?]
        }
        TagDataType::Float => {
            let v = numeric(value)? as f32;
            words_from_u32(v.to_bits(), enc.word_order).to_vec()
        }
        TagDataType::Double => {
            let v = numeric(value)?;
            if enc.treat_longs_as_decimals {
                encode_decimal_pair(v, enc)?.to_vec()
            } else {
                words_from_u64(v.to_bits(), enc).to_vec()
            }
        }
        TagDataType::Boolean | TagDataType::String => {
            return Err(ModbusError::write_rejected(format!(
                "{} is not a register element type",
                data_type
            )))
        }
    };
    Ok(words.into_iter().map(|w| denormalize_word(w, enc)).collect())
}

fn numeric(value: &TagValue) -> ModbusResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| ModbusError::write_rejected(format!("{} is not numeric", value.type_name())))
}

// =============================================================================
// Public API
// =============================================================================

/// Decodes a tag's registers into a [`TagValue`].
///
/// `words` must hold exactly the tag's registers (`count` elements of
/// `data_type`, or `count` registers for String tags).
pub fn decode_registers(
    words: &[u16],
    data_type: TagDataType,
    count: u16,
    enc: &EncodingConfig,
) -> ModbusResult<TagValue> {
    if data_type == TagDataType::String {
        if words.len() < count as usize {
            return Err(ModbusError::invalid_response("short string response"));
        }
        return Ok(TagValue::Text(decode_string(&words[..count as usize], enc)));
    }

    let per = data_type.units_per_element() as usize;
    let needed = per * count as usize;
    if words.len() < needed {
        return Err(ModbusError::invalid_response(format!(
            "expected {} registers, got {}",
            needed,
            words.len()
        )));
    }

    if count == 1 {
        return decode_element(&words[..per], data_type, enc);
    }

    let mut elements = Vec::with_capacity(count as usize);
    for chunk in words[..needed].chunks_exact(per) {
        // One bad element does not null the whole array.
        elements.push(decode_element(chunk, data_type, enc).unwrap_or(TagValue::Null));
    }
    Ok(TagValue::Array(elements))
}

/// Encodes a [`TagValue`] into the tag's registers.
pub fn encode_registers(
    value: &TagValue,
    data_type: TagDataType,
    count: u16,
    enc: &EncodingConfig,
) -> ModbusResult<Vec<u16>> {
    if data_type == TagDataType::String {
        return encode_string(value, count, enc);
    }

    if count == 1 {
        return encode_element(value, data_type, enc);
    }

    let elements = value.as_array().ok_or_else(|| {
        ModbusError::write_rejected(format!(
            "array tag expects an array value, got {}",
            value.type_name()
        ))
    })?;
    if elements.len() != count as usize {
        return Err(ModbusError::write_rejected(format!(
            "array length {} does not match element count {}",
            elements.len(),
            count
        )));
    }

    let mut words = Vec::with_capacity(count as usize * data_type.units_per_element() as usize);
    for element in elements {
        words.extend(encode_element(element, data_type, enc)?);
    }
    Ok(words)
}

/// Decodes a bit-space tag from a block response slice.
///
/// `bits` starts at the tag's first bit. Elements the response does not
/// cover decode as `Null`.
pub fn decode_bits(bits: &[bool], count: u16) -> TagValue {
    if count == 1 {
        return bits.first().map(|b| TagValue::Bool(*b)).unwrap_or(TagValue::Null);
    }
    let elements = (0..count as usize)
        .map(|i| bits.get(i).map(|b| TagValue::Bool(*b)).unwrap_or(TagValue::Null))
        .collect();
    TagValue::Array(elements)
}

/// Encodes a bit-space tag value into coil states.
pub fn encode_bits(value: &TagValue, count: u16) -> ModbusResult<Vec<bool>> {
    if count == 1 {
        let bit = value
            .as_bool()
            .ok_or_else(|| ModbusError::write_rejected("expected a boolean value"))?;
        return Ok(vec![bit]);
    }
    let elements = value
        .as_array()
        .ok_or_else(|| ModbusError::write_rejected("expected a boolean array"))?;
    if elements.len() != count as usize {
        return Err(ModbusError::write_rejected(format!(
            "array length {} does not match element count {}",
            elements.len(),
            count
        )));
    }
    elements
        .iter()
        .map(|v| {
            v.as_bool()
                .ok_or_else(|| ModbusError::write_rejected("array element is not a boolean"))
        })
        .collect()
}

/// Decodes a string from registers: two big-endian characters per register,
/// trailing NULs trimmed.
fn decode_string(words: &[u16], enc: &EncodingConfig) -> String {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for &word in words {
        let word = normalize_word(word, enc);
        bytes.push((word >> 8) as u8);
        bytes.push(word as u8);
    }
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn encode_string(value: &TagValue, count: u16, enc: &EncodingConfig) -> ModbusResult<Vec<u16>> {
    let text = value
        .as_str()
        .ok_or_else(|| ModbusError::write_rejected("expected a string value"))?;
    let capacity = count as usize * 2;
    if text.len() > capacity {
        return Err(ModbusError::write_rejected(format!(
            "string of {} bytes exceeds the tag's {} registers",
            text.len(),
            count
        )));
    }
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(capacity, 0);
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| denormalize_word(((pair[0] as u16) << 8) | pair[1] as u16, enc))
        .collect())
}

// =============================================================================
// Tests
// =============================================================================
