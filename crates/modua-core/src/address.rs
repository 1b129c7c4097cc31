// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! 6-digit IEC 61131 address parsing.
//!
//! Tag addresses use the conventional 6-digit numbering:
//!
//! ```text
//! 000001 - 065536   Coils             (read/write bits)
//! 100001 - 165536   Discrete inputs   (read-only bits)
//! 300001 - 365536   Input registers   (read-only words)
//! 400001 - 465536   Holding registers (read/write words)
//! ```
//!
//! Array tags append an element count in brackets: `428672 [58]`. The
//! explicit prefixes `C:`, `DI:`, `IR:` and `HR:` are accepted as an
//! alternative to the numeric range.
//!
//! Whether the numeric part is 1-based (the convention above) or 0-based is
//! a per-device setting, configured independently for register and bit
//! spaces.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ConfigError, ConfigResult};
use crate::types::TagDataType;

// =============================================================================
// Register Spaces
// =============================================================================

/// The four Modbus register spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterSpace {
    /// Read/write single bits (FC 1 / 5 / 15).
    Coil,

    /// Read-only single bits (FC 2).
    DiscreteInput,

    /// Read-only 16-bit registers (FC 4).
    InputRegister,

    /// Read/write 16-bit registers (FC 3 / 6 / 16).
    HoldingRegister,
}

impl RegisterSpace {
    /// Returns `true` if this space addresses single bits.
    #[inline]
    pub fn is_bit(&self) -> bool {
        matches!(self, RegisterSpace::Coil | RegisterSpace::DiscreteInput)
    }

    /// Returns `true` if this space accepts writes.
    #[inline]
    pub fn is_writable(&self) -> bool {
        matches!(self, RegisterSpace::Coil | RegisterSpace::HoldingRegister)
    }

    /// Returns the space name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterSpace::Coil => "coil",
            RegisterSpace::DiscreteInput => "discrete_input",
            RegisterSpace::InputRegister => "input_register",
            RegisterSpace::HoldingRegister => "holding_register",
        }
    }
}

impl fmt::Display for RegisterSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Tag Addresses
// =============================================================================

/// A resolved tag address: space, 0-based protocol offset and element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagAddress {
    /// The register space.
    pub space: RegisterSpace,

    /// 0-based protocol offset of the first element.
    pub offset: u16,

    /// Number of elements (1 for scalar tags).
    pub count: u16,
}

impl TagAddress {
    /// Total addressing units (bits or registers) this tag occupies.
    #[inline]
    pub fn span(&self, data_type: TagDataType) -> u32 {
        self.count as u32 * data_type.units_per_element() as u32
    }

    /// 0-based offset one past the last unit this tag occupies.
    #[inline]
    pub fn end(&self, data_type: TagDataType) -> u32 {
        self.offset as u32 + self.span(data_type)
    }

    /// Returns `true` if this is an array address.
    #[inline]
    pub fn is_array(&self) -> bool {
        self.count > 1
    }
}

impl fmt::Display for TagAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count > 1 {
            write!(f, "{}:{} [{}]", self.space, self.offset, self.count)
        } else {
            write!(f, "{}:{}", self.space, self.offset)
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses a tag address string.
///
/// `one_based_registers` and `one_based_bits` select whether the numeric
/// part counts from 1 (default convention) or 0 in register and bit spaces
/// respectively.
///
/// # Examples
///
/// ```
/// use modua_core::address::{parse_address, RegisterSpace};
///
/// let addr = parse_address("400001", true, true).unwrap();
/// assert_eq!(addr.space, RegisterSpace::HoldingRegister);
/// assert_eq!(addr.offset, 0);
/// assert_eq!(addr.count, 1);
///
/// let addr = parse_address("428672 [58]", true, true).unwrap();
/// assert_eq!(addr.offset, 28671);
/// assert_eq!(addr.count, 58);
/// ```
pub fn parse_address(
    input: &str,
    one_based_registers: bool,
    one_based_bits: bool,
) -> ConfigResult<TagAddress> {
    let trimmed = input.trim();
    let (numeric, count) = split_array_suffix(trimmed)
        .map_err(|message| ConfigError::invalid_address(input, message))?;

    let (space, raw) = if let Some((prefix, rest)) = numeric.split_once(':') {
        let space = match prefix.trim().to_ascii_uppercase().as_str() {
            "C" => RegisterSpace::Coil,
            "DI" => RegisterSpace::DiscreteInput,
            "IR" => RegisterSpace::InputRegister,
            "HR" => RegisterSpace::HoldingRegister,
            other => {
                return Err(ConfigError::invalid_address(
                    input,
                    format!("unknown space prefix '{}'", other),
                ))
            }
        };
        let raw: u32 = rest
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid_address(input, "offset is not a number"))?;
        (space, raw)
    } else {
        let digits: u32 = numeric
            .parse()
            .map_err(|_| ConfigError::invalid_address(input, "address is not a number"))?;
        classify_six_digit(digits)
            .ok_or_else(|| ConfigError::invalid_address(input, "outside all address ranges"))?
    };

    let one_based = if space.is_bit() {
        one_based_bits
    } else {
        one_based_registers
    };

    let offset = if one_based {
        raw.checked_sub(1)
            .ok_or_else(|| ConfigError::invalid_address(input, "1-based address cannot be 0"))?
    } else {
        raw
    };

    if offset > u16::MAX as u32 {
        return Err(ConfigError::invalid_address(input, "offset exceeds 65535"));
    }

    Ok(TagAddress {
        space,
        offset: offset as u16,
        count,
    })
}

/// Splits a trailing `[N]` array suffix off the address string.
fn split_array_suffix(input: &str) -> Result<(&str, u16), String> {
    match input.find('[') {
        None => Ok((input, 1)),
        Some(open) => {
            let rest = &input[open..];
            if !rest.ends_with(']') {
                return Err("unterminated array suffix".to_string());
            }
            let count: u16 = rest[1..rest.len() - 1]
                .trim()
                .parse()
                .map_err(|_| "array count is not a number".to_string())?;
            if count == 0 {
                return Err("array count must be at least 1".to_string());
            }
            Ok((input[..open].trim_end(), count))
        }
    }
}

/// Maps a 6-digit number to its register space and space-relative address.
fn classify_six_digit(digits: u32) -> Option<(RegisterSpace, u32)> {
    match digits {
        // 0 is accepted so that 0-based devices can reach coil offset 0;
        // with 1-based numbering it still fails the offset conversion.
        0..=65_536 => Some((RegisterSpace::Coil, digits)),
        100_001..=165_536 => Some((RegisterSpace::DiscreteInput, digits - 100_000)),
        300_001..=365_536 => Some((RegisterSpace::InputRegister, digits - 300_000)),
        400_001..=465_536 => Some((RegisterSpace::HoldingRegister, digits - 400_000)),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar_addresses() {
        let addr = parse_address("400001", true, true).unwrap();
        assert_eq!(addr.space, RegisterSpace::HoldingRegister);
        assert_eq!(addr.offset, 0);
        assert_eq!(addr.count, 1);

        let addr = parse_address("300010", true, true).unwrap();
        assert_eq!(addr.space, RegisterSpace::InputRegister);
        assert_eq!(addr.offset, 9);

        let addr = parse_address("000017", true, true).unwrap();
        assert_eq!(addr.space, RegisterSpace::Coil);
        assert_eq!(addr.offset, 16);

        let addr = parse_address("101024", true, true).unwrap();
        assert_eq!(addr.space, RegisterSpace::DiscreteInput);
        assert_eq!(addr.offset, 1023);
    }

    #[test]
    fn test_parse_array_suffix() {
        let addr = parse_address("428672 [58]", true, true).unwrap();
        assert_eq!(addr.space, RegisterSpace::HoldingRegister);
        assert_eq!(addr.offset, 28671);
        assert_eq!(addr.count, 58);

        let addr = parse_address("101024 [40]", true, true).unwrap();
        assert_eq!(addr.space, RegisterSpace::DiscreteInput);
        assert_eq!(addr.offset, 1023);
        assert_eq!(addr.count, 40);

        // No space before the bracket is accepted too.
        let addr = parse_address("400100[4]", true, true).unwrap();
        assert_eq!(addr.offset, 99);
        assert_eq!(addr.count, 4);
    }

    #[test]
    fn test_parse_prefixed() {
        let addr = parse_address("HR:28672", true, true).unwrap();
        assert_eq!(addr.space, RegisterSpace::HoldingRegister);
        assert_eq!(addr.offset, 28671);

        let addr = parse_address("di:1024 [8]", true, true).unwrap();
        assert_eq!(addr.space, RegisterSpace::DiscreteInput);
        assert_eq!(addr.offset, 1023);
        assert_eq!(addr.count, 8);
    }

    #[test]
    fn test_zero_based() {
        let addr = parse_address("400001", false, true).unwrap();
        assert_eq!(addr.offset, 1);

        // Bit spaces follow their own flag.
        let addr = parse_address("000005", true, false).unwrap();
        assert_eq!(addr.offset, 5);
        let addr = parse_address("000005", true, true).unwrap();
        assert_eq!(addr.offset, 4);

        // The first coil is reachable numerically on 0-based devices.
        let addr = parse_address("0", true, false).unwrap();
        assert_eq!(addr.space, RegisterSpace::Coil);
        assert_eq!(addr.offset, 0);
    }

    #[test]
    fn test_parse_rejects() {
        assert!(parse_address("200001", true, true).is_err());
        assert!(parse_address("465537", true, true).is_err());
        assert!(parse_address("abc", true, true).is_err());
        assert!(parse_address("400001 [0]", true, true).is_err());
        assert!(parse_address("400001 [12", true, true).is_err());
        assert!(parse_address("XX:100", true, true).is_err());
        // 0 is invalid when 1-based.
        assert!(parse_address("C:0", true, true).is_err());
        assert!(parse_address("0", true, true).is_err());
    }

    #[test]
    fn test_span() {
        let addr = parse_address("400001 [10]", true, true).unwrap();
        assert_eq!(addr.span(TagDataType::Float), 20);
        assert_eq!(addr.end(TagDataType::Float), 20);
        assert_eq!(addr.span(TagDataType::Double), 40);

        let addr = parse_address("101024 [40]", true, true).unwrap();
        assert_eq!(addr.span(TagDataType::Boolean), 40);
        assert_eq!(addr.end(TagDataType::Boolean), 1063);
    }

    #[test]
    fn test_space_properties() {
        assert!(RegisterSpace::Coil.is_bit());
        assert!(RegisterSpace::Coil.is_writable());
        assert!(RegisterSpace::DiscreteInput.is_bit());
        assert!(!RegisterSpace::DiscreteInput.is_writable());
        assert!(!RegisterSpace::HoldingRegister.is_bit());
        assert!(RegisterSpace::HoldingRegister.is_writable());
        assert!(!RegisterSpace::InputRegister.is_writable());
    }
}
