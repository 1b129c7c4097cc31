// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Engineering-unit scaling.
//!
//! Numeric tags can map their raw wire range onto an engineering-unit
//! range, either linearly or through a square-root characteristic (common
//! for differential-pressure flow measurements). Writes pass through the
//! inverse mapping before encoding.

use serde::{Deserialize, Serialize};

// =============================================================================
// Scaling Configuration
// =============================================================================

/// The scaling characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMode {
    /// Straight-line interpolation between the two ranges.
    #[default]
    Linear,

    /// Square root of the normalized raw value, then interpolation.
    SquareRoot,
}

/// Scaling parameters for one tag.
///
/// # Examples
///
/// ```
/// use modua_core::scaling::Scaling;
///
/// let scaling = Scaling::linear(0.0, 65535.0, 0.0, 100.0);
/// let scaled = scaling.apply(32768.0);
/// assert!((scaled - 50.0).abs() < 0.01);
///
/// let raw = scaling.unapply(scaled);
/// assert!((raw - 32768.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaling {
    /// The scaling characteristic.
    #[serde(default)]
    pub mode: ScalingMode,

    /// Raw range lower bound.
    pub raw_low: f64,

    /// Raw range upper bound.
    pub raw_high: f64,

    /// Scaled range lower bound.
    pub scaled_low: f64,

    /// Scaled range upper bound.
    pub scaled_high: f64,

    /// Clamp scaled values below the scaled range.
    #[serde(default)]
    pub clamp_low: bool,

    /// Clamp scaled values above the scaled range.
    #[serde(default)]
    pub clamp_high: bool,

    /// Negate the scaled value.
    #[serde(default)]
    pub negate: bool,

    /// Engineering units label, surfaced on the OPC UA node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl Scaling {
    /// Creates a linear scaling without clamping.
    pub fn linear(raw_low: f64, raw_high: f64, scaled_low: f64, scaled_high: f64) -> Self {
        Self {
            mode: ScalingMode::Linear,
            raw_low,
            raw_high,
            scaled_low,
            scaled_high,
            clamp_low: false,
            clamp_high: false,
            negate: false,
            units: None,
        }
    }

    /// Creates a square-root scaling without clamping.
    pub fn square_root(raw_low: f64, raw_high: f64, scaled_low: f64, scaled_high: f64) -> Self {
        Self {
            mode: ScalingMode::SquareRoot,
            ..Self::linear(raw_low, raw_high, scaled_low, scaled_high)
        }
    }

    /// Returns `true` if the raw range is degenerate (zero width).
    pub fn is_degenerate(&self) -> bool {
        (self.raw_high - self.raw_low).abs() < f64::EPSILON
            || (self.scaled_high - self.scaled_low).abs() < f64::EPSILON
    }

    /// Maps a raw value to engineering units.
    pub fn apply(&self, raw: f64) -> f64 {
        let ratio = (raw - self.raw_low) / (self.raw_high - self.raw_low);
        let ratio = match self.mode {
            ScalingMode::Linear => ratio,
            ScalingMode::SquareRoot => ratio.max(0.0).sqrt(),
        };
        let mut scaled = ratio * (self.scaled_high - self.scaled_low) + self.scaled_low;
        if self.negate {
            scaled = -scaled;
        }
        self.clamp(scaled)
    }

    /// Maps an engineering-unit value back to the raw range.
    ///
    /// The caller rounds the result when the raw wire type is integral.
    pub fn unapply(&self, scaled: f64) -> f64 {
        let scaled = if self.negate { -scaled } else { scaled };
        let ratio = (scaled - self.scaled_low) / (self.scaled_high - self.scaled_low);
        let ratio = match self.mode {
            ScalingMode::Linear => ratio,
            ScalingMode::SquareRoot => ratio * ratio,
        };
        ratio * (self.raw_high - self.raw_low) + self.raw_low
    }

    fn clamp(&self, scaled: f64) -> f64 {
        let lo = self.scaled_low.min(self.scaled_high);
        let hi = self.scaled_low.max(self.scaled_high);
        let scaled = if self.clamp_low { scaled.max(lo) } else { scaled };
        if self.clamp_high {
            scaled.min(hi)
        } else {
            scaled
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
    fn test_linear_midpoint() {
        let scaling = Scaling::linear(0.0, 65535.0, 0.0, 100.0);
        let scaled = scaling.apply(32768.0);
        assert!((scaled - 50.0).abs() < 0.01, "got {}", scaled);
    }

    #[test]
    fn test_linear_round_trip() {
        let scaling = Scaling::linear(0.0, 65535.0, 0.0, 100.0);
        let raw = scaling.unapply(scaling.apply(32768.0));
        assert!((raw - 32768.0).abs() < 1e-6);
    }

    #[test]
    fn test_square_root() {
        let scaling = Scaling::square_root(0.0, 10000.0, 0.0, 100.0);
        // Quarter of the raw range maps to half of the scaled range.
        let scaled = scaling.apply(2500.0);
        assert!((scaled - 50.0).abs() < 1e-9);

        let raw = scaling.unapply(scaled);
        assert!((raw - 2500.0).abs() < 1e-6);
    }

    #[test]
    fn test_square_root_negative_ratio() {
        let scaling = Scaling::square_root(1000.0, 2000.0, 0.0, 100.0);
        // Below the raw range the normalized ratio is negative; sqrt input
        // is clamped to zero instead of producing NaN.
        assert_eq!(scaling.apply(500.0), 0.0);
    }

    #[test]
    fn test_clamping() {
        let mut scaling = Scaling::linear(0.0, 100.0, 0.0, 10.0);
        scaling.clamp_low = true;
        scaling.clamp_high = true;

        assert_eq!(scaling.apply(-50.0), 0.0);
        assert_eq!(scaling.apply(200.0), 10.0);
        assert!((scaling.apply(50.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_negate() {
        let mut scaling = Scaling::linear(0.0, 100.0, 0.0, 10.0);
        scaling.negate = true;

        let scaled = scaling.apply(50.0);
        assert!((scaled + 5.0).abs() < 1e-9);

        let raw = scaling.unapply(scaled);
        assert!((raw - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate() {
        let scaling = Scaling::linear(5.0, 5.0, 0.0, 10.0);
        assert!(scaling.is_degenerate());
        let scaling = Scaling::linear(0.0, 10.0, 3.0, 3.0);
        assert!(scaling.is_degenerate());
        let scaling = Scaling::linear(0.0, 10.0, 0.0, 100.0);
        assert!(!scaling.is_degenerate());
    }
}
