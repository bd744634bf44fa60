//! Numeric helpers for constant handling.
//!
//! Shader constants are carried as `f32`/`f64`/`i64` until they are
//! materialized, at which point they must be quantized or range-checked
//! against the target scalar type.

use std::fmt;

/// Why a numeric conversion failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversionFailure {
    ExceedsPositiveLimit,
    ExceedsNegativeLimit,
}

impl fmt::Display for ConversionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionFailure::ExceedsPositiveLimit => {
                f.write_str("value exceeds positive limit for type")
            }
            ConversionFailure::ExceedsNegativeLimit => {
                f.write_str("value exceeds negative limit for type")
            }
        }
    }
}

// ─── f16 ──────────────────────────────────────────────────────────

/// Largest finite half-precision value (0x1.ffcp15).
pub const F16_HIGHEST: f32 = 65504.0;
/// Lowest finite half-precision value.
pub const F16_LOWEST: f32 = -65504.0;
/// Smallest positive normal half-precision value (2^-14).
pub const F16_SMALLEST: f32 = 6.103_515_6e-5;
/// Smallest positive subnormal half-precision value (2^-24).
pub const F16_SMALLEST_SUBNORMAL: f32 = 5.960_464_5e-8;

const SIGN_MASK: u32 = 0x8000_0000;
const EXPONENT_MASK: u32 = 0x7f80_0000;

/// Quantize an `f32` to the nearest half-precision value toward zero,
/// keeping the result in `f32` storage.
///
/// Every finite f16 is exactly representable as an f32, so quantization
/// only masks away low mantissa bits: 13 bits in the normal range, and
/// `126 - e` bits (e = biased f32 exponent) in the subnormal range.
/// Values beyond the finite range become infinities; values below the
/// smallest subnormal flush to a signed zero.
pub fn quantize_f16(value: f32) -> f32 {
    if value > F16_HIGHEST {
        return f32::INFINITY;
    }
    if value < F16_LOWEST {
        return f32::NEG_INFINITY;
    }

    let mut bits = value.to_bits();
    if bits & !SIGN_MASK == 0 {
        return value;
    }
    if bits & EXPONENT_MASK == EXPONENT_MASK {
        return value;
    }

    let abs = value.abs();
    if abs >= F16_SMALLEST {
        bits &= !((1u32 << 13) - 1);
    } else if abs >= F16_SMALLEST_SUBNORMAL {
        let biased_exponent = (bits & EXPONENT_MASK) >> 23;
        debug_assert!((103..=112).contains(&biased_exponent));
        let discard_bits = 126 - biased_exponent;
        bits &= !((1u32 << discard_bits) - 1);
    } else if value > 0.0 {
        return 0.0;
    } else {
        return -0.0;
    }
    f32::from_bits(bits)
}

/// Convert to f16 storage, failing instead of overflowing to infinity.
pub fn checked_f16(value: f64) -> Result<f32, ConversionFailure> {
    if value > F16_HIGHEST as f64 {
        return Err(ConversionFailure::ExceedsPositiveLimit);
    }
    if value < F16_LOWEST as f64 {
        return Err(ConversionFailure::ExceedsNegativeLimit);
    }
    Ok(quantize_f16(value as f32))
}

/// Convert to f32, failing on overflow.
pub fn checked_f32(value: f64) -> Result<f32, ConversionFailure> {
    if value.is_finite() && value > f32::MAX as f64 {
        return Err(ConversionFailure::ExceedsPositiveLimit);
    }
    if value.is_finite() && value < f32::MIN as f64 {
        return Err(ConversionFailure::ExceedsNegativeLimit);
    }
    Ok(value as f32)
}

pub fn checked_i32(value: i64) -> Result<i32, ConversionFailure> {
    i32::try_from(value).map_err(|_| {
        if value > 0 {
            ConversionFailure::ExceedsPositiveLimit
        } else {
            ConversionFailure::ExceedsNegativeLimit
        }
    })
}

pub fn checked_u32(value: i64) -> Result<u32, ConversionFailure> {
    u32::try_from(value).map_err(|_| {
        if value > 0 {
            ConversionFailure::ExceedsPositiveLimit
        } else {
            ConversionFailure::ExceedsNegativeLimit
        }
    })
}
