//! # Float16 Amount Encoding
//!
//! A transaction amount travels inside the proof circuit as 16 bits:
//!
//! ```text
//!  15        11   10    9                 0
//! ┌────────────┬─────┬────────────────────┐
//! │ exponent e │  h  │    mantissa m      │
//! │   5 bits   │1 bit│      10 bits       │
//! └────────────┴─────┴────────────────────┘
//!
//! value = m · 10^e            (+ 10^e / 2 when h = 1 and e > 0)
//! ```
//!
//! Two encoders are provided. `floor` never exceeds the input, `nearest`
//! minimizes the absolute error among three candidates.

use crate::errors::CodecError;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

const MANTISSA_MASK: u16 = 0x03FF;
const HALF_FLAG: u16 = 0x0400;
const EXPONENT_SHIFT: u16 = 11;
const MANTISSA_LIMIT: u64 = 1024;

/// Largest exponent the 5-bit field holds.
pub const MAX_EXPONENT: u16 = 31;

/// Mantissa used when `nearest` carries into the next exponent.
const CARRY_MANTISSA: u16 = 0x66;

/// A 16-bit encoded amount.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Float16(pub u16);

impl Float16 {
    /// Largest encoding, `1023.5 · 10^31`.
    pub const MAX: Float16 = Float16(0xFFFF);

    /// Builds an encoding from its three fields.
    ///
    /// Mantissa and exponent are masked to their field widths.
    pub fn from_parts(mantissa: u16, half: bool, exponent: u16) -> Self {
        let mut bits = (mantissa & MANTISSA_MASK) | ((exponent & 0x1F) << EXPONENT_SHIFT);
        if half {
            bits |= HALF_FLAG;
        }
        Self(bits)
    }

    pub fn mantissa(&self) -> u16 {
        self.0 & MANTISSA_MASK
    }

    pub fn exponent(&self) -> u16 {
        self.0 >> EXPONENT_SHIFT
    }

    pub fn is_half(&self) -> bool {
        self.0 & HALF_FLAG != 0
    }

    /// Decodes to the full-precision amount.
    pub fn to_amount(&self) -> U256 {
        let scale = U256::exp10(self.exponent() as usize);
        let mut amount = U256::from(self.mantissa()) * scale;
        if self.is_half() && self.exponent() != 0 {
            amount += scale / 2;
        }
        amount
    }

    /// Largest amount any encoding expresses.
    pub fn max_amount() -> U256 {
        Self::MAX.to_amount()
    }

    /// Rounds `amount` down to an encoding.
    ///
    /// # Errors
    /// - `Overflow` if `amount` is above [`Float16::max_amount`]
    pub fn floor(amount: U256) -> Result<Self, CodecError> {
        let fl1 = Self::floor_fix(amount)?;
        let fl2 = Self(fl1.0 | HALF_FLAG);
        if fl2.to_amount() <= amount {
            Ok(fl2)
        } else {
            Ok(fl1)
        }
    }

    /// Encodes `amount` to the candidate with the smallest absolute error.
    ///
    /// Candidates are evaluated in the order `fl1`, `fl2`, `fl3`; a later
    /// candidate only wins when strictly closer.
    ///
    /// # Errors
    /// - `Overflow` if `amount` is above [`Float16::max_amount`]
    pub fn nearest(amount: U256) -> Result<Self, CodecError> {
        let fl1 = Self::floor_fix(amount)?;
        let mut best = fl1;
        let mut best_diff = abs_diff(fl1.to_amount(), amount);

        let fl2 = Self(fl1.0 | HALF_FLAG);
        let diff = abs_diff(fl2.to_amount(), amount);
        if diff < best_diff {
            best = fl2;
            best_diff = diff;
        }

        if let Some(fl3) = fl1.next_mantissa() {
            if abs_diff(fl3.to_amount(), amount) < best_diff {
                best = fl3;
            }
        }

        Ok(best)
    }

    /// Encodes `amount` only if no precision is lost.
    ///
    /// # Errors
    /// - `Overflow` if `amount` is above [`Float16::max_amount`]
    /// - `RoundingLoss` if the nearest encoding decodes to a different value
    pub fn exact(amount: U256) -> Result<Self, CodecError> {
        let encoded = Self::nearest(amount)?;
        let decoded = encoded.to_amount();
        if decoded != amount {
            return Err(CodecError::RoundingLoss {
                amount,
                nearest: decoded,
            });
        }
        Ok(encoded)
    }

    /// Big-endian wire form.
    pub fn to_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Parses the big-endian wire form.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        let raw: [u8; 2] = bytes
            .try_into()
            .map_err(|_| CodecError::InvalidLength(bytes.len()))?;
        Ok(Self(u16::from_be_bytes(raw)))
    }

    /// Mantissa/exponent pair with `h = 0` at the smallest exponent that
    /// fits the mantissa in 10 bits.
    fn floor_fix(amount: U256) -> Result<Self, CodecError> {
        let max = Self::max_amount();
        if amount > max {
            return Err(CodecError::Overflow { amount, max });
        }

        let limit = U256::from(MANTISSA_LIMIT);
        let ten = U256::from(10u8);
        let mut mantissa = amount;
        let mut exponent = 0u16;
        while mantissa >= limit {
            mantissa /= ten;
            exponent += 1;
        }

        Ok(Self::from_parts(mantissa.low_u64() as u16, false, exponent))
    }

    /// `fl3`: mantissa plus one, carrying into the exponent at 1024.
    fn next_mantissa(&self) -> Option<Self> {
        let mut mantissa = self.mantissa() + 1;
        let mut exponent = self.exponent();
        if u64::from(mantissa) == MANTISSA_LIMIT {
            mantissa = CARRY_MANTISSA;
            exponent += 1;
        }
        if exponent > MAX_EXPONENT {
            return None;
        }
        Some(Self::from_parts(mantissa, false, exponent))
    }
}

impl fmt::Debug for Float16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Float16(0x{:04X}: m={}, h={}, e={})",
            self.0,
            self.mantissa(),
            self.is_half() as u8,
            self.exponent()
        )
    }
}

impl fmt::Display for Float16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

fn abs_diff(a: U256, b: U256) -> U256 {
    if a > b {
        a - b
    } else {
        b - a
    }
}
