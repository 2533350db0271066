//! # Fee Selector
//!
//! A transaction's `fee` field is an 8-bit selector into a fixed table of
//! factors applied to its amount, not an absolute value.
//!
//! | Selector | Factor |
//! |----------|--------|
//! | 0 | 0 |
//! | 1..=31 | 2^(-60 + 13·i/8) |
//! | 32..=191 | 2^((i - 192) / 20) |
//! | 192..=255 | 2^(i - 192) |
//!
//! The absolute fee is computed in fixed point with a 60-bit fractional part.

use crate::errors::CodecError;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Fractional bits of the fixed-point factor.
pub const FEE_FACTOR_SHIFT: u32 = 60;

/// First selector whose factor is an integer power of two.
const INTEGER_FACTOR_START: u8 = 192;

/// Index into the fee-factor table.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FeeSelector(pub u8);

impl FeeSelector {
    /// The factor as a float, for display.
    pub fn factor(&self) -> f64 {
        let i = f64::from(self.0);
        match self.0 {
            0 => 0.0,
            1..=31 => 2f64.powf(-60.0 + 13.0 * i / 8.0),
            32..=191 => 2f64.powf((i - 192.0) / 20.0),
            _ => 2f64.powi(i32::from(self.0) - 192),
        }
    }

    /// `round(factor · 2^60)`.
    pub fn factor_shifted(&self) -> U256 {
        match self.0 {
            0 => U256::zero(),
            i if i >= INTEGER_FACTOR_START => {
                U256::one() << (u32::from(i - INTEGER_FACTOR_START) + FEE_FACTOR_SHIFT)
            }
            _ => {
                let scaled = self.factor() * 2f64.powi(FEE_FACTOR_SHIFT as i32);
                U256::from(scaled.round() as u128)
            }
        }
    }

    /// Absolute fee paid on `amount`.
    ///
    /// # Errors
    /// - `FeeOverflow` if `amount · factor_shifted` exceeds 256 bits
    pub fn fee_amount(&self, amount: U256) -> Result<U256, CodecError> {
        let product = amount
            .checked_mul(self.factor_shifted())
            .ok_or(CodecError::FeeOverflow {
                amount,
                selector: self.0,
            })?;
        Ok(product >> FEE_FACTOR_SHIFT)
    }
}

impl From<u8> for FeeSelector {
    fn from(value: u8) -> Self {
        Self(value)
    }
}
