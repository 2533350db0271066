//! Error types for the amount codec.

use primitive_types::U256;
use thiserror::Error;

/// All errors the codec can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Amount is above the largest value any encoding can express.
    #[error("Amount {amount} exceeds the largest Float16 value {max}")]
    Overflow { amount: U256, max: U256 },

    /// Amount has no encoding that decodes back to it exactly.
    #[error("Amount {amount} is not exactly representable (nearest is {nearest})")]
    RoundingLoss { amount: U256, nearest: U256 },

    /// Fixed-point fee computation did not fit in 256 bits.
    #[error("Fee overflow for amount {amount} with selector {selector}")]
    FeeOverflow { amount: U256, selector: u8 },

    /// Wire slice has the wrong length.
    #[error("Float16 needs 2 bytes, got {0}")]
    InvalidLength(usize),
}
