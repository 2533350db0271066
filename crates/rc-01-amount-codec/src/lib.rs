//! # Amount Codec
//!
//! Fixed-width numeric encodings used by rollup transactions:
//!
//! - [`Float16`]: lossy 16-bit representation of an arbitrary-precision
//!   amount (10-bit mantissa, half-step flag, 5-bit decimal exponent).
//! - [`FeeSelector`]: 8-bit index into the fee-factor table.
//!
//! The codec is pure. It owns no state and does not log.
//!
//! ## Usage
//!
//! ```
//! use rc_01_amount_codec::{decode, encode_floor, encode_nearest};
//! use primitive_types::U256;
//!
//! let amount = U256::from(454_500u64);
//! assert_eq!(encode_floor(amount).unwrap(), 0x1DC6);
//! assert_eq!(decode(encode_nearest(amount).unwrap()), amount);
//! ```

pub mod errors;
pub mod fee;
pub mod float16;

pub use errors::CodecError;
pub use fee::{FeeSelector, FEE_FACTOR_SHIFT};
pub use float16::{Float16, MAX_EXPONENT};

use shared_types::U256;

/// Rounds `amount` down to its 16-bit encoding.
pub fn encode_floor(amount: U256) -> Result<u16, CodecError> {
    Float16::floor(amount).map(|f| f.0)
}

/// Encodes `amount` to the closest 16-bit representation.
pub fn encode_nearest(amount: U256) -> Result<u16, CodecError> {
    Float16::nearest(amount).map(|f| f.0)
}

/// Decodes a 16-bit encoding.
pub fn decode(encoded: u16) -> U256 {
    Float16(encoded).to_amount()
}

/// Checks that `amount` survives the codec unchanged, returning its
/// encoding.
///
/// This is the admission check for transaction amounts. Signatures and ids
/// cover the encoding, so an amount the encoding does not pin down exactly
/// is refused.
///
/// # Errors
/// - `Overflow` above [`Float16::max_amount`]
/// - `RoundingLoss` if the encoding decodes to a different value
pub fn ensure_representable(amount: U256) -> Result<Float16, CodecError> {
    Float16::exact(amount)
}
