//! # Core Rollup Entities
//!
//! Primitive identifiers and the read-only account view shared by the amount
//! codec and the transaction pool.
//!
//! ## Widths (protocol fixed-width format)
//!
//! | Type | Bits |
//! |------|------|
//! | `Idx` | 48 |
//! | `Nonce` | 48 |
//! | `TokenId` | 32 |
//! | `BatchNum` | 64 |

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};
use std::fmt;

// Re-export U256 from primitive-types for use across all crates
pub use primitive_types::U256;

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

/// A 64-byte Ed25519 signature.
pub type Signature = [u8; 64];

/// A 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

/// A 20-byte Ethereum-style address.
pub type Address = [u8; 20];

/// Timestamp in milliseconds since UNIX epoch.
pub type Timestamp = u64;

/// Token identifier registered in the rollup.
pub type TokenId = u32;

/// Sequential number of a forged batch.
pub type BatchNum = u64;

/// Per-account transaction counter.
pub type Nonce = u64;

/// Largest nonce representable in the 48-bit protocol field.
pub const MAX_NONCE: Nonce = (1 << 48) - 1;

/// Account index in the rollup state tree.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Idx(pub u64);

impl Idx {
    /// Sentinel `toIdx` for a recipient that is not registered yet.
    pub const UNREGISTERED: Idx = Idx(0);
    /// `toIdx` that marks an exit to the base chain.
    pub const EXIT: Idx = Idx(1);
    /// First index assigned to user accounts.
    pub const USER_THRESHOLD: Idx = Idx(256);
    /// Largest index representable in 48 bits.
    pub const MAX: Idx = Idx((1 << 48) - 1);

    /// Returns true if the index fits the 48-bit field.
    pub fn is_valid(&self) -> bool {
        self.0 <= Self::MAX.0
    }

    /// Big-endian 6-byte encoding.
    pub fn to_bytes(&self) -> [u8; 6] {
        let full = self.0.to_be_bytes();
        let mut out = [0u8; 6];
        out.copy_from_slice(&full[2..]);
        out
    }
}

impl fmt::Display for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Big-endian 6-byte encoding of a 48-bit nonce.
pub fn nonce_to_bytes(nonce: Nonce) -> [u8; 6] {
    let full = nonce.to_be_bytes();
    let mut out = [0u8; 6];
    out.copy_from_slice(&full[2..]);
    out
}

/// Content-derived identifier of a pool transaction.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TxId(pub Hash);

impl TxId {
    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId(0x{})", hex::encode(&self.0[..6]))
    }
}

/// Identifier of an atomic group.
///
/// Derived from the ids of its members, sorted ascending, so the same member
/// set always yields the same group id.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AtomicGroupId(pub Hash);

impl AtomicGroupId {
    /// Computes the group id for a set of member ids.
    pub fn from_members(ids: &[TxId]) -> Self {
        let mut sorted = ids.to_vec();
        sorted.sort();
        let mut hasher = Sha256::new();
        for id in &sorted {
            hasher.update(id.0);
        }
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for AtomicGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AtomicGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AtomicGroupId(0x{})", hex::encode(&self.0[..6]))
    }
}

/// Read-only account view supplied by the base-chain synchronizer.
///
/// The pool consults it and never mutates it.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account index.
    pub idx: Idx,
    /// Token held by the account.
    pub token_id: TokenId,
    /// Next nonce the account expects.
    pub nonce: Nonce,
    /// Confirmed balance.
    pub balance: U256,
    /// Key that signs the account's transactions.
    #[serde_as(as = "Bytes")]
    pub public_key: PublicKey,
}
