//! Core domain entities for the transaction pool.
//!
//! Defines the pool transaction record, its lifecycle state machine and the
//! atomic-group reference fields.

use super::errors::PoolError;
use rc_01_amount_codec::CodecError;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};
use std::fmt;

pub use rc_01_amount_codec::{FeeSelector, Float16};
pub use shared_types::{
    nonce_to_bytes, Account, Address, AtomicGroupId, BatchNum, Hash, Idx, Nonce, PublicKey,
    Signature, Timestamp, TokenId, TxId, MAX_NONCE, U256,
};

/// Length of [`PoolL2Tx::canonical_bytes`].
pub const CANONICAL_LEN: usize = 107;

/// Lifecycle state of a pool transaction.
///
/// ```text
/// [Pending] ──start_forging──→ [Forging] ──done_forging──→ [Forged]
///    │  ↑                         │  │                        │
///    │  └──────── reorg ──────────┘  │                        │
///    │  ↑                            │                        │
///    │  └──────────────── reorg ─────┼────────────────────────┘
///    │                               │
///    └──── invalidate ──→ [Invalid] ←┘
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PoolTxState {
    /// Waiting for selection.
    #[default]
    Pending,
    /// Selected for the batch being built.
    Forging,
    /// Included in a confirmed batch.
    Forged,
    /// Can never become valid again.
    Invalid,
}

impl PoolTxState {
    pub const ALL: [PoolTxState; 4] = [
        PoolTxState::Pending,
        PoolTxState::Forging,
        PoolTxState::Forged,
        PoolTxState::Invalid,
    ];

    /// Returns true if `self → next` is a legal transition.
    pub fn can_transition_to(self, next: PoolTxState) -> bool {
        use PoolTxState::*;
        matches!(
            (self, next),
            (Pending, Forging)
                | (Pending, Invalid)
                | (Forging, Forged)
                | (Forging, Pending)
                | (Forging, Invalid)
                | (Forged, Pending)
        )
    }

    /// Short tag used by row storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolTxState::Pending => "pend",
            PoolTxState::Forging => "fing",
            PoolTxState::Forged => "fged",
            PoolTxState::Invalid => "invl",
        }
    }
}

impl fmt::Display for PoolTxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction kind, derived from the recipient fields at admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxType {
    /// Transfer to a registered account.
    Transfer,
    /// Transfer to an Ethereum address with no account yet.
    TransferToEthAddr,
    /// Transfer to a BabyJubJub key with no account yet.
    TransferToBjj,
    /// Withdrawal to the base chain.
    Exit,
}

impl TxType {
    /// Derives the kind from the recipient fields.
    ///
    /// # Errors
    /// - `MalformedTransaction` if the combination names no kind
    pub fn derive(
        to_idx: Idx,
        to_eth_addr: Option<&Address>,
        to_bjj: Option<&PublicKey>,
    ) -> Result<Self, PoolError> {
        if to_idx >= Idx::USER_THRESHOLD {
            return Ok(TxType::Transfer);
        }
        if to_idx == Idx::EXIT {
            return Ok(TxType::Exit);
        }
        if to_idx == Idx::UNREGISTERED {
            return match (to_eth_addr, to_bjj) {
                (_, Some(_)) => Ok(TxType::TransferToBjj),
                (Some(_), None) => Ok(TxType::TransferToEthAddr),
                (None, None) => Err(PoolError::MalformedTransaction(
                    "unregistered recipient needs an address or key".into(),
                )),
            };
        }
        Err(PoolError::MalformedTransaction(format!(
            "recipient index {} is reserved",
            to_idx
        )))
    }
}

/// The fields of the transaction an atomic member requires.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFields {
    pub from_idx: Idx,
    pub to_idx: Idx,
    pub token_id: TokenId,
    pub amount: U256,
    pub fee: FeeSelector,
    pub nonce: Nonce,
}

/// Relative position of the requested transaction, as its 3-bit code.
///
/// Codes `1..=3` mean `+1..=+3`, codes `4..=7` mean `-4..=-1`. Code `0`
/// means no request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestOffset(u8);

impl RequestOffset {
    pub const NONE: RequestOffset = RequestOffset(0);

    pub fn from_code(code: u8) -> Option<Self> {
        (code <= 7).then_some(Self(code))
    }

    pub fn from_relative(relative: i8) -> Option<Self> {
        match relative {
            1..=3 => Some(Self(relative as u8)),
            -4..=-1 => Some(Self((8 + relative) as u8)),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        self.0
    }

    /// Relative position, or `None` for code 0.
    pub fn relative(&self) -> Option<i8> {
        match self.0 {
            0 => None,
            c @ 1..=3 => Some(c as i8),
            c => Some(c as i8 - 8),
        }
    }

    /// Absolute position requested by the member at `position`, if inside
    /// a group of `size`.
    pub fn target(&self, position: usize, size: usize) -> Option<usize> {
        let target = position as i64 + i64::from(self.relative()?);
        (0..size as i64).contains(&target).then_some(target as usize)
    }
}

/// Where a transaction sits inside its atomic group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomicMembership {
    pub group_id: AtomicGroupId,
    pub position: u8,
    pub group_size: u8,
}

/// A transaction held by the pool.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolL2Tx {
    /// `sha256(canonical_bytes ‖ signature)`, set at admission.
    pub id: TxId,
    pub from_idx: Idx,
    pub to_idx: Idx,
    pub to_eth_addr: Option<Address>,
    pub to_bjj: Option<PublicKey>,
    pub token_id: TokenId,
    pub amount: U256,
    pub fee: FeeSelector,
    pub nonce: Nonce,
    pub state: PoolTxState,
    /// Present iff `state == Forged`.
    pub batch_num: Option<BatchNum>,
    /// Last forged batch when the row became `Invalid`.
    pub invalidated_at: Option<BatchNum>,
    pub atomic: Option<AtomicMembership>,
    pub rq: Option<RequestFields>,
    pub rq_offset: RequestOffset,
    /// Last batch this transaction may be forged in.
    pub max_num_batch: Option<BatchNum>,
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
    /// Insertion time (ms).
    pub timestamp: Timestamp,
    pub tx_type: TxType,
    /// Why the transaction was last passed over by selection.
    pub info: Option<String>,
}

impl PoolL2Tx {
    /// Unsigned transfer to a registered account.
    pub fn new_transfer(
        from_idx: Idx,
        to_idx: Idx,
        token_id: TokenId,
        amount: U256,
        fee: FeeSelector,
        nonce: Nonce,
    ) -> Self {
        Self {
            id: TxId::default(),
            from_idx,
            to_idx,
            to_eth_addr: None,
            to_bjj: None,
            token_id,
            amount,
            fee,
            nonce,
            state: PoolTxState::Pending,
            batch_num: None,
            invalidated_at: None,
            atomic: None,
            rq: None,
            rq_offset: RequestOffset::NONE,
            max_num_batch: None,
            signature: [0u8; 64],
            timestamp: 0,
            tx_type: TxType::Transfer,
            info: None,
        }
    }

    /// The fields another member must carry to request this transaction.
    pub fn as_request(&self) -> RequestFields {
        RequestFields {
            from_idx: self.from_idx,
            to_idx: self.to_idx,
            token_id: self.token_id,
            amount: self.amount,
            fee: self.fee,
            nonce: self.nonce,
        }
    }

    /// Fixed-width big-endian encoding of every signed field.
    ///
    /// # Errors
    /// - a `CodecError` if `amount` or `rq.amount` is not representable
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(CANONICAL_LEN);
        out.extend_from_slice(&self.from_idx.to_bytes());
        out.extend_from_slice(&self.to_idx.to_bytes());
        out.extend_from_slice(&self.token_id.to_be_bytes());
        out.extend_from_slice(&Float16::nearest(self.amount)?.to_bytes());
        out.push(self.fee.0);
        out.extend_from_slice(&nonce_to_bytes(self.nonce));
        out.extend_from_slice(&self.to_eth_addr.unwrap_or_default());
        out.extend_from_slice(&self.to_bjj.unwrap_or_default());
        let max_num_batch = self.max_num_batch.unwrap_or(0) as u32;
        out.extend_from_slice(&max_num_batch.to_be_bytes());

        match &self.rq {
            Some(rq) => {
                out.extend_from_slice(&rq.from_idx.to_bytes());
                out.extend_from_slice(&rq.to_idx.to_bytes());
                out.extend_from_slice(&rq.token_id.to_be_bytes());
                out.extend_from_slice(&Float16::nearest(rq.amount)?.to_bytes());
                out.push(rq.fee.0);
                out.extend_from_slice(&nonce_to_bytes(rq.nonce));
            }
            None => out.extend_from_slice(&[0u8; 25]),
        }
        out.push(self.rq_offset.code());
        Ok(out)
    }

    /// Message the sender signs.
    pub fn hash_to_sign(&self) -> Result<Hash, CodecError> {
        Ok(Sha256::digest(self.canonical_bytes()?).into())
    }

    /// Content-derived id over the signed fields and the signature.
    pub fn compute_id(&self) -> Result<TxId, CodecError> {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_bytes()?);
        hasher.update(self.signature);
        Ok(TxId(hasher.finalize().into()))
    }

    /// Fee paid, as an amount of the transferred token.
    pub fn absolute_fee(&self) -> Result<U256, CodecError> {
        self.fee.fee_amount(self.amount)
    }

    pub fn group_id(&self) -> Option<AtomicGroupId> {
        self.atomic.map(|m| m.group_id)
    }

    pub fn is_pending(&self) -> bool {
        self.state == PoolTxState::Pending
    }

    /// Whether the transaction has passed its last allowed batch.
    pub fn is_expired_for(&self, batch_num: BatchNum) -> bool {
        self.max_num_batch.is_some_and(|max| max < batch_num)
    }
}
