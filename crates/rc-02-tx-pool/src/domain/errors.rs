//! Transaction pool error types.
//!
//! Errors fall in three families:
//!
//! | Kind | Meaning | Caller action |
//! |------|---------|---------------|
//! | Admission | Submission refused, nothing stored | Report to the submitter |
//! | Consistency | Lifecycle call on rows in the wrong state | Treat as a bug |
//! | Transient | Collaborator unavailable | Retry with backoff |

use super::entities::{AtomicGroupId, BatchNum, PoolTxState, TxId};
use rc_01_amount_codec::CodecError;
use thiserror::Error;

/// Failure reported by the persistent store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store write failed: {0}")]
    WriteFailed(String),
}

/// Error family, see the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Admission,
    Consistency,
    Transient,
}

/// All errors the pool reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    // ---- admission ----
    /// A transaction with the same id is already held.
    #[error("Duplicate transaction {0}")]
    DuplicateTx(TxId),

    /// Signature does not verify against the sender's key.
    #[error("Invalid signature on transaction {0}")]
    InvalidSignature(TxId),

    /// Amount cannot be carried by the 16-bit encoding.
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] CodecError),

    /// Atomic group shape or request fields are wrong.
    #[error("Malformed atomic group: {0}")]
    MalformedAtomicGroup(String),

    /// Transaction fields are inconsistent.
    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    /// Nonce does not fit in 48 bits.
    #[error("Nonce {0} exceeds the 48-bit range")]
    NonceOverflow(u64),

    /// Sender account is not known to the account provider.
    #[error("Unknown sender account {0}")]
    UnknownAccount(u64),

    // ---- consistency ----
    #[error("Transaction {id} is {state}, expected pend")]
    NotPending { id: TxId, state: PoolTxState },

    #[error("Transaction {id} is {state}, expected fing")]
    NotForging { id: TxId, state: PoolTxState },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TxId),

    #[error("Atomic group not found: {0}")]
    GroupNotFound(AtomicGroupId),

    /// Lifecycle call names only part of an atomic group.
    #[error("Atomic group {0} must transition as a whole")]
    PartialAtomicGroup(AtomicGroupId),

    #[error("Reorg to batch {requested} is deeper than {safety_period} batches below {last_forged}")]
    ReorgTooDeep {
        requested: BatchNum,
        last_forged: BatchNum,
        safety_period: u64,
    },

    // ---- transient ----
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Account provider error: {0}")]
    AccountProvider(String),
}

impl PoolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::DuplicateTx(_)
            | PoolError::InvalidSignature(_)
            | PoolError::InvalidAmount(_)
            | PoolError::MalformedAtomicGroup(_)
            | PoolError::MalformedTransaction(_)
            | PoolError::NonceOverflow(_)
            | PoolError::UnknownAccount(_) => ErrorKind::Admission,
            PoolError::NotPending { .. }
            | PoolError::NotForging { .. }
            | PoolError::TransactionNotFound(_)
            | PoolError::GroupNotFound(_)
            | PoolError::PartialAtomicGroup(_)
            | PoolError::ReorgTooDeep { .. } => ErrorKind::Consistency,
            PoolError::Store(_) | PoolError::AccountProvider(_) => ErrorKind::Transient,
        }
    }

    /// True when resubmitting the same transaction can never succeed.
    ///
    /// An unknown sender may be registered later, and a duplicate is
    /// already held, so neither counts.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            PoolError::InvalidSignature(_)
                | PoolError::InvalidAmount(_)
                | PoolError::MalformedAtomicGroup(_)
                | PoolError::MalformedTransaction(_)
                | PoolError::NonceOverflow(_)
        )
    }
}
