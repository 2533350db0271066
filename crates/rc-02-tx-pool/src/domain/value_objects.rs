//! Value objects exchanged between the pool store, the selection engine and
//! the service.

use super::entities::{BatchNum, Idx, Nonce, PoolL2Tx, TxId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Row changes produced by a planned mutation.
///
/// A changeset is committed to the persistent store first and applied to
/// the in-memory pool afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Changeset {
    /// Rows to insert or overwrite.
    pub upserts: Vec<PoolL2Tx>,
    /// Rows to delete.
    pub deletes: Vec<TxId>,
    /// New highest forged batch, if it moves.
    pub last_forged_batch: Option<BatchNum>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty() && self.last_forged_batch.is_none()
    }

    /// Number of rows touched.
    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }

    pub fn upserted_ids(&self) -> Vec<TxId> {
        self.upserts.iter().map(|tx| tx.id).collect()
    }

    /// Folds `other` into `self`. Later upserts of the same id win.
    pub fn merge(&mut self, other: Changeset) {
        for tx in other.upserts {
            match self.upserts.iter_mut().find(|t| t.id == tx.id) {
                Some(existing) => *existing = tx,
                None => self.upserts.push(tx),
            }
        }
        for id in other.deletes {
            if !self.deletes.contains(&id) {
                self.deletes.push(id);
            }
        }
        if other.last_forged_batch.is_some() {
            self.last_forged_batch = other.last_forged_batch;
        }
    }
}

/// Account index with its current nonce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdxNonce {
    pub idx: Idx,
    pub nonce: Nonce,
}

/// Per-account nonces at the moment a batch is composed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NonceSnapshot {
    nonces: HashMap<Idx, Nonce>,
}

impl NonceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, idx: Idx, nonce: Nonce) {
        self.nonces.insert(idx, nonce);
    }

    pub fn get(&self, idx: Idx) -> Option<Nonce> {
        self.nonces.get(&idx).copied()
    }

    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }
}

impl FromIterator<(Idx, Nonce)> for NonceSnapshot {
    fn from_iter<I: IntoIterator<Item = (Idx, Nonce)>>(iter: I) -> Self {
        Self {
            nonces: iter.into_iter().collect(),
        }
    }
}

/// Why selection passed over a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The account provider does not know the sender.
    SenderUnknown,
    /// Nonce is ahead of the account's cursor.
    NonceAhead { expected: Nonce, got: Nonce },
    /// Batch filled before the unit was reached.
    BatchFull,
    /// Atomic group is larger than the space left.
    GroupDoesNotFit { size: usize, remaining: usize },
    /// Another member of the atomic group could not be placed.
    GroupMemberBlocked,
    /// Nonce is below the account's cursor.
    NonceBelowAccount { expected: Nonce, got: Nonce },
    /// `max_num_batch` is before the batch being built.
    Expired { max_num_batch: BatchNum },
}

impl SkipReason {
    /// Stale transactions can never be selected again.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            SkipReason::NonceBelowAccount { .. } | SkipReason::Expired { .. }
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SenderUnknown => write!(f, "Sender account not found"),
            SkipReason::NonceAhead { expected, got } => {
                write!(f, "Nonce {} ahead of account nonce {}", got, expected)
            }
            SkipReason::BatchFull => write!(f, "Batch full"),
            SkipReason::GroupDoesNotFit { size, remaining } => write!(
                f,
                "Atomic group of {} does not fit in {} remaining slots",
                size, remaining
            ),
            SkipReason::GroupMemberBlocked => write!(f, "Atomic group member not selectable"),
            SkipReason::NonceBelowAccount { expected, got } => {
                write!(f, "Nonce {} below account nonce {}", got, expected)
            }
            SkipReason::Expired { max_num_batch } => {
                write!(f, "MaxNumBatch {} exceeded", max_num_batch)
            }
        }
    }
}

/// Result of one selection run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionOutcome {
    /// Accepted ids in selection order.
    pub selected: Vec<TxId>,
    /// Candidates that can never be selected, to be invalidated.
    pub stale: Vec<(TxId, SkipReason)>,
    /// Candidates kept pending for a later batch.
    pub deferred: Vec<(TxId, SkipReason)>,
}

/// Pool statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub pending_count: usize,
    pub forging_count: usize,
    pub forged_count: usize,
    pub invalid_count: usize,
    pub atomic_group_count: usize,
    pub last_forged_batch: BatchNum,
    pub oldest_pending_age_ms: u64,
}

impl PoolStatus {
    pub fn total(&self) -> usize {
        self.pending_count + self.forging_count + self.forged_count + self.invalid_count
    }
}
