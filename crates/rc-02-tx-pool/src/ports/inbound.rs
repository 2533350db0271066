//! # Inbound Port - TxPoolApi
//!
//! Primary driving port of the transaction pool.
//!
//! | Method | Caller |
//! |--------|--------|
//! | `add_tx`, `add_atomic_group` | API surface (local submissions) |
//! | `add_gossiped_tx` | Gossip ingest task |
//! | `select_batch`, `done_forging`, `invalidate_txs` | Batch builder |
//! | `reorg` | Base-chain synchronizer |
//! | `purge` | Purge task |

use crate::domain::{
    AtomicGroupId, BatchNum, IdxNonce, Idx, PoolError, PoolL2Tx, PoolStatus, TxId,
};

/// Primary API of the transaction pool.
pub trait TxPoolApi: Send + Sync {
    /// Admits a locally submitted transaction and gossips it.
    ///
    /// # Errors
    /// - `DuplicateTx`, `InvalidSignature`, `InvalidAmount`,
    ///   `MalformedAtomicGroup`, `MalformedTransaction`, `NonceOverflow`,
    ///   `UnknownAccount`
    /// - `Store` if the row could not be persisted
    fn add_tx(&self, tx: PoolL2Tx) -> Result<TxId, PoolError>;

    /// Admits a transaction received from a peer. Never republished.
    fn add_gossiped_tx(&self, tx: PoolL2Tx) -> Result<TxId, PoolError>;

    /// Admits an ordered atomic group, all members or none.
    fn add_atomic_group(&self, txs: Vec<PoolL2Tx>) -> Result<AtomicGroupId, PoolError>;

    fn get_tx(&self, id: &TxId) -> Result<PoolL2Tx, PoolError>;

    /// Pending transactions, oldest first.
    fn get_pending_txs(&self) -> Vec<PoolL2Tx>;

    /// Members of an atomic group in position order.
    fn get_atomic_group(&self, id: &AtomicGroupId) -> Result<Vec<PoolL2Tx>, PoolError>;

    /// Senders with at least one Pending transaction.
    fn pending_from_idxs(&self) -> Vec<Idx>;

    /// Selects the next batch and marks it Forging.
    fn select_batch(&self, max_size: usize) -> Result<Vec<PoolL2Tx>, PoolError>;

    /// `Pending → Forging` for exactly `ids`.
    fn start_forging(&self, ids: &[TxId]) -> Result<(), PoolError>;

    /// `Forging → Forged` in `batch_num`.
    fn done_forging(&self, ids: &[TxId], batch_num: BatchNum) -> Result<(), PoolError>;

    /// Marks transactions Invalid. Returns the ids that changed.
    fn invalidate_txs(&self, ids: &[TxId]) -> Result<Vec<TxId>, PoolError>;

    /// Invalidates Pending transactions below their account's nonce.
    fn check_nonces(&self, accounts: &[IdxNonce]) -> Result<Vec<TxId>, PoolError>;

    /// Reverts batches after `last_valid_batch`. Returns reverted ids.
    fn reorg(&self, last_valid_batch: BatchNum) -> Result<Vec<TxId>, PoolError>;

    /// Deletes rows due for removal now. Returns the number deleted.
    fn purge(&self) -> Result<usize, PoolError>;

    fn status(&self) -> PoolStatus;
}
