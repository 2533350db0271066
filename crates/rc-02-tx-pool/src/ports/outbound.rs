//! Outbound (driven) ports for the transaction pool.
//!
//! These traits define the collaborators the pool depends on but does not
//! own.

use crate::domain::{
    Account, Changeset, Hash, Idx, Nonce, PoolError, PoolL2Tx, PoolTxState, PublicKey,
    Signature, StoreError, Timestamp, TokenId, TxId, U256,
};
use thiserror::Error;

/// Read-only account snapshot supplied by the base-chain synchronizer.
///
/// Eventually consistent with confirmed base-chain state.
pub trait AccountProvider: Send + Sync {
    /// Looks up an account. `Ok(None)` if it does not exist.
    fn account(&self, idx: Idx) -> Result<Option<Account>, PoolError>;

    /// Current nonce of an account.
    fn current_nonce(&self, idx: Idx) -> Result<Option<Nonce>, PoolError> {
        Ok(self.account(idx)?.map(|a| a.nonce))
    }

    /// Balance of an account in `token_id`; zero for another token.
    fn balance(&self, idx: Idx, token_id: TokenId) -> Result<Option<U256>, PoolError> {
        Ok(self.account(idx)?.map(|a| {
            if a.token_id == token_id {
                a.balance
            } else {
                U256::zero()
            }
        }))
    }
}

/// Durable row storage keyed by transaction id.
pub trait TxStore: Send + Sync {
    /// Applies a changeset atomically: every row or none.
    fn commit(&self, changeset: &Changeset) -> Result<(), StoreError>;

    /// All stored rows, for recovery.
    fn load_all(&self) -> Result<Vec<PoolL2Tx>, StoreError>;

    fn get(&self, id: &TxId) -> Result<Option<PoolL2Tx>, StoreError>;

    /// Ids of one sender's rows in one state.
    fn ids_by_account_state(
        &self,
        idx: Idx,
        state: PoolTxState,
    ) -> Result<Vec<TxId>, StoreError>;
}

/// Checks transaction signatures.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, message: &Hash, signature: &Signature, public_key: &PublicKey) -> bool;
}

/// Failure to hand a transaction to the gossip layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("Gossip layer not connected")]
    NotConnected,

    #[error("Gossip publish failed: {0}")]
    Internal(String),
}

/// Disseminates locally submitted transactions to peers.
pub trait GossipPublisher: Send + Sync {
    fn publish(&self, tx: &PoolL2Tx) -> Result<(), PublishError>;
}

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Returns the current timestamp in milliseconds.
    fn now(&self) -> Timestamp;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}
