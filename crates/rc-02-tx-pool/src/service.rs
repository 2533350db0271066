//! # Transaction Pool Service
//!
//! Lifecycle controller: owns the in-memory [`PoolStore`] behind a single
//! lock and drives every mutation through the persistent store.
//!
//! ## Mutation Flow
//!
//! ```text
//! write lock ──→ plan_*() ──→ TxStore::commit() ──→ PoolStore::apply()
//!                                   │
//!                                   └── error ──→ memory untouched
//! ```
//!
//! Admission checks that need no pool state (field widths, codec,
//! signature) run before the lock is taken.

use crate::adapters::{Ed25519SignatureVerifier, InMemoryTxStore, NoOpPublisher};
use crate::config::{ConfigError, PoolConfig};
use crate::domain::atomic::assemble_group;
use crate::domain::{
    AdmissionPlan, AtomicGroupId, BatchNum, Changeset, Idx, IdxNonce, NonceSnapshot,
    PoolError, PoolL2Tx, PoolStatus, PoolStore, PoolTxState, SelectionEngine, Timestamp, TxId,
    TxType, MAX_NONCE,
};
use crate::ports::inbound::TxPoolApi;
use crate::ports::outbound::{
    AccountProvider, GossipPublisher, SignatureVerifier, SystemTimeSource, TimeSource, TxStore,
};
use parking_lot::RwLock;
use rc_01_amount_codec::ensure_representable;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Span};

/// Collaborators of the pool service.
#[derive(Clone)]
pub struct PoolDependencies {
    pub store: Arc<dyn TxStore>,
    pub accounts: Arc<dyn AccountProvider>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub publisher: Arc<dyn GossipPublisher>,
    pub time: Arc<dyn TimeSource>,
}

impl PoolDependencies {
    /// In-memory store, Ed25519 verification, no gossip, system clock.
    pub fn in_memory(accounts: Arc<dyn AccountProvider>) -> Self {
        Self {
            store: Arc::new(InMemoryTxStore::new()),
            accounts,
            verifier: Arc::new(Ed25519SignatureVerifier),
            publisher: Arc::new(NoOpPublisher),
            time: Arc::new(SystemTimeSource),
        }
    }
}

/// Where an admitted transaction came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    Local,
    Gossip,
}

/// The transaction pool service.
pub struct TxPoolService {
    pool: RwLock<PoolStore>,
    deps: PoolDependencies,
    span: Span,
}

impl TxPoolService {
    /// Creates an empty pool. Events are emitted under `span`; pass
    /// `Span::none()` to discard them.
    pub fn new(
        config: PoolConfig,
        deps: PoolDependencies,
        span: Span,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            parent: &span,
            max_txs = config.max_txs,
            safety_period = config.safety_period,
            max_batch_size = config.max_batch_size,
            "Transaction pool initialized"
        );
        Ok(Self {
            pool: RwLock::new(PoolStore::new(config)),
            deps,
            span,
        })
    }

    pub fn config(&self) -> PoolConfig {
        self.pool.read().config().clone()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Replaces the in-memory pool with the rows held by the store.
    ///
    /// Returns the number of rows loaded.
    pub fn recover(&self) -> Result<usize, PoolError> {
        let rows = self.deps.store.load_all()?;
        let loaded = rows.len();
        let mut pool = self.pool.write();
        let config = pool.config().clone();
        *pool = PoolStore::from_rows(config, rows);
        info!(
            parent: &self.span,
            loaded,
            pending = pool.count(PoolTxState::Pending),
            last_forged_batch = pool.last_forged_batch(),
            "Pool recovered from store"
        );
        Ok(loaded)
    }

    /// Purge as of `now`. Returns the number of rows deleted.
    pub fn purge_at(&self, now: Timestamp) -> Result<usize, PoolError> {
        let mut pool = self.pool.write();
        let changeset = pool.plan_purge(now);
        let deleted = changeset.deletes.len();
        self.commit(&mut pool, changeset)?;
        if deleted > 0 {
            info!(parent: &self.span, deleted, "Purged transactions");
        }
        Ok(deleted)
    }

    // =========================================================================
    // ADMISSION
    // =========================================================================

    fn admit(&self, tx: PoolL2Tx, origin: Origin) -> Result<TxId, PoolError> {
        let tx = self
            .prepare(tx, self.deps.time.now())
            .inspect_err(|e| self.log_rejection(e))?;
        let id = tx.id;
        let published = (origin == Origin::Local).then(|| tx.clone());

        {
            let mut pool = self.pool.write();
            match pool.plan_add(tx).inspect_err(|e| self.log_rejection(e))? {
                AdmissionPlan::Insert(changeset) => self.commit(&mut pool, changeset)?,
                AdmissionPlan::RejectAndInvalidate { changeset, error } => {
                    let invalidated = changeset.upserts.len();
                    self.commit(&mut pool, changeset)?;
                    warn!(
                        parent: &self.span,
                        tx_id = %id,
                        invalidated,
                        error = %error,
                        "Atomic group contradicted, gathered members invalidated"
                    );
                    return Err(error);
                }
            }
        }

        debug!(parent: &self.span, tx_id = %id, ?origin, "Transaction admitted");
        if let Some(tx) = published {
            self.publish(&tx);
        }
        Ok(id)
    }

    /// Checks everything that does not depend on pool contents and returns
    /// the row to insert.
    fn prepare(&self, mut tx: PoolL2Tx, now: Timestamp) -> Result<PoolL2Tx, PoolError> {
        check_idx("sender", tx.from_idx)?;
        check_idx("recipient", tx.to_idx)?;
        if tx.from_idx < Idx::USER_THRESHOLD {
            return Err(PoolError::MalformedTransaction(format!(
                "sender {} is not a user account",
                tx.from_idx
            )));
        }
        if tx.nonce > MAX_NONCE {
            return Err(PoolError::NonceOverflow(tx.nonce));
        }
        if let Some(rq) = &tx.rq {
            check_idx("requested sender", rq.from_idx)?;
            check_idx("requested recipient", rq.to_idx)?;
            if rq.nonce > MAX_NONCE {
                return Err(PoolError::NonceOverflow(rq.nonce));
            }
            ensure_representable(rq.amount)?;
        }
        ensure_representable(tx.amount)?;
        tx.absolute_fee()?;
        tx.tx_type = TxType::derive(tx.to_idx, tx.to_eth_addr.as_ref(), tx.to_bjj.as_ref())?;

        let claimed = tx.id;
        tx.id = tx.compute_id()?;
        if claimed != TxId::default() && claimed != tx.id {
            return Err(PoolError::MalformedTransaction(format!(
                "id {} does not match content {}",
                claimed, tx.id
            )));
        }

        let account = self
            .deps
            .accounts
            .account(tx.from_idx)?
            .ok_or(PoolError::UnknownAccount(tx.from_idx.0))?;
        if account.token_id != tx.token_id {
            return Err(PoolError::MalformedTransaction(format!(
                "token {} does not match sender token {}",
                tx.token_id, account.token_id
            )));
        }
        let message = tx.hash_to_sign()?;
        if !self
            .deps
            .verifier
            .verify(&message, &tx.signature, &account.public_key)
        {
            return Err(PoolError::InvalidSignature(tx.id));
        }

        tx.state = PoolTxState::Pending;
        tx.batch_num = None;
        tx.invalidated_at = None;
        tx.info = None;
        tx.timestamp = now;
        Ok(tx)
    }

    fn publish(&self, tx: &PoolL2Tx) {
        if let Err(e) = self.deps.publisher.publish(tx) {
            warn!(parent: &self.span, tx_id = %tx.id, error = %e, "Gossip publish failed");
        }
    }

    fn log_rejection(&self, error: &PoolError) {
        debug!(
            parent: &self.span,
            error = %error,
            permanent = error.is_permanent(),
            "Transaction rejected"
        );
    }

    // =========================================================================
    // COMMIT
    // =========================================================================

    /// Persists `changeset` and, only if that succeeds, applies it.
    fn commit(&self, pool: &mut PoolStore, changeset: Changeset) -> Result<(), PoolError> {
        if changeset.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.deps.store.commit(&changeset) {
            error!(
                parent: &self.span,
                rows = changeset.len(),
                error = %e,
                "Store commit failed, pool unchanged"
            );
            return Err(e.into());
        }
        pool.apply(changeset);
        Ok(())
    }

    fn nonce_snapshot(&self, senders: Vec<Idx>) -> Result<NonceSnapshot, PoolError> {
        let mut snapshot = NonceSnapshot::new();
        for idx in senders {
            if let Some(nonce) = self.deps.accounts.current_nonce(idx)? {
                snapshot.insert(idx, nonce);
            }
        }
        Ok(snapshot)
    }
}

fn check_idx(role: &str, idx: Idx) -> Result<(), PoolError> {
    if idx.is_valid() {
        Ok(())
    } else {
        Err(PoolError::MalformedTransaction(format!(
            "{} index {} exceeds 48 bits",
            role, idx
        )))
    }
}

impl TxPoolApi for TxPoolService {
    fn add_tx(&self, tx: PoolL2Tx) -> Result<TxId, PoolError> {
        self.admit(tx, Origin::Local)
    }

    fn add_gossiped_tx(&self, tx: PoolL2Tx) -> Result<TxId, PoolError> {
        self.admit(tx, Origin::Gossip)
    }

    fn add_atomic_group(&self, txs: Vec<PoolL2Tx>) -> Result<AtomicGroupId, PoolError> {
        let max_group_size = self.pool.read().config().max_atomic_group_size;
        let now = self.deps.time.now();
        let (txs, group_id) =
            assemble_group(txs, max_group_size).inspect_err(|e| self.log_rejection(e))?;
        let txs = txs
            .into_iter()
            .map(|tx| self.prepare(tx, now))
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|e| self.log_rejection(e))?;

        {
            let mut pool = self.pool.write();
            let changeset = pool
                .plan_add_group(txs.clone())
                .inspect_err(|e| self.log_rejection(e))?;
            self.commit(&mut pool, changeset)?;
        }

        debug!(
            parent: &self.span,
            group_id = %group_id,
            members = txs.len(),
            "Atomic group admitted"
        );
        for tx in &txs {
            self.publish(tx);
        }
        Ok(group_id)
    }

    fn get_tx(&self, id: &TxId) -> Result<PoolL2Tx, PoolError> {
        self.pool
            .read()
            .get(id)
            .cloned()
            .ok_or(PoolError::TransactionNotFound(*id))
    }

    fn get_pending_txs(&self) -> Vec<PoolL2Tx> {
        self.pool
            .read()
            .pending_txs()
            .into_iter()
            .cloned()
            .collect()
    }

    fn get_atomic_group(&self, id: &AtomicGroupId) -> Result<Vec<PoolL2Tx>, PoolError> {
        let pool = self.pool.read();
        let group = pool.group(id).ok_or(PoolError::GroupNotFound(*id))?;
        Ok(group
            .members()
            .iter()
            .filter_map(|member| pool.get(member).cloned())
            .collect())
    }

    fn pending_from_idxs(&self) -> Vec<Idx> {
        self.pool.read().pending_from_idxs()
    }

    fn select_batch(&self, max_size: usize) -> Result<Vec<PoolL2Tx>, PoolError> {
        let mut pool = self.pool.write();
        let max_size = max_size.min(pool.config().max_batch_size);
        let batch_num = pool.last_forged_batch() + 1;
        let nonces = self.nonce_snapshot(pool.pending_from_idxs())?;

        let outcome = SelectionEngine::new(&pool).select(&nonces, max_size, batch_num);

        let stale: Vec<TxId> = outcome.stale.iter().map(|(id, _)| *id).collect();
        let info: Vec<(TxId, String)> = outcome
            .deferred
            .iter()
            .map(|(id, reason)| (*id, format!("BatchNum: {}. {}", batch_num, reason)))
            .collect();

        let mut changeset = pool.plan_invalidate(&stale);
        changeset.merge(pool.plan_info(&info));
        changeset.merge(pool.plan_start_forging(&outcome.selected)?);
        self.commit(&mut pool, changeset)?;

        let selected: Vec<PoolL2Tx> = outcome
            .selected
            .iter()
            .filter_map(|id| pool.get(id).cloned())
            .collect();
        info!(
            parent: &self.span,
            batch_num,
            selected = selected.len(),
            stale = outcome.stale.len(),
            deferred = outcome.deferred.len(),
            "Batch selected"
        );
        Ok(selected)
    }

    fn start_forging(&self, ids: &[TxId]) -> Result<(), PoolError> {
        let mut pool = self.pool.write();
        let changeset = pool.plan_start_forging(ids)?;
        self.commit(&mut pool, changeset)
    }

    fn done_forging(&self, ids: &[TxId], batch_num: BatchNum) -> Result<(), PoolError> {
        let mut pool = self.pool.write();
        let changeset = pool.plan_done_forging(ids, batch_num)?;
        self.commit(&mut pool, changeset)?;
        info!(parent: &self.span, batch_num, forged = ids.len(), "Batch forged");
        Ok(())
    }

    fn invalidate_txs(&self, ids: &[TxId]) -> Result<Vec<TxId>, PoolError> {
        let mut pool = self.pool.write();
        let changeset = pool.plan_invalidate(ids);
        let invalidated = changeset.upserted_ids();
        self.commit(&mut pool, changeset)?;
        if !invalidated.is_empty() {
            info!(
                parent: &self.span,
                requested = ids.len(),
                invalidated = invalidated.len(),
                "Transactions invalidated"
            );
        }
        Ok(invalidated)
    }

    fn check_nonces(&self, accounts: &[IdxNonce]) -> Result<Vec<TxId>, PoolError> {
        let mut pool = self.pool.write();
        let changeset = pool.plan_check_nonces(accounts);
        let invalidated = changeset.upserted_ids();
        self.commit(&mut pool, changeset)?;
        if !invalidated.is_empty() {
            info!(
                parent: &self.span,
                accounts = accounts.len(),
                invalidated = invalidated.len(),
                "Stale nonces invalidated"
            );
        }
        Ok(invalidated)
    }

    fn reorg(&self, last_valid_batch: BatchNum) -> Result<Vec<TxId>, PoolError> {
        let mut pool = self.pool.write();
        let changeset = pool.plan_reorg(last_valid_batch).inspect_err(|e| {
            warn!(parent: &self.span, batch_num = last_valid_batch, error = %e, "Reorg refused");
        })?;
        let reverted = changeset.upserted_ids();
        self.commit(&mut pool, changeset)?;
        info!(
            parent: &self.span,
            batch_num = last_valid_batch,
            reverted = reverted.len(),
            "Reorg applied"
        );
        Ok(reverted)
    }

    fn purge(&self) -> Result<usize, PoolError> {
        self.purge_at(self.deps.time.now())
    }

    fn status(&self) -> PoolStatus {
        self.pool.read().status(self.deps.time.now())
    }
}
