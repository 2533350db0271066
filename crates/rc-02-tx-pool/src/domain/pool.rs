//! # Pool Store - Indices and Lifecycle State Machine
//!
//! In-memory view of every pool transaction.
//!
//! ## Data Structures
//!
//! - `by_id`: O(1) lookup by transaction id
//! - `by_account`: per-sender `(nonce, id)` set, all states
//! - `pending`: Pending rows ordered by insertion time (TTL eviction, listing)
//! - `forged_by_batch` / `invalid_by_batch`: terminal rows keyed by batch, so
//!   reorg and purge touch only the affected range
//! - `expiring`: Pending rows keyed by `max_num_batch`
//!
//! ## Plan / Apply
//!
//! Every mutation is split in two. A `plan_*` method validates against the
//! current state and returns a [`Changeset`] without touching anything;
//! [`PoolStore::apply`] then applies it. The service commits the changeset
//! to the persistent store between the two steps, so a failed commit leaves
//! memory untouched.

use super::atomic::{self, AtomicGroup, AtomicGroupRegistry, GroupStatus, MemberCheck};
use super::entities::{
    AtomicGroupId, BatchNum, Idx, Nonce, PoolL2Tx, PoolTxState, Timestamp, TxId,
};
use super::errors::PoolError;
use super::value_objects::{Changeset, IdxNonce, PoolStatus};
use crate::config::PoolConfig;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound::{Excluded, Unbounded};

/// What admitting a transaction would do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdmissionPlan {
    /// Store the transaction.
    Insert(Changeset),
    /// Refuse the transaction, and invalidate the atomic group it
    /// contradicts.
    RejectAndInvalidate {
        changeset: Changeset,
        error: PoolError,
    },
}

/// Indexed transaction store.
#[derive(Debug)]
pub struct PoolStore {
    config: PoolConfig,
    by_id: HashMap<TxId, PoolL2Tx>,
    by_account: HashMap<Idx, BTreeSet<(Nonce, TxId)>>,
    pending: BTreeSet<(Timestamp, TxId)>,
    forging: BTreeSet<TxId>,
    forged_by_batch: BTreeMap<BatchNum, BTreeSet<TxId>>,
    invalid_by_batch: BTreeMap<BatchNum, BTreeSet<TxId>>,
    expiring: BTreeMap<BatchNum, BTreeSet<TxId>>,
    groups: AtomicGroupRegistry,
    last_forged_batch: BatchNum,
}

impl PoolStore {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            by_id: HashMap::new(),
            by_account: HashMap::new(),
            pending: BTreeSet::new(),
            forging: BTreeSet::new(),
            forged_by_batch: BTreeMap::new(),
            invalid_by_batch: BTreeMap::new(),
            expiring: BTreeMap::new(),
            groups: AtomicGroupRegistry::new(),
            last_forged_batch: 0,
        }
    }

    /// Rebuilds indices and atomic groups from persisted rows.
    pub fn from_rows(config: PoolConfig, rows: Vec<PoolL2Tx>) -> Self {
        let last_forged_batch = rows
            .iter()
            .filter_map(|tx| tx.batch_num.or(tx.invalidated_at))
            .max()
            .unwrap_or(0);
        let mut pool = Self::new(config);
        pool.apply(Changeset {
            upserts: rows,
            deletes: Vec::new(),
            last_forged_batch: Some(last_forged_batch),
        });
        pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: &TxId) -> Option<&PoolL2Tx> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn last_forged_batch(&self) -> BatchNum {
        self.last_forged_batch
    }

    pub fn group(&self, id: &AtomicGroupId) -> Option<&AtomicGroup> {
        self.groups.get(id)
    }

    /// Number of rows in `state`.
    pub fn count(&self, state: PoolTxState) -> usize {
        match state {
            PoolTxState::Pending => self.pending.len(),
            PoolTxState::Forging => self.forging.len(),
            PoolTxState::Forged => self.forged_by_batch.values().map(BTreeSet::len).sum(),
            PoolTxState::Invalid => self.invalid_by_batch.values().map(BTreeSet::len).sum(),
        }
    }

    /// Pending rows, oldest first.
    pub fn pending_txs(&self) -> Vec<&PoolL2Tx> {
        self.pending
            .iter()
            .filter_map(|(_, id)| self.by_id.get(id))
            .collect()
    }

    /// Distinct senders with at least one Pending row, ascending.
    pub fn pending_from_idxs(&self) -> Vec<Idx> {
        let senders: BTreeSet<Idx> = self.pending_txs().iter().map(|tx| tx.from_idx).collect();
        senders.into_iter().collect()
    }

    /// Rows of one sender in one state, by nonce.
    pub fn account_txs(&self, idx: Idx, state: PoolTxState) -> Vec<&PoolL2Tx> {
        self.by_account
            .get(&idx)
            .into_iter()
            .flatten()
            .filter_map(|(_, id)| self.by_id.get(id))
            .filter(|tx| tx.state == state)
            .collect()
    }

    /// Members of a group if it may be handed to selection.
    ///
    /// Only `Complete` groups whose members are all Pending qualify.
    pub fn selectable_group(&self, id: &AtomicGroupId) -> Option<Vec<&PoolL2Tx>> {
        let group = self.groups.get(id)?;
        if group.status() != GroupStatus::Complete {
            return None;
        }
        let members: Vec<&PoolL2Tx> = group
            .members()
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .collect();
        (members.len() == group.size() && members.iter().all(|tx| tx.is_pending()))
            .then_some(members)
    }

    pub fn status(&self, now: Timestamp) -> PoolStatus {
        let oldest_pending_age_ms = self
            .pending
            .iter()
            .next()
            .map(|(ts, _)| now.saturating_sub(*ts))
            .unwrap_or(0);

        PoolStatus {
            pending_count: self.count(PoolTxState::Pending),
            forging_count: self.count(PoolTxState::Forging),
            forged_count: self.count(PoolTxState::Forged),
            invalid_count: self.count(PoolTxState::Invalid),
            atomic_group_count: self.groups.len(),
            last_forged_batch: self.last_forged_batch,
            oldest_pending_age_ms,
        }
    }

    // =========================================================================
    // PLANNING
    // =========================================================================

    /// Plans admission of a prepared Pending transaction.
    ///
    /// # Errors
    /// - `DuplicateTx` if the id is already held
    /// - `MalformedAtomicGroup` / `MalformedTransaction` for a bad group shape
    pub fn plan_add(&self, tx: PoolL2Tx) -> Result<AdmissionPlan, PoolError> {
        if self.contains(&tx.id) {
            return Err(PoolError::DuplicateTx(tx.id));
        }

        match self
            .groups
            .check_member(&tx, self.config.max_atomic_group_size, &self.by_id)?
        {
            MemberCheck::Accept => Ok(AdmissionPlan::Insert(Changeset {
                upserts: vec![tx],
                ..Default::default()
            })),
            MemberCheck::Poisoned { invalidate, reason } => {
                Ok(AdmissionPlan::RejectAndInvalidate {
                    changeset: self.invalidation(invalidate),
                    error: PoolError::MalformedAtomicGroup(reason),
                })
            }
        }
    }

    /// Plans admission of a whole assembled group. All members or none.
    pub fn plan_add_group(&self, txs: Vec<PoolL2Tx>) -> Result<Changeset, PoolError> {
        let group_id = txs
            .first()
            .and_then(PoolL2Tx::group_id)
            .ok_or_else(|| PoolError::MalformedAtomicGroup("empty group".into()))?;

        for tx in &txs {
            if self.contains(&tx.id) {
                return Err(PoolError::DuplicateTx(tx.id));
            }
            atomic::check_shape(tx, self.config.max_atomic_group_size)?;
        }
        if self.groups.get(&group_id).is_some() {
            return Err(PoolError::MalformedAtomicGroup(format!(
                "group {} already exists",
                group_id
            )));
        }
        let members: Vec<&PoolL2Tx> = txs.iter().collect();
        atomic::validate_group(&members, group_id).map_err(PoolError::MalformedAtomicGroup)?;

        Ok(Changeset {
            upserts: txs,
            ..Default::default()
        })
    }

    /// Invalidates Pending rows whose nonce is below the account's nonce.
    pub fn plan_check_nonces(&self, accounts: &[IdxNonce]) -> Changeset {
        let mut stale = Vec::new();
        for account in accounts {
            let Some(txs) = self.by_account.get(&account.idx) else {
                continue;
            };
            let below = txs.range(..(account.nonce, TxId::default()));
            stale.extend(
                below
                    .filter(|(_, id)| self.by_id.get(id).is_some_and(PoolL2Tx::is_pending))
                    .map(|(_, id)| *id),
            );
        }
        self.invalidation(stale)
    }

    /// `Pending → Forging` for exactly `ids`, all or nothing.
    ///
    /// # Errors
    /// - `TransactionNotFound` / `NotPending` for any id
    /// - `PartialAtomicGroup` if a group is not named as a whole
    pub fn plan_start_forging(&self, ids: &[TxId]) -> Result<Changeset, PoolError> {
        let mut changeset = Changeset::default();
        for tx in self.lifecycle_rows(ids)? {
            if tx.state != PoolTxState::Pending {
                return Err(PoolError::NotPending {
                    id: tx.id,
                    state: tx.state,
                });
            }
            changeset
                .upserts
                .push(self.transitioned(tx, PoolTxState::Forging, None));
        }
        Ok(changeset)
    }

    /// `Forging → Forged` in `batch_num`, all or nothing.
    ///
    /// # Errors
    /// - `TransactionNotFound` / `NotForging` for any id
    /// - `PartialAtomicGroup` if a group is not named as a whole
    pub fn plan_done_forging(
        &self,
        ids: &[TxId],
        batch_num: BatchNum,
    ) -> Result<Changeset, PoolError> {
        let mut changeset = Changeset::default();
        for tx in self.lifecycle_rows(ids)? {
            if tx.state != PoolTxState::Forging {
                return Err(PoolError::NotForging {
                    id: tx.id,
                    state: tx.state,
                });
            }
            changeset
                .upserts
                .push(self.transitioned(tx, PoolTxState::Forged, Some(batch_num)));
        }
        if batch_num > self.last_forged_batch {
            changeset.last_forged_batch = Some(batch_num);
        }
        Ok(changeset)
    }

    /// Invalidates Pending/Forging rows, expanded to whole atomic groups.
    ///
    /// Unknown ids and rows already Forged or Invalid are left alone.
    pub fn plan_invalidate(&self, ids: &[TxId]) -> Changeset {
        self.invalidation(ids.to_vec())
    }

    /// Reverts everything forged after `last_valid_batch`, and every
    /// Forging row, to Pending.
    ///
    /// # Errors
    /// - `ReorgTooDeep` if more than `safety_period` batches would be undone
    pub fn plan_reorg(&self, last_valid_batch: BatchNum) -> Result<Changeset, PoolError> {
        let depth = self.last_forged_batch.saturating_sub(last_valid_batch);
        if depth > self.config.safety_period {
            return Err(PoolError::ReorgTooDeep {
                requested: last_valid_batch,
                last_forged: self.last_forged_batch,
                safety_period: self.config.safety_period,
            });
        }

        let reverted = self
            .forged_by_batch
            .range((Excluded(last_valid_batch), Unbounded))
            .flat_map(|(_, ids)| ids.iter())
            .chain(self.forging.iter());

        let mut changeset = Changeset::default();
        for id in reverted {
            if let Some(tx) = self.by_id.get(id) {
                changeset
                    .upserts
                    .push(self.transitioned(tx, PoolTxState::Pending, None));
            }
        }
        if last_valid_batch < self.last_forged_batch {
            changeset.last_forged_batch = Some(last_valid_batch);
        }
        Ok(changeset)
    }

    /// Rows due for deletion at `now`.
    ///
    /// - Forged/Invalid rows more than `safety_period` batches old
    /// - Pending rows whose `max_num_batch` has passed
    /// - Oldest Pending rows past the TTL, while the pool is above `max_txs`
    pub fn plan_purge(&self, now: Timestamp) -> Changeset {
        let mut deleted: HashSet<TxId> = HashSet::new();
        let mut deletes = Vec::new();
        let mut push = |ids: Vec<TxId>, deletes: &mut Vec<TxId>| {
            for id in ids {
                if deleted.insert(id) {
                    deletes.push(id);
                }
            }
        };

        if let Some(horizon) = self
            .last_forged_batch
            .checked_sub(self.config.safety_period)
        {
            let aged = self
                .forged_by_batch
                .range(..horizon)
                .chain(self.invalid_by_batch.range(..horizon))
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect();
            push(aged, &mut deletes);
        }

        let expired: Vec<TxId> = self
            .expiring
            .range(..self.last_forged_batch)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        push(self.pending_closure(expired), &mut deletes);

        let ttl_ms = self.config.ttl_ms();
        for (timestamp, id) in &self.pending {
            if self.by_id.len().saturating_sub(deletes.len()) <= self.config.max_txs {
                break;
            }
            if now.saturating_sub(*timestamp) <= ttl_ms {
                break;
            }
            push(self.pending_closure(vec![*id]), &mut deletes);
        }

        Changeset {
            deletes,
            ..Default::default()
        }
    }

    /// Writes `info` onto Pending rows.
    pub fn plan_info(&self, entries: &[(TxId, String)]) -> Changeset {
        let upserts = entries
            .iter()
            .filter_map(|(id, info)| {
                let tx = self.by_id.get(id).filter(|tx| tx.is_pending())?;
                (tx.info.as_deref() != Some(info.as_str())).then(|| {
                    let mut tx = tx.clone();
                    tx.info = Some(info.clone());
                    tx
                })
            })
            .collect();
        Changeset {
            upserts,
            ..Default::default()
        }
    }

    // =========================================================================
    // APPLY
    // =========================================================================

    /// Applies a changeset produced by one of the `plan_*` methods.
    pub fn apply(&mut self, changeset: Changeset) {
        let mut touched: HashSet<AtomicGroupId> = HashSet::new();

        for id in changeset.deletes {
            if let Some(tx) = self.by_id.remove(&id) {
                self.unindex(&tx);
                self.groups.detach(&tx);
                touched.extend(tx.group_id());
            }
        }

        for tx in changeset.upserts {
            match self.by_id.remove(&tx.id) {
                Some(old) => self.unindex(&old),
                None => self.groups.attach(&tx),
            }
            self.index(&tx);
            touched.extend(tx.group_id());
            self.by_id.insert(tx.id, tx);
        }

        if let Some(batch_num) = changeset.last_forged_batch {
            self.last_forged_batch = batch_num;
        }

        for id in &touched {
            self.groups.refresh(id, &self.by_id);
        }
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// Resolves lifecycle ids and checks that groups are named whole.
    fn lifecycle_rows(&self, ids: &[TxId]) -> Result<Vec<&PoolL2Tx>, PoolError> {
        let named: HashSet<TxId> = ids.iter().copied().collect();
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(named.len());

        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            let tx = self
                .by_id
                .get(id)
                .ok_or(PoolError::TransactionNotFound(*id))?;
            if let Some(group_id) = tx.group_id() {
                let whole = self.groups.get(&group_id).is_some_and(|g| {
                    g.is_full() && g.members().iter().all(|m| named.contains(m))
                });
                if !whole {
                    return Err(PoolError::PartialAtomicGroup(group_id));
                }
            }
            rows.push(tx);
        }
        Ok(rows)
    }

    /// Adds every member of any group touched by `ids`. Order preserved.
    fn group_closure(&self, ids: Vec<TxId>) -> Vec<TxId> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let group = self
                .by_id
                .get(&id)
                .and_then(PoolL2Tx::group_id)
                .and_then(|g| self.groups.get(&g));
            let members = match group {
                Some(g) => g.members(),
                None => vec![id],
            };
            for member in members {
                if seen.insert(member) {
                    out.push(member);
                }
            }
        }
        out
    }

    /// Group closure restricted to Pending rows.
    fn pending_closure(&self, ids: Vec<TxId>) -> Vec<TxId> {
        self.group_closure(ids)
            .into_iter()
            .filter(|id| self.by_id.get(id).is_some_and(PoolL2Tx::is_pending))
            .collect()
    }

    fn invalidation(&self, ids: Vec<TxId>) -> Changeset {
        let upserts = self
            .group_closure(ids)
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .filter(|tx| tx.state.can_transition_to(PoolTxState::Invalid))
            .map(|tx| self.transitioned(tx, PoolTxState::Invalid, None))
            .collect();
        Changeset {
            upserts,
            ..Default::default()
        }
    }

    /// Copy of `tx` in `state` with the batch fields kept consistent.
    fn transitioned(
        &self,
        tx: &PoolL2Tx,
        state: PoolTxState,
        batch_num: Option<BatchNum>,
    ) -> PoolL2Tx {
        let mut next = tx.clone();
        next.state = state;
        next.batch_num = None;
        next.invalidated_at = None;
        match state {
            PoolTxState::Pending | PoolTxState::Forging => next.info = None,
            PoolTxState::Forged => next.batch_num = batch_num,
            PoolTxState::Invalid => next.invalidated_at = Some(self.last_forged_batch),
        }
        next
    }

    fn index(&mut self, tx: &PoolL2Tx) {
        self.by_account
            .entry(tx.from_idx)
            .or_default()
            .insert((tx.nonce, tx.id));
        match tx.state {
            PoolTxState::Pending => {
                self.pending.insert((tx.timestamp, tx.id));
                if let Some(max) = tx.max_num_batch {
                    self.expiring.entry(max).or_default().insert(tx.id);
                }
            }
            PoolTxState::Forging => {
                self.forging.insert(tx.id);
            }
            PoolTxState::Forged => {
                self.forged_by_batch
                    .entry(tx.batch_num.unwrap_or_default())
                    .or_default()
                    .insert(tx.id);
            }
            PoolTxState::Invalid => {
                self.invalid_by_batch
                    .entry(tx.invalidated_at.unwrap_or_default())
                    .or_default()
                    .insert(tx.id);
            }
        }
    }

    fn unindex(&mut self, tx: &PoolL2Tx) {
        if let Some(txs) = self.by_account.get_mut(&tx.from_idx) {
            txs.remove(&(tx.nonce, tx.id));
            if txs.is_empty() {
                self.by_account.remove(&tx.from_idx);
            }
        }
        match tx.state {
            PoolTxState::Pending => {
                self.pending.remove(&(tx.timestamp, tx.id));
                if let Some(max) = tx.max_num_batch {
                    remove_keyed(&mut self.expiring, max, &tx.id);
                }
            }
            PoolTxState::Forging => {
                self.forging.remove(&tx.id);
            }
            PoolTxState::Forged => {
                remove_keyed(
                    &mut self.forged_by_batch,
                    tx.batch_num.unwrap_or_default(),
                    &tx.id,
                );
            }
            PoolTxState::Invalid => {
                remove_keyed(
                    &mut self.invalid_by_batch,
                    tx.invalidated_at.unwrap_or_default(),
                    &tx.id,
                );
            }
        }
    }
}

fn remove_keyed(map: &mut BTreeMap<BatchNum, BTreeSet<TxId>>, key: BatchNum, id: &TxId) {
    if let Some(ids) = map.get_mut(&key) {
        ids.remove(id);
        if ids.is_empty() {
            map.remove(&key);
        }
    }
}
