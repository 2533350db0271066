//! In-memory persistent-store adapter.
//!
//! Keeps rows keyed by id with a secondary `(from_idx, state)` index. A
//! changeset is validated in full before any row is touched, so a commit
//! either lands completely or not at all.

use crate::domain::{Changeset, Idx, PoolL2Tx, PoolTxState, StoreError, TxId};
use crate::ports::outbound::TxStore;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<TxId, PoolL2Tx>,
    by_account_state: HashMap<(Idx, PoolTxState), BTreeSet<TxId>>,
}

impl Tables {
    fn remove(&mut self, id: &TxId) {
        if let Some(old) = self.rows.remove(id) {
            let key = (old.from_idx, old.state);
            if let Some(ids) = self.by_account_state.get_mut(&key) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_account_state.remove(&key);
                }
            }
        }
    }

    fn upsert(&mut self, tx: PoolL2Tx) {
        self.remove(&tx.id);
        self.by_account_state
            .entry((tx.from_idx, tx.state))
            .or_default()
            .insert(tx.id);
        self.rows.insert(tx.id, tx);
    }
}

/// Row store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryTxStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    commits: AtomicU64,
}

impl InMemoryTxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail with `StoreError::Unavailable`
    /// until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.tables.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store switched off".into()));
        }
        Ok(())
    }
}

impl TxStore for InMemoryTxStore {
    fn commit(&self, changeset: &Changeset) -> Result<(), StoreError> {
        self.check_available()?;
        if let Some(tx) = changeset.upserts.iter().find(|tx| tx.id == TxId::default()) {
            return Err(StoreError::WriteFailed(format!(
                "row from account {} has no id",
                tx.from_idx
            )));
        }

        let mut tables = self.tables.write();
        for id in &changeset.deletes {
            tables.remove(id);
        }
        for tx in &changeset.upserts {
            tables.upsert(tx.clone());
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<PoolL2Tx>, StoreError> {
        self.check_available()?;
        Ok(self.tables.read().rows.values().cloned().collect())
    }

    fn get(&self, id: &TxId) -> Result<Option<PoolL2Tx>, StoreError> {
        self.check_available()?;
        Ok(self.tables.read().rows.get(id).cloned())
    }

    fn ids_by_account_state(
        &self,
        idx: Idx,
        state: PoolTxState,
    ) -> Result<Vec<TxId>, StoreError> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .by_account_state
            .get(&(idx, state))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default())
    }
}
