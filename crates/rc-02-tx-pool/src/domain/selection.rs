//! # Selection Engine
//!
//! Composes the ordered transaction list of the next batch.
//!
//! 1. Candidates are grouped in units: a complete atomic group is one unit,
//!    every other Pending transaction is a unit of one.
//! 2. A unit's priority is its absolute fee; a group's is the smallest fee
//!    among its members.
//! 3. Units are stably sorted by priority descending, then `from_idx`
//!    ascending, then `nonce` ascending.
//! 4. The sorted list is walked with a per-account nonce cursor seeded from
//!    the account snapshot. A unit is accepted only if every member's nonce
//!    equals its account's cursor at the time it is reached, advancing the
//!    cursor member by member. The walk repeats until the batch is full or a
//!    pass accepts nothing.
//!
//! The sort only prioritizes; the cursor walk is what guarantees that each
//! account's transactions appear in the batch with strictly increasing
//! nonces, even when other accounts' transactions are interleaved.

use super::entities::{BatchNum, Idx, Nonce, PoolL2Tx, TxId, U256};
use super::pool::PoolStore;
use super::value_objects::{NonceSnapshot, SelectionOutcome, SkipReason};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

/// A candidate unit: one transaction or a whole atomic group.
#[derive(Debug)]
struct Unit<'a> {
    members: Vec<&'a PoolL2Tx>,
    fee: U256,
    from_idx: Idx,
    nonce: Nonce,
}

impl<'a> Unit<'a> {
    fn new(members: Vec<&'a PoolL2Tx>) -> Self {
        let fee = members
            .iter()
            .map(|tx| tx.absolute_fee().unwrap_or_default())
            .min()
            .unwrap_or_default();
        let (from_idx, nonce) = members
            .first()
            .map(|tx| (tx.from_idx, tx.nonce))
            .unwrap_or_default();
        Self {
            members,
            fee,
            from_idx,
            nonce,
        }
    }

    fn ids(&self) -> impl Iterator<Item = TxId> + '_ {
        self.members.iter().map(|tx| tx.id)
    }
}

/// Selects transactions for a batch from a pool snapshot.
pub struct SelectionEngine<'a> {
    pool: &'a PoolStore,
}

impl<'a> SelectionEngine<'a> {
    pub fn new(pool: &'a PoolStore) -> Self {
        Self { pool }
    }

    /// Runs selection for batch `batch_num` with room for `max_size`
    /// transactions.
    pub fn select(
        &self,
        nonces: &NonceSnapshot,
        max_size: usize,
        batch_num: BatchNum,
    ) -> SelectionOutcome {
        let mut outcome = SelectionOutcome::default();
        let mut units = Vec::new();

        for unit in self.build_units() {
            match precheck(&unit, nonces, batch_num) {
                Some(reason) if reason.is_stale() => {
                    outcome.stale.extend(unit.ids().map(|id| (id, reason.clone())));
                }
                Some(reason) => {
                    outcome
                        .deferred
                        .extend(unit.ids().map(|id| (id, reason.clone())));
                }
                None => units.push(unit),
            }
        }

        units.sort_by_key(|u| (Reverse(u.fee), u.from_idx, u.nonce));

        let mut cursors: HashMap<Idx, Nonce> = HashMap::new();
        let mut accepted = vec![false; units.len()];
        let mut last_reason: Vec<Option<SkipReason>> = vec![None; units.len()];

        'passes: loop {
            let mut progress = false;
            for (i, unit) in units.iter().enumerate() {
                if accepted[i] {
                    continue;
                }
                let remaining = max_size - outcome.selected.len();
                if remaining == 0 {
                    break 'passes;
                }
                if unit.members.len() > remaining {
                    last_reason[i] = Some(SkipReason::GroupDoesNotFit {
                        size: unit.members.len(),
                        remaining,
                    });
                    continue;
                }
                match try_advance(unit, &cursors, nonces) {
                    Ok(advanced) => {
                        cursors.extend(advanced);
                        outcome.selected.extend(unit.ids());
                        accepted[i] = true;
                        progress = true;
                    }
                    Err(reason) => last_reason[i] = Some(reason),
                }
            }
            if !progress {
                break;
            }
        }

        for (i, unit) in units.iter().enumerate() {
            if accepted[i] {
                continue;
            }
            let reason = match cursor_stale(unit, &cursors) {
                Some(stale) => stale,
                None => last_reason[i].take().unwrap_or(SkipReason::BatchFull),
            };
            let bucket = if reason.is_stale() {
                &mut outcome.stale
            } else {
                &mut outcome.deferred
            };
            bucket.extend(unit.ids().map(|id| (id, reason.clone())));
        }

        outcome
    }

    /// Pending singles plus selectable groups, in pool insertion order.
    fn build_units(&self) -> Vec<Unit<'a>> {
        let mut seen_groups = HashSet::new();
        let mut units = Vec::new();
        for tx in self.pool.pending_txs() {
            match tx.group_id() {
                None => units.push(Unit::new(vec![tx])),
                Some(group_id) => {
                    if !seen_groups.insert(group_id) {
                        continue;
                    }
                    if let Some(members) = self.pool.selectable_group(&group_id) {
                        units.push(Unit::new(members));
                    }
                }
            }
        }
        units
    }
}

/// Reasons a unit can be set aside before the walk.
fn precheck(unit: &Unit<'_>, nonces: &NonceSnapshot, batch_num: BatchNum) -> Option<SkipReason> {
    for tx in &unit.members {
        if let Some(max_num_batch) = tx.max_num_batch.filter(|_| tx.is_expired_for(batch_num)) {
            return Some(SkipReason::Expired { max_num_batch });
        }
    }
    for tx in &unit.members {
        let Some(expected) = nonces.get(tx.from_idx) else {
            return Some(SkipReason::SenderUnknown);
        };
        if tx.nonce < expected {
            return Some(SkipReason::NonceBelowAccount {
                expected,
                got: tx.nonce,
            });
        }
    }
    None
}

/// Hypothetical cursor advance for every member, in unit order.
fn try_advance(
    unit: &Unit<'_>,
    cursors: &HashMap<Idx, Nonce>,
    nonces: &NonceSnapshot,
) -> Result<HashMap<Idx, Nonce>, SkipReason> {
    let mut advanced: HashMap<Idx, Nonce> = HashMap::new();
    for tx in &unit.members {
        let cursor = advanced
            .get(&tx.from_idx)
            .or_else(|| cursors.get(&tx.from_idx))
            .copied()
            .or_else(|| nonces.get(tx.from_idx))
            .ok_or(SkipReason::SenderUnknown)?;
        if tx.nonce != cursor {
            return Err(if unit.members.len() > 1 {
                SkipReason::GroupMemberBlocked
            } else {
                SkipReason::NonceAhead {
                    expected: cursor,
                    got: tx.nonce,
                }
            });
        }
        advanced.insert(tx.from_idx, cursor + 1);
    }
    Ok(advanced)
}

/// A unit left behind because another transaction used its nonce.
fn cursor_stale(unit: &Unit<'_>, cursors: &HashMap<Idx, Nonce>) -> Option<SkipReason> {
    unit.members.iter().find_map(|tx| {
        let cursor = cursors.get(&tx.from_idx).copied()?;
        (tx.nonce < cursor).then_some(SkipReason::NonceBelowAccount {
            expected: cursor,
            got: tx.nonce,
        })
    })
}
