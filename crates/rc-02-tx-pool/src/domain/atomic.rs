//! # Atomic Group Manager
//!
//! Tracks groups of transactions that must be forged together.
//!
//! Each member carries the fields of the transaction it requests and a
//! relative offset to it. A group is kept as an arena of slots indexed by
//! position; members reference each other only through positions.
//!
//! ```text
//!  position:   0        1        2
//!            ┌────┐   ┌────┐   ┌────┐
//!            │ A  │──→│ B  │──→│ C  │     rq_offset: A=+1, B=+1, C=-2
//!            └────┘   └────┘   └────┘
//!              ↑                  │
//!              └──────────────────┘
//! ```
//!
//! A group is `Complete` once every slot is filled, every request matches
//! its target, and the request chain from position 0 visits every member
//! and returns to 0.

use super::entities::{AtomicGroupId, AtomicMembership, PoolL2Tx, PoolTxState, TxId};
use super::errors::PoolError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Selection eligibility of a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStatus {
    /// Some members have not arrived.
    Incomplete,
    /// All members present and mutually consistent.
    Complete,
    /// Members contradict each other or one was invalidated.
    Inconsistent,
}

/// Arena of member ids for one group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtomicGroup {
    id: AtomicGroupId,
    slots: Vec<Option<TxId>>,
    status: GroupStatus,
}

impl AtomicGroup {
    fn new(id: AtomicGroupId, size: usize) -> Self {
        Self {
            id,
            slots: vec![None; size],
            status: GroupStatus::Incomplete,
        }
    }

    pub fn id(&self) -> AtomicGroupId {
        self.id
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn status(&self) -> GroupStatus {
        self.status
    }

    pub fn slot(&self, position: usize) -> Option<TxId> {
        self.slots.get(position).copied().flatten()
    }

    /// Present member ids in position order.
    pub fn members(&self) -> Vec<TxId> {
        self.slots.iter().flatten().copied().collect()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

/// Result of offering a new member to its group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberCheck {
    /// The member may be stored.
    Accept,
    /// The member contradicts the group: it is refused and the members
    /// already gathered must be invalidated.
    Poisoned {
        invalidate: Vec<TxId>,
        reason: String,
    },
}

/// All atomic groups known to the pool.
#[derive(Clone, Debug, Default)]
pub struct AtomicGroupRegistry {
    groups: HashMap<AtomicGroupId, AtomicGroup>,
}

impl AtomicGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &AtomicGroupId) -> Option<&AtomicGroup> {
        self.groups.get(id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Checks a not-yet-stored member against the members already held.
    ///
    /// # Errors
    /// - `MalformedAtomicGroup` / `MalformedTransaction` for shape errors;
    ///   nothing needs invalidating in that case
    pub fn check_member(
        &self,
        tx: &PoolL2Tx,
        max_group_size: usize,
        rows: &HashMap<TxId, PoolL2Tx>,
    ) -> Result<MemberCheck, PoolError> {
        check_shape(tx, max_group_size)?;
        let Some(membership) = tx.atomic else {
            return Ok(MemberCheck::Accept);
        };
        let Some(group) = self.groups.get(&membership.group_id) else {
            return Ok(MemberCheck::Accept);
        };

        let size = membership.group_size as usize;
        let position = membership.position as usize;
        if group.size() != size {
            return Err(PoolError::MalformedAtomicGroup(format!(
                "group {} has {} members, transaction claims {}",
                group.id,
                group.size(),
                size
            )));
        }
        if group.status == GroupStatus::Inconsistent {
            return Err(PoolError::MalformedAtomicGroup(format!(
                "group {} is inconsistent",
                group.id
            )));
        }
        if group.slot(position).is_some() {
            return Err(PoolError::MalformedAtomicGroup(format!(
                "position {} of group {} is taken",
                position, group.id
            )));
        }

        let present: Vec<&PoolL2Tx> = group
            .members()
            .iter()
            .filter_map(|id| rows.get(id))
            .collect();
        let poisoned = |reason: String| MemberCheck::Poisoned {
            invalidate: present.iter().map(|m| m.id).collect(),
            reason,
        };

        if let Some(target) = tx
            .rq_offset
            .target(position, size)
            .and_then(|t| group.slot(t))
            .and_then(|id| rows.get(&id))
        {
            if !request_matches(tx, target) {
                return Ok(poisoned(format!(
                    "position {} requests fields that do not match its target",
                    position
                )));
            }
        }
        for member in &present {
            let Some(m) = member.atomic else { continue };
            if member.rq_offset.target(m.position as usize, size) == Some(position)
                && !request_matches(member, tx)
            {
                return Ok(poisoned(format!(
                    "position {} requests fields that do not match position {}",
                    m.position, position
                )));
            }
        }

        if present.len() + 1 == size {
            let mut ordered: Vec<&PoolL2Tx> = present.clone();
            ordered.push(tx);
            ordered.sort_by_key(|t| t.atomic.map(|m| m.position));
            if let Err(reason) = validate_group(&ordered, membership.group_id) {
                return Ok(poisoned(reason));
            }
        }

        Ok(MemberCheck::Accept)
    }

    /// Places a stored member in its slot, creating the group on first use.
    pub(crate) fn attach(&mut self, tx: &PoolL2Tx) {
        let Some(m) = tx.atomic else { return };
        let group = self
            .groups
            .entry(m.group_id)
            .or_insert_with(|| AtomicGroup::new(m.group_id, m.group_size as usize));
        if let Some(slot) = group.slots.get_mut(m.position as usize) {
            *slot = Some(tx.id);
        }
    }

    /// Clears a deleted member's slot; the group goes with its last member.
    pub(crate) fn detach(&mut self, tx: &PoolL2Tx) {
        let Some(m) = tx.atomic else { return };
        let Some(group) = self.groups.get_mut(&m.group_id) else {
            return;
        };
        if let Some(slot) = group.slots.get_mut(m.position as usize) {
            if *slot == Some(tx.id) {
                *slot = None;
            }
        }
        if group.is_empty() {
            self.groups.remove(&m.group_id);
        }
    }

    /// Recomputes a group's status from its member rows.
    pub(crate) fn refresh(&mut self, id: &AtomicGroupId, rows: &HashMap<TxId, PoolL2Tx>) {
        let Some(group) = self.groups.get_mut(id) else {
            return;
        };
        let members: Vec<&PoolL2Tx> = group
            .slots
            .iter()
            .flatten()
            .filter_map(|id| rows.get(id))
            .collect();

        group.status = if members.iter().any(|m| m.state == PoolTxState::Invalid) {
            GroupStatus::Inconsistent
        } else if !group.is_full() {
            GroupStatus::Incomplete
        } else if validate_group(&members, group.id).is_ok() {
            GroupStatus::Complete
        } else {
            GroupStatus::Inconsistent
        };
    }
}

/// Checks the fields a single transaction can be judged on alone.
pub fn check_shape(tx: &PoolL2Tx, max_group_size: usize) -> Result<(), PoolError> {
    let Some(m) = tx.atomic else {
        if tx.rq.is_some() || tx.rq_offset.code() != 0 {
            return Err(PoolError::MalformedTransaction(
                "request fields set outside an atomic group".into(),
            ));
        }
        return Ok(());
    };

    let size = m.group_size as usize;
    let position = m.position as usize;
    if size < 2 || size > max_group_size {
        return Err(PoolError::MalformedAtomicGroup(format!(
            "group size {} outside 2..={}",
            size, max_group_size
        )));
    }
    if position >= size {
        return Err(PoolError::MalformedAtomicGroup(format!(
            "position {} outside group of {}",
            position, size
        )));
    }
    if tx.rq.is_none() {
        return Err(PoolError::MalformedAtomicGroup(
            "member has no request fields".into(),
        ));
    }
    if tx.rq_offset.code() == 0 {
        return Err(PoolError::MalformedAtomicGroup(
            "member has no request offset".into(),
        ));
    }
    if tx.rq_offset.target(position, size).is_none() {
        return Err(PoolError::MalformedAtomicGroup(format!(
            "request offset code {} from position {} leaves the group",
            tx.rq_offset.code(),
            position
        )));
    }
    Ok(())
}

/// Whether `requester`'s request fields describe `target`.
pub fn request_matches(requester: &PoolL2Tx, target: &PoolL2Tx) -> bool {
    requester.rq.as_ref() == Some(&target.as_request())
}

/// Validates a full member set given in position order.
///
/// Returns a human-readable reason on failure.
pub fn validate_group(members: &[&PoolL2Tx], id: AtomicGroupId) -> Result<(), String> {
    let size = members.len();
    let mut targets = Vec::with_capacity(size);

    for (i, tx) in members.iter().enumerate() {
        let expected = AtomicMembership {
            group_id: id,
            position: i as u8,
            group_size: size as u8,
        };
        if tx.atomic != Some(expected) {
            return Err(format!("member {} has wrong group membership", i));
        }
        let target = tx
            .rq_offset
            .target(i, size)
            .ok_or_else(|| format!("member {} requests outside the group", i))?;
        if !request_matches(tx, members[target]) {
            return Err(format!(
                "member {} request does not match position {}",
                i, target
            ));
        }
        targets.push(target);
    }

    // Every member has one outgoing request, so the group is strongly
    // connected iff the chain from 0 is a single cycle through everyone.
    let mut visited = vec![false; size];
    let mut position = 0;
    for _ in 0..size {
        if visited[position] {
            return Err(format!(
                "request chain returns to position {} before covering the group",
                position
            ));
        }
        visited[position] = true;
        position = targets[position];
    }
    if position != 0 {
        return Err("request chain does not close at position 0".into());
    }

    let ids: Vec<TxId> = members.iter().map(|tx| tx.id).collect();
    if AtomicGroupId::from_members(&ids) != id {
        return Err("group id does not match its members".into());
    }
    Ok(())
}

/// Completes an ordered group submitted as a whole.
///
/// Fills every member's request fields from the position its offset points
/// at, then derives ids, the group id and memberships.
///
/// # Errors
/// - `MalformedAtomicGroup` if the shape is wrong
/// - `InvalidAmount` if an amount is not representable
pub fn assemble_group(
    mut txs: Vec<PoolL2Tx>,
    max_group_size: usize,
) -> Result<(Vec<PoolL2Tx>, AtomicGroupId), PoolError> {
    let size = txs.len();
    if size < 2 || size > max_group_size {
        return Err(PoolError::MalformedAtomicGroup(format!(
            "group size {} outside 2..={}",
            size, max_group_size
        )));
    }

    let mut requests = Vec::with_capacity(size);
    for (i, tx) in txs.iter().enumerate() {
        let target = tx.rq_offset.target(i, size).ok_or_else(|| {
            PoolError::MalformedAtomicGroup(format!(
                "member {} has request offset code {} outside the group",
                i,
                tx.rq_offset.code()
            ))
        })?;
        requests.push(txs[target].as_request());
    }
    for (tx, rq) in txs.iter_mut().zip(requests) {
        tx.rq = Some(rq);
        tx.id = tx.compute_id()?;
    }

    let ids: Vec<TxId> = txs.iter().map(|tx| tx.id).collect();
    let group_id = AtomicGroupId::from_members(&ids);
    for (i, tx) in txs.iter_mut().enumerate() {
        tx.atomic = Some(AtomicMembership {
            group_id,
            position: i as u8,
            group_size: size as u8,
        });
    }
    Ok((txs, group_id))
}
