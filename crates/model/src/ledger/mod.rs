/// Ledger entries and event records.
pub mod entry;

use std::collections::BTreeMap;

use time::OffsetDateTime;

use crate::{
    num::Amount,
    params::PoolParams,
    reward::{self, Payout, PayoutBatch},
    tree::TreeProgress,
    Address, EntryId, EntryStatus, EventId, EventKind, EventRecord, EventStatus, IncomeKind,
    LedgerEntry, NodeId, Participant, ParticipantId, PoolLevel, PoolNode, PoolTree, Position,
    Slot, TransactionRef, TreeId,
};

/// The state of the compensation engine.
///
/// Holds participants, pool nodes, pool trees, reserved income, ledger entries and
/// processed events. Nodes and entries are append-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ledger {
    participants: BTreeMap<ParticipantId, Participant>,
    nodes: BTreeMap<NodeId, PoolNode>,
    trees: BTreeMap<PoolLevel, Vec<PoolTree>>,
    reserves: BTreeMap<ParticipantId, BTreeMap<PoolLevel, Amount>>,
    entries: Vec<LedgerEntry>,
    events: BTreeMap<EventId, EventRecord>,
    next_node_id: u64,
}

/// A chunk of an event's payouts that still awaits confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChunk {
    /// Idempotency key on the payment gateway.
    pub key: String,
    /// Index of the chunk within the event.
    pub index: usize,
    /// Pending entries of the chunk.
    pub entries: Vec<EntryId>,
    /// The batch to submit.
    pub batch: PayoutBatch,
}

impl Ledger {
    /// Get participant.
    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(id)
    }

    /// Get participant or return [`UnknownParticipant`](crate::Error::UnknownParticipant).
    pub fn try_participant(&self, id: &ParticipantId) -> crate::Result<&Participant> {
        self.participants
            .get(id)
            .ok_or(crate::Error::UnknownParticipant(*id))
    }

    pub(crate) fn participant_mut(&mut self, id: &ParticipantId) -> crate::Result<&mut Participant> {
        self.participants
            .get_mut(id)
            .ok_or(crate::Error::UnknownParticipant(*id))
    }

    /// Iterate over participants, ordered by id.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Register a participant.
    ///
    /// The referrer must have been registered before, so the ancestry is always acyclic.
    pub fn register(
        &mut self,
        id: ParticipantId,
        address: Address,
        ancestor: Option<ParticipantId>,
    ) -> crate::Result<&Participant> {
        if self.participants.contains_key(&id) {
            return Err(crate::Error::AlreadyRegistered(id));
        }
        if let Some(ancestor) = ancestor {
            if ancestor == id {
                return Err(crate::Error::InvalidArgument("a participant cannot refer itself"));
            }
            self.participant_mut(&ancestor)?.record_referral()?;
        }
        Ok(self
            .participants
            .entry(id)
            .or_insert(Participant::new(id, address, ancestor)))
    }

    /// The referral ancestry of a participant, nearest first, at most `depth` long.
    pub fn ancestry(&self, id: &ParticipantId, depth: usize) -> crate::Result<Vec<&Participant>> {
        let mut chain = Vec::with_capacity(depth);
        let mut next = self.try_participant(id)?.ancestor();
        while let Some(ancestor) = next {
            if chain.len() == depth {
                break;
            }
            let participant = self.try_participant(&ancestor)?;
            chain.push(participant);
            next = participant.ancestor();
        }
        Ok(chain)
    }

    /// Get node.
    pub fn node(&self, id: &NodeId) -> Option<&PoolNode> {
        self.nodes.get(id)
    }

    /// Get node or return [`UnknownNode`](crate::Error::UnknownNode).
    pub fn try_node(&self, id: &NodeId) -> crate::Result<&PoolNode> {
        self.nodes.get(id).ok_or(crate::Error::UnknownNode(*id))
    }

    /// Iterate over nodes of the given level, in placement order.
    pub fn nodes_at(&self, level: PoolLevel) -> impl Iterator<Item = &PoolNode> {
        self.nodes.values().filter(move |node| node.level() == level)
    }

    /// Nodes owned by the participant, in placement order.
    pub fn nodes_of(&self, owner: ParticipantId) -> impl Iterator<Item = &PoolNode> {
        self.nodes.values().filter(move |node| node.owner() == owner)
    }

    /// The pool-tree ancestors of a node, nearest first, at most `depth` long.
    pub fn node_ancestors(&self, id: &NodeId, depth: usize) -> crate::Result<Vec<&PoolNode>> {
        let mut chain = Vec::with_capacity(depth);
        let mut next = self.try_node(id)?.parent();
        while let Some(parent) = next {
            if chain.len() == depth {
                break;
            }
            let node = self.try_node(&parent)?;
            chain.push(node);
            next = node.parent();
        }
        Ok(chain)
    }

    /// Pool levels that have at least one tree.
    pub fn levels(&self) -> impl Iterator<Item = PoolLevel> + '_ {
        self.trees.keys().copied()
    }

    /// Trees of the given level, ordered by tree number.
    pub fn trees(&self, level: PoolLevel) -> &[PoolTree] {
        self.trees.get(&level).map(Vec::as_slice).unwrap_or_default()
    }

    /// Get tree.
    pub fn tree(&self, id: &TreeId) -> Option<&PoolTree> {
        let index = usize::try_from(id.number).ok()?.checked_sub(1)?;
        self.trees(id.level).get(index)
    }

    /// Get tree or return [`UnknownTree`](crate::Error::UnknownTree).
    pub fn try_tree(&self, id: &TreeId) -> crate::Result<&PoolTree> {
        self.tree(id).ok_or(crate::Error::UnknownTree(*id))
    }

    fn tree_mut(&mut self, id: &TreeId) -> crate::Result<&mut PoolTree> {
        let index = usize::try_from(id.number)
            .ok()
            .and_then(|number| number.checked_sub(1))
            .ok_or(crate::Error::UnknownTree(*id))?;
        self.trees
            .get_mut(&id.level)
            .and_then(|trees| trees.get_mut(index))
            .ok_or(crate::Error::UnknownTree(*id))
    }

    /// Number of trees of the level that have not reached their fixed size.
    pub fn open_tree_count(&self, level: PoolLevel) -> u32 {
        let open = self
            .trees(level)
            .iter()
            .filter(|tree| !tree.is_complete())
            .count();
        u32::try_from(open).unwrap_or(u32::MAX)
    }

    /// All free child slots of the level, oldest node first, left before right.
    pub fn free_slots(&self, level: PoolLevel) -> Vec<Slot> {
        self.nodes_at(level)
            .flat_map(|node| {
                Slot::children(level, node.id())
                    .into_iter()
                    .filter(|slot| node.child(slot.position).is_none())
            })
            .collect()
    }

    /// The oldest free child slot of the level.
    pub fn oldest_free_slot(&self, level: PoolLevel) -> Option<Slot> {
        self.nodes_at(level).find_map(|node| {
            Slot::children(level, node.id())
                .into_iter()
                .find(|slot| node.child(slot.position).is_none())
        })
    }

    /// Check that the slot can take a new node.
    pub fn check_slot(&self, slot: &Slot, params: &PoolParams) -> crate::Result<()> {
        match slot.parent {
            None => {
                let open = self.open_tree_count(slot.level);
                if open >= params.max_open_trees() {
                    return Err(crate::Error::TreeCapacityReached {
                        level: slot.level,
                        open,
                    });
                }
                Ok(())
            }
            Some(parent) => {
                let parent = self.try_node(&parent)?;
                if parent.level() != slot.level {
                    return Err(crate::Error::SlotLevelMismatch {
                        slot: *slot,
                        level: parent.level(),
                    });
                }
                if slot.position == Position::Root || parent.child(slot.position).is_some() {
                    return Err(crate::Error::SlotOccupied(*slot));
                }
                Ok(())
            }
        }
    }

    /// Insert a node at the slot. Returns the new node and the parent if it has just
    /// become complete.
    pub(crate) fn insert_node(
        &mut self,
        owner: ParticipantId,
        slot: &Slot,
        params: &PoolParams,
        at: OffsetDateTime,
    ) -> crate::Result<(NodeId, Option<NodeId>)> {
        self.check_slot(slot, params)?;
        let id = NodeId(
            self.next_node_id
                .checked_add(1)
                .ok_or(crate::Error::Overflow)?,
        );
        let (node, completed) = match slot.parent {
            None => {
                let trees = self.trees.entry(slot.level).or_default();
                let number = u32::try_from(trees.len())
                    .ok()
                    .and_then(|len| len.checked_add(1))
                    .ok_or(crate::Error::Overflow)?;
                let tree = TreeId {
                    level: slot.level,
                    number,
                };
                trees.push(PoolTree::new(tree, id));
                (PoolNode::new(id, owner, slot, 0, tree), None)
            }
            Some(parent_id) => {
                let parent = self
                    .nodes
                    .get_mut(&parent_id)
                    .ok_or(crate::Error::UnknownNode(parent_id))?;
                let depth = parent.depth().checked_add(1).ok_or(crate::Error::Overflow)?;
                let completed = parent.attach(slot.position, id, at)?;
                (
                    PoolNode::new(id, owner, slot, depth, parent.tree()),
                    completed.then_some(parent_id),
                )
            }
        };
        self.nodes.insert(id, node);
        self.next_node_id = id.0;
        Ok((id, completed))
    }

    /// Count the completion of `node` towards its tree.
    pub(crate) fn record_completion(
        &mut self,
        node: &NodeId,
        params: &PoolParams,
        at: OffsetDateTime,
    ) -> crate::Result<(TreeId, TreeProgress)> {
        let node = self.try_node(node)?;
        let (tree, owner) = (node.tree(), node.owner());
        let progress = self
            .tree_mut(&tree)?
            .record_completion(owner, params.pool_size(), at)?;
        Ok((tree, progress))
    }

    pub(crate) fn mark_progressed(
        &mut self,
        tree: &TreeId,
        participant: ParticipantId,
    ) -> crate::Result<()> {
        self.tree_mut(tree)?.mark_progressed(participant);
        Ok(())
    }

    /// Reserved income of the participant at the level.
    pub fn reserve(&self, participant: &ParticipantId, level: PoolLevel) -> Amount {
        self.reserves
            .get(participant)
            .and_then(|reserves| reserves.get(&level))
            .copied()
            .unwrap_or_default()
    }

    /// Iterate over non-empty reservations as `(participant, level, balance)`.
    pub fn reserves(&self) -> impl Iterator<Item = (ParticipantId, PoolLevel, Amount)> + '_ {
        self.reserves.iter().flat_map(|(participant, levels)| {
            levels
                .iter()
                .filter(|(_, balance)| **balance != 0)
                .map(|(level, balance)| (*participant, *level, *balance))
        })
    }

    /// Credit reserved income. Returns the new balance.
    pub fn credit_reserve(
        &mut self,
        participant: ParticipantId,
        level: PoolLevel,
        amount: Amount,
    ) -> crate::Result<Amount> {
        self.participant_mut(&participant)?
            .income_mut()
            .add(IncomeKind::Reserved, amount)?;
        let balance = self
            .reserves
            .entry(participant)
            .or_default()
            .entry(level)
            .or_default();
        *balance = balance.checked_add(amount).ok_or(crate::Error::Overflow)?;
        Ok(*balance)
    }

    /// Debit reserved income. Returns the new balance.
    pub(crate) fn debit_reserve(
        &mut self,
        participant: ParticipantId,
        level: PoolLevel,
        amount: Amount,
    ) -> crate::Result<Amount> {
        let available = self.reserve(&participant, level);
        let remaining = available
            .checked_sub(amount)
            .ok_or(crate::Error::InsufficientReserve {
                participant,
                level,
                required: amount,
                available,
            })?;
        self.reserves
            .entry(participant)
            .or_default()
            .insert(level, remaining);
        Ok(remaining)
    }

    /// Get event record.
    pub fn event(&self, id: &EventId) -> Option<&EventRecord> {
        self.events.get(id)
    }

    fn try_event(&self, id: &EventId) -> crate::Result<&EventRecord> {
        self.events
            .get(id)
            .ok_or_else(|| crate::Error::UnknownEvent(id.clone()))
    }

    fn event_mut(&mut self, id: &EventId) -> crate::Result<&mut EventRecord> {
        self.events
            .get_mut(id)
            .ok_or_else(|| crate::Error::UnknownEvent(id.clone()))
    }

    /// Iterate over events that are not settled.
    pub fn pending_events(&self) -> impl Iterator<Item = &EventRecord> {
        self.events
            .values()
            .filter(|event| event.status() == EventStatus::Pending)
    }

    /// Iterate over all ledger entries.
    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    /// Get entry.
    pub fn entry(&self, id: &EntryId) -> Option<&LedgerEntry> {
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.entries.get(index)
    }

    fn entry_mut(&mut self, id: &EntryId) -> crate::Result<&mut LedgerEntry> {
        usize::try_from(id.0)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|index| self.entries.get_mut(index))
            .ok_or(crate::Error::Computation("unknown ledger entry"))
    }

    /// Entries of the event, in decision order.
    pub fn entries_of(&self, event: &EventId) -> crate::Result<Vec<&LedgerEntry>> {
        self.try_event(event)?
            .entries()
            .iter()
            .map(|id| {
                self.entry(id)
                    .ok_or(crate::Error::Computation("dangling ledger entry"))
            })
            .collect()
    }

    /// Total amount of pending entries.
    pub fn outstanding(&self) -> crate::Result<Amount> {
        self.entries
            .iter()
            .filter(|entry| entry.status() == EntryStatus::Pending)
            .try_fold(0, |acc: Amount, entry| acc.checked_add(entry.amount()))
            .ok_or(crate::Error::Overflow)
    }

    /// Check that `required` can be paid from `available` on top of the outstanding payments.
    pub fn check_funds(&self, available: Amount, required: Amount) -> crate::Result<()> {
        let total = self
            .outstanding()?
            .checked_add(required)
            .ok_or(crate::Error::Overflow)?;
        if total > available {
            return Err(crate::Error::InsufficientFunds {
                required: total,
                available,
            });
        }
        Ok(())
    }

    /// Return [`DuplicateEvent`](crate::Error::DuplicateEvent) if the event has been recorded.
    pub fn ensure_new_event(&self, id: &EventId) -> crate::Result<()> {
        if self.events.contains_key(id) {
            return Err(crate::Error::DuplicateEvent(id.clone()));
        }
        Ok(())
    }

    /// Record a processed event with its payouts as pending entries.
    ///
    /// An event without payouts is settled immediately.
    pub fn record_event(
        &mut self,
        id: EventId,
        kind: EventKind,
        payouts: &[Payout],
        at: OffsetDateTime,
    ) -> crate::Result<&EventRecord> {
        self.ensure_new_event(&id)?;
        reward::total(payouts)?;
        self.events.insert(
            id.clone(),
            EventRecord {
                id: id.clone(),
                kind,
                status: EventStatus::Pending,
                entries: Vec::new(),
                attempt: 0,
                recorded_at: at,
                settled_at: None,
            },
        );
        self.append_payouts(&id, payouts, at)?;
        self.try_event(&id)
    }

    /// Append payouts to a recorded event.
    pub fn append_payouts(
        &mut self,
        id: &EventId,
        payouts: &[Payout],
        at: OffsetDateTime,
    ) -> crate::Result<()> {
        let kind = self.try_event(id)?.kind().clone();
        let mut ids = Vec::with_capacity(payouts.len());
        for payout in payouts.iter().filter(|payout| payout.amount != 0) {
            let entry_id = EntryId(
                u64::try_from(self.entries.len())
                    .ok()
                    .and_then(|len| len.checked_add(1))
                    .ok_or(crate::Error::Overflow)?,
            );
            self.entries.push(LedgerEntry {
                id: entry_id,
                event: id.clone(),
                recipient: payout.recipient.clone(),
                participant: payout.participant,
                tag: payout.tag,
                amount: payout.amount,
                status: EntryStatus::Pending,
                transaction: None,
                failure: None,
                description: format!(
                    "{} from {} of {}",
                    payout.tag,
                    kind.name(),
                    kind.participant()
                ),
            });
            ids.push(entry_id);
        }
        let event = self.event_mut(id)?;
        if !ids.is_empty() {
            event.status = EventStatus::Pending;
            event.settled_at = None;
        }
        event.entries.extend(ids);
        self.try_settle(id, at)?;
        Ok(())
    }

    /// Pending chunks of the event, each at most `max_batch_size` payments long.
    pub fn pending_chunks(
        &self,
        id: &EventId,
        max_batch_size: usize,
    ) -> crate::Result<Vec<PendingChunk>> {
        if max_batch_size == 0 {
            return Err(crate::Error::InvalidArgument("batch size must be positive"));
        }
        let event = self.try_event(id)?;
        let entries = self.entries_of(id)?;
        let mut chunks = Vec::new();
        for (index, chunk) in entries.chunks(max_batch_size).enumerate() {
            let pending = chunk
                .iter()
                .filter(|entry| entry.status() == EntryStatus::Pending)
                .collect::<Vec<_>>();
            if pending.is_empty() {
                continue;
            }
            let payouts = pending
                .iter()
                .map(|entry| Payout {
                    recipient: entry.recipient.clone(),
                    participant: entry.participant,
                    amount: entry.amount,
                    tag: entry.tag,
                })
                .collect::<Vec<_>>();
            chunks.push(PendingChunk {
                key: event.chunk_key(index),
                index,
                entries: pending.iter().map(|entry| entry.id()).collect(),
                batch: PayoutBatch::try_new(&payouts, max_batch_size)?,
            });
        }
        Ok(chunks)
    }

    /// Mark the entries confirmed by the transaction and update income totals.
    ///
    /// Returns whether the event is settled afterwards.
    pub fn confirm_entries(
        &mut self,
        id: &EventId,
        entries: &[EntryId],
        transaction: &TransactionRef,
        at: OffsetDateTime,
    ) -> crate::Result<bool> {
        for entry_id in entries {
            let entry = self.entry_mut(entry_id)?;
            if entry.event != *id {
                return Err(crate::Error::InvalidArgument("entry belongs to another event"));
            }
            if entry.status == EntryStatus::Confirmed {
                continue;
            }
            entry.status = EntryStatus::Confirmed;
            entry.transaction = Some(transaction.clone());
            entry.failure = None;
            let (participant, tag, amount) = (entry.participant, entry.tag, entry.amount);
            if let (Some(participant), Some(kind)) = (participant, IncomeKind::from_tag(&tag)) {
                self.participant_mut(&participant)?
                    .income_mut()
                    .add(kind, amount)?;
            }
        }
        self.try_settle(id, at)
    }

    /// Mark pending entries as rejected by the payment rail.
    pub fn fail_entries(
        &mut self,
        id: &EventId,
        entries: &[EntryId],
        reason: &str,
    ) -> crate::Result<()> {
        for entry_id in entries {
            let entry = self.entry_mut(entry_id)?;
            if entry.event != *id {
                return Err(crate::Error::InvalidArgument("entry belongs to another event"));
            }
            if entry.status == EntryStatus::Pending {
                entry.status = EntryStatus::Failed;
                entry.failure = Some(reason.to_string());
            }
        }
        Ok(())
    }

    /// Re-arm failed entries of the event for resubmission under new idempotency keys.
    ///
    /// Returns the number of re-armed entries.
    pub fn rearm(&mut self, id: &EventId) -> crate::Result<usize> {
        let ids = self.try_event(id)?.entries().to_vec();
        let mut count = 0usize;
        for entry_id in ids {
            let entry = self.entry_mut(&entry_id)?;
            if entry.status == EntryStatus::Failed {
                entry.status = EntryStatus::Pending;
                count = count.checked_add(1).ok_or(crate::Error::Overflow)?;
            }
        }
        if count != 0 {
            let event = self.event_mut(id)?;
            event.attempt = event.attempt.checked_add(1).ok_or(crate::Error::Overflow)?;
        }
        Ok(count)
    }

    fn try_settle(&mut self, id: &EventId, at: OffsetDateTime) -> crate::Result<bool> {
        let event = self.try_event(id)?;
        if event.status() == EventStatus::Settled {
            return Ok(true);
        }
        let all_confirmed = self
            .entries_of(id)?
            .iter()
            .all(|entry| entry.status() == EntryStatus::Confirmed);
        if !all_confirmed {
            return Ok(false);
        }
        let kind = event.kind().clone();
        let event = self.event_mut(id)?;
        event.status = EventStatus::Settled;
        event.settled_at = Some(at);
        if let EventKind::Retopup { participant } = kind {
            self.participant_mut(&participant)?.mark_retopped();
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        test::{address, chain},
        RewardTag,
    };

    use super::*;

    #[test]
    fn register_and_walk_ancestry() -> crate::Result<()> {
        let mut ledger = chain(12)?;
        let ancestry = ledger.ancestry(&ParticipantId(12), 10)?;
        assert_eq!(ancestry.len(), 10);
        assert_eq!(ancestry[0].id(), ParticipantId(11));
        assert_eq!(ancestry[9].id(), ParticipantId(2));
        assert_eq!(ledger.ancestry(&ParticipantId(3), 10)?.len(), 2);
        assert_eq!(ledger.try_participant(&ParticipantId(1))?.direct_referrals(), 1);

        assert_eq!(
            ledger.register(ParticipantId(5), address(5), None).map(|_| ()),
            Err(crate::Error::AlreadyRegistered(ParticipantId(5)))
        );
        assert!(ledger
            .register(ParticipantId(99), address(99), Some(ParticipantId(100)))
            .is_err());
        assert!(ledger.participant(&ParticipantId(99)).is_none());
        Ok(())
    }

    #[test]
    fn reserve_never_goes_negative() -> crate::Result<()> {
        let mut ledger = chain(1)?;
        let p = ParticipantId(1);
        assert_eq!(ledger.credit_reserve(p, 1, 30)?, 30);
        assert_eq!(ledger.credit_reserve(p, 1, 20)?, 50);
        assert!(matches!(
            ledger.debit_reserve(p, 1, 51),
            Err(crate::Error::InsufficientReserve {
                required: 51,
                available: 50,
                ..
            })
        ));
        assert_eq!(ledger.reserve(&p, 1), 50);
        assert_eq!(ledger.debit_reserve(p, 1, 50)?, 0);
        assert_eq!(ledger.reserve(&p, 1), 0);
        assert_eq!(ledger.try_participant(&p)?.income().reserved, 50);
        Ok(())
    }

    #[test]
    fn events_settle_on_confirmation() -> crate::Result<()> {
        let mut ledger = chain(2)?;
        let now = OffsetDateTime::UNIX_EPOCH;
        let platform = address(0);
        let payouts = vec![
            Payout::to_participant(ParticipantId(1), address(1), 12, RewardTag::LevelIncome(1)),
            Payout::to_platform(&platform, 28, RewardTag::PlatformRemainder),
        ];
        let id = EventId::new("retopup-1");
        let kind = EventKind::Retopup {
            participant: ParticipantId(2),
        };
        ledger.check_funds(40, 40)?;
        ledger.record_event(id.clone(), kind.clone(), &payouts, now)?;
        assert_eq!(ledger.outstanding()?, 40);
        assert!(ledger.check_funds(79, 40).is_err());
        assert_eq!(
            ledger.record_event(id.clone(), kind, &payouts, now).map(|_| ()),
            Err(crate::Error::DuplicateEvent(id.clone()))
        );
        assert!(ledger.ensure_new_event(&id).is_err());
        assert!(ledger.ensure_new_event(&EventId::new("retopup-2")).is_ok());

        let chunks = ledger.pending_chunks(&id, 1)?;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].key, "retopup-1#0");
        assert_eq!(chunks[1].key, "retopup-1#1");

        let tx = TransactionRef {
            id: "0xtx".into(),
            block: 7,
        };
        assert!(!ledger.confirm_entries(&id, &chunks[0].entries, &tx, now)?);
        assert_eq!(ledger.try_participant(&ParticipantId(1))?.income().level, 12);
        assert!(!ledger.try_participant(&ParticipantId(2))?.has_retopped());

        ledger.fail_entries(&id, &chunks[1].entries, "insufficient balance")?;
        assert!(ledger.pending_chunks(&id, 1)?.is_empty());
        assert_eq!(ledger.rearm(&id)?, 1);
        let chunks = ledger.pending_chunks(&id, 1)?;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].key, "retopup-1#1/1");

        assert!(ledger.confirm_entries(&id, &chunks[0].entries, &tx, now)?);
        assert_eq!(ledger.event(&id).map(|e| e.status()), Some(EventStatus::Settled));
        assert!(ledger.try_participant(&ParticipantId(2))?.has_retopped());
        assert_eq!(ledger.outstanding()?, 0);
        Ok(())
    }

    #[test]
    fn event_without_payouts_is_settled() -> crate::Result<()> {
        let mut ledger = chain(1)?;
        let record = ledger.record_event(
            EventId::new("enter-1"),
            EventKind::SecondReferral {
                participant: ParticipantId(1),
                ancestor: None,
            },
            &[],
            OffsetDateTime::UNIX_EPOCH,
        )?;
        assert_eq!(record.status(), EventStatus::Settled);
        Ok(())
    }
}
