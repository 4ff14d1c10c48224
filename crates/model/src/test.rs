use std::collections::{BTreeMap, VecDeque};

use time::OffsetDateTime;

use crate::{
    action::{
        place::{Placement, PlacementReport, ProgressionCandidate},
        LedgerAction,
    },
    params::{LevelIncomeParams, Params, PoolParams},
    Address, Ledger, ParticipantId, PoolLevel, Slot,
};

/// Base entry value used by the fixtures.
pub const BASE_ENTRY_VALUE: u128 = 25;

/// Retopup price used by the fixtures.
pub const RETOPUP_PRICE: u128 = 40;

/// Deterministic address of a test participant. `0` is the platform wallet.
pub fn address(id: u64) -> Address {
    Address::new(format!("0x{id:040x}")).expect("formatted addresses are never empty")
}

/// Default params with base entry value `25` and retopup price `40`.
pub fn params() -> Params {
    params_with(PoolParams::builder().base_entry_value(BASE_ENTRY_VALUE).build())
}

/// Params with the given pool params.
pub fn params_with(pool: PoolParams) -> Params {
    Params::builder()
        .pool(pool)
        .level_income(
            LevelIncomeParams::builder()
                .retopup_price(RETOPUP_PRICE)
                .build(),
        )
        .platform_wallet(address(0))
        .build()
}

/// A ledger with participants `1..=len`, each referred by the previous one.
pub fn chain(len: u64) -> crate::Result<Ledger> {
    let mut ledger = Ledger::default();
    for id in 1..=len {
        let ancestor = id.checked_sub(1).filter(|id| *id != 0).map(ParticipantId);
        ledger.register(ParticipantId(id), address(id), ancestor)?;
    }
    Ok(ledger)
}

/// A FIFO placement queue per pool level.
#[derive(Debug, Clone, Default)]
pub struct TestQueue {
    slots: BTreeMap<PoolLevel, VecDeque<Slot>>,
}

impl TestQueue {
    /// Pop the oldest slot of the level.
    pub fn pop(&mut self, level: PoolLevel) -> Option<Slot> {
        self.slots.get_mut(&level)?.pop_front()
    }

    /// Push a slot to the back of its level.
    pub fn push(&mut self, slot: Slot) {
        self.slots.entry(slot.level).or_default().push_back(slot);
    }

    /// Return a slot to the front of its level.
    pub fn push_front(&mut self, slot: Slot) {
        self.slots.entry(slot.level).or_default().push_front(slot);
    }

    /// Number of queued slots of the level.
    pub fn len(&self, level: PoolLevel) -> usize {
        self.slots.get(&level).map(VecDeque::len).unwrap_or_default()
    }

    /// Queued slots of the level, oldest first.
    pub fn slots(&self, level: PoolLevel) -> Vec<Slot> {
        self.slots
            .get(&level)
            .map(|slots| slots.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// A ledger driven through the placement queue, the way the engine drives it.
#[derive(Debug, Clone)]
pub struct TestPool {
    /// Ledger.
    pub ledger: Ledger,
    /// Params.
    pub params: Params,
    /// Placement queue.
    pub queue: TestQueue,
    next_participant: u64,
}

impl TestPool {
    /// Create an empty pool.
    pub fn new(params: Params) -> Self {
        Self {
            ledger: Ledger::default(),
            params,
            queue: TestQueue::default(),
            next_participant: 0,
        }
    }

    /// Register the next participant.
    pub fn register(&mut self, ancestor: Option<ParticipantId>) -> crate::Result<ParticipantId> {
        self.next_participant = self
            .next_participant
            .checked_add(1)
            .ok_or(crate::Error::Overflow)?;
        let id = ParticipantId(self.next_participant);
        self.ledger.register(id, address(id.0), ancestor)?;
        Ok(id)
    }

    /// Register a new participant and enter them into the first level.
    pub fn join(&mut self) -> crate::Result<(ParticipantId, PlacementReport)> {
        let participant = self.register(None)?;
        let report = self.place(Placement::entry(participant))?;
        Ok((participant, report))
    }

    /// Pop a slot, place, and push the child slots.
    pub fn place(&mut self, placement: Placement) -> crate::Result<PlacementReport> {
        let slot = self.queue.pop(placement.level);
        let result = self
            .ledger
            .place(&self.params, placement, slot, OffsetDateTime::UNIX_EPOCH)
            .and_then(|action| action.execute());
        match result {
            Ok(report) => {
                for slot in report.child_slots() {
                    self.queue.push(*slot);
                }
                Ok(report)
            }
            Err(err) => {
                if let Some(slot) = slot {
                    self.queue.push_front(slot);
                }
                Err(err)
            }
        }
    }

    /// Progress every ready candidate, following the candidates produced along the way.
    pub fn progress(
        &mut self,
        candidates: &[ProgressionCandidate],
    ) -> crate::Result<Vec<PlacementReport>> {
        let mut pending = candidates.iter().copied().collect::<VecDeque<_>>();
        let mut reports = Vec::new();
        while let Some(candidate) = pending.pop_front() {
            let decision = self.ledger.progression_decision(
                &self.params.pool,
                candidate.participant,
                &candidate.tree,
            )?;
            if !decision.is_ready() {
                continue;
            }
            let placement = Placement::progression(candidate.participant, candidate.tree)?;
            let report = self.place(placement)?;
            pending.extend(report.progression_candidates().iter().copied());
            reports.push(report);
        }
        Ok(reports)
    }
}
