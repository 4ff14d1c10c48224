use std::{collections::VecDeque, future::Future, time::Duration};

use autopool_model::{
    reward, Amount, EntryStatus, EventId, EventKind, EventStatus, LedgerAction, Params,
    PendingChunk, Placement, PlacementReport, PoolLevel, ProgressDecision, QualifyingEvent,
};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::{
    gateway::{BatchStatus, PaymentGateway},
    queue::PlacementQueue,
    reconcile::Reconciler,
    store::LedgerStore,
};

/// Outcome of a handled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every payment of the event has been confirmed.
    Settled,
    /// The event had been settled before.
    Duplicate,
}

/// Event-processing engine.
///
/// Decisions are recorded as pending ledger entries in the same ledger write as the placement
/// or waterfall that produced them, and settled on the payment rail afterwards.
#[derive(Debug)]
pub struct Engine<S, Q, G> {
    store: S,
    queue: Q,
    gateway: G,
    params: Params,
    gateway_timeout: Duration,
    placement: Mutex<()>,
}

impl<S, Q, G> Engine<S, Q, G>
where
    S: LedgerStore,
    Q: PlacementQueue,
    G: PaymentGateway,
{
    /// Create a new engine.
    pub fn new(store: S, queue: Q, gateway: G, params: Params, gateway_timeout: Duration) -> Self {
        Self {
            store,
            queue,
            gateway,
            params,
            gateway_timeout,
            placement: Mutex::new(()),
        }
    }

    /// Get the ledger store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the placement queue.
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Get the payment gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Get the params.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Create a [`Reconciler`].
    pub fn reconciler(&self) -> Reconciler<'_, S, Q, G> {
        Reconciler::new(self)
    }

    /// Handle a qualifying event.
    ///
    /// Delivering the same event twice has the effects of delivering it once. A pending event
    /// resumes its settlement.
    pub async fn handle(&self, event: QualifyingEvent) -> crate::Result<Outcome> {
        let span = tracing::info_span!(
            "handle",
            event = %event.id,
            kind = event.kind.name(),
            participant = %event.kind.participant(),
        );
        self.handle_inner(event).instrument(span).await
    }

    async fn handle_inner(&self, event: QualifyingEvent) -> crate::Result<Outcome> {
        let id = event.id.clone();
        let status = self
            .store
            .read(|ledger| ledger.event(&id).map(|record| record.status()))
            .await?;
        match status {
            Some(EventStatus::Settled) => {
                tracing::debug!("event has been settled");
                return Ok(Outcome::Duplicate);
            }
            Some(EventStatus::Pending) => {
                tracing::info!("resuming settlement");
            }
            None => {
                let decided = match &event.kind {
                    EventKind::Register { .. } => self.register(&event).await,
                    EventKind::SecondReferral { .. } => self.enter_pool(&event).await,
                    EventKind::Retopup { .. } => self.retopup(&event).await,
                };
                match decided {
                    Ok(()) => {}
                    Err(crate::Error::Model(autopool_model::Error::DuplicateEvent(_))) => {
                        tracing::debug!("event has been recorded concurrently");
                        return Ok(Outcome::Duplicate);
                    }
                    Err(err) => {
                        tracing::warn!(%err, retryable = err.is_retryable(), "event rejected");
                        return Err(err);
                    }
                }
            }
        }
        self.settle(&id).await?;
        Ok(Outcome::Settled)
    }

    async fn register(&self, event: &QualifyingEvent) -> crate::Result<()> {
        let EventKind::Register {
            participant,
            address,
            ancestor,
        } = &event.kind
        else {
            return Err(crate::Error::unknown("not a registration"));
        };
        let at = OffsetDateTime::now_utc();
        self.store
            .write(|ledger| {
                ledger.record_event(event.id.clone(), event.kind.clone(), &[], at)?;
                ledger.register(*participant, address.clone(), *ancestor)?;
                Ok(())
            })
            .await?;
        tracing::info!(ancestor = ?ancestor, "registered");
        Ok(())
    }

    async fn enter_pool(&self, event: &QualifyingEvent) -> crate::Result<()> {
        let EventKind::SecondReferral {
            participant,
            ancestor,
        } = &event.kind
        else {
            return Err(crate::Error::unknown("not a second referral"));
        };
        let recorded = self
            .store
            .read(|ledger| {
                ledger
                    .try_participant(participant)
                    .map(|current| current.ancestor())
            })
            .await??;
        if ancestor.is_some() && *ancestor != recorded {
            tracing::warn!(?ancestor, ?recorded, "ancestor mismatch, keeping the recorded one");
        }

        let _guard = self.placement.lock().await;
        let available = self.available_balance().await?;

        let report = self
            .place(&event.id, Some(&event.kind), Placement::entry(*participant), available)
            .await?;

        let mut candidates = report
            .progression_candidates()
            .iter()
            .copied()
            .collect::<VecDeque<_>>();
        while let Some(candidate) = candidates.pop_front() {
            let decision = self
                .store
                .read(|ledger| {
                    ledger.progression_decision(
                        &self.params.pool,
                        candidate.participant,
                        &candidate.tree,
                    )
                })
                .await??;
            match decision {
                ProgressDecision::Ready { amount } => {
                    tracing::info!(
                        participant = %candidate.participant,
                        tree = %candidate.tree,
                        %amount,
                        "progressing"
                    );
                }
                ProgressDecision::InsufficientReserve { have, need } => {
                    tracing::debug!(
                        participant = %candidate.participant,
                        tree = %candidate.tree,
                        %have,
                        %need,
                        "reserve does not cover the next level yet"
                    );
                    continue;
                }
                decision => {
                    tracing::debug!(participant = %candidate.participant, ?decision, "not progressing");
                    continue;
                }
            }
            let placement = Placement::progression(candidate.participant, candidate.tree)?;
            match self.place(&event.id, None, placement, available).await {
                Ok(report) => {
                    candidates.extend(report.progression_candidates().iter().copied());
                }
                Err(
                    err @ crate::Error::Model(
                        autopool_model::Error::TreeCapacityReached { .. }
                        | autopool_model::Error::InsufficientFunds { .. },
                    ),
                ) => {
                    tracing::warn!(
                        %err,
                        participant = %candidate.participant,
                        tree = %candidate.tree,
                        "progression deferred"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Pop a slot and place in one ledger write together with the resulting payouts.
    ///
    /// The event is recorded when `kind` is given, otherwise the payouts are appended to it.
    async fn place(
        &self,
        event: &EventId,
        kind: Option<&EventKind>,
        placement: Placement,
        available: Amount,
    ) -> crate::Result<PlacementReport> {
        loop {
            let slot = self.queue.pop(placement.level).await?;
            tracing::debug!(level = placement.level, slot = ?slot, "popped slot");
            let at = OffsetDateTime::now_utc();
            let result = self
                .store
                .write(|ledger| {
                    if kind.is_some() {
                        ledger.ensure_new_event(event)?;
                    }
                    let report = ledger.place(&self.params, placement, slot, at)?.execute()?;
                    ledger.check_funds(available, reward::total(report.payouts())?)?;
                    match kind {
                        Some(kind) => {
                            ledger.record_event(event.clone(), kind.clone(), report.payouts(), at)?;
                        }
                        None => ledger.append_payouts(event, report.payouts(), at)?,
                    }
                    Ok(report)
                })
                .await;
            match result {
                Ok(report) => {
                    self.queue.push(report.child_slots()).await?;
                    tracing::info!(
                        level = placement.level,
                        node = %report.node(),
                        slot = %report.slot(),
                        completed_parent = ?report.completed_parent(),
                        completed_tree = ?report.completed_tree(),
                        "placed"
                    );
                    return Ok(report);
                }
                Err(crate::Error::Model(autopool_model::Error::SlotOccupied(stale))) => {
                    tracing::debug!(%stale, "dropping stale slot");
                }
                Err(err) => {
                    if let Some(slot) = slot {
                        self.queue.push_front(slot).await?;
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn retopup(&self, event: &QualifyingEvent) -> crate::Result<()> {
        let EventKind::Retopup { participant } = &event.kind else {
            return Err(crate::Error::unknown("not a retopup"));
        };
        // Funds are checked under the placement lock, as for placements.
        let _guard = self.placement.lock().await;
        let available = self.available_balance().await?;
        let at = OffsetDateTime::now_utc();
        let total = self
            .store
            .write(|ledger| {
                ledger.ensure_new_event(&event.id)?;
                let report = ledger.retopup(&self.params, *participant)?.execute()?;
                let total = report.total()?;
                ledger.check_funds(available, total)?;
                ledger.record_event(event.id.clone(), event.kind.clone(), report.payouts(), at)?;
                Ok(total)
            })
            .await?;
        tracing::info!(%total, "level income decided");
        Ok(())
    }

    /// Submit every pending chunk of the event that the gateway does not know yet and apply
    /// the results.
    async fn settle(&self, id: &EventId) -> crate::Result<()> {
        for chunk in self.pending_chunks(id).await? {
            let status = match self.bounded(self.gateway.batch_status(&chunk.key)).await? {
                Some(status) => status,
                None => {
                    let submission = tokio::time::timeout(
                        self.gateway_timeout,
                        self.gateway.submit_batch(&chunk.key, &chunk.batch),
                    )
                    .await;
                    match submission {
                        Err(_) => {
                            tracing::warn!(key = %chunk.key, "submission timed out");
                            return Err(crate::Error::GatewayTimeout(chunk.key));
                        }
                        Ok(Err(crate::Error::GatewayRejected { reason, .. })) => {
                            BatchStatus::Failed { reason }
                        }
                        Ok(status) => status?,
                    }
                }
            };
            self.apply_status(id, &chunk, status).await?;
        }

        let (status, failed) = self
            .store
            .read(|ledger| {
                let status = ledger.event(id).map(|record| record.status());
                let failed = ledger.entries_of(id).map(|entries| {
                    entries
                        .iter()
                        .filter(|entry| entry.status() == EntryStatus::Failed)
                        .count()
                });
                (status, failed)
            })
            .await?;
        let failed = failed?;
        if failed != 0 {
            return Err(crate::Error::Unsettled {
                event: id.to_string(),
                failed,
            });
        }
        if status != Some(EventStatus::Settled) {
            return Err(crate::Error::unknown(format!("event `{id}` is not settled")));
        }
        Ok(())
    }

    /// Apply a gateway status to the entries of the chunk.
    ///
    /// Returns whether the event is settled afterwards.
    pub(crate) async fn apply_status(
        &self,
        id: &EventId,
        chunk: &PendingChunk,
        status: BatchStatus,
    ) -> crate::Result<bool> {
        match status {
            BatchStatus::Confirmed(receipt) => {
                let at = OffsetDateTime::now_utc();
                let transaction = receipt.transaction_ref();
                let settled = self
                    .store
                    .write(|ledger| ledger.confirm_entries(id, &chunk.entries, &transaction, at))
                    .await?;
                tracing::info!(
                    key = %chunk.key,
                    transaction = %receipt.transaction_id,
                    block = receipt.confirmed_block,
                    settled,
                    "batch confirmed"
                );
                Ok(settled)
            }
            BatchStatus::InFlight { transaction_id } => {
                tracing::info!(key = %chunk.key, ?transaction_id, "batch is in flight");
                Err(crate::Error::InFlight(chunk.key.clone()))
            }
            BatchStatus::Failed { reason } => {
                self.store
                    .write(|ledger| ledger.fail_entries(id, &chunk.entries, &reason))
                    .await?;
                tracing::warn!(key = %chunk.key, %reason, "batch rejected");
                Err(crate::Error::GatewayRejected {
                    key: chunk.key.clone(),
                    reason,
                })
            }
        }
    }

    pub(crate) async fn pending_chunks(&self, id: &EventId) -> crate::Result<Vec<PendingChunk>> {
        let max_batch_size = self.params.max_batch_size.min(self.gateway.max_batch_size());
        Ok(self
            .store
            .read(|ledger| ledger.pending_chunks(id, max_batch_size))
            .await??)
    }

    /// Settle every pending event. Returns the ids of the events that remain pending.
    pub async fn settle_pending(&self) -> crate::Result<Vec<EventId>> {
        let pending = self
            .store
            .read(|ledger| {
                ledger
                    .pending_events()
                    .map(|record| record.id().clone())
                    .collect::<Vec<_>>()
            })
            .await?;
        let mut remaining = Vec::new();
        for id in pending {
            if let Err(err) = self.settle(&id).await {
                tracing::warn!(event = %id, %err, "event remains pending");
                remaining.push(id);
            }
        }
        Ok(remaining)
    }

    /// Rebuild the placement queue of the level from the free slots recorded in the ledger.
    pub async fn rebuild_queue(&self, level: PoolLevel) -> crate::Result<usize> {
        let _guard = self.placement.lock().await;
        let slots = self.store.read(|ledger| ledger.free_slots(level)).await?;
        let len = slots.len();
        self.queue.reset(level, slots).await?;
        tracing::debug!(level, len, "rebuilt placement queue");
        Ok(len)
    }

    /// Rebuild the placement queues of every level with nodes.
    pub async fn rebuild_queues(&self) -> crate::Result<()> {
        let levels = self
            .store
            .read(|ledger| ledger.levels().collect::<Vec<_>>())
            .await?;
        for level in levels {
            self.rebuild_queue(level).await?;
        }
        Ok(())
    }

    pub(crate) async fn bounded<T>(
        &self,
        fut: impl Future<Output = crate::Result<T>>,
    ) -> crate::Result<T> {
        tokio::time::timeout(self.gateway_timeout, fut)
            .await
            .map_err(|_| crate::Error::transport("gateway call timed out"))?
    }

    async fn available_balance(&self) -> crate::Result<Amount> {
        self.bounded(self.gateway.available_balance()).await
    }
}

#[cfg(test)]
mod tests {
    use autopool_model::{
        test::{address, params},
        Ledger, ParticipantId, RewardTag,
    };

    use crate::{
        gateway::{memory::Mode, MemoryGateway},
        queue::MemoryPlacementQueue,
        store::MemoryLedgerStore,
        test::setup_fmt_tracing,
    };

    use super::*;

    type TestEngine = Engine<MemoryLedgerStore, MemoryPlacementQueue, MemoryGateway>;

    fn engine(balance: Amount) -> TestEngine {
        Engine::new(
            MemoryLedgerStore::default(),
            MemoryPlacementQueue::default(),
            MemoryGateway::new(balance, 50),
            params(),
            Duration::from_secs(10),
        )
    }

    fn register(id: u64, ancestor: Option<u64>) -> QualifyingEvent {
        QualifyingEvent::new(
            format!("reg-{id}"),
            EventKind::Register {
                participant: ParticipantId(id),
                address: address(id),
                ancestor: ancestor.map(ParticipantId),
            },
        )
    }

    fn enter(id: u64) -> QualifyingEvent {
        QualifyingEvent::new(
            format!("pool-{id}"),
            EventKind::SecondReferral {
                participant: ParticipantId(id),
                ancestor: None,
            },
        )
    }

    fn retopup(id: u64, n: u32) -> QualifyingEvent {
        QualifyingEvent::new(
            format!("retopup-{id}-{n}"),
            EventKind::Retopup {
                participant: ParticipantId(id),
            },
        )
    }

    async fn ledger(engine: &TestEngine) -> Ledger {
        engine.store().snapshot().await
    }

    #[tokio::test]
    async fn completion_pays_one_batch() -> crate::Result<()> {
        let _tracing = setup_fmt_tracing("info");
        let engine = engine(1_000);
        for id in 1..=3 {
            assert_eq!(engine.handle(register(id, None)).await?, Outcome::Settled);
            assert_eq!(engine.handle(enter(id)).await?, Outcome::Settled);
        }
        // Placements of 1 and 2 pay nothing, the third completes the root.
        assert_eq!(engine.gateway().submissions().await, 1);
        assert_eq!(engine.gateway().balance().await, 975);
        assert_eq!(engine.gateway().paid_to(&address(1)).await, 12);
        assert_eq!(engine.gateway().paid_to(&address(0)).await, 13);
        assert_eq!(engine.queue().len(1).await?, 4);

        let ledger = ledger(&engine).await;
        let income = ledger.try_participant(&ParticipantId(1))?.income();
        assert_eq!(income.get(autopool_model::IncomeKind::AutoPool), 12);
        assert!(ledger.pending_events().next().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_events_have_one_effect() -> crate::Result<()> {
        let engine = engine(1_000);
        for id in 1..=3 {
            engine.handle(register(id, None)).await?;
            engine.handle(enter(id)).await?;
        }
        let before = ledger(&engine).await;
        assert_eq!(engine.handle(enter(3)).await?, Outcome::Duplicate);
        assert_eq!(engine.handle(register(2, None)).await?, Outcome::Duplicate);
        assert_eq!(ledger(&engine).await, before);
        assert_eq!(engine.gateway().submissions().await, 1);

        let again = QualifyingEvent::new("pool-3-again", enter(3).kind);
        assert!(matches!(
            engine.handle(again).await,
            Err(crate::Error::Model(autopool_model::Error::AlreadyInPool(_)))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_deliveries_place_once() -> crate::Result<()> {
        let engine = engine(1_000);
        engine.handle(register(1, None)).await?;

        // Both deliveries pass the status check before either takes the placement lock.
        let guard = engine.placement.lock().await;
        let (first, second, ()) = tokio::join!(
            engine.handle(enter(1)),
            engine.handle(enter(1)),
            async {
                tokio::task::yield_now().await;
                drop(guard);
            }
        );
        assert_eq!(first?, Outcome::Settled);
        assert_eq!(second?, Outcome::Duplicate);

        let ledger = ledger(&engine).await;
        assert_eq!(ledger.nodes_at(1).count(), 1);
        assert_eq!(engine.queue().slots(1).await?, ledger.free_slots(1));
        assert_eq!(engine.gateway().submissions().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn insufficient_funds_leave_no_trace() -> crate::Result<()> {
        let engine = engine(20);
        for id in 1..=2 {
            engine.handle(register(id, None)).await?;
            engine.handle(enter(id)).await?;
        }
        engine.handle(register(3, None)).await?;
        let before = ledger(&engine).await;
        let queued = engine.queue().slots(1).await?;

        let err = engine.handle(enter(3)).await.err();
        assert!(matches!(
            err,
            Some(crate::Error::Model(autopool_model::Error::InsufficientFunds {
                required: 25,
                available: 20
            }))
        ));
        assert!(err.is_some_and(|err| err.is_retryable()));
        assert_eq!(ledger(&engine).await, before);
        assert_eq!(engine.queue().slots(1).await?, queued);

        engine.gateway().set_balance(25).await;
        assert_eq!(engine.handle(enter(3)).await?, Outcome::Settled);
        assert_eq!(engine.gateway().balance().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn unregistered_participants_are_replayable() -> crate::Result<()> {
        let engine = engine(1_000);
        let err = engine.handle(enter(1)).await.err();
        assert!(err.is_some_and(|err| err.is_retryable()));
        engine.handle(register(1, None)).await?;
        assert_eq!(engine.handle(enter(1)).await?, Outcome::Settled);
        Ok(())
    }

    #[tokio::test]
    async fn retopup_settles_the_waterfall() -> crate::Result<()> {
        let engine = engine(1_000);
        engine.handle(register(1, None)).await?;
        engine.handle(register(2, Some(1))).await?;
        engine.handle(register(3, Some(2))).await?;

        // Nobody has retopped: everything goes to the platform.
        engine.handle(retopup(3, 1)).await?;
        assert_eq!(engine.gateway().paid_to(&address(0)).await, 40);

        engine.handle(retopup(2, 1)).await?;
        assert!(ledger(&engine).await.try_participant(&ParticipantId(2))?.has_retopped());

        engine.handle(retopup(3, 2)).await?;
        assert_eq!(engine.gateway().paid_to(&address(2)).await, 12);
        let entries = ledger(&engine).await;
        let tags = entries
            .entries_of(&EventId::new("retopup-3-2"))?
            .iter()
            .map(|entry| entry.tag())
            .collect::<Vec<_>>();
        assert_eq!(
            tags,
            [
                RewardTag::LevelIncome(1),
                RewardTag::LevelIncomeForfeited(2),
                RewardTag::PlatformRemainder
            ]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_batches_are_never_resubmitted() -> crate::Result<()> {
        let engine = engine(1_000);
        engine.handle(register(1, None)).await?;
        engine.handle(register(2, Some(1))).await?;
        engine.handle(retopup(2, 1)).await?;
        let submissions = engine.gateway().submissions().await;

        engine.gateway().set_mode(Mode::Stall).await;
        let err = engine.handle(retopup(2, 2)).await.err();
        assert!(matches!(err, Some(crate::Error::GatewayTimeout(ref key)) if key == "retopup-2-2#0"));
        assert_eq!(engine.gateway().submissions().await, submissions + 1);

        // The batch is known to the rail: replaying must not submit it again.
        let err = engine.handle(retopup(2, 2)).await.err();
        assert!(matches!(err, Some(crate::Error::InFlight(_))));
        assert_eq!(engine.gateway().submissions().await, submissions + 1);

        engine.gateway().confirm_in_flight("retopup-2-2#0").await?;
        assert_eq!(engine.handle(retopup(2, 2)).await?, Outcome::Settled);
        assert_eq!(engine.gateway().submissions().await, submissions + 1);
        assert_eq!(engine.handle(retopup(2, 2)).await?, Outcome::Duplicate);
        Ok(())
    }

    #[tokio::test]
    async fn rejected_batches_stay_unsettled() -> crate::Result<()> {
        let engine = engine(1_000);
        engine.handle(register(1, None)).await?;
        engine
            .gateway()
            .set_mode(Mode::Reject("paused".to_string()))
            .await;
        let err = engine.handle(retopup(1, 1)).await.err();
        assert!(matches!(err, Some(crate::Error::GatewayRejected { ref reason, .. }) if reason == "paused"));
        assert!(!ledger(&engine).await.try_participant(&ParticipantId(1))?.has_retopped());

        let err = engine.handle(retopup(1, 1)).await.err();
        assert!(matches!(
            err,
            Some(crate::Error::Unsettled { failed: 1, .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn queue_is_rebuilt_from_the_ledger() -> crate::Result<()> {
        let engine = engine(1_000);
        for id in 1..=4 {
            engine.handle(register(id, None)).await?;
            engine.handle(enter(id)).await?;
        }
        let queued = engine.queue().slots(1).await?;
        engine.queue().reset(1, Vec::new()).await?;
        assert_eq!(engine.rebuild_queue(1).await?, queued.len());
        assert_eq!(engine.queue().slots(1).await?, queued);
        Ok(())
    }
}
