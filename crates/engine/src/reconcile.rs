use autopool_model::{EntryStatus, EventId, PoolLevel};

use crate::{
    engine::Engine,
    gateway::PaymentGateway,
    queue::PlacementQueue,
    store::LedgerStore,
};

/// Mismatch between the placement queue and the free slots recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct QueueDrift {
    /// Pool level.
    pub level: PoolLevel,
    /// Number of queued slots.
    pub queued: usize,
    /// Number of free slots in the ledger.
    pub free: usize,
}

/// Report of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReconciliationReport {
    /// Number of chunks found confirmed on the rail and finalised.
    pub confirmed: usize,
    /// Events settled by this pass.
    pub settled: Vec<EventId>,
    /// Events with chunks rejected by the rail.
    pub failed: Vec<EventId>,
    /// Number of chunks still in flight.
    pub in_flight: usize,
    /// Events with chunks the rail has never seen.
    pub unsubmitted: Vec<EventId>,
    /// Levels whose placement queue disagrees with the ledger.
    pub queue_drift: Vec<QueueDrift>,
}

impl ReconciliationReport {
    /// Whether nothing needs operator attention.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
            && self.in_flight == 0
            && self.unsubmitted.is_empty()
            && self.queue_drift.is_empty()
    }
}

/// Compares pending ledger entries against the payment rail.
///
/// Reconciliation never submits payments.
#[must_use]
pub struct Reconciler<'a, S, Q, G> {
    engine: &'a Engine<S, Q, G>,
}

impl<'a, S, Q, G> Reconciler<'a, S, Q, G>
where
    S: LedgerStore,
    Q: PlacementQueue,
    G: PaymentGateway,
{
    pub(crate) fn new(engine: &'a Engine<S, Q, G>) -> Self {
        Self { engine }
    }

    /// Run the reconciliation pass.
    pub async fn run(self) -> crate::Result<ReconciliationReport> {
        let mut report = ReconciliationReport::default();
        let pending = self
            .engine
            .store()
            .read(|ledger| {
                ledger
                    .pending_events()
                    .map(|record| record.id().clone())
                    .collect::<Vec<_>>()
            })
            .await?;

        for id in pending {
            let mut unsubmitted = false;
            for chunk in self.engine.pending_chunks(&id).await? {
                let status = self
                    .engine
                    .bounded(self.engine.gateway().batch_status(&chunk.key))
                    .await?;
                let Some(status) = status else {
                    tracing::error!(event = %id, key = %chunk.key, "pending chunk was never submitted");
                    unsubmitted = true;
                    continue;
                };
                match self.engine.apply_status(&id, &chunk, status).await {
                    Ok(settled) => {
                        report.confirmed = report.confirmed.saturating_add(1);
                        if settled {
                            report.settled.push(id.clone());
                        }
                    }
                    Err(crate::Error::InFlight(_)) => {
                        report.in_flight = report.in_flight.saturating_add(1);
                    }
                    Err(crate::Error::GatewayRejected { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
            let failed = self
                .engine
                .store()
                .read(|ledger| {
                    ledger.entries_of(&id).map(|entries| {
                        entries
                            .iter()
                            .filter(|entry| entry.status() == EntryStatus::Failed)
                            .count()
                    })
                })
                .await??;
            if unsubmitted {
                report.unsubmitted.push(id.clone());
            }
            if failed != 0 {
                tracing::error!(event = %id, failed, "payments were rejected by the rail");
                report.failed.push(id);
            }
        }

        let levels = self
            .engine
            .store()
            .read(|ledger| {
                ledger
                    .levels()
                    .map(|level| (level, ledger.free_slots(level)))
                    .collect::<Vec<_>>()
            })
            .await?;
        for (level, free) in levels {
            let queued = self.engine.queue().slots(level).await?;
            if queued != free {
                tracing::error!(level, queued = queued.len(), free = free.len(), "placement queue drifted");
                report.queue_drift.push(QueueDrift {
                    level,
                    queued: queued.len(),
                    free: free.len(),
                });
            }
        }

        tracing::info!(
            confirmed = report.confirmed,
            settled = report.settled.len(),
            failed = report.failed.len(),
            in_flight = report.in_flight,
            unsubmitted = report.unsubmitted.len(),
            "reconciled"
        );
        Ok(report)
    }

    /// Re-arm the failed entries of the event for resubmission under new idempotency keys.
    pub async fn rearm(self, event: &EventId) -> crate::Result<usize> {
        let count = self
            .engine
            .store()
            .write(|ledger| ledger.rearm(event))
            .await?;
        tracing::info!(%event, count, "re-armed failed entries");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use autopool_model::{
        test::{address, params},
        EventKind, LedgerAction, ParticipantId, QualifyingEvent,
    };

    use crate::{
        engine::Outcome,
        gateway::{memory::Mode, MemoryGateway},
        queue::MemoryPlacementQueue,
        store::MemoryLedgerStore,
    };

    use super::*;

    type TestEngine = Engine<MemoryLedgerStore, MemoryPlacementQueue, MemoryGateway>;

    async fn engine_with_root() -> crate::Result<TestEngine> {
        let engine = Engine::new(
            MemoryLedgerStore::default(),
            MemoryPlacementQueue::default(),
            MemoryGateway::new(1_000, 50),
            params(),
            Duration::from_secs(10),
        );
        engine
            .handle(QualifyingEvent::new(
                "reg-1",
                EventKind::Register {
                    participant: ParticipantId(1),
                    address: address(1),
                    ancestor: None,
                },
            ))
            .await?;
        Ok(engine)
    }

    fn retopup(id: &str) -> QualifyingEvent {
        QualifyingEvent::new(
            id,
            EventKind::Retopup {
                participant: ParticipantId(1),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_batches_are_finalised() -> crate::Result<()> {
        let engine = engine_with_root().await?;
        engine.gateway().set_mode(Mode::Stall).await;
        assert!(engine.handle(retopup("r-1")).await.is_err());

        let report = engine.reconciler().run().await?;
        assert_eq!(report.in_flight, 1);
        assert!(!report.is_clean());

        engine.gateway().confirm_in_flight("r-1#0").await?;
        let report = engine.reconciler().run().await?;
        assert_eq!(report.confirmed, 1);
        assert_eq!(report.settled, vec![EventId::new("r-1")]);
        assert!(report.is_clean());
        assert_eq!(engine.handle(retopup("r-1")).await?, Outcome::Duplicate);
        Ok(())
    }

    #[tokio::test]
    async fn rejected_batches_are_rearmed() -> crate::Result<()> {
        let engine = engine_with_root().await?;
        engine
            .gateway()
            .set_mode(Mode::Reject("paused".to_string()))
            .await;
        assert!(engine.handle(retopup("r-1")).await.is_err());

        let report = engine.reconciler().run().await?;
        assert_eq!(report.failed, vec![EventId::new("r-1")]);
        assert!(!report.is_clean());

        engine.gateway().set_mode(Mode::Confirm).await;
        assert_eq!(engine.reconciler().rearm(&EventId::new("r-1")).await?, 1);
        assert_eq!(engine.handle(retopup("r-1")).await?, Outcome::Settled);
        assert!(engine.gateway().batch_status("r-1#0/1").await?.is_some());
        assert_eq!(engine.gateway().paid_to(&address(0)).await, 40);
        Ok(())
    }

    #[tokio::test]
    async fn unsubmitted_chunks_and_queue_drift_are_reported() -> crate::Result<()> {
        let engine = engine_with_root().await?;
        let at = time::OffsetDateTime::now_utc();
        let params = engine.params().clone();
        engine
            .store()
            .write(move |ledger| {
                let report = ledger.retopup(&params, ParticipantId(1))?.execute()?;
                ledger.record_event(EventId::new("r-1"), retopup("r-1").kind, report.payouts(), at)?;
                let entry = autopool_model::Placement::entry(ParticipantId(1));
                ledger.place(&params, entry, None, at)?.execute()?;
                Ok(())
            })
            .await?;

        let report = engine.reconciler().run().await?;
        assert_eq!(report.unsubmitted, vec![EventId::new("r-1")]);
        assert_eq!(
            report.queue_drift,
            vec![QueueDrift {
                level: 1,
                queued: 0,
                free: 2
            }]
        );

        engine.rebuild_queues().await?;
        assert!(engine.reconciler().run().await?.queue_drift.is_empty());
        Ok(())
    }
}
