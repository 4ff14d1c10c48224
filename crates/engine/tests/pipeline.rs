use std::time::Duration;

use autopool_engine::{
    gateway::MemoryGateway, queue::MemoryPlacementQueue, store::MemoryLedgerStore, Engine,
    LedgerStore, Outcome, PaymentGateway, PlacementQueue,
};
use autopool_model::{
    test::{address, params, params_with, BASE_ENTRY_VALUE},
    Amount, EntryStatus, EventId, EventKind, Params, ParticipantId, PoolParams, QualifyingEvent,
    Slot, TreeId,
};
use futures_util::future::try_join_all;

type MemoryEngine = Engine<MemoryLedgerStore, MemoryPlacementQueue, MemoryGateway>;

const BALANCE: Amount = 100_000;

fn engine_with(params: Params, max_batch_size: usize) -> MemoryEngine {
    Engine::new(
        MemoryLedgerStore::default(),
        MemoryPlacementQueue::default(),
        MemoryGateway::new(BALANCE, max_batch_size),
        params,
        Duration::from_secs(10),
    )
}

fn engine_with_batch_size(max_batch_size: usize) -> MemoryEngine {
    engine_with(params(), max_batch_size)
}

fn engine() -> MemoryEngine {
    engine_with_batch_size(50)
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

fn retopup(id: u64) -> QualifyingEvent {
    QualifyingEvent::new(
        format!("retopup-{id}"),
        EventKind::Retopup {
            participant: ParticipantId(id),
        },
    )
}

async fn register_all(engine: &MemoryEngine, count: u64) -> autopool_engine::Result<()> {
    for id in 1..=count {
        engine.handle(register(id, None)).await?;
    }
    Ok(())
}

#[tokio::test]
async fn concurrent_entries_keep_queue_and_ledger_in_step() -> autopool_engine::Result<()> {
    let engine = engine();
    register_all(&engine, 40).await?;

    let outcomes = try_join_all((1..=40).map(|id| engine.handle(enter(id)))).await?;
    assert!(outcomes.iter().all(|outcome| *outcome == Outcome::Settled));

    let ledger = engine.store().snapshot().await;

    // Every placement consumes one slot and pushes two.
    assert_eq!(engine.queue().len(1).await?, 41);
    assert_eq!(engine.queue().slots(1).await?, ledger.free_slots(1));

    let nodes = ledger.nodes_at(1).collect::<Vec<_>>();
    assert_eq!(nodes.len(), 40);
    for node in &nodes {
        assert_eq!(node.is_complete(), node.child_count() == 2);
    }

    let trees = ledger.trees(1);
    assert_eq!(trees.len(), 1);
    assert!(trees[0].is_complete());
    assert_eq!(trees[0].completed_nodes(), 15);
    assert_eq!(trees[0].last_four().len(), 4);

    // Each completed node distributes exactly one entry value.
    let completed = nodes.iter().filter(|node| node.is_complete()).count();
    assert_eq!(completed, 19);
    let paid = ledger.entries().map(|entry| entry.amount()).sum::<Amount>();
    let reserved = ledger.reserves().map(|(_, _, balance)| balance).sum::<Amount>();
    assert_eq!(paid + reserved, 25 * completed as Amount);
    assert!(ledger
        .entries()
        .all(|entry| entry.status() == EntryStatus::Confirmed));
    assert_eq!(engine.gateway().balance().await, BALANCE - paid);

    assert!(engine.reconciler().run().await?.is_clean());
    Ok(())
}

#[tokio::test]
async fn last_four_progress_with_their_reserves() -> autopool_engine::Result<()> {
    let engine = engine();
    register_all(&engine, 31).await?;
    for id in 1..=30 {
        engine.handle(enter(id)).await?;
    }
    assert_eq!(engine.gateway().submissions().await, 14);

    engine
        .store()
        .write(|ledger| {
            for id in 12..=15 {
                ledger.credit_reserve(ParticipantId(id), 1, 50)?;
            }
            Ok(())
        })
        .await?;
    assert_eq!(engine.handle(enter(31)).await?, Outcome::Settled);

    let ledger = engine.store().snapshot().await;
    let last_four = [12, 13, 14, 15].map(ParticipantId);
    let tree = ledger.try_tree(&TreeId {
        level: 1,
        number: 1,
    })?;
    assert!(tree.is_complete());
    assert_eq!(tree.last_four(), last_four);
    assert_eq!(tree.progressed().len(), 4);
    for participant in &last_four {
        assert_eq!(ledger.reserve(participant, 1), 0);
    }

    let owners = ledger
        .nodes_at(2)
        .map(|node| node.owner())
        .collect::<Vec<_>>();
    assert_eq!(owners, last_four);
    assert_eq!(engine.queue().len(1).await?, 32);
    assert_eq!(engine.queue().len(2).await?, 5);

    // The completing entry and the four re-entries settle in one batch.
    let total = ledger
        .entries_of(&EventId::new("pool-31"))?
        .iter()
        .map(|entry| entry.amount())
        .sum::<Amount>();
    assert_eq!(total, 25 + 4 * 50);
    assert_eq!(engine.gateway().submissions().await, 15);
    assert_eq!(engine.gateway().balance().await, BALANCE - 14 * 25 - total);
    Ok(())
}

#[tokio::test]
async fn progression_is_deferred_at_tree_capacity() -> autopool_engine::Result<()> {
    let pool = PoolParams::builder()
        .base_entry_value(BASE_ENTRY_VALUE)
        .max_open_trees(1)
        .build();
    let engine = engine_with(params_with(pool), 50);
    register_all(&engine, 31).await?;
    for id in 1..=30 {
        engine.handle(enter(id)).await?;
    }
    engine
        .store()
        .write(|ledger| {
            for id in 12..=15 {
                ledger.credit_reserve(ParticipantId(id), 1, 50)?;
            }
            Ok(())
        })
        .await?;

    // Stale root slots: only the first re-entry may open a level 2 tree.
    engine.queue().push(&[Slot::root(2), Slot::root(2)]).await?;
    assert_eq!(engine.handle(enter(31)).await?, Outcome::Settled);

    let ledger = engine.store().snapshot().await;
    assert_eq!(ledger.trees(2).len(), 1);
    let owners = ledger
        .nodes_at(2)
        .map(|node| node.owner())
        .collect::<Vec<_>>();
    assert_eq!(owners, [ParticipantId(12)]);
    assert_eq!(ledger.reserve(&ParticipantId(12), 1), 0);
    for id in 13..=15 {
        assert_eq!(ledger.reserve(&ParticipantId(id), 1), 50);
    }
    let tree = ledger.try_tree(&TreeId {
        level: 1,
        number: 1,
    })?;
    assert_eq!(tree.progressed().len(), 1);

    let total = ledger
        .entries_of(&EventId::new("pool-31"))?
        .iter()
        .map(|entry| entry.amount())
        .sum::<Amount>();
    assert_eq!(total, 25 + 50);
    assert!(ledger.pending_events().next().is_none());
    Ok(())
}

#[tokio::test]
async fn large_events_are_split_into_chunks() -> autopool_engine::Result<()> {
    let engine = engine_with_batch_size(2);
    engine.handle(register(1, None)).await?;
    engine.handle(register(2, Some(1))).await?;
    engine.handle(register(3, Some(2))).await?;
    engine.handle(retopup(2)).await?;
    let submissions = engine.gateway().submissions().await;

    // Level income of depth 1, a forfeited share of depth 2 and the remainder.
    assert_eq!(engine.handle(retopup(3)).await?, Outcome::Settled);
    assert_eq!(engine.gateway().submissions().await, submissions + 2);
    for key in ["retopup-3#0", "retopup-3#1"] {
        assert!(engine.gateway().batch_status(key).await?.is_some());
    }
    assert_eq!(engine.gateway().paid_to(&address(2)).await, 12);
    Ok(())
}

#[tokio::test]
async fn replayed_streams_have_no_effect() -> autopool_engine::Result<()> {
    let engine = engine();
    let mut events = Vec::new();
    for id in 1..=10 {
        events.push(register(id, id.checked_sub(1).filter(|id| *id != 0)));
    }
    events.extend((1..=10).map(retopup));
    events.extend((1..=7).map(enter));

    for event in events.clone() {
        assert_eq!(engine.handle(event).await?, Outcome::Settled);
    }
    let ledger = engine.store().snapshot().await;
    let submissions = engine.gateway().submissions().await;
    let balance = engine.gateway().balance().await;

    for event in events {
        assert_eq!(engine.handle(event).await?, Outcome::Duplicate);
    }
    assert_eq!(engine.store().snapshot().await, ledger);
    assert_eq!(engine.gateway().submissions().await, submissions);
    assert_eq!(engine.gateway().balance().await, balance);
    assert!(ledger.pending_events().next().is_none());
    Ok(())
}
