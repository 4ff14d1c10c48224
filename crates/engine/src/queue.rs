use std::{
    collections::{BTreeMap, VecDeque},
    future::Future,
};

use autopool_model::{PoolLevel, Slot};
use tokio::sync::Mutex;

/// FIFO queue of free slots, one per pool level.
///
/// The queue is a cache of the free slots recorded in the ledger and can always be rebuilt
/// from it.
pub trait PlacementQueue: Send + Sync {
    /// Pop the oldest slot of the level.
    fn pop(&self, level: PoolLevel) -> impl Future<Output = crate::Result<Option<Slot>>> + Send;

    /// Push slots to the back of their levels, in order.
    fn push(&self, slots: &[Slot]) -> impl Future<Output = crate::Result<()>> + Send;

    /// Return a slot to the front of its level.
    fn push_front(&self, slot: Slot) -> impl Future<Output = crate::Result<()>> + Send;

    /// Number of queued slots of the level.
    fn len(&self, level: PoolLevel) -> impl Future<Output = crate::Result<usize>> + Send;

    /// Queued slots of the level, oldest first.
    fn slots(&self, level: PoolLevel) -> impl Future<Output = crate::Result<Vec<Slot>>> + Send;

    /// Replace the slots of the level.
    fn reset(
        &self,
        level: PoolLevel,
        slots: Vec<Slot>,
    ) -> impl Future<Output = crate::Result<()>> + Send;
}

/// In-process placement queue.
#[derive(Debug, Default)]
pub struct MemoryPlacementQueue {
    levels: Mutex<BTreeMap<PoolLevel, VecDeque<Slot>>>,
}

impl PlacementQueue for MemoryPlacementQueue {
    async fn pop(&self, level: PoolLevel) -> crate::Result<Option<Slot>> {
        Ok(self
            .levels
            .lock()
            .await
            .get_mut(&level)
            .and_then(VecDeque::pop_front))
    }

    async fn push(&self, slots: &[Slot]) -> crate::Result<()> {
        let mut levels = self.levels.lock().await;
        for slot in slots {
            levels.entry(slot.level).or_default().push_back(*slot);
        }
        Ok(())
    }

    async fn push_front(&self, slot: Slot) -> crate::Result<()> {
        self.levels
            .lock()
            .await
            .entry(slot.level)
            .or_default()
            .push_front(slot);
        Ok(())
    }

    async fn len(&self, level: PoolLevel) -> crate::Result<usize> {
        Ok(self
            .levels
            .lock()
            .await
            .get(&level)
            .map(VecDeque::len)
            .unwrap_or_default())
    }

    async fn slots(&self, level: PoolLevel) -> crate::Result<Vec<Slot>> {
        Ok(self
            .levels
            .lock()
            .await
            .get(&level)
            .map(|slots| slots.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn reset(&self, level: PoolLevel, slots: Vec<Slot>) -> crate::Result<()> {
        self.levels.lock().await.insert(level, slots.into());
        Ok(())
    }
}
