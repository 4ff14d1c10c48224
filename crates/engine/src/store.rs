use std::{future::Future, path::PathBuf};

use autopool_model::Ledger;
use tokio::sync::RwLock;

/// Ledger storage.
///
/// A write either applies completely or not at all.
pub trait LedgerStore: Send + Sync {
    /// Read the ledger.
    fn read<R, F>(&self, f: F) -> impl Future<Output = crate::Result<R>> + Send
    where
        F: FnOnce(&Ledger) -> R + Send,
        R: Send;

    /// Apply a write to the ledger. Nothing is applied if `f` fails.
    fn write<R, F>(&self, f: F) -> impl Future<Output = crate::Result<R>> + Send
    where
        F: FnOnce(&mut Ledger) -> autopool_model::Result<R> + Send,
        R: Send;
}

/// In-memory ledger store with an optional JSON snapshot on disk.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    ledger: RwLock<Ledger>,
    snapshot: Option<PathBuf>,
}

impl MemoryLedgerStore {
    /// Create a store holding the given ledger.
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger: RwLock::new(ledger),
            snapshot: None,
        }
    }

    /// Open a store persisted at `path`, loading the snapshot if it exists.
    pub async fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        let ledger = if tokio::fs::try_exists(&path).await? {
            let data = tokio::fs::read(&path).await?;
            let ledger: Ledger = serde_json::from_slice(&data)?;
            tracing::info!(path = %path.display(), "loaded ledger snapshot");
            ledger
        } else {
            Ledger::default()
        };
        Ok(Self {
            ledger: RwLock::new(ledger),
            snapshot: Some(path),
        })
    }

    /// A copy of the current ledger.
    pub async fn snapshot(&self) -> Ledger {
        self.ledger.read().await.clone()
    }

    async fn persist(&self, ledger: &Ledger) -> crate::Result<()> {
        let Some(path) = self.snapshot.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(ledger)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

impl LedgerStore for MemoryLedgerStore {
    async fn read<R, F>(&self, f: F) -> crate::Result<R>
    where
        F: FnOnce(&Ledger) -> R + Send,
        R: Send,
    {
        Ok(f(&*self.ledger.read().await))
    }

    async fn write<R, F>(&self, f: F) -> crate::Result<R>
    where
        F: FnOnce(&mut Ledger) -> autopool_model::Result<R> + Send,
        R: Send,
    {
        let mut current = self.ledger.write().await;
        let mut next = current.clone();
        let output = f(&mut next)?;
        self.persist(&next).await?;
        *current = next;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use autopool_model::{test::address, ParticipantId};

    use super::*;

    #[tokio::test]
    async fn failed_write_leaves_no_trace() -> crate::Result<()> {
        let store = MemoryLedgerStore::default();
        store
            .write(|ledger| {
                ledger.register(ParticipantId(1), address(1), None)?;
                Ok(())
            })
            .await?;

        let result = store
            .write(|ledger| {
                ledger.register(ParticipantId(2), address(2), Some(ParticipantId(1)))?;
                ledger.register(ParticipantId(3), address(3), Some(ParticipantId(9)))?;
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(crate::Error::Model(
                autopool_model::Error::UnknownParticipant(ParticipantId(9))
            ))
        ));

        let ledger = store.snapshot().await;
        assert!(ledger.participant(&ParticipantId(2)).is_none());
        assert_eq!(
            store
                .read(|ledger| ledger.participants().count())
                .await?,
            1
        );
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() -> crate::Result<()> {
        let path = std::env::temp_dir()
            .join(format!("autopool-store-{}", std::process::id()))
            .join("ledger.json");
        let _ = tokio::fs::remove_file(&path).await;

        let store = MemoryLedgerStore::open(&path).await?;
        store
            .write(|ledger| {
                ledger.register(ParticipantId(1), address(1), None)?;
                ledger.credit_reserve(ParticipantId(1), 1, 30)?;
                Ok(())
            })
            .await?;

        let reopened = MemoryLedgerStore::open(&path).await?;
        assert_eq!(reopened.snapshot().await, store.snapshot().await);
        assert_eq!(
            reopened
                .read(|ledger| ledger.reserve(&ParticipantId(1), 1))
                .await?,
            30
        );
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }
}
