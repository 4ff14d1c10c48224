use std::fmt;

use time::OffsetDateTime;

use crate::{num::Amount, Address, EventId, EventKind, ParticipantId, RewardTag};

/// Ledger entry id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry-{}", self.0)
    }
}

/// Status of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "strum",
    derive(strum::EnumIter, strum::EnumString, strum::Display)
)]
#[cfg_attr(feature = "strum", strum(serialize_all = "snake_case"))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EntryStatus {
    /// Decided, not yet confirmed by the payment rail.
    Pending,
    /// Confirmed by the payment rail.
    Confirmed,
    /// Rejected by the payment rail.
    Failed,
}

/// Reference to a transaction on the payment rail.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransactionRef {
    /// Transaction id.
    pub id: String,
    /// Block the transaction was confirmed in.
    pub block: u64,
}

/// A record of one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LedgerEntry {
    pub(crate) id: EntryId,
    pub(crate) event: EventId,
    pub(crate) recipient: Address,
    pub(crate) participant: Option<ParticipantId>,
    pub(crate) tag: RewardTag,
    pub(crate) amount: Amount,
    pub(crate) status: EntryStatus,
    pub(crate) transaction: Option<TransactionRef>,
    pub(crate) failure: Option<String>,
    pub(crate) description: String,
}

impl LedgerEntry {
    /// Get id.
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// The event that produced the entry.
    pub fn event(&self) -> &EventId {
        &self.event
    }

    /// Recipient address.
    pub fn recipient(&self) -> &Address {
        &self.recipient
    }

    /// Recipient participant, `None` for the platform wallet.
    pub fn participant(&self) -> Option<ParticipantId> {
        self.participant
    }

    /// Reward tag.
    pub fn tag(&self) -> RewardTag {
        self.tag
    }

    /// Amount.
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Status.
    pub fn status(&self) -> EntryStatus {
        self.status
    }

    /// Confirmed transaction.
    pub fn transaction(&self) -> Option<&TransactionRef> {
        self.transaction.as_ref()
    }

    /// Failure reason reported by the payment rail.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Free-text description.
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Status of a processed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "strum",
    derive(strum::EnumIter, strum::EnumString, strum::Display)
)]
#[cfg_attr(feature = "strum", strum(serialize_all = "snake_case"))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EventStatus {
    /// Decisions recorded, payments not all confirmed.
    Pending,
    /// Every payment of the event has been confirmed.
    Settled,
}

/// Record of a processed event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventRecord {
    pub(crate) id: EventId,
    pub(crate) kind: EventKind,
    pub(crate) status: EventStatus,
    pub(crate) entries: Vec<EntryId>,
    pub(crate) attempt: u32,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub(crate) recorded_at: OffsetDateTime,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub(crate) settled_at: Option<OffsetDateTime>,
}

impl EventRecord {
    /// Get id.
    pub fn id(&self) -> &EventId {
        &self.id
    }

    /// Get kind.
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Get status.
    pub fn status(&self) -> EventStatus {
        self.status
    }

    /// Entries produced by the event, in decision order.
    pub fn entries(&self) -> &[EntryId] {
        &self.entries
    }

    /// Number of times failed payments have been re-armed.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Recording time.
    pub fn recorded_at(&self) -> OffsetDateTime {
        self.recorded_at
    }

    /// Settlement time.
    pub fn settled_at(&self) -> Option<OffsetDateTime> {
        self.settled_at
    }

    /// Idempotency key of the given chunk of this event on the payment gateway.
    pub fn chunk_key(&self, index: usize) -> String {
        if self.attempt == 0 {
            format!("{}#{index}", self.id)
        } else {
            format!("{}#{index}/{}", self.id, self.attempt)
        }
    }
}
