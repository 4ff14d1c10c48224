#![deny(missing_docs)]
#![deny(unreachable_pub)]
#![warn(clippy::arithmetic_side_effects)]

//! Domain model of the auto-pool compensation engine.
//!
//! Everything in this crate is synchronous and deterministic. The [`Ledger`] holds
//! participants, pool trees, reserved income, ledger entries and processed events,
//! and the algorithms run against it as [`LedgerAction`]s.

/// Participants.
pub mod participant;

/// Pool trees and nodes.
pub mod tree;

/// Rewards and payouts.
pub mod reward;

/// Params.
pub mod params;

/// Qualifying events.
pub mod event;

/// Ledger state.
pub mod ledger;

/// Actions.
pub mod action;

/// Error type.
pub mod error;

/// Number utils.
pub mod num;

/// Utils for testing.
#[cfg(any(test, feature = "test"))]
pub mod test;

pub use action::{
    distribute::{Distribution, Reservation},
    place::{Funding, Placement, PlacementReport, ProgressionCandidate},
    progress::ProgressDecision,
    retopup::WaterfallReport,
    LedgerAction,
};
pub use error::Error;
pub use event::{EventId, EventKind, QualifyingEvent};
pub use ledger::{
    entry::{EntryId, EntryStatus, EventRecord, EventStatus, LedgerEntry, TransactionRef},
    Ledger, PendingChunk,
};
pub use num::Amount;
pub use params::{LevelIncomeParams, Params, PoolParams};
pub use participant::{Address, IncomeKind, IncomeTotals, Participant, ParticipantId};
pub use reward::{Payout, PayoutBatch, RewardTag};
pub use tree::{NodeId, PoolLevel, PoolNode, PoolTree, Position, Slot, TreeId, TreeProgress};

/// Alias for result.
pub type Result<T> = std::result::Result<T, Error>;
