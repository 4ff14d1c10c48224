use crate::{num::Amount, EventId, NodeId, ParticipantId, PoolLevel, Slot, TreeId};

/// Error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Invalid params.
    #[error("invalid params: {0}")]
    InvalidParams(&'static str),
    /// Overflow.
    #[error("overflow")]
    Overflow,
    /// Unknown computation error.
    #[error("computation error: {0}")]
    Computation(&'static str),
    /// Unknown participant.
    #[error("unknown participant: {0}")]
    UnknownParticipant(ParticipantId),
    /// Participant already registered.
    #[error("participant {0} is already registered")]
    AlreadyRegistered(ParticipantId),
    /// Participant already entered auto-pool.
    #[error("participant {0} has already entered auto-pool")]
    AlreadyInPool(ParticipantId),
    /// Unknown node.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
    /// Unknown tree.
    #[error("unknown tree: {0}")]
    UnknownTree(TreeId),
    /// The slot has been taken.
    #[error("slot {0} is already occupied")]
    SlotOccupied(Slot),
    /// Slot level mismatched.
    #[error("slot {slot} does not belong to pool level {level}")]
    SlotLevelMismatch {
        /// The slot.
        slot: Slot,
        /// Expected level.
        level: PoolLevel,
    },
    /// Too many open trees at the level.
    #[error("tree capacity reached at pool level {level}: {open} open trees")]
    TreeCapacityReached {
        /// Pool level.
        level: PoolLevel,
        /// Number of open trees.
        open: u32,
    },
    /// Top pool level has no next level.
    #[error("pool level {0} is the top level")]
    TopLevel(PoolLevel),
    /// Not eligible for progression.
    #[error("participant {participant} is not eligible to progress from tree {tree}: {reason}")]
    NotEligible {
        /// Participant.
        participant: ParticipantId,
        /// Tree.
        tree: TreeId,
        /// Reason.
        reason: &'static str,
    },
    /// Insufficient reserved income.
    #[error("insufficient reserve for {participant} at level {level}: required={required}, available={available}")]
    InsufficientReserve {
        /// Participant.
        participant: ParticipantId,
        /// Pool level of the reservation.
        level: PoolLevel,
        /// Required amount.
        required: Amount,
        /// Available amount.
        available: Amount,
    },
    /// Insufficient funds on the payment rail.
    #[error("insufficient funds: required={required}, available={available}")]
    InsufficientFunds {
        /// Required amount.
        required: Amount,
        /// Available amount.
        available: Amount,
    },
    /// Invalid payout batch.
    #[error("invalid batch: {0}")]
    InvalidBatch(&'static str),
    /// Event has been recorded.
    #[error("duplicate event: {0}")]
    DuplicateEvent(EventId),
    /// Unknown event.
    #[error("unknown event: {0}")]
    UnknownEvent(EventId),
    /// Invalid reward tag.
    #[error("invalid reward tag: {0}")]
    InvalidRewardTag(String),
}
