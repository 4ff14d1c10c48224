use time::OffsetDateTime;

use crate::{
    num::Amount,
    params::{Params, PoolParams},
    Ledger, ParticipantId, Slot, TreeId,
};

use super::place::{PlaceParticipant, Placement};

/// Whether one of the last four of a tree can be re-entered at the next level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressDecision {
    /// The reservation covers the next entry value.
    Ready {
        /// The amount to debit from the reservation.
        amount: Amount,
    },
    /// The reservation does not cover the next entry value yet.
    InsufficientReserve {
        /// Current reservation.
        have: Amount,
        /// Next entry value.
        need: Amount,
    },
    /// The participant has progressed from this tree before.
    AlreadyProgressed,
    /// The tree is at the top level.
    TopLevel,
    /// The participant is not one of the last four of a complete tree.
    NotLastFour,
}

impl ProgressDecision {
    /// Whether the participant can progress now.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

impl Ledger {
    /// Decide whether `participant` can progress from `tree` to the next level.
    pub fn progression_decision(
        &self,
        params: &PoolParams,
        participant: ParticipantId,
        tree: &TreeId,
    ) -> crate::Result<ProgressDecision> {
        let current = self.try_tree(tree)?;
        if params.is_top_level(tree.level) {
            return Ok(ProgressDecision::TopLevel);
        }
        if !current.last_four().contains(&participant) {
            return Ok(ProgressDecision::NotLastFour);
        }
        if current.progressed().contains(&participant) {
            return Ok(ProgressDecision::AlreadyProgressed);
        }
        let next = tree.level.checked_add(1).ok_or(crate::Error::Overflow)?;
        let need = params.entry_value(next)?;
        let have = self.reserve(&participant, tree.level);
        if have < need {
            Ok(ProgressDecision::InsufficientReserve { have, need })
        } else {
            Ok(ProgressDecision::Ready { amount: need })
        }
    }

    /// Create a [`PlaceParticipant`] action re-entering `participant` from `tree` into the
    /// next level, funded by the reservation.
    pub fn progress<'a>(
        &'a mut self,
        params: &'a Params,
        participant: ParticipantId,
        tree: TreeId,
        slot: Option<Slot>,
        at: OffsetDateTime,
    ) -> crate::Result<PlaceParticipant<'a>> {
        let placement = Placement::progression(participant, tree)?;
        PlaceParticipant::try_new(self, params, placement, slot, at)
    }
}
