use time::OffsetDateTime;

use crate::{
    params::Params, tree::TreeProgress, Ledger, NodeId, ParticipantId, PoolLevel, Slot, TreeId,
};

use super::{
    distribute::{DistributeLayeredIncome, Distribution},
    progress::ProgressDecision,
    LedgerAction,
};

/// How a placement is paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Funding {
    /// Paid by an external pool entry.
    Entry,
    /// Paid from the reservation earned as one of the last four of `tree`.
    Reserve {
        /// The completed tree the participant progresses from.
        tree: TreeId,
    },
}

/// A request to place a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Placement {
    /// Participant.
    pub participant: ParticipantId,
    /// Pool level.
    pub level: PoolLevel,
    /// Funding.
    pub funding: Funding,
}

impl Placement {
    /// Entry into the first pool level.
    pub fn entry(participant: ParticipantId) -> Self {
        Self {
            participant,
            level: 1,
            funding: Funding::Entry,
        }
    }

    /// Re-entry of one of the last four of `tree` into the next level.
    pub fn progression(participant: ParticipantId, tree: TreeId) -> crate::Result<Self> {
        let level = tree
            .level
            .checked_add(1)
            .ok_or(crate::Error::TopLevel(tree.level))?;
        Ok(Self {
            participant,
            level,
            funding: Funding::Reserve { tree },
        })
    }
}

/// Place a participant into a pool tree, run the completion cascade and distribute layered income.
#[must_use = "actions do nothing unless you `execute` them"]
pub struct PlaceParticipant<'a> {
    ledger: &'a mut Ledger,
    params: &'a Params,
    placement: Placement,
    slot: Option<Slot>,
    at: OffsetDateTime,
}

impl<'a> PlaceParticipant<'a> {
    /// Create a new placement.
    ///
    /// `slot` is the slot popped from the placement queue. Without one, the oldest free slot
    /// of the level is used, or a new tree is opened.
    pub fn try_new(
        ledger: &'a mut Ledger,
        params: &'a Params,
        placement: Placement,
        slot: Option<Slot>,
        at: OffsetDateTime,
    ) -> crate::Result<Self> {
        params.pool.entry_value(placement.level)?;
        if let Some(slot) = slot {
            if slot.level != placement.level {
                return Err(crate::Error::SlotLevelMismatch {
                    slot,
                    level: placement.level,
                });
            }
        }
        Ok(Self {
            ledger,
            params,
            placement,
            slot,
            at,
        })
    }

    fn validate_funding(&self) -> crate::Result<()> {
        let Placement {
            participant,
            level,
            funding,
        } = self.placement;
        let current = self.ledger.try_participant(&participant)?;
        match funding {
            Funding::Entry => {
                if level != 1 {
                    return Err(crate::Error::InvalidArgument(
                        "entry placements go to the first level",
                    ));
                }
                if current.in_auto_pool() {
                    return Err(crate::Error::AlreadyInPool(participant));
                }
            }
            Funding::Reserve { tree } => {
                if tree.level.checked_add(1) != Some(level) {
                    return Err(crate::Error::InvalidArgument(
                        "progression goes to the next level",
                    ));
                }
                let not_eligible = |reason| crate::Error::NotEligible {
                    participant,
                    tree,
                    reason,
                };
                match self
                    .ledger
                    .progression_decision(&self.params.pool, participant, &tree)?
                {
                    ProgressDecision::Ready { .. } => {}
                    ProgressDecision::InsufficientReserve { have, need } => {
                        return Err(crate::Error::InsufficientReserve {
                            participant,
                            level: tree.level,
                            required: need,
                            available: have,
                        })
                    }
                    ProgressDecision::TopLevel => return Err(crate::Error::TopLevel(tree.level)),
                    ProgressDecision::NotLastFour => {
                        return Err(not_eligible("not one of the last four"))
                    }
                    ProgressDecision::AlreadyProgressed => {
                        return Err(not_eligible("already progressed"))
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve_slot(&self) -> Slot {
        let level = self.placement.level;
        self.slot
            .or_else(|| self.ledger.oldest_free_slot(level))
            .unwrap_or_else(|| Slot::root(level))
    }
}

impl LedgerAction for PlaceParticipant<'_> {
    type Report = PlacementReport;

    /// Execute the placement.
    ///
    /// # Notes
    /// - Every check runs before the ledger is mutated.
    fn execute(mut self) -> crate::Result<Self::Report> {
        self.validate_funding()?;
        let slot = self.resolve_slot();
        let pool = &self.params.pool;
        self.ledger.check_slot(&slot, pool)?;

        let Placement {
            participant,
            level,
            funding,
        } = self.placement;
        match funding {
            Funding::Entry => {
                self.ledger
                    .participant_mut(&participant)?
                    .mark_in_auto_pool();
            }
            Funding::Reserve { tree } => {
                let amount = pool.entry_value(level)?;
                self.ledger.debit_reserve(participant, tree.level, amount)?;
                self.ledger.mark_progressed(&tree, participant)?;
            }
        }

        let (node, completed_parent) =
            self.ledger
                .insert_node(participant, &slot, pool, self.at)?;
        let tree = self.ledger.try_node(&node)?.tree();

        let distribution = if matches!(funding, Funding::Reserve { .. }) || completed_parent.is_some()
        {
            Some(DistributeLayeredIncome::try_new(&mut *self.ledger, self.params, node)?.execute()?)
        } else {
            None
        };

        let mut report = PlacementReport {
            node,
            slot,
            child_slots: Slot::children(level, node),
            completed_parent,
            completed_tree: None,
            distribution,
            progression_candidates: Vec::new(),
        };

        if let Some(parent) = completed_parent {
            let (completed, progress) = self.ledger.record_completion(&parent, pool, self.at)?;
            if progress == TreeProgress::Completed {
                report.completed_tree = Some(completed);
                let last_four = self.ledger.try_tree(&completed)?.last_four().to_vec();
                for participant in last_four {
                    report.push_candidate(participant, completed);
                }
            }
        }

        let reserved = report
            .distribution
            .as_ref()
            .map(|distribution| {
                distribution
                    .reservations()
                    .iter()
                    .map(|reservation| reservation.participant)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        for participant in reserved {
            report.push_candidate(participant, tree);
        }

        Ok(report)
    }
}

/// A participant that may be re-entered at the next level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgressionCandidate {
    /// Participant.
    pub participant: ParticipantId,
    /// The completed tree whose last four the participant belongs to.
    pub tree: TreeId,
}

/// Report of a placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementReport {
    node: NodeId,
    slot: Slot,
    child_slots: [Slot; 2],
    completed_parent: Option<NodeId>,
    completed_tree: Option<TreeId>,
    distribution: Option<Distribution>,
    progression_candidates: Vec<ProgressionCandidate>,
}

impl PlacementReport {
    fn push_candidate(&mut self, participant: ParticipantId, tree: TreeId) {
        let candidate = ProgressionCandidate { participant, tree };
        if !self.progression_candidates.contains(&candidate) {
            self.progression_candidates.push(candidate);
        }
    }

    /// The new node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The consumed slot.
    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    /// The child slots of the new node, to be pushed onto the placement queue.
    pub fn child_slots(&self) -> &[Slot; 2] {
        &self.child_slots
    }

    /// The parent completed by this placement.
    pub fn completed_parent(&self) -> Option<NodeId> {
        self.completed_parent
    }

    /// The tree completed by this placement.
    pub fn completed_tree(&self) -> Option<TreeId> {
        self.completed_tree
    }

    /// The layered income distribution, if one was triggered.
    pub fn distribution(&self) -> Option<&Distribution> {
        self.distribution.as_ref()
    }

    /// Participants whose progression should be attempted.
    pub fn progression_candidates(&self) -> &[ProgressionCandidate] {
        &self.progression_candidates
    }

    /// Payouts of the distribution.
    pub fn payouts(&self) -> &[crate::Payout] {
        self.distribution
            .as_ref()
            .map(Distribution::payouts)
            .unwrap_or_default()
    }
}

impl Ledger {
    /// Create a [`PlaceParticipant`] action.
    pub fn place<'a>(
        &'a mut self,
        params: &'a Params,
        placement: Placement,
        slot: Option<Slot>,
        at: OffsetDateTime,
    ) -> crate::Result<PlaceParticipant<'a>> {
        PlaceParticipant::try_new(self, params, placement, slot, at)
    }
}
