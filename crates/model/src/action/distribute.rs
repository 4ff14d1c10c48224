use crate::{
    num::{apply_bps, Amount},
    params::Params,
    reward::{self, Payout, RewardTag},
    Ledger, NodeId, ParticipantId, PoolLevel,
};

use super::LedgerAction;

/// Number of ancestor layers sharing in a pool entry.
pub const LAYERS: usize = 3;

/// Distribute the entry value of a placed node to its ancestor layers.
#[must_use = "actions do nothing unless you `execute` them"]
pub struct DistributeLayeredIncome<'a> {
    ledger: &'a mut Ledger,
    params: &'a Params,
    node: NodeId,
}

impl<'a> DistributeLayeredIncome<'a> {
    /// Create a new distribution for the given node.
    pub fn try_new(ledger: &'a mut Ledger, params: &'a Params, node: NodeId) -> crate::Result<Self> {
        ledger.try_node(&node)?;
        Ok(Self {
            ledger,
            params,
            node,
        })
    }

    fn decide(&self) -> crate::Result<Distribution> {
        let pool = &self.params.pool;
        let node = self.ledger.try_node(&self.node)?;
        let level = node.level();
        let tree = self.ledger.try_tree(&node.tree())?;
        let entry_value = pool.entry_value(level)?;
        let reserving = !pool.is_top_level(level);

        let mut payouts = Vec::with_capacity(LAYERS.saturating_add(2));
        let mut reservations = Vec::new();
        let mut assigned: Amount = 0;
        for (ancestor, bps) in self
            .ledger
            .node_ancestors(&self.node, LAYERS)?
            .into_iter()
            .zip(pool.layer_bps())
        {
            let share = apply_bps(entry_value, *bps).ok_or(crate::Error::Overflow)?;
            if share == 0 {
                continue;
            }
            assigned = assigned.checked_add(share).ok_or(crate::Error::Overflow)?;
            let owner = ancestor.owner();
            if reserving && tree.is_reserving_for(&owner) {
                reservations.push(Reservation {
                    participant: owner,
                    level,
                    amount: share,
                });
            } else {
                let address = self.ledger.try_participant(&owner)?.address().clone();
                payouts.push(Payout::to_participant(
                    owner,
                    address,
                    share,
                    RewardTag::AutoPoolIncome,
                ));
            }
        }

        let platform = &self.params.platform_wallet;
        let fee = apply_bps(entry_value, pool.platform_fee_bps()).ok_or(crate::Error::Overflow)?;
        let remainder = entry_value
            .checked_sub(assigned)
            .and_then(|rest| rest.checked_sub(fee))
            .ok_or(crate::Error::Computation("layer shares exceed the entry value"))?;
        if fee != 0 {
            payouts.push(Payout::to_platform(platform, fee, RewardTag::PlatformFee));
        }
        if remainder != 0 {
            payouts.push(Payout::to_platform(
                platform,
                remainder,
                RewardTag::PlatformRemainder,
            ));
        }

        Ok(Distribution {
            entry_value,
            payouts,
            reservations,
        })
    }
}

impl LedgerAction for DistributeLayeredIncome<'_> {
    type Report = Distribution;

    /// Execute the distribution.
    ///
    /// Reserved shares are credited to the reservations, the rest is returned as payouts.
    fn execute(mut self) -> crate::Result<Self::Report> {
        let distribution = self.decide()?;
        for reservation in distribution.reservations() {
            self.ledger.credit_reserve(
                reservation.participant,
                reservation.level,
                reservation.amount,
            )?;
        }
        debug_assert_eq!(
            distribution.distributed().ok(),
            Some(distribution.entry_value())
        );
        Ok(distribution)
    }
}

/// A layer share withheld into a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reservation {
    /// Participant.
    pub participant: ParticipantId,
    /// Pool level of the reservation.
    pub level: PoolLevel,
    /// Amount.
    pub amount: Amount,
}

/// Report of a layered income distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Distribution {
    entry_value: Amount,
    payouts: Vec<Payout>,
    reservations: Vec<Reservation>,
}

impl Distribution {
    /// The distributed entry value.
    pub fn entry_value(&self) -> Amount {
        self.entry_value
    }

    /// Payouts to request from the payment gateway.
    pub fn payouts(&self) -> &[Payout] {
        &self.payouts
    }

    /// Shares withheld into reservations.
    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    /// Total of payouts and reservations.
    pub fn distributed(&self) -> crate::Result<Amount> {
        self.reservations
            .iter()
            .try_fold(reward::total(&self.payouts)?, |acc, reservation| {
                acc.checked_add(reservation.amount)
            })
            .ok_or(crate::Error::Overflow)
    }

    /// Take the payouts.
    pub fn into_payouts(self) -> Vec<Payout> {
        self.payouts
    }
}
