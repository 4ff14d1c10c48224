use crate::{
    num::{apply_bps, Amount},
    params::{Params, LEVEL_INCOME_DEPTH},
    reward::{self, Payout, RewardTag},
    Ledger, ParticipantId,
};

use super::LedgerAction;

/// Level income waterfall of one retopup.
///
/// Pays each of up to ten referral ancestors its share of the retopup price. The share of
/// an ancestor who has not retopped is forfeited to the platform wallet, and the shares of
/// missing ancestors and the rounding dust go to the platform wallet as one remainder.
#[must_use = "actions do nothing unless you `execute` them"]
pub struct LevelIncomeWaterfall<'a> {
    ledger: &'a Ledger,
    params: &'a Params,
    participant: ParticipantId,
}

impl<'a> LevelIncomeWaterfall<'a> {
    /// Create a new waterfall for a retopup of `participant`.
    pub fn try_new(
        ledger: &'a Ledger,
        params: &'a Params,
        participant: ParticipantId,
    ) -> crate::Result<Self> {
        ledger.try_participant(&participant)?;
        Ok(Self {
            ledger,
            params,
            participant,
        })
    }
}

impl LedgerAction for LevelIncomeWaterfall<'_> {
    type Report = WaterfallReport;

    fn execute(self) -> crate::Result<Self::Report> {
        let price = self.params.level_income.retopup_price();
        let platform = &self.params.platform_wallet;
        let ancestry = self.ledger.ancestry(&self.participant, LEVEL_INCOME_DEPTH)?;

        let mut payouts = Vec::with_capacity(LEVEL_INCOME_DEPTH.saturating_add(1));
        let mut assigned: Amount = 0;
        for (index, bps) in self.params.level_income.bps().iter().enumerate() {
            let Some(ancestor) = ancestry.get(index) else {
                break;
            };
            let share = apply_bps(price, *bps).ok_or(crate::Error::Overflow)?;
            if share == 0 {
                continue;
            }
            let depth = index
                .checked_add(1)
                .and_then(|depth| u8::try_from(depth).ok())
                .ok_or(crate::Error::Overflow)?;
            assigned = assigned.checked_add(share).ok_or(crate::Error::Overflow)?;
            if ancestor.has_retopped() {
                payouts.push(Payout::to_participant(
                    ancestor.id(),
                    ancestor.address().clone(),
                    share,
                    RewardTag::LevelIncome(depth),
                ));
            } else {
                payouts.push(Payout::to_platform(
                    platform,
                    share,
                    RewardTag::LevelIncomeForfeited(depth),
                ));
            }
        }

        let remainder = price
            .checked_sub(assigned)
            .ok_or(crate::Error::Computation("level income exceeds the price"))?;
        if remainder != 0 {
            payouts.push(Payout::to_platform(
                platform,
                remainder,
                RewardTag::PlatformRemainder,
            ));
        }

        Ok(WaterfallReport { price, payouts })
    }
}

/// Report of a level income waterfall.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WaterfallReport {
    price: Amount,
    payouts: Vec<Payout>,
}

impl WaterfallReport {
    /// Retopup price.
    pub fn price(&self) -> Amount {
        self.price
    }

    /// Payouts, nearest ancestor first and the platform remainder last.
    pub fn payouts(&self) -> &[Payout] {
        &self.payouts
    }

    /// Total amount of the payouts.
    pub fn total(&self) -> crate::Result<Amount> {
        reward::total(&self.payouts)
    }

    /// Take the payouts.
    pub fn into_payouts(self) -> Vec<Payout> {
        self.payouts
    }
}

impl Ledger {
    /// Create a [`LevelIncomeWaterfall`] action.
    pub fn retopup<'a>(
        &'a self,
        params: &'a Params,
        participant: ParticipantId,
    ) -> crate::Result<LevelIncomeWaterfall<'a>> {
        LevelIncomeWaterfall::try_new(self, params, participant)
    }
}
