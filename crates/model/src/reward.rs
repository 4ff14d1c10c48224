use std::{fmt, str::FromStr};

use crate::{
    num::{checked_sum, Amount},
    Address, ParticipantId,
};

const AUTO_POOL_INCOME: &str = "AUTO_POOL_INCOME";
const PLATFORM_FEE: &str = "PLATFORM_FEE";
const PLATFORM_REMAINDER: &str = "PLATFORM_REMAINDER";
const LEVEL_INCOME_PREFIX: &str = "LEVEL_INCOME_";
const LEVEL_INCOME_FORFEITED_PREFIX: &str = "LEVEL_INCOME_FORFEITED_";

/// Reward tag attached to every payment on the payment rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum RewardTag {
    /// Layered auto-pool income of an ancestor layer.
    AutoPoolIncome,
    /// Platform fee share of a pool entry.
    PlatformFee,
    /// Shares with no eligible recipient and rounding dust, routed to the platform wallet.
    PlatformRemainder,
    /// Level income for the ancestor at the given depth (1-indexed).
    LevelIncome(u8),
    /// Level income of the given depth forfeited to the platform wallet.
    LevelIncomeForfeited(u8),
}

impl RewardTag {
    /// Whether the payment goes to the platform wallet.
    pub fn is_platform(&self) -> bool {
        matches!(
            self,
            Self::PlatformFee | Self::PlatformRemainder | Self::LevelIncomeForfeited(_)
        )
    }
}

impl fmt::Display for RewardTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AutoPoolIncome => f.write_str(AUTO_POOL_INCOME),
            Self::PlatformFee => f.write_str(PLATFORM_FEE),
            Self::PlatformRemainder => f.write_str(PLATFORM_REMAINDER),
            Self::LevelIncome(depth) => write!(f, "{LEVEL_INCOME_PREFIX}{depth}"),
            Self::LevelIncomeForfeited(depth) => write!(f, "{LEVEL_INCOME_FORFEITED_PREFIX}{depth}"),
        }
    }
}

impl FromStr for RewardTag {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || crate::Error::InvalidRewardTag(s.to_string());
        match s {
            AUTO_POOL_INCOME => Ok(Self::AutoPoolIncome),
            PLATFORM_FEE => Ok(Self::PlatformFee),
            PLATFORM_REMAINDER => Ok(Self::PlatformRemainder),
            _ => {
                // The forfeited prefix must be checked first since it shares a prefix.
                if let Some(depth) = s.strip_prefix(LEVEL_INCOME_FORFEITED_PREFIX) {
                    depth
                        .parse()
                        .map(Self::LevelIncomeForfeited)
                        .map_err(|_| invalid())
                } else if let Some(depth) = s.strip_prefix(LEVEL_INCOME_PREFIX) {
                    depth.parse().map(Self::LevelIncome).map_err(|_| invalid())
                } else {
                    Err(invalid())
                }
            }
        }
    }
}

impl TryFrom<String> for RewardTag {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RewardTag> for String {
    fn from(value: RewardTag) -> Self {
        value.to_string()
    }
}

/// A decided payment.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Payout {
    /// Recipient address.
    pub recipient: Address,
    /// Recipient participant, `None` for the platform wallet.
    pub participant: Option<ParticipantId>,
    /// Amount.
    pub amount: Amount,
    /// Reward tag.
    pub tag: RewardTag,
}

impl Payout {
    /// Payment to a participant.
    pub fn to_participant(
        participant: ParticipantId,
        recipient: Address,
        amount: Amount,
        tag: RewardTag,
    ) -> Self {
        Self {
            recipient,
            participant: Some(participant),
            amount,
            tag,
        }
    }

    /// Payment to the platform wallet.
    pub fn to_platform(platform: &Address, amount: Amount, tag: RewardTag) -> Self {
        Self {
            recipient: platform.clone(),
            participant: None,
            amount,
            tag,
        }
    }
}

/// Total amount of the given payouts.
pub fn total(payouts: &[Payout]) -> crate::Result<Amount> {
    checked_sum(payouts.iter().map(|payout| &payout.amount)).ok_or(crate::Error::Overflow)
}

/// A batch of payments, in the array layout the payment rail accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PayoutBatch {
    recipients: Vec<Address>,
    amounts: Vec<Amount>,
    tags: Vec<RewardTag>,
}

impl PayoutBatch {
    /// Build a batch from payouts.
    ///
    /// # Errors
    /// - The batch is empty or longer than `max_size`.
    /// - A payout has zero amount.
    pub fn try_new<'a>(
        payouts: impl IntoIterator<Item = &'a Payout>,
        max_size: usize,
    ) -> crate::Result<Self> {
        let mut batch = Self {
            recipients: Vec::new(),
            amounts: Vec::new(),
            tags: Vec::new(),
        };
        for payout in payouts {
            if payout.amount == 0 {
                return Err(crate::Error::InvalidBatch("zero amount"));
            }
            batch.recipients.push(payout.recipient.clone());
            batch.amounts.push(payout.amount);
            batch.tags.push(payout.tag);
        }
        batch.validate(max_size)?;
        Ok(batch)
    }

    /// Validate the layout of the batch.
    pub fn validate(&self, max_size: usize) -> crate::Result<()> {
        if self.recipients.len() != self.amounts.len() || self.amounts.len() != self.tags.len() {
            return Err(crate::Error::InvalidBatch("arrays must have equal length"));
        }
        if self.recipients.is_empty() {
            return Err(crate::Error::InvalidBatch("empty batch"));
        }
        if self.recipients.len() > max_size {
            return Err(crate::Error::InvalidBatch("batch too large"));
        }
        Ok(())
    }

    /// Recipients.
    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }

    /// Amounts.
    pub fn amounts(&self) -> &[Amount] {
        &self.amounts
    }

    /// Tags.
    pub fn tags(&self) -> &[RewardTag] {
        &self.tags
    }

    /// Number of payments.
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    /// Returns whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Total amount.
    pub fn total(&self) -> crate::Result<Amount> {
        checked_sum(&self.amounts).ok_or(crate::Error::Overflow)
    }
}
