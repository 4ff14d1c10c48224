use std::fmt;

use crate::{num::Amount, reward::RewardTag};

/// Opaque participant id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for ParticipantId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Payment address on the payment rail.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Address(String);

impl Address {
    /// Create a new address.
    ///
    /// Surrounding whitespace is trimmed and empty addresses are rejected.
    pub fn new(address: impl AsRef<str>) -> crate::Result<Self> {
        let address = address.as_ref().trim();
        if address.is_empty() {
            return Err(crate::Error::InvalidArgument("empty address"));
        }
        Ok(Self(address.to_string()))
    }

    /// Get the address as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Income category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "strum",
    derive(strum::EnumIter, strum::EnumString, strum::Display)
)]
#[cfg_attr(feature = "strum", strum(serialize_all = "snake_case"))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum IncomeKind {
    /// Layered auto-pool income paid out.
    AutoPool,
    /// Level income paid out.
    Level,
    /// Auto-pool income withheld into a reservation.
    Reserved,
}

impl IncomeKind {
    /// The income kind credited to the recipient of a payout with the given tag.
    ///
    /// Returns `None` for tags that only ever pay the platform wallet.
    pub fn from_tag(tag: &RewardTag) -> Option<Self> {
        match tag {
            RewardTag::AutoPoolIncome => Some(Self::AutoPool),
            RewardTag::LevelIncome(_) => Some(Self::Level),
            RewardTag::PlatformFee
            | RewardTag::PlatformRemainder
            | RewardTag::LevelIncomeForfeited(_) => None,
        }
    }
}

/// Running income totals of a participant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IncomeTotals {
    /// Confirmed auto-pool income.
    pub auto_pool: Amount,
    /// Confirmed level income.
    pub level: Amount,
    /// Total amount ever withheld into reservations.
    pub reserved: Amount,
}

impl IncomeTotals {
    /// Add `amount` to the total of the given kind.
    pub fn add(&mut self, kind: IncomeKind, amount: Amount) -> crate::Result<()> {
        let total = match kind {
            IncomeKind::AutoPool => &mut self.auto_pool,
            IncomeKind::Level => &mut self.level,
            IncomeKind::Reserved => &mut self.reserved,
        };
        *total = total.checked_add(amount).ok_or(crate::Error::Overflow)?;
        Ok(())
    }

    /// Get the total of the given kind.
    pub fn get(&self, kind: IncomeKind) -> Amount {
        match kind {
            IncomeKind::AutoPool => self.auto_pool,
            IncomeKind::Level => self.level,
            IncomeKind::Reserved => self.reserved,
        }
    }
}

/// Participant.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Participant {
    id: ParticipantId,
    address: Address,
    ancestor: Option<ParticipantId>,
    direct_referrals: u32,
    has_retopped: bool,
    in_auto_pool: bool,
    income: IncomeTotals,
}

impl Participant {
    pub(crate) fn new(id: ParticipantId, address: Address, ancestor: Option<ParticipantId>) -> Self {
        Self {
            id,
            address,
            ancestor,
            direct_referrals: 0,
            has_retopped: false,
            in_auto_pool: false,
            income: IncomeTotals::default(),
        }
    }

    /// Get id.
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Get payment address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Get the referrer.
    pub fn ancestor(&self) -> Option<ParticipantId> {
        self.ancestor
    }

    /// Number of direct referrals.
    pub fn direct_referrals(&self) -> u32 {
        self.direct_referrals
    }

    /// Whether the participant has completed at least one retopup.
    pub fn has_retopped(&self) -> bool {
        self.has_retopped
    }

    /// Whether the participant has entered auto-pool.
    pub fn in_auto_pool(&self) -> bool {
        self.in_auto_pool
    }

    /// Income totals.
    pub fn income(&self) -> &IncomeTotals {
        &self.income
    }

    pub(crate) fn record_referral(&mut self) -> crate::Result<()> {
        self.direct_referrals = self
            .direct_referrals
            .checked_add(1)
            .ok_or(crate::Error::Overflow)?;
        Ok(())
    }

    pub(crate) fn mark_retopped(&mut self) {
        self.has_retopped = true;
    }

    pub(crate) fn mark_in_auto_pool(&mut self) {
        self.in_auto_pool = true;
    }

    pub(crate) fn income_mut(&mut self) -> &mut IncomeTotals {
        &mut self.income
    }
}
