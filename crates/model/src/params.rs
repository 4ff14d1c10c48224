use typed_builder::TypedBuilder;

use crate::{
    num::{bps_total, Amount, BASIS_POINTS},
    Address, PoolLevel,
};

/// Number of completed nodes that makes a tree complete.
pub const DEFAULT_POOL_SIZE: u32 = 15;

/// Maximum number of concurrently open trees per pool level.
pub const DEFAULT_MAX_OPEN_TREES: u32 = 15;

/// Highest pool level.
pub const DEFAULT_MAX_LEVEL: PoolLevel = 10;

/// Number of last completers re-entered at the next level.
pub const LAST_FOUR: usize = 4;

/// Shares of the pool entry value for the three ancestor layers.
pub const DEFAULT_LAYER_BPS: [u16; 3] = [5_000, 2_500, 1_500];

/// Platform fee share of the pool entry value.
pub const DEFAULT_PLATFORM_FEE_BPS: u16 = 1_000;

/// Depth of the level-income ancestry walk.
pub const LEVEL_INCOME_DEPTH: usize = 10;

/// Level income shares by ancestor depth.
pub const DEFAULT_LEVEL_INCOME_BPS: [u16; LEVEL_INCOME_DEPTH] =
    [3_000, 1_500, 1_000, 500, 500, 500, 500, 500, 1_000, 1_000];

/// Maximum number of payments in one gateway batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;

/// Auto-pool params.
#[derive(Debug, Clone, TypedBuilder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolParams {
    base_entry_value: Amount,
    #[builder(default = DEFAULT_POOL_SIZE)]
    pool_size: u32,
    #[builder(default = DEFAULT_MAX_OPEN_TREES)]
    max_open_trees: u32,
    #[builder(default = DEFAULT_MAX_LEVEL)]
    max_level: PoolLevel,
    #[builder(default = DEFAULT_LAYER_BPS)]
    layer_bps: [u16; 3],
    #[builder(default = DEFAULT_PLATFORM_FEE_BPS)]
    platform_fee_bps: u16,
}

impl PoolParams {
    /// Validate the params.
    pub fn validate(&self) -> crate::Result<()> {
        if self.base_entry_value == 0 {
            return Err(crate::Error::InvalidParams("base entry value must be positive"));
        }
        if self.pool_size == 0 {
            return Err(crate::Error::InvalidParams("pool size must be positive"));
        }
        if self.max_open_trees == 0 {
            return Err(crate::Error::InvalidParams("max open trees must be positive"));
        }
        if self.max_level == 0 {
            return Err(crate::Error::InvalidParams("max level must be positive"));
        }
        let total = bps_total(&self.layer_bps)
            .checked_add(u32::from(self.platform_fee_bps))
            .ok_or(crate::Error::Overflow)?;
        if total != u32::from(BASIS_POINTS) {
            return Err(crate::Error::InvalidParams(
                "layer shares and platform fee must sum to 10000 bps",
            ));
        }
        self.entry_value(self.max_level)?;
        Ok(())
    }

    /// Entry value of the given level: `base_entry_value * 2^(level - 1)`.
    pub fn entry_value(&self, level: PoolLevel) -> crate::Result<Amount> {
        let exponent = level
            .checked_sub(1)
            .ok_or(crate::Error::InvalidArgument("pool level starts from 1"))?;
        if level > self.max_level {
            return Err(crate::Error::InvalidArgument("pool level above the top level"));
        }
        Amount::from(2u8)
            .checked_pow(u32::from(exponent))
            .and_then(|factor| self.base_entry_value.checked_mul(factor))
            .ok_or(crate::Error::Overflow)
    }

    /// Entry value of the first level.
    pub fn base_entry_value(&self) -> Amount {
        self.base_entry_value
    }

    /// Number of completed nodes that makes a tree complete.
    pub fn pool_size(&self) -> u32 {
        self.pool_size
    }

    /// Maximum number of open trees per level.
    pub fn max_open_trees(&self) -> u32 {
        self.max_open_trees
    }

    /// Highest pool level.
    pub fn max_level(&self) -> PoolLevel {
        self.max_level
    }

    /// Whether `level` is the highest level.
    pub fn is_top_level(&self, level: PoolLevel) -> bool {
        level >= self.max_level
    }

    /// Shares of the ancestor layers.
    pub fn layer_bps(&self) -> &[u16; 3] {
        &self.layer_bps
    }

    /// Platform fee share.
    pub fn platform_fee_bps(&self) -> u16 {
        self.platform_fee_bps
    }
}

/// Level income params.
#[derive(Debug, Clone, TypedBuilder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LevelIncomeParams {
    retopup_price: Amount,
    #[builder(default = DEFAULT_LEVEL_INCOME_BPS)]
    bps: [u16; LEVEL_INCOME_DEPTH],
}

impl LevelIncomeParams {
    /// Validate the params.
    pub fn validate(&self) -> crate::Result<()> {
        if self.retopup_price == 0 {
            return Err(crate::Error::InvalidParams("retopup price must be positive"));
        }
        if bps_total(&self.bps) != u32::from(BASIS_POINTS) {
            return Err(crate::Error::InvalidParams(
                "level income table must sum to 10000 bps",
            ));
        }
        Ok(())
    }

    /// Price of one retopup.
    pub fn retopup_price(&self) -> Amount {
        self.retopup_price
    }

    /// Share table by depth.
    pub fn bps(&self) -> &[u16; LEVEL_INCOME_DEPTH] {
        &self.bps
    }
}

/// Params of the whole engine.
#[derive(Debug, Clone, TypedBuilder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Params {
    /// Auto-pool params.
    pub pool: PoolParams,
    /// Level income params.
    pub level_income: LevelIncomeParams,
    /// Platform wallet.
    pub platform_wallet: Address,
    /// Maximum number of payments in one gateway batch.
    #[builder(default = DEFAULT_MAX_BATCH_SIZE)]
    pub max_batch_size: usize,
}

impl Params {
    /// Validate the params.
    pub fn validate(&self) -> crate::Result<()> {
        self.pool.validate()?;
        self.level_income.validate()?;
        if self.max_batch_size == 0 {
            return Err(crate::Error::InvalidParams("max batch size must be positive"));
        }
        Ok(())
    }
}
