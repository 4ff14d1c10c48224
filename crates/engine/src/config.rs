use std::{path::PathBuf, time::Duration};

use autopool_model::{
    params::{
        DEFAULT_LAYER_BPS, DEFAULT_LEVEL_INCOME_BPS, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_LEVEL,
        DEFAULT_MAX_OPEN_TREES, DEFAULT_PLATFORM_FEE_BPS, DEFAULT_POOL_SIZE, LEVEL_INCOME_DEPTH,
    },
    Address, Amount, LevelIncomeParams, Params, PoolLevel, PoolParams,
};
use url::Url;

const DEFAULT_BASE_ENTRY_VALUE: u64 = 25;
const DEFAULT_RETOPUP_PRICE: u64 = 40;
const DEFAULT_GATEWAY_TIMEOUT: &str = "10s";

/// Configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Platform wallet receiving fees, forfeitures and remainders.
    pub platform_wallet: Option<String>,
    /// Auto-pool.
    pub pool: PoolConfig,
    /// Level income.
    pub level_income: LevelIncomeConfig,
    /// Payment gateway.
    pub gateway: GatewayConfig,
    /// Ledger storage.
    pub ledger: LedgerConfig,
}

/// Auto-pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Entry value of the first level.
    pub base_entry_value: u64,
    /// Completed nodes that make a tree complete.
    pub pool_size: u32,
    /// Maximum number of open trees per level.
    pub max_open_trees: u32,
    /// Highest pool level.
    pub max_level: PoolLevel,
    /// Shares of the three ancestor layers, in basis points.
    pub layer_bps: [u16; 3],
    /// Platform fee, in basis points.
    pub platform_fee_bps: u16,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_entry_value: DEFAULT_BASE_ENTRY_VALUE,
            pool_size: DEFAULT_POOL_SIZE,
            max_open_trees: DEFAULT_MAX_OPEN_TREES,
            max_level: DEFAULT_MAX_LEVEL,
            layer_bps: DEFAULT_LAYER_BPS,
            platform_fee_bps: DEFAULT_PLATFORM_FEE_BPS,
        }
    }
}

/// Level income configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LevelIncomeConfig {
    /// Price of one retopup.
    pub retopup_price: u64,
    /// Shares by ancestor depth, in basis points.
    pub bps: Vec<u16>,
}

impl Default for LevelIncomeConfig {
    fn default() -> Self {
        Self {
            retopup_price: DEFAULT_RETOPUP_PRICE,
            bps: DEFAULT_LEVEL_INCOME_BPS.to_vec(),
        }
    }
}

/// Kind of payment gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[cfg_attr(feature = "clap", clap(rename_all = "snake_case"))]
pub enum GatewayKind {
    /// HTTP payment relay in front of the payment contract.
    #[default]
    Relay,
    /// In-process simulated rail, for dry runs.
    Simulated,
}

/// Payment gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway kind.
    pub kind: GatewayKind,
    /// Base URL of the payment relay.
    pub url: Option<Url>,
    /// Bound on every gateway call, e.g. `10s`.
    pub timeout: String,
    /// Maximum number of payments per batch.
    pub max_batch_size: usize,
    /// Starting balance of the simulated rail.
    pub simulated_balance: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: GatewayKind::default(),
            url: None,
            timeout: DEFAULT_GATEWAY_TIMEOUT.to_string(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            simulated_balance: 0,
        }
    }
}

/// Ledger storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Path of the JSON snapshot of the ledger.
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    /// Validate the config and build the model params.
    ///
    /// Every failure is fatal.
    pub fn validate(&self) -> crate::Result<Params> {
        let platform_wallet = self
            .platform_wallet
            .as_deref()
            .ok_or_else(|| crate::Error::config("missing platform wallet"))?;
        let platform_wallet = Address::new(platform_wallet).map_err(crate::Error::config)?;

        let bps: [u16; LEVEL_INCOME_DEPTH] =
            self.level_income.bps.as_slice().try_into().map_err(|_| {
                crate::Error::config(format!(
                    "level income table must have {LEVEL_INCOME_DEPTH} entries"
                ))
            })?;

        let pool = &self.pool;
        let params = Params::builder()
            .pool(
                PoolParams::builder()
                    .base_entry_value(Amount::from(pool.base_entry_value))
                    .pool_size(pool.pool_size)
                    .max_open_trees(pool.max_open_trees)
                    .max_level(pool.max_level)
                    .layer_bps(pool.layer_bps)
                    .platform_fee_bps(pool.platform_fee_bps)
                    .build(),
            )
            .level_income(
                LevelIncomeParams::builder()
                    .retopup_price(Amount::from(self.level_income.retopup_price))
                    .bps(bps)
                    .build(),
            )
            .platform_wallet(platform_wallet)
            .max_batch_size(self.gateway.max_batch_size)
            .build();
        params.validate().map_err(crate::Error::config)?;

        self.gateway_timeout()?;
        if self.gateway.kind == GatewayKind::Relay {
            self.relay_url()?;
        }
        Ok(params)
    }

    /// Bound on gateway calls.
    pub fn gateway_timeout(&self) -> crate::Result<Duration> {
        humantime::parse_duration(&self.gateway.timeout).map_err(crate::Error::config)
    }

    /// Base URL of the payment relay.
    pub fn relay_url(&self) -> crate::Result<&Url> {
        self.gateway
            .url
            .as_ref()
            .ok_or_else(|| crate::Error::config("missing payment relay url"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulated() -> Config {
        Config {
            platform_wallet: Some("0xplatform".to_string()),
            gateway: GatewayConfig {
                kind: GatewayKind::Simulated,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn default_config_requires_wallet_and_relay() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));

        let config = Config {
            platform_wallet: Some("0xplatform".to_string()),
            ..Default::default()
        };
        let err = config.validate().map(|_| ()).map_err(|err| err.to_string());
        assert_eq!(err, Err("config: missing payment relay url".to_string()));
    }

    #[test]
    fn validate_builds_params() -> crate::Result<()> {
        let params = simulated().validate()?;
        assert_eq!(params.pool.entry_value(2)?, 50);
        assert_eq!(params.level_income.retopup_price(), 40);
        assert_eq!(params.platform_wallet.as_str(), "0xplatform");
        assert_eq!(simulated().gateway_timeout()?, Duration::from_secs(10));
        Ok(())
    }

    #[test]
    fn invalid_tables_are_fatal() {
        let mut config = simulated();
        config.level_income.bps.pop();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));

        let mut config = simulated();
        config.level_income.bps[0] = 2_000;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));

        let mut config = simulated();
        config.gateway.timeout = "soon".to_string();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn decode_partial_sections() -> crate::Result<()> {
        let config: Config = serde_json::from_value(serde_json::json!({
            "platform_wallet": "0xplatform",
            "pool": { "base_entry_value": 100 },
            "gateway": { "kind": "relay", "url": "http://127.0.0.1:8080/" },
        }))?;
        assert_eq!(config.pool.pool_size, 15);
        let params = config.validate()?;
        assert_eq!(params.pool.entry_value(3)?, 400);
        Ok(())
    }
}
