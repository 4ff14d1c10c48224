mod output;

use std::path::PathBuf;

use autopool_engine::config::GatewayKind;
use url::Url;

pub use output::OutputFormat;

/// Command-line overrides of the configuration.
///
/// Only the values given on the command line are layered over the config file.
#[derive(Debug, Clone, Default, clap::Args, serde::Serialize)]
pub struct Overrides {
    /// Platform wallet receiving fees, forfeitures and remainders.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    platform_wallet: Option<String>,
    /// Payment gateway.
    #[command(flatten)]
    gateway: GatewayOverrides,
    /// Ledger storage.
    #[command(flatten)]
    ledger: LedgerOverrides,
}

/// Payment gateway overrides.
#[derive(Debug, Clone, Default, clap::Args, serde::Serialize)]
pub struct GatewayOverrides {
    /// Payment gateway kind.
    #[arg(long = "gateway", value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<GatewayKind>,
    /// Base URL of the payment relay.
    #[arg(long = "relay-url")]
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<Url>,
    /// Bound on every gateway call, e.g. `10s`.
    #[arg(long = "gateway-timeout")]
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<String>,
    /// Starting balance of the simulated rail.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    simulated_balance: Option<u64>,
}

/// Ledger storage overrides.
#[derive(Debug, Clone, Default, clap::Args, serde::Serialize)]
pub struct LedgerOverrides {
    /// Path of the JSON snapshot of the ledger.
    #[arg(long = "snapshot")]
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_path: Option<PathBuf>,
}
