use std::path::Path;

use autopool_engine::{
    model::Ledger, queue::MemoryPlacementQueue, store::MemoryLedgerStore, Config, Engine,
};
use enum_dispatch::enum_dispatch;
use eyre::OptionExt;

use crate::gateway::AnyGateway;

use init_config::InitConfig;
use inspect::Inspect;
use reconcile::Reconcile;
use replay::Replay;

mod init_config;
mod inspect;
mod reconcile;
mod replay;

/// Commands.
#[enum_dispatch]
#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// Initialize config file.
    InitConfig(InitConfig),
    /// Process qualifying events from a file.
    Replay(Replay),
    /// Compare pending payments with the payment rail.
    Reconcile(Reconcile),
    /// Inspect the ledger.
    Inspect(Inspect),
}

#[enum_dispatch(Commands)]
pub(crate) trait Command {
    async fn execute(&self, ctx: Context<'_>) -> eyre::Result<()>;
}

pub(crate) type CliEngine = Engine<MemoryLedgerStore, MemoryPlacementQueue, AnyGateway>;

pub(crate) struct Context<'a> {
    config_path: &'a Path,
    config: &'a Config,
}

impl<'a> Context<'a> {
    pub(crate) fn new(config_path: &'a Path, config: &'a Config) -> Self {
        Self {
            config_path,
            config,
        }
    }

    pub(crate) fn config_path(&self) -> &Path {
        self.config_path
    }

    /// Build an engine from the config, with placement queues rebuilt from the ledger.
    pub(crate) async fn engine(&self) -> eyre::Result<CliEngine> {
        let params = self.config.validate()?;
        let timeout = self.config.gateway_timeout()?;
        let store = match self.config.ledger.snapshot_path.as_ref() {
            Some(path) => MemoryLedgerStore::open(path).await?,
            None => {
                tracing::warn!("no ledger snapshot configured, decisions will not be persisted");
                MemoryLedgerStore::default()
            }
        };
        let gateway = AnyGateway::try_new(self.config, timeout)?;
        let engine = Engine::new(
            store,
            MemoryPlacementQueue::default(),
            gateway,
            params,
            timeout,
        );
        engine.rebuild_queues().await?;
        Ok(engine)
    }

    /// Load the persisted ledger.
    pub(crate) async fn ledger(&self) -> eyre::Result<Ledger> {
        let path = self
            .config
            .ledger
            .snapshot_path
            .as_ref()
            .ok_or_eyre("ledger snapshot path is not set")?;
        Ok(MemoryLedgerStore::open(path).await?.snapshot().await)
    }
}
