/// Configuration.
pub mod config;

/// Payment gateway selection.
pub mod gateway;

/// Commands.
pub mod commands;

use std::{ops::Deref, path::PathBuf};

use autopool_engine::Config;
use clap::Parser;
use commands::{Command, Commands, Context};
use config::Overrides;
use eyre::OptionExt;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Provider,
};

const ENV_PREFIX: &str = "AUTOPOOL_";
const CONFIG_DIR: &str = "autopool";

/// We use `__` in the name of environment variable as an alias of `.`.
///
/// See [`Env`] for more infomation.
const DOT_ALIAS: &str = "__";

/// Command-line interface for the auto-pool engine.
#[derive(Debug)]
pub struct Cli {
    inner: Inner,
    config: Config,
}

impl Cli {
    /// Creates from the command line arguments.
    pub fn init() -> eyre::Result<Self> {
        let mut inner = Inner::parse();

        let config_path = inner.find_config()?;
        let config = inner.figment(Toml::file(&config_path)).extract()?;
        inner.config_path = Some(config_path);

        Ok(Self { inner, config })
    }

    /// Get the resolved config.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute command.
    pub async fn execute(&self) -> eyre::Result<()> {
        let config_path = self
            .config_path
            .as_ref()
            .ok_or_eyre("config path is not set")?;
        self.command
            .execute(Context::new(config_path, &self.config))
            .await
    }
}

impl Deref for Cli {
    type Target = Inner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Command-line interface for the auto-pool engine.
#[derive(Debug, Parser)]
#[command(name = "autopool", version)]
pub struct Inner {
    /// Path to the config file.
    #[clap(long = "config", short)]
    config_path: Option<PathBuf>,
    /// Config overrides.
    #[command(flatten)]
    overrides: Overrides,
    /// Commands.
    #[command(subcommand)]
    command: Commands,
}

impl Inner {
    fn find_config(&self) -> eyre::Result<PathBuf> {
        use etcetera::{choose_base_strategy, BaseStrategy};

        match self.config_path.as_ref() {
            Some(path) => Ok(path.clone()),
            None => {
                let strategy = choose_base_strategy()?;
                Ok(strategy.config_dir().join(CONFIG_DIR).join("config.toml"))
            }
        }
    }

    /// Layers the config file, the environment and the command-line overrides, in that order.
    fn figment(&self, file: impl Provider) -> Figment {
        Figment::new()
            .merge(file)
            .merge(Env::prefixed(ENV_PREFIX).split(DOT_ALIAS))
            .merge(Serialized::defaults(&self.overrides))
    }
}
