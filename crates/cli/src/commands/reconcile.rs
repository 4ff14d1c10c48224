use crate::config::OutputFormat;

use super::{Command, Context};

/// Compare pending ledger entries with the payment rail and finalise what the rail settled.
#[derive(Debug, clap::Args)]
pub struct Reconcile {
    /// Re-arm rejected payments and settle every pending event afterwards.
    #[arg(long)]
    rearm: bool,
    /// Output format.
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
}

impl Command for Reconcile {
    async fn execute(&self, ctx: Context<'_>) -> eyre::Result<()> {
        let engine = ctx.engine().await?;
        let report = engine.reconciler().run().await?;
        println!("{}", self.format.display_one(&report)?);

        if self.rearm {
            for event in &report.failed {
                engine.reconciler().rearm(event).await?;
            }
            let remaining = engine.settle_pending().await?;
            if !remaining.is_empty() {
                let remaining = remaining.iter().map(ToString::to_string).collect::<Vec<_>>();
                eyre::bail!("events remain pending: {}", remaining.join(", "));
            }
        } else if !report.is_clean() {
            tracing::warn!("reconciliation found payments that need attention");
        }
        Ok(())
    }
}
