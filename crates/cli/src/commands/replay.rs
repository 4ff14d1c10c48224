use std::path::PathBuf;

use autopool_engine::{model::QualifyingEvent, Outcome};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use super::{Command, Context};

/// Process qualifying events from a newline-delimited JSON file, in order.
///
/// Events already processed are skipped, so a file can be replayed safely.
#[derive(Debug, clap::Args)]
pub struct Replay {
    /// Path to the events file.
    file: PathBuf,
    /// Stop at the first event that fails.
    #[arg(long)]
    fail_fast: bool,
}

impl Command for Replay {
    async fn execute(&self, ctx: Context<'_>) -> eyre::Result<()> {
        let engine = ctx.engine().await?;
        let mut lines = BufReader::new(File::open(&self.file).await?).lines();

        let mut line_number = 0usize;
        let mut settled = 0usize;
        let mut duplicate = 0usize;
        let mut failed = Vec::new();
        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let event = match serde_json::from_str::<QualifyingEvent>(line) {
                Ok(event) => event,
                Err(err) => {
                    tracing::error!(line = line_number, %err, "malformed event");
                    if self.fail_fast {
                        eyre::bail!("malformed event at line {line_number}: {err}");
                    }
                    failed.push(format!("line {line_number}"));
                    continue;
                }
            };
            let id = event.id.clone();
            match engine.handle(event).await {
                Ok(Outcome::Settled) => settled += 1,
                Ok(Outcome::Duplicate) => duplicate += 1,
                Err(err) => {
                    tracing::error!(event = %id, %err, retryable = err.is_retryable(), "event failed");
                    if self.fail_fast {
                        return Err(err.into());
                    }
                    failed.push(id.to_string());
                }
            }
        }

        println!(
            "settled: {settled}, duplicate: {duplicate}, failed: {}",
            failed.len()
        );
        if !failed.is_empty() {
            eyre::bail!("{} events failed: {}", failed.len(), failed.join(", "));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use autopool_engine::{
        config::{GatewayConfig, GatewayKind, LedgerConfig},
        Config,
    };
    use autopool_model::{EventId, EventStatus};
    use tokio::fs;

    use super::*;

    const EVENTS: &str = r#"{"id":"reg-1","type":"register","participant":1,"address":"0x01","ancestor":null}
{"id":"reg-2","type":"register","participant":2,"address":"0x02","ancestor":1}

{"id":"retopup-2","type":"retopup","participant":2}
"#;

    fn config(dir: &Path) -> Config {
        Config {
            platform_wallet: Some("0xplatform".to_string()),
            gateway: GatewayConfig {
                kind: GatewayKind::Simulated,
                simulated_balance: 1_000,
                ..Default::default()
            },
            ledger: LedgerConfig {
                snapshot_path: Some(dir.join("ledger.json")),
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn replays_are_persisted_once() -> eyre::Result<()> {
        let dir = std::env::temp_dir().join(format!("autopool-replay-{}", std::process::id()));
        fs::create_dir_all(&dir).await?;
        let file = dir.join("events.ndjson");
        fs::write(&file, EVENTS).await?;
        let config_path = dir.join("config.toml");
        let config = config(&dir);

        let replay = Replay {
            file: file.clone(),
            fail_fast: false,
        };
        replay.execute(Context::new(&config_path, &config)).await?;
        let ledger = Context::new(&config_path, &config).ledger().await?;
        assert_eq!(ledger.participants().count(), 2);
        assert_eq!(
            ledger
                .event(&EventId::new("retopup-2"))
                .map(|record| record.status()),
            Some(EventStatus::Settled)
        );
        assert!(ledger.pending_events().next().is_none());

        // Every event is a duplicate the second time.
        replay.execute(Context::new(&config_path, &config)).await?;
        assert_eq!(Context::new(&config_path, &config).ledger().await?, ledger);

        fs::write(&file, format!("{EVENTS}not an event\n")).await?;
        assert!(replay
            .execute(Context::new(&config_path, &config))
            .await
            .is_err());
        assert_eq!(Context::new(&config_path, &config).ledger().await?, ledger);

        fs::remove_dir_all(&dir).await?;
        Ok(())
    }
}
