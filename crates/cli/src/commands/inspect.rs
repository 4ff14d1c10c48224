use autopool_engine::model::{EventRecord, Ledger, ParticipantId, PoolLevel, PoolTree};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::config::OutputFormat;

use super::Context;

/// Inspect the persisted ledger.
#[derive(Debug, clap::Args)]
pub struct Inspect {
    #[command(subcommand)]
    command: Command,
    /// Output format.
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Pool trees.
    Trees {
        /// Only show trees of this level.
        #[arg(long)]
        level: Option<PoolLevel>,
    },
    /// A participant with their income, nodes and reservations.
    Participant {
        /// Participant id.
        id: u64,
    },
    /// Non-empty reservations.
    Reserves,
    /// Events whose payments are not all confirmed.
    Pending,
}

impl super::Command for Inspect {
    async fn execute(&self, ctx: Context<'_>) -> eyre::Result<()> {
        let ledger = ctx.ledger().await?;
        let output = match &self.command {
            Command::Trees { level } => self.format.display_many(tree_rows(&ledger, *level)?)?,
            Command::Participant { id } => self
                .format
                .display_one(participant_view(&ledger, ParticipantId(*id))?)?,
            Command::Reserves => self.format.display_many(reserve_rows(&ledger))?,
            Command::Pending => self.format.display_many(
                ledger
                    .pending_events()
                    .map(PendingRow::try_from)
                    .collect::<eyre::Result<Vec<_>>>()?,
            )?,
        };
        println!("{output}");
        Ok(())
    }
}

#[derive(Debug, serde::Serialize)]
struct TreeRow {
    tree: String,
    root: String,
    completed_nodes: u32,
    complete: bool,
    completed_at: Option<String>,
    last_four: Vec<String>,
    progressed: Vec<String>,
}

impl TryFrom<&PoolTree> for TreeRow {
    type Error = eyre::Error;

    fn try_from(tree: &PoolTree) -> Result<Self, Self::Error> {
        Ok(Self {
            tree: tree.id().to_string(),
            root: tree.root().to_string(),
            completed_nodes: tree.completed_nodes(),
            complete: tree.is_complete(),
            completed_at: tree.completed_at().map(format_time).transpose()?,
            last_four: tree.last_four().iter().map(ToString::to_string).collect(),
            progressed: tree.progressed().iter().map(ToString::to_string).collect(),
        })
    }
}

fn tree_rows(ledger: &Ledger, level: Option<PoolLevel>) -> eyre::Result<Vec<TreeRow>> {
    ledger
        .levels()
        .filter(|current| level.map_or(true, |level| level == *current))
        .flat_map(|level| ledger.trees(level))
        .map(TreeRow::try_from)
        .collect()
}

#[derive(Debug, serde::Serialize)]
struct ParticipantView {
    id: String,
    address: String,
    ancestor: Option<String>,
    direct_referrals: u32,
    has_retopped: bool,
    in_auto_pool: bool,
    auto_pool_income: String,
    level_income: String,
    reserved_income: String,
    nodes: Vec<String>,
    reserves: Vec<String>,
}

fn participant_view(ledger: &Ledger, id: ParticipantId) -> eyre::Result<ParticipantView> {
    let participant = ledger.try_participant(&id)?;
    let income = participant.income();
    Ok(ParticipantView {
        id: id.to_string(),
        address: participant.address().to_string(),
        ancestor: participant.ancestor().map(|ancestor| ancestor.to_string()),
        direct_referrals: participant.direct_referrals(),
        has_retopped: participant.has_retopped(),
        in_auto_pool: participant.in_auto_pool(),
        auto_pool_income: income.auto_pool.to_string(),
        level_income: income.level.to_string(),
        reserved_income: income.reserved.to_string(),
        nodes: ledger
            .nodes_of(id)
            .map(|node| format!("{} in {}", node.id(), node.tree()))
            .collect(),
        reserves: ledger
            .reserves()
            .filter(|(participant, _, _)| *participant == id)
            .map(|(_, level, balance)| format!("L{level}: {balance}"))
            .collect(),
    })
}

#[derive(Debug, serde::Serialize)]
struct ReserveRow {
    participant: String,
    level: PoolLevel,
    balance: String,
}

fn reserve_rows(ledger: &Ledger) -> Vec<ReserveRow> {
    ledger
        .reserves()
        .map(|(participant, level, balance)| ReserveRow {
            participant: participant.to_string(),
            level,
            balance: balance.to_string(),
        })
        .collect()
}

#[derive(Debug, serde::Serialize)]
struct PendingRow {
    event: String,
    kind: &'static str,
    participant: String,
    entries: usize,
    attempt: u32,
    recorded_at: String,
}

impl TryFrom<&EventRecord> for PendingRow {
    type Error = eyre::Error;

    fn try_from(record: &EventRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            event: record.id().to_string(),
            kind: record.kind().name(),
            participant: record.kind().participant().to_string(),
            entries: record.entries().len(),
            attempt: record.attempt(),
            recorded_at: format_time(record.recorded_at())?,
        })
    }
}

fn format_time(at: OffsetDateTime) -> eyre::Result<String> {
    Ok(at.format(&Rfc3339)?)
}
