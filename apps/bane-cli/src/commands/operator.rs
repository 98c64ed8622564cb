// operator.rs — Operator subcommands: audits, incidents.
//
// These read the configured store directly. Lock and unlock act on a live
// engine's ledger, so they are only available inside `bane serve`.

use clap::Subcommand;

use bane_gateway::{BaneConfig, StoreKind};

use super::print_json;

#[derive(Subcommand)]
pub enum OperatorCommands {
    /// Show recent decisions, newest first.
    Audits {
        /// Number of records to show.
        #[arg(short, default_value = "20")]
        n: usize,
    },
    /// Show recent incidents, newest first.
    Incidents {
        /// Number of records to show.
        #[arg(short, default_value = "20")]
        n: usize,
    },
}

pub fn execute(cmd: &OperatorCommands, config: &BaneConfig) -> anyhow::Result<()> {
    if config.store.kind == StoreKind::Memory {
        anyhow::bail!("the configured store is in-memory; nothing is persisted to read");
    }
    let store = config.build_store()?;
    match cmd {
        OperatorCommands::Audits { n } => print_json(&store.recent_audits(*n)?),
        OperatorCommands::Incidents { n } => print_json(&store.recent_incidents(*n)?),
    }
}
