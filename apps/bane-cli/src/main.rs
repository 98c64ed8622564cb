//! # bane-cli
//!
//! Command-line interface for the BANE enforcement engine.
//!
//! - `bane evaluate` — evaluate one request and print the decision
//! - `bane serve` — evaluate JSON lines from stdin, one decision per line
//! - `bane snapshot issue/verify` — sign and check offline policy snapshots
//! - `bane entitlement check` — decide an entitlement from a snapshot
//! - `bane operator audits/incidents` — read the persisted records
//!
//! Configuration comes from `<project-root>/.bane/config.toml` plus the
//! `BANE_*` environment variables. Logs go to stderr; stdout carries data.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bane_gateway::BaneConfig;

/// BANE policy enforcement and entitlement engine.
#[derive(Parser)]
#[command(name = "bane", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".", global = true)]
    project_root: PathBuf,

    /// Explicit config file (defaults to <project-root>/.bane/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single request.
    Evaluate(commands::evaluate::EvaluateArgs),
    /// Evaluate JSON-lines requests from stdin until EOF.
    Serve,
    /// Issue or verify policy snapshots.
    Snapshot {
        #[command(subcommand)]
        command: commands::snapshot::SnapshotCommands,
    },
    /// Evaluate entitlements.
    Entitlement {
        #[command(subcommand)]
        command: commands::entitlement::EntitlementCommands,
    },
    /// Inspect persisted decisions and incidents.
    Operator {
        #[command(subcommand)]
        command: commands::operator::OperatorCommands,
    },
}

fn init_logging(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("bane_policy=info".parse()?)
        .add_directive("bane_entitlements=info".parse()?)
        .add_directive("bane_gateway=info".parse()?);
    // Logs go to stderr so they never mix with decisions on stdout.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn load_config(cli: &Cli, project_root: &std::path::Path) -> anyhow::Result<BaneConfig> {
    let config = match &cli.config {
        Some(path) => BaneConfig::load(path)?,
        None => BaneConfig::load_for_project(project_root)?,
    };
    Ok(config.with_env_overrides())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    let project_root = cli
        .project_root
        .canonicalize()
        .unwrap_or_else(|_| cli.project_root.clone());
    let config = load_config(&cli, &project_root)?;
    tracing::debug!(?config, "configuration loaded");

    match &cli.command {
        Commands::Evaluate(args) => commands::evaluate::execute(args, &config),
        Commands::Serve => commands::serve::execute(&config),
        Commands::Snapshot { command } => commands::snapshot::execute(command, &config),
        Commands::Entitlement { command } => commands::entitlement::execute(command, &config),
        Commands::Operator { command } => commands::operator::execute(command, &config),
    }
}
