use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use cyberlearnd::{db, reconcile, xp};

/// CyberLearn progress repair tool.
#[derive(Parser)]
#[command(name = "cyberlearnd")]
#[command(about = "Batch repair jobs for CyberLearn student progress", long_about = None)]
struct Cli {
    /// Workspace directory holding cyberlearn.sqlite3
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Guarantee every sectioned student an unlocked entry module
    Reconcile,
    /// Recompute derived XP totals against the quiz catalog
    RecomputeXp,
    /// Run both passes (reconcile, then XP recompute)
    Repair,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RepairSummary {
    reconcile: reconcile::ReconcileSummary,
    xp: xp::XpSummary,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only the summary line.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // No catalog, no batch: any open failure is fatal.
    let conn = db::open_db(&cli.workspace)?;

    let summary = match cli.command {
        Command::Reconcile => serde_json::to_string(&reconcile::run_reconcile(&conn)?)?,
        Command::RecomputeXp => serde_json::to_string(&xp::run_recompute(&conn)?)?,
        Command::Repair => {
            // The two passes are independent and commute; reconcile first so
            // freshly created records are covered by the same run.
            let summary = RepairSummary {
                reconcile: reconcile::run_reconcile(&conn)?,
                xp: xp::run_recompute(&conn)?,
            };
            serde_json::to_string(&summary)?
        }
    };
    println!("{}", summary);
    Ok(())
}
