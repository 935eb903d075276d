//! Main entry point for the cluster orchestrator binary
//!
//! Wires the file-backed stores into a [`RunOrchestrator`] and exposes run,
//! resume and status inspection on the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use orchestrator::{
    monitor::RunStatus,
    services::{FileCheckpointStore, FileResultStore},
    PersistenceStore, RawConfig, RunOrchestrator,
};
use shared::Matrix;

/// Checkpointable iterative biclustering of a numeric matrix
#[derive(Parser)]
#[command(name = "cluster-orchestrator")]
#[command(about = "Runs and resumes checkpointed clustering runs")]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start a new run, or resume one from its checkpoints
    Run {
        /// Tab separated matrix: header row of column labels, first column row labels
        #[arg(long)]
        matrix: PathBuf,

        /// JSON run configuration (not needed with --resume)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory for results, stats and checkpoints
        #[arg(long, default_value = "./output")]
        output: PathBuf,

        /// Resume from the latest checkpoint in the output directory
        #[arg(long)]
        resume: bool,

        /// Resume from this checkpoint iteration instead of the latest
        #[arg(long, requires = "resume")]
        checkpoint: Option<u32>,
    },
    /// Report whether the run in an output directory is running, finished or stalled
    Status {
        #[arg(long, default_value = "./output")]
        output: PathBuf,

        /// Seconds without progress after which a run counts as stalled
        #[arg(long, default_value = "600")]
        stale_after: i64,
    },
}

fn load_matrix(path: &Path) -> anyhow::Result<Arc<Matrix>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading matrix {}", path.display()))?;
    let matrix = Matrix::from_tsv(&text).with_context(|| format!("parsing matrix {}", path.display()))?;
    Ok(Arc::new(matrix))
}

fn load_config(path: &Path) -> anyhow::Result<RawConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    RawConfig::from_json_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

async fn run_command(
    matrix: PathBuf,
    config: Option<PathBuf>,
    output: PathBuf,
    resume: bool,
    checkpoint: Option<u32>,
) -> anyhow::Result<()> {
    let matrix = load_matrix(&matrix)?;
    let persistence = FileResultStore::new(&output);
    let checkpoints = FileCheckpointStore::new(&output);
    let mut orchestrator = RunOrchestrator::new(matrix, persistence, checkpoints);

    if resume {
        orchestrator
            .init_from_checkpoint(checkpoint)
            .await
            .with_context(|| format!("restoring run from {}", output.display()))?;
    } else {
        let Some(config) = config else {
            bail!("--config is required unless --resume is given");
        };
        let raw = load_config(&config)?;
        orchestrator.prepare_run(&raw).await.context("preparing run")?;
    }

    let summary = orchestrator.run().await.context("running iterations")?;
    println!(
        "run {} finished: iterations {}..={}, median residual {}, {} scoring degradations, {} numeric anomalies",
        summary.run_id,
        summary.first_iteration,
        summary.last_iteration,
        summary
            .final_median_residual
            .map_or_else(|| "n/a".to_string(), |m| format!("{m:.4}")),
        summary.degradations,
        summary.anomalies
    );
    Ok(())
}

async fn status_command(output: PathBuf, stale_after: i64) -> anyhow::Result<()> {
    let store = FileResultStore::new(&output);
    let metadata = store
        .read_run_metadata()
        .await
        .with_context(|| format!("reading run metadata in {}", output.display()))?;
    let status = RunStatus::infer(&metadata, chrono::Utc::now(), chrono::Duration::seconds(stale_after));
    println!("{status}");
    if status.is_resumable() {
        println!("resume with: cluster-orchestrator run --resume --matrix <MATRIX> --output {}", output.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    shared::logging::init_tracing_with_level(Some(&args.log_level));

    match args.command {
        Command::Run {
            matrix,
            config,
            output,
            resume,
            checkpoint,
        } => run_command(matrix, config, output, resume, checkpoint).await,
        Command::Status { output, stale_after } => status_command(output, stale_after).await,
    }
}
