use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use ramp_evaluation::{EvaluationRuntime, ModelEntry, RampConfig};
use serde_json::{json, Value};
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "ramp", version, about = "Cross-validated model evaluation and leaderboards")]
struct Cli {
    /// Evaluation settings; defaults apply when the file is absent.
    #[arg(long, global = true, default_value = "ramp.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Holds out a test set and writes data/train.json + data/test.json.
    Prepare {
        /// Raw dataset document.
        #[arg(long)]
        raw: PathBuf,
    },
    /// Writes validation and test ground truth.
    Setup,
    /// Queues a model for evaluation.
    Submit {
        /// Submission name shown on leaderboards.
        #[arg(long)]
        name: String,
        /// Registered classifier reference.
        #[arg(long)]
        model: String,
    },
    /// Trains pending models, then tests trained ones.
    Run {
        /// Skip the test stage.
        #[arg(long)]
        no_test: bool,
    },
    /// Lists submitted models.
    Models {
        /// Number of entries to display.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Prints a leaderboard.
    Leaderboard {
        #[command(subcommand)]
        board: Board,
    },
}

#[derive(Subcommand, Debug)]
enum Board {
    /// Models ranked by mean validation score.
    Classical {
        /// Also report held-out test scores.
        #[arg(long)]
        with_test: bool,
    },
    /// Models ranked by greedy-ensemble contributivity.
    Combination {
        /// Also report held-out test scores.
        #[arg(long)]
        with_test: bool,
    },
    /// Mean fit and validation times.
    Times,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let log_path = config.log_path.clone();
    let log_level = config.log_level;
    let runtime = EvaluationRuntime::from_config(config)?;
    match cli.command {
        Commands::Prepare { raw } => {
            anyhow::ensure!(raw.exists(), "raw dataset {} not found", raw.display());
            let (train, test) = runtime.prepare(&raw)?;
            println!("prepared {train} training rows and {test} test rows");
            log_cli_event(log_path.as_deref(), log_level, "prepare", json!({ "raw": raw }))
        }
        Commands::Setup => {
            let folds = runtime.setup_ground_truth(&runtime.split_provider())?;
            println!("wrote ground truth for {} folds", folds.len());
            log_cli_event(log_path.as_deref(), log_level, "setup", json!({ "folds": folds.len() }))
        }
        Commands::Submit { name, model } => {
            let entry = runtime.enqueue_model(&name, &model)?;
            println!("{} | {} | {}", entry.id, entry.name, entry.state);
            log_cli_event(
                log_path.as_deref(),
                log_level,
                "submit",
                json!({ "model": entry.id, "name": name, "reference": model }),
            )
        }
        Commands::Run { no_test } => {
            let executor = Runtime::new().context("starting tokio runtime")?;
            let report =
                executor.block_on(runtime.run_pending_pass(&runtime.split_provider(), !no_test))?;
            for outcome in &report.outcomes {
                match &outcome.error {
                    Some(error) => println!("{} | {} | {error}", outcome.name, outcome.state),
                    None => println!("{} | {}", outcome.name, outcome.state),
                }
            }
            log_cli_event(
                log_path.as_deref(),
                log_level,
                "run",
                json!({
                    "models": report.outcomes.len(),
                    "failures": report.failures().count(),
                }),
            )
        }
        Commands::Models { limit } => {
            let entries = runtime.models()?;
            for entry in entries.iter().rev().take(limit) {
                println!("{}", describe(entry));
            }
            Ok(())
        }
        Commands::Leaderboard { board } => {
            match board {
                Board::Classical { with_test } => {
                    print!("{}", runtime.classical_leaderboard(with_test)?);
                }
                Board::Combination { with_test } => {
                    print!("{}", runtime.combination_leaderboard(with_test)?);
                }
                Board::Times => print!("{}", runtime.execution_times()?),
            }
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<RampConfig> {
    if path.exists() {
        RampConfig::load(path).with_context(|| format!("loading {}", path.display()))
    } else {
        Ok(RampConfig::default())
    }
}

fn describe(entry: &ModelEntry) -> String {
    let submitted = entry.submitted_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
    match &entry.error {
        Some(error) => format!(
            "{} | {} | {} | {submitted} | {error}",
            entry.id, entry.name, entry.state
        ),
        None => format!("{} | {} | {} | {submitted}", entry.id, entry.name, entry.state),
    }
}

fn log_cli_event(
    path: Option<&Path>,
    min_level: LogLevel,
    command: &str,
    metadata: Value,
) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let logger = JsonLogger::new(path)?.with_min_level(min_level);
    let record = LogRecord::new("ramp", LogLevel::Info, format!("cli.{command}"))
        .with_metadata(metadata);
    logger.log(&record)
}
