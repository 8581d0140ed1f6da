use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Instrument;

use tsdecomp::config::{RecipeFormat, load_recipe};
use tsdecomp::core::ErrorStrategy;
use tsdecomp::io::{read_dataset, write_dataset};
use tsdecomp::logging;
use tsdecomp::runner::{RunOptions, run_recipe};
use tsdecomp::simulate::{SimulationOptions, sample_recipe, simulate};

/// tsdecomp - Seasonal decomposition for tabular time series
#[derive(Parser)]
#[command(name = "tsdecomp")]
#[command(version = "0.1.0")]
#[command(about = "Validated STL and classical decomposition of tabular time series")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decompose the target columns of a dataset
    Run {
        /// Recipe file (.json for JSON, TOML otherwise)
        #[arg(short, long)]
        config: PathBuf,

        /// Input dataset (JSON rows)
        #[arg(short, long)]
        input: PathBuf,

        /// Output dataset
        #[arg(short, long)]
        output: PathBuf,

        /// What to do when a series group fails; overrides the recipe
        #[arg(long, value_enum)]
        error_strategy: Option<ErrorStrategy>,

        /// Decompose series groups concurrently
        #[arg(long)]
        parallel: bool,

        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Generate a synthetic long-format dataset
    Simulate {
        /// Output dataset
        #[arg(short, long)]
        output: PathBuf,

        /// Number of series
        #[arg(long, default_value_t = 3)]
        series: usize,

        /// Seasonal cycles per series
        #[arg(long, default_value_t = 8)]
        periods: usize,

        /// Observations per seasonal cycle
        #[arg(long, default_value_t = 7)]
        period: usize,

        /// Standard deviation of the noise
        #[arg(long, default_value_t = 1.0)]
        noise: f64,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Also write a matching STL recipe to this file
        #[arg(long)]
        recipe: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level);

    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("tsdecomp", %run_id);

    let result = async move {
        match cli.command {
            Command::Run {
                config,
                input,
                output,
                error_strategy,
                parallel,
                pretty,
            } => run(config, input, output, error_strategy, parallel, pretty).await,
            Command::Simulate {
                output,
                series,
                periods,
                period,
                noise,
                seed,
                recipe,
            } => {
                let options = SimulationOptions {
                    series,
                    periods,
                    period,
                    noise,
                    seed,
                };
                generate(options, output, recipe).await
            }
        }
    }
    .instrument(span)
    .await;

    if let Err(e) = &result {
        tracing::error!("{e:#}");
    }
    result
}

async fn run(
    config: PathBuf,
    input: PathBuf,
    output: PathBuf,
    error_strategy: Option<ErrorStrategy>,
    parallel: bool,
    pretty: bool,
) -> anyhow::Result<()> {
    let raw = load_recipe(&config)?;
    let dataset = read_dataset(&input).await?;
    tracing::info!(
        path = %input.display(),
        rows = dataset.num_rows(),
        "Input dataset loaded"
    );

    let mut options = RunOptions::from_raw(&raw);
    if let Some(strategy) = error_strategy {
        options.error_strategy = strategy;
    }
    options.parallel |= parallel;

    let (decomposed, report) = run_recipe(&raw, &dataset, options)
        .await
        .with_context(|| format!("Recipe '{}' failed", config.display()))?;

    for skipped in &report.skipped {
        tracing::warn!(
            group = %skipped.group,
            reason = %skipped.reason,
            "Group left out of the output"
        );
    }

    write_dataset(&output, &decomposed, pretty).await?;
    tracing::info!(
        path = %output.display(),
        rows = decomposed.num_rows(),
        processed = report.processed,
        skipped = report.skipped.len(),
        "Output written"
    );
    Ok(())
}

async fn generate(
    options: SimulationOptions,
    output: PathBuf,
    recipe: Option<PathBuf>,
) -> anyhow::Result<()> {
    let dataset = simulate(&options)?;
    write_dataset(&output, &dataset, false).await?;

    if let Some(path) = recipe {
        let recipe = sample_recipe(&options).with_context(|| {
            format!("No frequency unit has a seasonal period of {}", options.period)
        })?;
        let content = match RecipeFormat::from_path(&path) {
            RecipeFormat::Json => serde_json::to_string_pretty(&recipe)?,
            RecipeFormat::Toml => toml::to_string(&recipe)?,
        };
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write recipe '{}'", path.display()))?;
        tracing::info!(path = %path.display(), "Sample recipe written");
    }

    tracing::info!(
        path = %output.display(),
        rows = dataset.num_rows(),
        "Simulated dataset written"
    );
    Ok(())
}
