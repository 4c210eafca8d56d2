use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use batchfetch::batch::{BatchPlanner, PlanReport, ResultAccumulator};
use batchfetch::config::{Config, LoggingConfig};
use batchfetch::error::BatchFetchErrorTrait;
use batchfetch::fetcher::body::LineEndingPolicy;
use batchfetch::utils::{format_bytes, parse_url_list, truncate_text};

#[derive(Parser)]
#[command(
    name = "batchfetch",
    version,
    about = "Fetch URLs in sequential batches of concurrent requests",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every URL listed in a file
    Run {
        /// File with one URL per line (blank lines and # comments skipped)
        #[arg(short, long)]
        input: PathBuf,

        /// URLs per batch
        #[arg(short, long)]
        batch_length: Option<usize>,

        /// Cap on concurrent requests inside one batch
        #[arg(long)]
        max_in_flight: Option<usize>,

        /// TOML configuration file (environment variables are used otherwise)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the full JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Line ending handling for bodies (preserve, carriage-return)
        #[arg(long)]
        line_endings: Option<LineEndingPolicy>,

        /// Print Prometheus metrics after the run
        #[arg(long, default_value = "false")]
        metrics: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            batch_length,
            max_in_flight,
            config,
            output,
            line_endings,
            metrics,
        } => {
            let mut config = match &config {
                Some(path) => Config::from_file(path)?,
                None => Config::from_env()?,
            };
            if let Some(batch_length) = batch_length {
                config.batch.batch_length = batch_length;
            }
            if max_in_flight.is_some() {
                config.batch.max_in_flight = max_in_flight;
            }
            if let Some(line_endings) = line_endings {
                config.fetcher.line_endings = line_endings;
            }
            if let Some(format) = cli.log_format {
                config.logging.format = format;
            }
            config.validate().context("Invalid configuration")?;

            setup_tracing(&config.logging, cli.verbose)?;

            tracing::info!(
                input = %input.display(),
                batch_length = config.batch.batch_length,
                max_in_flight = ?config.batch.max_in_flight,
                line_endings = ?config.fetcher.line_endings,
                "Starting run command"
            );

            run(&input, &config, output, metrics).await?;
        }
    }

    tracing::info!("batchfetch completed successfully");
    Ok(())
}

fn setup_tracing(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new(logging.filter_directive(true))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(logging.filter_directive(false)))
    };

    if logging.is_json() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("Failed to initialize tracing")?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("Failed to initialize tracing")?;
    }

    Ok(())
}

async fn run(
    input: &Path,
    config: &Config,
    output: Option<PathBuf>,
    with_metrics: bool,
) -> Result<()> {
    if with_metrics {
        if let Err(e) = batchfetch::metrics::init_metrics() {
            tracing::warn!("Metrics initialization failed: {e}");
        }
    }

    let text = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read URL list: {}", input.display()))?;
    let urls = parse_url_list(&text);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, abandoning current batch");
            let _ = shutdown_tx.send(true);
        }
    });

    let planner = BatchPlanner::from_config(config)
        .context("Invalid configuration")?
        .with_shutdown(shutdown_rx);
    let accumulator =
        ResultAccumulator::with_failure_warn_threshold(config.batch.failure_warn_threshold);

    let report = match planner.plan(&urls, &accumulator).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(category = e.category().description(), error = %e, "Run stopped");
            let snapshot = accumulator.snapshot().await;
            println!(
                "Interrupted: {} attempted ({} ok, {} failed) before stopping",
                snapshot.records.len(),
                snapshot.successes,
                snapshot.failures
            );
            return Err(e).context("Batch plan did not complete");
        }
    };

    print_summary(&report, config.batch.failure_warn_threshold);

    if let Some(path) = output {
        if let Err(e) = report.write_json(&path).await {
            tracing::error!(category = e.category().description(), error = %e, "Report not written");
            return Err(e).with_context(|| format!("Failed to write report: {}", path.display()));
        }
        println!("  Report: {}", path.display());
    }

    if with_metrics {
        match batchfetch::metrics::encode_metrics() {
            Ok(text) => println!("{text}"),
            Err(e) => tracing::warn!("Failed to encode metrics: {e}"),
        }
    }

    Ok(())
}

fn print_summary(report: &PlanReport, failure_warn_threshold: u32) {
    let snapshot = &report.snapshot;

    println!("Fetched {} URLs in {} batches", snapshot.records.len(), report.batches.len());
    println!("  Successes: {}", snapshot.successes);
    println!("  Failures: {}", snapshot.failures);
    println!("  Success rate: {:.1}%", snapshot.success_rate() * 100.0);
    println!("  Body bytes: {}", format_bytes(snapshot.body_bytes()));
    println!("  Elapsed: {:.2}s", report.elapsed.as_secs_f64());

    for batch in &report.batches {
        println!(
            "  Batch {}: {}/{} ok ({:.1}%) in {:.2}s",
            batch.index + 1,
            batch.successes,
            batch.size,
            batch.success_rate() * 100.0,
            batch.elapsed.as_secs_f64()
        );
    }

    for record in snapshot.in_input_order() {
        if let Some(reason) = record.outcome.failure_reason() {
            println!("  FAILED {} ({reason})", truncate_text(&record.url, 80));
        }
    }

    if failure_warn_threshold > 0 {
        for (url, streak) in snapshot.failing_urls(failure_warn_threshold) {
            println!(
                "  FAILING {} ({streak} consecutive failures)",
                truncate_text(url, 80)
            );
        }
    }
}
