use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use verse_normalizer::app::{handle_fatal_error, init_logging, AppConfig};
use verse_normalizer::client::{DecompositionClient, GeminiService, PromptTemplate};
use verse_normalizer::config::{DatasetConfig, NormalizerConfig};
use verse_normalizer::dispatcher::Dispatcher;
use verse_normalizer::ledger::LedgerRetention;
use verse_normalizer::pipeline::{plan_dataset, Pipeline};

/// Decompose verses into atomic propositions, resuming from previous runs
#[derive(Parser)]
#[command(name = "verse-normalizer")]
#[command(about = "Resumable verse decomposition into atomic propositions", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to configuration file (default: normalizer.toml if present)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Only process these datasets (repeatable)
    #[arg(short = 'd', long = "dataset")]
    datasets: Vec<String>,

    /// Number of concurrent workers
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Drop superseded failure rows from ledgers before planning
    #[arg(long)]
    compact: bool,

    /// Report pending work without dispatching anything
    #[arg(long)]
    plan: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            init_logging(&AppConfig::new(cli.verbose));
            handle_fatal_error(e, cli.verbose)
        }
    };

    init_logging(&AppConfig::new(cli.verbose).with_log_file(&config.log_file));
    debug!("Effective configuration: {:?}", config);

    let result = if cli.plan {
        run_plan(&config, &cli.datasets)
    } else {
        run_normalize(&config, &cli.datasets).await
    };

    if let Err(e) = result {
        handle_fatal_error(e, cli.verbose);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<NormalizerConfig> {
    let mut config = NormalizerConfig::load(cli.config.as_deref())?;
    config.merge_env_vars();

    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if cli.compact {
        config.retention = LedgerRetention::Compact;
    }

    config.validate()?;
    config.select_datasets(&cli.datasets)?;
    Ok(config)
}

fn run_plan(config: &NormalizerConfig, names: &[String]) -> anyhow::Result<()> {
    for dataset in config.select_datasets(names)? {
        match plan_dataset(&dataset) {
            Ok(plan) => println!(
                "{}: {} pending of {} ({} processed, {} retrying)",
                dataset.name,
                plan.pending.len(),
                plan.total,
                plan.processed,
                plan.retrying
            ),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => println!("{}: skipped ({})", dataset.name, e),
        }
    }
    Ok(())
}

async fn run_normalize(config: &NormalizerConfig, names: &[String]) -> anyhow::Result<()> {
    let datasets: Vec<DatasetConfig> = config.select_datasets(names)?;

    // Everything a record needs is checked before any dataset is touched
    let template = PromptTemplate::load(&config.prompt_path)?;
    let service = GeminiService::new(&config.service)?;
    let client = DecompositionClient::new(Arc::new(service), template, config.retry.clone());

    let dispatcher = Dispatcher::new(config.concurrency).with_progress(config.show_progress);
    let pipeline = Pipeline::new(Arc::new(client), dispatcher).with_retention(config.retention);

    let summary = pipeline
        .run(&datasets)
        .await
        .context("Normalization aborted")?;

    for report in &summary.completed {
        info!(
            dataset = %report.name,
            "{} of {} pending verses decomposed, {} left empty",
            report.dispatch.succeeded,
            report.pending,
            report.dispatch.failed
        );
    }
    Ok(())
}
