use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pvalue_extractor::{
    BpeTokenCounter, BudgetConfig, Budgets, ChunkProcessor, ChunkStore, OpenAiClient,
    OpenAiConfig, PipelineConfig, RequestExecutor, RunSummary, ShutdownSignal, run_pipeline,
};

#[derive(Parser)]
#[command(name = "pvalue-extractor")]
#[command(
    author,
    version,
    about = "Extract p-values and test statistics from scientific texts",
    long_about = None
)]
struct Cli {
    /// Maximum number of unprocessed chunks to process in this run
    #[arg(long, alias = "max_chunks", default_value = "1000")]
    max_chunks: usize,

    /// SQLite database holding the chunks and extracted p-values
    #[arg(long, default_value = "p.db")]
    database: PathBuf,

    /// Log file ("-" logs to stderr)
    #[arg(long, default_value = "p.log")]
    log_file: PathBuf,

    /// Model to use (overrides OPENAI_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Credentials are checked before anything else is touched
    let mut api_config = OpenAiConfig::from_env()?;
    if let Some(model) = cli.model.clone() {
        api_config.model = model;
    }

    setup_logging(cli.verbose, &cli.log_file)?;
    info!("Starting main processing with model {}", api_config.model);

    let counter = BpeTokenCounter::for_model(&api_config.model)?;
    let client = OpenAiClient::new(api_config)?;
    let store = ChunkStore::open(&cli.database)
        .with_context(|| format!("Failed to open database {:?}", cli.database))?;

    let executor = RequestExecutor::new(
        Arc::new(client),
        Arc::new(counter),
        Budgets::from_config(&BudgetConfig::default()),
    );
    let processor = Arc::new(ChunkProcessor::new(executor, store));

    let shutdown = Arc::new(ShutdownSignal::new());
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Shutdown requested, letting in-flight requests finish");
                shutdown.trigger();
            }
        });
    }

    let pipeline_config = PipelineConfig {
        max_chunks: cli.max_chunks,
        show_progress: !cli.no_progress,
    };
    let summary = run_pipeline(processor, &pipeline_config, shutdown)
        .await
        .context("Failed to load chunks")?;

    print_summary(&summary);
    Ok(())
}

fn setup_logging(verbose: bool, log_file: &Path) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,pvalue_extractor={level}")));
    let builder = FmtSubscriber::builder().with_env_filter(filter);

    if log_file == Path::new("-") {
        let subscriber = builder.with_writer(std::io::stderr).finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("Failed to open log file {:?}", log_file))?;
        let subscriber = builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Run {}", summary.run_id);
    println!("==================");
    println!("Started: {}", summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Chunks attempted: {}", summary.attempted);
    println!("Succeeded: {}", summary.succeeded);
    println!("Failed: {}", summary.failed);
    if summary.cancelled > 0 {
        println!("Cancelled: {}", summary.cancelled);
    }
    println!("P-values stored: {}", summary.candidates);
    println!("Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
}
