//! Stock forecast engine
//!
//! Walk-forward backtest, H-step forecast and directional metrics for a
//! frozen sequence forecaster.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stock_forecast::{
    batch::{infer_symbol, BatchEvaluator, BatchSettings, Checkpoint},
    config::Config,
    data::MarketTable,
    model::ModelBundle,
    server::{start_server, AppState},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stock-forecast")]
#[command(about = "Backtest, forecast and evaluate a frozen stock forecasting model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "forecast.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List symbols in the feature table
    Symbols,
    /// Backtest and forecast one symbol, print the result as JSON
    Infer {
        symbol: String,
        /// Trailing days covered by the backtest
        #[arg(long)]
        backtest_days: Option<usize>,
        /// Observed prices included for display
        #[arg(long)]
        lookback: Option<usize>,
    },
    /// Evaluate every symbol and write metrics
    Evaluate {
        /// Skip symbols already completed in the checkpoint
        #[arg(long)]
        resume: bool,
        /// Output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Serve the HTTP inference API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Symbols => show_symbols(config),
        Commands::Infer {
            symbol,
            backtest_days,
            lookback,
        } => infer_one(config, symbol, backtest_days, lookback).await,
        Commands::Evaluate { resume, output_dir } => evaluate(config, resume, output_dir).await,
        Commands::Serve { port } => serve(config, port).await,
    }
}

fn load_table(config: &Config) -> anyhow::Result<Arc<MarketTable>> {
    Ok(Arc::new(MarketTable::from_csv_path(
        &config.data.resolved_path(),
    )?))
}

fn load_bundle(config: &Config) -> anyhow::Result<Arc<ModelBundle>> {
    Ok(Arc::new(ModelBundle::load(&config.artifacts.resolved_dir())?))
}

fn show_symbols(config: Config) -> anyhow::Result<()> {
    let table = load_table(&config)?;
    for symbol in table.symbols() {
        println!("{}", symbol);
    }
    Ok(())
}

async fn infer_one(
    config: Config,
    symbol: String,
    backtest_days: Option<usize>,
    lookback: Option<usize>,
) -> anyhow::Result<()> {
    let bundle = load_bundle(&config)?;
    let table = load_table(&config)?;

    let mut settings = BatchSettings::from(&config.evaluation);
    if let Some(days) = backtest_days {
        settings.backtest_days = days;
    }
    if let Some(lookback) = lookback {
        settings.lookback_display = lookback;
    }

    let result = infer_symbol(bundle, table, symbol.to_uppercase(), settings).await?;
    tracing::info!("{}: {}", result.symbol, result.metrics);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn evaluate(config: Config, resume: bool, output_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let bundle = load_bundle(&config)?;
    let table = load_table(&config)?;

    let mut settings = BatchSettings::from(&config.evaluation);
    if let Some(dir) = output_dir {
        settings.output_dir = dir;
    }

    let checkpoint_path = config
        .evaluation
        .resolved_checkpoint()
        .unwrap_or_else(|| settings.output_dir.join("checkpoint.jsonl"));
    if !resume && checkpoint_path.exists() {
        tracing::info!("Starting fresh run, ignoring {}", checkpoint_path.display());
        tokio::fs::remove_file(&checkpoint_path).await?;
    }
    let mut checkpoint = Checkpoint::open(&checkpoint_path).await?;

    let evaluator = BatchEvaluator::new(bundle, settings);
    let report = evaluator.run(table, Some(&mut checkpoint)).await?;

    report.log_summary();
    report.write_outputs(&evaluator.settings().output_dir)?;
    Ok(())
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let bundle = load_bundle(&config)?;
    let table = load_table(&config)?;
    let settings = BatchSettings::from(&config.evaluation);

    let state = Arc::new(AppState::new(bundle, table, settings));
    let port = port.unwrap_or(config.server.port);
    start_server(state, &config.server.host, port).await
}
