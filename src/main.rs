use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use price_forecaster::config::load_config;
use price_forecaster::source::{CsvFileSource, PriceSource, YahooSource};
use price_forecaster::ForecastPipeline;

#[derive(Parser)]
#[command(name = "price-forecaster")]
#[command(version = "0.1.0")]
#[command(about = "Forecast closing prices with an SVM + LSTM ensemble", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "forecast.toml")]
    config: String,

    /// Enable verbose logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a history, train both models and print the forecast report
    Run {
        /// Instrument ticker
        #[arg(short, long, default_value = "FSM")]
        ticker: String,
        /// Start date (YYYY-MM-DD)
        #[arg(short, long, default_value = "2021-01-01")]
        start: NaiveDate,
        /// End date (YYYY-MM-DD), exclusive
        #[arg(short, long, default_value = "2021-08-11")]
        end: NaiveDate,
        /// Read the history from a local CSV export instead of Yahoo Finance
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
        /// Report predictions in price units instead of the [0, 1] scale
        #[arg(long)]
        prices: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run { ticker, start, end, csv, json, prices } => {
            let source: Arc<dyn PriceSource> = match csv {
                Some(path) => Arc::new(CsvFileSource::new(path)),
                None => Arc::new(YahooSource::new()?),
            };
            info!("Price Forecaster v0.1.0 using {}", source.name());

            let target = config.pipeline.target_column.clone();
            let pipeline = ForecastPipeline::new(source, config);
            let mut result = match pipeline.run(&ticker, start, end).await {
                Ok(result) => result,
                Err(e) => {
                    error!("Forecast failed ({}): {}", e.kind(), e);
                    return Err(e.into());
                }
            };
            if prices {
                result.predictions = result.predictions.in_price_units(&result.scaler, &target)?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                result.print_summary();
            }
        }
    }

    Ok(())
}
