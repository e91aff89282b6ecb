use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use forecast_portfolio::PipelineConfig;
use forecast_portfolio::PortfolioPipeline;
use forecast_portfolio::io::load_histories;
use forecast_portfolio::io::save_report_json;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Forecast every configured asset and allocate a mean-variance portfolio.
#[derive(Parser)]
#[command(name = "forecast-portfolio")]
#[command(version, long_about = None)]
struct Cli {
  /// TOML configuration; built-in defaults when omitted.
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Directory holding one `<TICKER>.csv` (`date,price`) per asset.
  #[arg(short, long, default_value = "data")]
  data_dir: PathBuf,

  /// Write the report as JSON to the results directory.
  #[arg(long)]
  save_to_files: bool,

  #[arg(long, default_value = "results")]
  results_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let cli = Cli::parse();
  let config = match &cli.config {
    Some(path) => PipelineConfig::load(path)?,
    None => PipelineConfig::default(),
  };

  let histories = load_histories(
    &cli.data_dir,
    &config.tickers,
    Some(config.start_date),
    config.end_date,
  )?;

  let report = PortfolioPipeline::new(config)
    .run(&histories)
    .context("portfolio run failed")?;

  info!(as_of = %report.as_of_date, "predictions: {:?}", report.predictions().collect::<Vec<_>>());
  info!("predicted returns: {:?}", report.predicted_returns().collect::<Vec<_>>());
  info!("weights: {:?}", report.weights().collect::<Vec<_>>());

  if cli.save_to_files {
    let path = save_report_json(&report, &cli.results_dir)?;
    info!(path = %path.display(), "saved report");
  }

  Ok(())
}
