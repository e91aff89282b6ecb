//! # File Adapters
//!
//! Local CSV price histories in, JSON allocation reports out.

use std::fs;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use crate::pipeline::PortfolioReport;
use crate::series::TimeSeries;

#[derive(Debug, Deserialize)]
struct PriceRecord {
  date: NaiveDate,
  price: f64,
}

/// Read a `date,price` CSV (with header, ISO dates) clipped to `[start, end]`.
pub fn load_price_csv(
  path: impl AsRef<Path>,
  asset_id: &str,
  start: Option<NaiveDate>,
  end: Option<NaiveDate>,
) -> Result<TimeSeries> {
  let path = path.as_ref();
  let mut reader = csv::ReaderBuilder::new()
    .trim(csv::Trim::All)
    .from_path(path)
    .with_context(|| format!("failed to open {}", path.display()))?;

  let mut observations = Vec::new();
  for (line, record) in reader.deserialize::<PriceRecord>().enumerate() {
    let record = record.with_context(|| format!("{}: bad record {}", path.display(), line + 1))?;
    observations.push((record.date, record.price));
  }

  let series = TimeSeries::new(asset_id, observations)
    .with_context(|| format!("invalid price history in {}", path.display()))?
    .between(start, end);
  debug!(asset = asset_id, observations = series.len(), "loaded price history");
  Ok(series)
}

/// Load `<dir>/<TICKER>.csv` for every ticker, in ticker order.
pub fn load_histories(
  dir: impl AsRef<Path>,
  tickers: &[String],
  start: Option<NaiveDate>,
  end: Option<NaiveDate>,
) -> Result<Vec<TimeSeries>> {
  let dir = dir.as_ref();
  tickers
    .iter()
    .map(|ticker| load_price_csv(dir.join(format!("{ticker}.csv")), ticker, start, end))
    .collect()
}

/// Write the report as `optimisation-<as_of_date>.json` under `dir` and return its path.
///
/// The JSON document is the only artifact; there is no plain-text summary
/// alongside it.
pub fn save_report_json(report: &PortfolioReport, dir: impl AsRef<Path>) -> Result<PathBuf> {
  let dir = dir.as_ref();
  fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

  let path = dir.join(format!("optimisation-{}.json", report.as_of_date));
  let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
  serde_json::to_writer_pretty(file, report)
    .with_context(|| format!("failed to write {}", path.display()))?;

  Ok(path)
}
