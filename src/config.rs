//! # Pipeline Configuration
//!
//! Immutable settings of one forecasting/allocation run, loadable from TOML.
//! Every field has a default, so a config file only lists what it overrides.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::estimation::EstimatorConfig;
use crate::forecast::ForecasterConfig;
use crate::optimize::SolverConfig;

/// Runtime configuration for [`PortfolioPipeline`](crate::pipeline::PortfolioPipeline).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// `λ` in `μᵀw − λwᵀΣw`.
  pub risk_aversion: f64,
  /// Floor on every weight.
  pub minimum_allocation: f64,
  /// Assets loaded by the command-line front end, in report order.
  pub tickers: Vec<String>,
  /// First date of the price history used.
  pub start_date: NaiveDate,
  /// Last date of the price history used; `None` keeps every later observation.
  pub end_date: Option<NaiveDate>,
  /// Fail with `NonConvergence` instead of returning a flagged result.
  pub require_convergence: bool,
  pub forecaster: ForecasterConfig,
  pub estimator: EstimatorConfig,
  pub solver: SolverConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      risk_aversion: 3.0,
      minimum_allocation: 0.05,
      tickers: ["KO", "REP.MC", "MSFT", "AAPL", "TSLA", "AMZN"]
        .iter()
        .map(|t| t.to_string())
        .collect(),
      start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
      end_date: None,
      require_convergence: false,
      forecaster: ForecasterConfig::default(),
      estimator: EstimatorConfig::default(),
      solver: SolverConfig::default(),
    }
  }
}

impl PipelineConfig {
  /// Parse and validate a TOML document.
  pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
    let config: Self = toml::from_str(raw).context("malformed pipeline configuration")?;
    config.validate()?;
    Ok(config)
  }

  /// Read, parse and validate a TOML file.
  pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
      .with_context(|| format!("failed to read config file {}", path.display()))?;
    Self::from_toml_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
  }

  pub fn validate(&self) -> Result<()> {
    if !(self.risk_aversion.is_finite() && self.risk_aversion > 0.0) {
      return Err(PortfolioError::InvalidParameter(format!(
        "risk_aversion must be positive, got {}",
        self.risk_aversion
      )));
    }
    if !(self.minimum_allocation.is_finite() && (0.0..=1.0).contains(&self.minimum_allocation)) {
      return Err(PortfolioError::InvalidParameter(format!(
        "minimum_allocation must be in [0, 1], got {}",
        self.minimum_allocation
      )));
    }
    if let Some(end) = self.end_date {
      if end < self.start_date {
        return Err(PortfolioError::InvalidParameter(format!(
          "end_date {end} precedes start_date {}",
          self.start_date
        )));
      }
    }

    let mut seen = HashSet::new();
    if let Some(dup) = self.tickers.iter().find(|t| !seen.insert(t.as_str())) {
      return Err(PortfolioError::InvalidParameter(format!(
        "ticker `{dup}` is listed twice"
      )));
    }

    self.forecaster.validate()?;
    self.solver.validate()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_reference_settings() {
    let config = PipelineConfig::default();
    assert_eq!(config.risk_aversion, 3.0);
    assert_eq!(config.minimum_allocation, 0.05);
    assert_eq!(config.tickers.len(), 6);
    assert_eq!(config.tickers[1], "REP.MC");
    assert_eq!(
      config.start_date,
      NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    );
    assert!(config.end_date.is_none());
    assert!(config.validate().is_ok());
  }

  #[test]
  fn partial_toml_keeps_defaults() {
    let config = PipelineConfig::from_toml_str(
      r#"
        risk_aversion = 1.5
        tickers = ["AAA", "BBB"]
        start_date = "2023-06-01"

        [forecaster]
        n_changepoints = 10
        weekly_seasonality = "disabled"

        [solver]
        max_iterations = 50
      "#,
    )
    .unwrap();

    assert_eq!(config.risk_aversion, 1.5);
    assert_eq!(config.minimum_allocation, 0.05);
    assert_eq!(config.tickers, vec!["AAA", "BBB"]);
    assert_eq!(config.forecaster.n_changepoints, 10);
    assert_eq!(config.forecaster.min_observations, 30);
    assert_eq!(config.solver.max_iterations, 50);
    assert_eq!(config.solver.tolerance, 1e-10);
    assert_eq!(config.estimator.min_overlap, 10);
  }

  #[test]
  fn invalid_values_are_rejected() {
    assert!(PipelineConfig::from_toml_str("risk_aversion = -1.0").is_err());
    assert!(PipelineConfig::from_toml_str("minimum_allocation = 1.5").is_err());
    assert!(PipelineConfig::from_toml_str("tickers = [\"A\", \"A\"]").is_err());
    assert!(
      PipelineConfig::from_toml_str("start_date = \"2024-05-01\"\nend_date = \"2024-01-01\"").is_err()
    );
    assert!(PipelineConfig::from_toml_str("risk_aversion = \"high\"").is_err());
  }

  #[test]
  fn bundled_config_equals_defaults() {
    let config = PipelineConfig::from_toml_str(include_str!("../portfolio.toml")).unwrap();
    assert_eq!(config, PipelineConfig::default());
  }

  #[test]
  fn load_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("portfolio.toml");
    fs::write(&path, "minimum_allocation = 0.1\n").unwrap();

    let config = PipelineConfig::load(&path).unwrap();
    assert_eq!(config.minimum_allocation, 0.1);
    assert!(PipelineConfig::load(dir.path().join("missing.toml")).is_err());
  }
}
