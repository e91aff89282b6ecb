//! # Portfolio Pipeline
//!
//! $$
//! \{p_{i,t}\} \xrightarrow{\text{forecast}} \hat p_i
//! \xrightarrow{\text{estimate}} (\mu, \Sigma)
//! \xrightarrow{\text{optimize}} \mathbf{w}^\*
//! $$
//!
//! End-to-end run: forecast every asset, estimate returns and risk, allocate.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::estimation::ReturnEstimator;
use crate::estimation::returns::ensure_unique;
use crate::forecast::ForecastResult;
use crate::forecast::SeriesForecaster;
use crate::optimize::OptimizationResult;
use crate::optimize::PortfolioOptimizer;
use crate::optimize::portfolio::check_floor;
use crate::series::TimeSeries;

/// One row of the report: prices, forecast and weight of an asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetAllocation {
  pub asset_id: String,
  pub current_price: f64,
  pub predicted_price: f64,
  pub predicted_return: f64,
  pub weight: f64,
  pub lower_bound: Option<f64>,
  pub upper_bound: Option<f64>,
}

/// Outcome of [`PortfolioPipeline::run`], rows in input order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
  /// Latest observation date across the input histories.
  pub as_of_date: NaiveDate,
  pub allocations: Vec<AssetAllocation>,
  pub optimization: OptimizationResult,
}

impl PortfolioReport {
  pub fn weights(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self.allocations.iter().map(|a| (a.asset_id.as_str(), a.weight))
  }

  pub fn predictions(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .allocations
      .iter()
      .map(|a| (a.asset_id.as_str(), a.predicted_price))
  }

  pub fn current_prices(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .allocations
      .iter()
      .map(|a| (a.asset_id.as_str(), a.current_price))
  }

  pub fn predicted_returns(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .allocations
      .iter()
      .map(|a| (a.asset_id.as_str(), a.predicted_return))
  }
}

/// Single entry point chaining forecaster, estimator and optimizer.
#[derive(Clone, Debug, Default)]
pub struct PortfolioPipeline {
  config: PipelineConfig,
}

impl PortfolioPipeline {
  pub fn new(config: PipelineConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  /// Run the full forecast → estimate → optimize chain over `histories`.
  ///
  /// Any per-asset failure aborts the run; the error reported is the one of
  /// the first failing asset in input order.
  pub fn run(&self, histories: &[TimeSeries]) -> Result<PortfolioReport> {
    self.config.validate()?;
    if histories.is_empty() {
      return Err(PortfolioError::InvalidParameter(
        "no price histories supplied".to_string(),
      ));
    }
    let assets: Vec<String> = histories.iter().map(|s| s.asset_id().to_string()).collect();
    ensure_unique(&assets)?;
    check_floor(self.config.minimum_allocation, histories.len())?;

    info!(assets = histories.len(), "forecasting prices");
    let forecaster = SeriesForecaster::new(self.config.forecaster.clone());
    let forecasts = histories
      .par_iter()
      .map(|series| forecaster.fit_and_forecast(series))
      .collect::<Vec<Result<ForecastResult>>>()
      .into_iter()
      .collect::<Result<Vec<_>>>()?;

    let mut last_prices = Vec::with_capacity(histories.len());
    let mut as_of_date = NaiveDate::MIN;
    for series in histories {
      let (date, price) = series.last().ok_or_else(|| PortfolioError::InsufficientData {
        asset: series.asset_id().to_string(),
        required: 1,
        actual: 0,
      })?;
      as_of_date = as_of_date.max(date);
      last_prices.push((series.asset_id().to_string(), price));
    }

    let estimator = ReturnEstimator::new(self.config.estimator.clone());
    let returns = estimator.expected_returns(&last_prices, &forecasts)?;
    let covariance = estimator.historical_covariance(histories)?;
    info!(
      periods = covariance.observations(),
      shrinkage = covariance.shrinkage(),
      "estimated returns and covariance"
    );

    let optimizer = PortfolioOptimizer::from_config(self.config.solver.clone());
    let optimization = optimizer.optimize(
      &returns,
      &covariance,
      self.config.risk_aversion,
      self.config.minimum_allocation,
    )?;

    if !optimization.converged {
      if self.config.require_convergence {
        return Err(PortfolioError::NonConvergence {
          iterations: optimization.iterations,
        });
      }
      warn!(
        iterations = optimization.iterations,
        "optimizer did not converge, returning best weights found"
      );
    }

    let allocations: Vec<AssetAllocation> = last_prices
      .into_iter()
      .zip(forecasts)
      .zip(returns.values().iter().zip(optimization.weights.values()))
      .map(|(((asset_id, current_price), forecast), (&predicted_return, &weight))| AssetAllocation {
        asset_id,
        current_price,
        predicted_price: forecast.point_forecast,
        predicted_return,
        weight,
        lower_bound: forecast.lower_bound,
        upper_bound: forecast.upper_bound,
      })
      .collect();

    for a in &allocations {
      info!(
        asset = %a.asset_id,
        current = a.current_price,
        predicted = a.predicted_price,
        predicted_return = a.predicted_return,
        weight = a.weight,
        "allocation"
      );
    }

    Ok(PortfolioReport {
      as_of_date,
      allocations,
      optimization,
    })
  }
}
