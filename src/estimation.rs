//! # Estimation
//!
//! $$
//! \mu_i = \frac{\hat p_i - p_i}{p_i}, \qquad \Sigma = \operatorname{Cov}(r)
//! $$
//!
//! Expected returns from forecasts and covariance from realized returns.

pub mod covariance;
pub mod returns;

use serde::Deserialize;
use serde::Serialize;

pub use covariance::CovarianceMatrix;
pub use covariance::historical_covariance;
pub use covariance::regularize;
pub use returns::ReturnVector;
pub use returns::expected_returns;

use crate::error::Result;
use crate::forecast::ForecastResult;
use crate::series::TimeSeries;

/// Runtime configuration for [`ReturnEstimator`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
  /// Fewest common return periods accepted for the covariance estimate (at least 2).
  pub min_overlap: usize,
}

impl Default for EstimatorConfig {
  fn default() -> Self {
    Self { min_overlap: 10 }
  }
}

/// Builds the optimizer inputs from prices, forecasts and histories.
#[derive(Clone, Debug, Default)]
pub struct ReturnEstimator {
  config: EstimatorConfig,
}

impl ReturnEstimator {
  pub fn new(config: EstimatorConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &EstimatorConfig {
    &self.config
  }

  pub fn expected_returns(
    &self,
    last_prices: &[(String, f64)],
    forecasts: &[ForecastResult],
  ) -> Result<ReturnVector> {
    expected_returns(last_prices, forecasts)
  }

  pub fn historical_covariance(&self, histories: &[TimeSeries]) -> Result<CovarianceMatrix> {
    historical_covariance(histories, self.config.min_overlap)
  }
}
