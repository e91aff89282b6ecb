//! # Errors
//!
//! Typed failures of a forecasting/allocation run. Every variant aborts the run
//! that produced it; nothing in the core retries or substitutes a default weighting.

use thiserror::Error;

/// Failure raised by the forecasting and allocation core.
#[derive(Debug, Error)]
pub enum PortfolioError {
  /// Series too short to fit a trend/seasonal model.
  #[error("asset `{asset}`: at least {required} observations required, got {actual}")]
  InsufficientData {
    asset: String,
    required: usize,
    actual: usize,
  },

  /// Non-positive, non-finite or missing last price.
  #[error("asset `{asset}`: invalid last price {price}")]
  InvalidPrice { asset: String, price: f64 },

  /// Too few common periods across assets to estimate a covariance matrix.
  #[error("at least {required} overlapping return periods required, got {actual}")]
  InsufficientOverlap { required: usize, actual: usize },

  /// `minimum_allocation * assets > 1`, so no weight vector can satisfy the floor.
  #[error("minimum allocation {minimum_allocation} is infeasible for {assets} assets")]
  InfeasibleConstraints {
    minimum_allocation: f64,
    assets: usize,
  },

  /// Solver exhausted its iteration budget and convergence was required.
  #[error("optimizer did not converge within {iterations} iterations")]
  NonConvergence { iterations: usize },

  /// Series violates ordering/positivity requirements.
  #[error("asset `{asset}`: invalid series ({reason})")]
  InvalidSeries { asset: String, reason: String },

  /// Fitted model extrapolated to a price that is not strictly positive.
  #[error("asset `{asset}`: forecast {value} is not a positive price")]
  NonPositiveForecast { asset: String, value: f64 },

  /// Asset sets or orderings of two inputs disagree.
  #[error("asset mismatch: {0}")]
  AssetMismatch(String),

  #[error("invalid parameter: {0}")]
  InvalidParameter(String),

  /// Linear algebra failure (singular KKT system, NaN input, exhausted shrinkage).
  #[error("numerical failure: {0}")]
  Numerical(String),
}

pub type Result<T> = std::result::Result<T, PortfolioError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn messages_name_the_asset() {
    let err = PortfolioError::InsufficientData {
      asset: "KO".to_string(),
      required: 30,
      actual: 3,
    };
    assert_eq!(
      err.to_string(),
      "asset `KO`: at least 30 observations required, got 3"
    );
  }

  #[test]
  fn infeasible_constraints_message() {
    let err = PortfolioError::InfeasibleConstraints {
      minimum_allocation: 0.4,
      assets: 3,
    };
    assert!(err.to_string().contains("0.4"));
    assert!(err.to_string().contains("3 assets"));
  }
}
