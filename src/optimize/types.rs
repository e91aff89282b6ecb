//! # Optimization Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}\in\mathcal W}\ \mu^\top\mathbf{w}-\lambda\,\mathbf{w}^\top\Sigma\mathbf{w}
//! $$
//!
//! Result containers of a portfolio optimization run.

use serde::Deserialize;
use serde::Serialize;

/// Portfolio weights in asset order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioWeights {
  assets: Vec<String>,
  weights: Vec<f64>,
}

impl PortfolioWeights {
  pub(crate) fn new(assets: Vec<String>, weights: Vec<f64>) -> Self {
    debug_assert_eq!(assets.len(), weights.len());
    Self { assets, weights }
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn values(&self) -> &[f64] {
    &self.weights
  }

  pub fn len(&self) -> usize {
    self.weights.len()
  }

  pub fn is_empty(&self) -> bool {
    self.weights.is_empty()
  }

  pub fn get(&self, asset: &str) -> Option<f64> {
    self
      .assets
      .iter()
      .position(|a| a == asset)
      .map(|i| self.weights[i])
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .assets
      .iter()
      .map(String::as_str)
      .zip(self.weights.iter().copied())
  }

  pub fn sum(&self) -> f64 {
    self.weights.iter().sum()
  }
}

/// Output of [`PortfolioOptimizer::optimize`](super::PortfolioOptimizer::optimize).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
  /// Final normalized weights.
  pub weights: PortfolioWeights,
  /// Utility `μᵀw − λwᵀΣw` of the final weights.
  pub objective_value: f64,
  /// Whether the solver met its tolerance before the iteration cap.
  pub converged: bool,
  /// Outer solver iterations performed.
  pub iterations: usize,
  /// Model expected portfolio return `μᵀw`.
  pub expected_return: f64,
  /// Model portfolio volatility `sqrt(wᵀΣw)`.
  pub volatility: f64,
}
