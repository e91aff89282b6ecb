//! # Portfolio Optimizer
//!
//! $$
//! \max_{\mathbf{w}}\ \mu^\top\mathbf{w}-\lambda\,\mathbf{w}^\top\Sigma\mathbf{w}
//! \quad\text{s.t.}\quad \mathbf 1^\top\mathbf{w}=1,\ \ m\le w_i\le 1
//! $$
//!
//! Long-only mean-variance allocation with a per-asset floor.

use nalgebra::DVector;
use tracing::debug;
use tracing::warn;

use super::objective::MeanVarianceObjective;
use super::sqp::Bounds;
use super::sqp::ConstrainedMinimizer;
use super::sqp::LinearEquality;
use super::sqp::SolverConfig;
use super::sqp::SqpSolver;
use super::types::OptimizationResult;
use super::types::PortfolioWeights;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::estimation::CovarianceMatrix;
use crate::estimation::ReturnVector;

/// Slack on `m·N ≤ 1` so that e.g. `0.2 × 5` is still feasible.
const FLOOR_SLACK: f64 = 1e-12;

/// Mean-variance optimizer over any [`ConstrainedMinimizer`].
#[derive(Clone, Debug)]
pub struct PortfolioOptimizer<S = SqpSolver> {
  solver: S,
}

impl Default for PortfolioOptimizer<SqpSolver> {
  fn default() -> Self {
    Self::new(SqpSolver::default())
  }
}

impl PortfolioOptimizer<SqpSolver> {
  pub fn from_config(config: SolverConfig) -> Self {
    Self::new(SqpSolver::new(config))
  }
}

impl<S: ConstrainedMinimizer> PortfolioOptimizer<S> {
  pub fn new(solver: S) -> Self {
    Self { solver }
  }

  pub fn solver(&self) -> &S {
    &self.solver
  }

  /// Solve for the weights maximizing `μᵀw − λwᵀΣw` under the budget and floor constraints.
  ///
  /// The returned weights always sum to one and respect the floor, even when
  /// `converged` is false.
  pub fn optimize(
    &self,
    returns: &ReturnVector,
    covariance: &CovarianceMatrix,
    risk_aversion: f64,
    minimum_allocation: f64,
  ) -> Result<OptimizationResult> {
    let n = returns.len();
    if n == 0 {
      return Err(PortfolioError::InvalidParameter(
        "cannot optimize an empty portfolio".to_string(),
      ));
    }
    if returns.assets() != covariance.assets() {
      return Err(PortfolioError::AssetMismatch(
        "expected returns and covariance list different assets".to_string(),
      ));
    }
    if !(risk_aversion.is_finite() && risk_aversion > 0.0) {
      return Err(PortfolioError::InvalidParameter(format!(
        "risk aversion must be positive, got {risk_aversion}"
      )));
    }
    if !(minimum_allocation.is_finite() && minimum_allocation >= 0.0) {
      return Err(PortfolioError::InvalidParameter(format!(
        "minimum allocation must be non-negative, got {minimum_allocation}"
      )));
    }
    check_floor(minimum_allocation, n)?;

    let objective = MeanVarianceObjective::new(
      returns.values().clone(),
      covariance.matrix().clone(),
      risk_aversion,
    );
    let outcome = self.solver.minimize(
      &objective,
      &LinearEquality::sum_to(n, 1.0),
      &Bounds::uniform(n, minimum_allocation, 1.0),
      DVector::from_element(n, 1.0 / n as f64),
    )?;

    if !outcome.converged {
      warn!(
        iterations = outcome.iterations,
        "optimizer stopped before reaching tolerance"
      );
    }

    let weights = normalize_weights(outcome.x.as_slice(), minimum_allocation);
    let w = DVector::from_column_slice(&weights);
    let objective_value = objective.utility(&w);
    let expected_return = objective.mu.dot(&w);
    let volatility = w.dot(&(&objective.sigma * &w)).max(0.0).sqrt();

    debug!(
      objective_value,
      expected_return,
      volatility,
      iterations = outcome.iterations,
      "optimized portfolio"
    );

    Ok(OptimizationResult {
      weights: PortfolioWeights::new(returns.assets().to_vec(), weights),
      objective_value,
      converged: outcome.converged,
      iterations: outcome.iterations,
      expected_return,
      volatility,
    })
  }
}

/// Fail with `InfeasibleConstraints` when `assets` weights cannot all reach the floor.
pub(crate) fn check_floor(minimum_allocation: f64, assets: usize) -> Result<()> {
  if minimum_allocation * assets as f64 > 1.0 + FLOOR_SLACK {
    return Err(PortfolioError::InfeasibleConstraints {
      minimum_allocation,
      assets,
    });
  }
  Ok(())
}

/// Clip to `[floor, 1]` and rescale the excess above the floor so the weights sum to one.
pub fn normalize_weights(raw: &[f64], floor: f64) -> Vec<f64> {
  let n = raw.len();
  if n == 0 {
    return Vec::new();
  }

  let clipped: Vec<f64> = raw.iter().map(|w| w.max(floor).min(1.0)).collect();
  let excess: f64 = clipped.iter().map(|w| w - floor).sum();
  let budget = (1.0 - floor * n as f64).max(0.0);

  if excess <= f64::EPSILON {
    return vec![floor + budget / n as f64; n];
  }

  clipped
    .iter()
    .map(|w| floor + (w - floor) * budget / excess)
    .collect()
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use nalgebra::DMatrix;

  use super::*;

  fn inputs(mu: &[f64], cov: DMatrix<f64>) -> (ReturnVector, CovarianceMatrix) {
    let assets: Vec<String> = (0..mu.len()).map(|i| format!("A{i}")).collect();
    (
      ReturnVector::new(assets.clone(), mu.to_vec()).unwrap(),
      CovarianceMatrix::new(assets, cov).unwrap(),
    )
  }

  fn diag(values: &[f64]) -> DMatrix<f64> {
    DMatrix::from_diagonal(&DVector::from_row_slice(values))
  }

  #[test]
  fn single_asset_takes_everything() {
    let (mu, cov) = inputs(&[-0.3], diag(&[0.5]));
    for lambda in [0.1, 3.0, 50.0] {
      let result = PortfolioOptimizer::default()
        .optimize(&mu, &cov, lambda, 0.0)
        .unwrap();
      assert_eq!(result.weights.values(), &[1.0]);
      assert!(result.converged);
    }
  }

  #[test]
  fn symmetric_problem_gives_equal_weights() {
    let cov = DMatrix::from_fn(4, 4, |i, j| if i == j { 0.04 } else { 0.01 });
    let (mu, cov) = inputs(&[0.01; 4], cov);
    let result = PortfolioOptimizer::default()
      .optimize(&mu, &cov, 3.0, 0.0)
      .unwrap();

    for w in result.weights.values() {
      assert_abs_diff_eq!(*w, 0.25, epsilon = 1e-9);
    }
  }

  #[test]
  fn favours_high_return_low_risk_assets() {
    let (mu, cov) = inputs(&[0.05, -0.02, 0.05], diag(&[0.01, 0.02, 0.015]));
    let result = PortfolioOptimizer::default()
      .optimize(&mu, &cov, 2.0, 0.0)
      .unwrap();
    let w = result.weights.values();

    assert!(result.converged);
    assert_abs_diff_eq!(result.weights.sum(), 1.0, epsilon = 1e-6);
    assert!(w[0] > w[1] && w[2] > w[1]);
    assert_abs_diff_eq!(w[0], 0.6, epsilon = 1e-6);
    assert_abs_diff_eq!(w[1], 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(w[2], 0.4, epsilon = 1e-6);
    assert_abs_diff_eq!(result.expected_return, 0.05, epsilon = 1e-6);
    assert_abs_diff_eq!(
      result.objective_value,
      0.05 - 2.0 * (0.36 * 0.01 + 0.16 * 0.015),
      epsilon = 1e-8
    );
  }

  #[test]
  fn floor_is_respected() {
    let (mu, cov) = inputs(
      &[0.08, -0.05, 0.01, -0.03],
      diag(&[0.01, 0.03, 0.02, 0.05]),
    );
    let result = PortfolioOptimizer::default()
      .optimize(&mu, &cov, 3.0, 0.05)
      .unwrap();

    assert_abs_diff_eq!(result.weights.sum(), 1.0, epsilon = 1e-6);
    for w in result.weights.values() {
      assert!(*w >= 0.05 - 1e-9);
    }
    assert_abs_diff_eq!(result.weights.get("A1").unwrap(), 0.05, epsilon = 1e-9);
  }

  #[test]
  fn floor_times_assets_above_one_is_infeasible() {
    let (mu, cov) = inputs(&[0.01, 0.02, 0.03], diag(&[0.01, 0.01, 0.01]));
    let err = PortfolioOptimizer::default()
      .optimize(&mu, &cov, 1.0, 0.4)
      .unwrap_err();
    assert!(matches!(
      err,
      PortfolioError::InfeasibleConstraints { assets: 3, .. }
    ));
  }

  #[test]
  fn floor_that_exhausts_budget_pins_all_weights() {
    let (mu, cov) = inputs(&[0.05, 0.0, -0.05, 0.01, 0.02], diag(&[0.01; 5]));
    let result = PortfolioOptimizer::default()
      .optimize(&mu, &cov, 1.0, 0.2)
      .unwrap();
    for w in result.weights.values() {
      assert_abs_diff_eq!(*w, 0.2, epsilon = 1e-12);
    }
  }

  #[test]
  fn iteration_cap_is_flagged_not_fatal() {
    let (mu, cov) = inputs(&[0.05, -0.02, 0.05], diag(&[0.01, 0.02, 0.015]));
    let optimizer = PortfolioOptimizer::from_config(SolverConfig {
      max_iterations: 1,
      ..SolverConfig::default()
    });
    let result = optimizer.optimize(&mu, &cov, 2.0, 0.0).unwrap();

    assert!(!result.converged);
    assert_eq!(result.iterations, 1);
    assert_abs_diff_eq!(result.weights.sum(), 1.0, epsilon = 1e-6);
  }

  #[test]
  fn invalid_inputs_are_rejected() {
    let (mu, cov) = inputs(&[0.01, 0.02], diag(&[0.01, 0.01]));
    let optimizer = PortfolioOptimizer::default();
    assert!(matches!(
      optimizer.optimize(&mu, &cov, 0.0, 0.0),
      Err(PortfolioError::InvalidParameter(_))
    ));
    assert!(matches!(
      optimizer.optimize(&mu, &cov, 1.0, -0.1),
      Err(PortfolioError::InvalidParameter(_))
    ));

    let other = CovarianceMatrix::new(vec!["X".into(), "Y".into()], diag(&[0.01, 0.01])).unwrap();
    assert!(matches!(
      optimizer.optimize(&mu, &other, 1.0, 0.0),
      Err(PortfolioError::AssetMismatch(_))
    ));
  }

  #[test]
  fn optimization_is_deterministic() {
    let cov = DMatrix::from_row_slice(
      3,
      3,
      &[0.04, 0.006, -0.002, 0.006, 0.09, 0.01, -0.002, 0.01, 0.025],
    );
    let (mu, cov) = inputs(&[0.03, 0.06, 0.01], cov);
    let optimizer = PortfolioOptimizer::default();
    let a = optimizer.optimize(&mu, &cov, 3.0, 0.05).unwrap();
    let b = optimizer.optimize(&mu, &cov, 3.0, 0.05).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn normalization_keeps_floor_and_budget() {
    let w = normalize_weights(&[0.7, 0.02, 0.5], 0.05);
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(w[1], 0.05, epsilon = 1e-15);
    assert!(w[0] > w[2]);
  }
}
