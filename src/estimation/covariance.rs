//! # Historical Covariance
//!
//! $$
//! \Sigma_{ij} = \frac{1}{T-1}\sum_{t}(r_{i,t}-\bar r_i)(r_{j,t}-\bar r_j) + \varepsilon I
//! $$
//!
//! Sample covariance of simple returns on common dates, with identity
//! shrinkage until the matrix admits a Cholesky factorization.

use std::collections::HashSet;

use chrono::NaiveDate;
use nalgebra::Cholesky;
use nalgebra::DMatrix;
use tracing::debug;

use super::returns::ensure_unique;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::series::TimeSeries;

/// First shrinkage step relative to the mean variance.
pub const SHRINKAGE_START: f64 = 1e-8;
/// Shrinkage grows tenfold per step, `0..=MAX_SHRINKAGE_STEPS`.
pub const MAX_SHRINKAGE_STEPS: i32 = 12;
/// Squared Cholesky pivots below this fraction of the mean variance count as singular.
pub const MIN_PIVOT_RATIO: f64 = 1e-12;

/// Symmetric positive-definite covariance in asset order.
#[derive(Clone, Debug, PartialEq)]
pub struct CovarianceMatrix {
  assets: Vec<String>,
  matrix: DMatrix<f64>,
  shrinkage: f64,
  observations: usize,
}

impl CovarianceMatrix {
  /// Wrap an externally estimated matrix, symmetrizing and regularizing it.
  pub fn new(assets: Vec<String>, matrix: DMatrix<f64>) -> Result<Self> {
    Self::with_observations(assets, matrix, 0)
  }

  fn with_observations(assets: Vec<String>, matrix: DMatrix<f64>, observations: usize) -> Result<Self> {
    if !matrix.is_square() || matrix.nrows() != assets.len() {
      return Err(PortfolioError::AssetMismatch(format!(
        "{} assets but a {}x{} covariance matrix",
        assets.len(),
        matrix.nrows(),
        matrix.ncols()
      )));
    }
    ensure_unique(&assets)?;
    let (matrix, shrinkage) = regularize(&matrix)?;

    Ok(Self {
      assets,
      matrix,
      shrinkage,
      observations,
    })
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn matrix(&self) -> &DMatrix<f64> {
    &self.matrix
  }

  pub fn len(&self) -> usize {
    self.assets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.assets.is_empty()
  }

  /// Multiple of the identity added to reach positive definiteness.
  pub fn shrinkage(&self) -> f64 {
    self.shrinkage
  }

  /// Common return periods used in the estimate (0 when supplied directly).
  pub fn observations(&self) -> usize {
    self.observations
  }
}

/// Symmetrize `matrix` and add `εI` on a fixed schedule until it is positive definite.
///
/// Returns the regularized matrix and the applied `ε` (0 when none was needed).
pub fn regularize(matrix: &DMatrix<f64>) -> Result<(DMatrix<f64>, f64)> {
  if matrix.iter().any(|v| !v.is_finite()) {
    return Err(PortfolioError::Numerical(
      "covariance matrix contains non-finite entries".to_string(),
    ));
  }

  let n = matrix.nrows();
  let sym = (matrix + matrix.transpose()) * 0.5;
  if n == 0 {
    return Ok((sym, 0.0));
  }

  let base = (sym.trace() / n as f64).max(f64::EPSILON);
  if is_positive_definite(&sym, base) {
    return Ok((sym, 0.0));
  }

  for k in 0..=MAX_SHRINKAGE_STEPS {
    let eps = base * SHRINKAGE_START * 10f64.powi(k);
    let candidate = &sym + DMatrix::<f64>::identity(n, n) * eps;
    if is_positive_definite(&candidate, base) {
      debug!(shrinkage = eps, step = k, "applied identity shrinkage");
      return Ok((candidate, eps));
    }
  }

  Err(PortfolioError::Numerical(format!(
    "covariance matrix is not positive definite after {} shrinkage steps",
    MAX_SHRINKAGE_STEPS + 1
  )))
}

fn is_positive_definite(m: &DMatrix<f64>, base: f64) -> bool {
  match Cholesky::new(m.clone()) {
    Some(chol) => chol
      .l_dirty()
      .diagonal()
      .iter()
      .all(|d| d * d >= base * MIN_PIVOT_RATIO),
    None => false,
  }
}

/// Covariance of per-period simple returns over the dates every asset trades.
///
/// Prices are inner-joined on date before differencing, so a holiday on one
/// exchange turns the surrounding period into a multi-day return for every
/// asset alike.
pub fn historical_covariance(histories: &[TimeSeries], min_overlap: usize) -> Result<CovarianceMatrix> {
  if histories.is_empty() {
    return Err(PortfolioError::InvalidParameter(
      "covariance requires at least one asset".to_string(),
    ));
  }

  let required = min_overlap.max(2);
  let mut common: HashSet<NaiveDate> = histories[0].dates().iter().copied().collect();
  for series in &histories[1..] {
    let dates: HashSet<NaiveDate> = series.dates().iter().copied().collect();
    common.retain(|d| dates.contains(d));
  }

  let returns: Vec<Vec<(NaiveDate, f64)>> = histories
    .iter()
    .map(|s| s.restricted_to(&common).simple_returns())
    .collect();
  let t = returns[0].len();
  if t < required {
    return Err(PortfolioError::InsufficientOverlap {
      required,
      actual: t,
    });
  }

  let n = histories.len();
  let aligned = DMatrix::from_fn(t, n, |row, col| returns[col][row].1);
  let means = aligned.row_mean();
  let centered = DMatrix::from_fn(t, n, |row, col| aligned[(row, col)] - means[col]);
  let sample = (centered.transpose() * &centered) / (t - 1) as f64;

  debug!(assets = n, periods = t, "estimated historical covariance");

  let assets = histories.iter().map(|s| s.asset_id().to_string()).collect();
  CovarianceMatrix::with_observations(assets, sample, t)
}
