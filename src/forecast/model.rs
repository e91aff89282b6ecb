//! # Additive Regression Model
//!
//! $$
//! \hat\beta = \arg\min_\beta \|y - X\beta\|^2 + \hat\sigma^2 \sum_j \frac{\beta_j^2}{\tau_j^2}
//! $$
//!
//! Trend hinges and Fourier terms as columns of one design matrix, fitted by a
//! single regularized least-squares solve (SVD) over the full history.

use chrono::NaiveDate;
use nalgebra::DMatrix;
use nalgebra::DVector;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;
use tracing::debug;

use super::forecaster::ForecasterConfig;
use super::seasonality::Seasonality;
use super::seasonality::resolve_seasonalities;
use super::trend::PiecewiseLinearTrend;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::series::TimeSeries;

/// Lower bound on the noise variance (scaled units) used to weight the priors.
const NOISE_FLOOR: f64 = 1e-12;
/// Singular values below this fraction of the largest one are truncated.
const SVD_RELATIVE_EPS: f64 = 1e-12;
/// Prior scale for intercept and base slope; effectively unpenalized.
const TREND_PRIOR_SCALE: f64 = 5.0;

/// Model complexity: requested changepoints and the seasonal components.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSpec {
  pub n_changepoints: usize,
  pub seasonalities: Vec<Seasonality>,
}

impl ModelSpec {
  /// Next simpler model, or `None` once only the linear trend is left.
  ///
  /// Changepoints are halved first; after that the highest Fourier order is
  /// halved and a seasonality is dropped when its order reaches zero.
  pub fn simplify(&self) -> Option<Self> {
    if self.n_changepoints > 0 {
      return Some(Self {
        n_changepoints: self.n_changepoints / 2,
        seasonalities: self.seasonalities.clone(),
      });
    }
    self.reduce_seasonality()
  }

  /// Halve the highest Fourier order, keeping the changepoints.
  ///
  /// A seasonality whose order reaches zero is removed; `None` when there is none left.
  pub fn reduce_seasonality(&self) -> Option<Self> {
    let (idx, _) = self
      .seasonalities
      .iter()
      .enumerate()
      .max_by_key(|(_, s)| s.order)?;

    let mut seasonalities = self.seasonalities.clone();
    let order = seasonalities[idx].order / 2;
    if order == 0 {
      seasonalities.remove(idx);
    } else {
      seasonalities[idx].order = order;
    }

    Some(Self {
      n_changepoints: self.n_changepoints,
      seasonalities,
    })
  }
}

/// Trend + seasonality model fitted to one asset.
#[derive(Clone, Debug)]
pub struct FittedModel {
  asset_id: String,
  first_date: NaiveDate,
  last_date: NaiveDate,
  span_days: f64,
  y_scale: f64,
  log_transform: bool,
  trend: PiecewiseLinearTrend,
  seasonalities: Vec<Seasonality>,
  coefficients: DVector<f64>,
  residual_std: f64,
  n_observations: usize,
}

impl FittedModel {
  pub fn fit(series: &TimeSeries, config: &ForecasterConfig) -> Result<Self> {
    let n = series.len();
    let required = config.min_observations.max(3);
    if n < required {
      return Err(PortfolioError::InsufficientData {
        asset: series.asset_id().to_string(),
        required,
        actual: n,
      });
    }

    let days = series.elapsed_days();
    let span_days = days[n - 1];
    let min_spacing = days
      .windows(2)
      .map(|w| w[1] - w[0])
      .fold(f64::INFINITY, f64::min);
    let first_date = series.dates()[0];
    let epoch_offset = days_since_epoch(first_date);

    let t: Vec<f64> = days.iter().map(|d| d / span_days).collect();
    let epoch_days: Vec<f64> = days.iter().map(|d| epoch_offset + d).collect();

    let y: Vec<f64> = if config.log_transform {
      series.prices().iter().map(|p| p.ln()).collect()
    } else {
      series.prices().to_vec()
    };
    let y_max = y.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let y_scale = if y_max > 0.0 { y_max } else { 1.0 };
    let y_vec = DVector::from_iterator(n, y.iter().map(|v| v / y_scale));

    let mut spec = ModelSpec {
      n_changepoints: config.n_changepoints,
      seasonalities: resolve_seasonalities(
        config.weekly_seasonality,
        config.yearly_seasonality,
        &config.custom_seasonalities,
        span_days,
        min_spacing,
      )
      .into_iter()
      .filter_map(|s| cap_order(s, &epoch_days))
      .collect(),
    };

    let (trend, x) = loop {
      let trend = PiecewiseLinearTrend::place(&t, spec.n_changepoints, config.changepoint_range);
      spec.n_changepoints = trend.changepoints.len();
      let x = design_matrix(&trend, &spec.seasonalities, &t, &epoch_days);
      let condition = condition_number(&x);

      if x.ncols() < n && condition <= config.max_condition_number {
        break (trend, x);
      }

      // A deficient seasonal block is fixed by lowering its order, not by dropping changepoints.
      let seasonal_deficient = !spec.seasonalities.is_empty()
        && condition_number(&seasonal_block(&spec.seasonalities, &epoch_days))
          > config.max_condition_number;

      debug!(
        asset = series.asset_id(),
        columns = x.ncols(),
        rows = n,
        condition,
        seasonal_deficient,
        "reducing forecast model complexity"
      );
      let next = if seasonal_deficient {
        spec.reduce_seasonality()
      } else {
        spec.simplify()
      };
      spec = next.ok_or_else(|| {
        PortfolioError::Numerical(format!(
          "asset `{}`: linear trend design is singular",
          series.asset_id()
        ))
      })?;
    };

    // First stage: unpenalized residual variance of the full design weights the priors.
    let p = x.ncols();
    let ols_fit = &x * solve_least_squares(x.clone(), &y_vec)?;
    let noise = ((&y_vec - ols_fit).norm_squared() / (n - p) as f64).max(NOISE_FLOOR);

    let mut a = DMatrix::zeros(n + p, p);
    a.view_mut((0, 0), (n, p)).copy_from(&x);
    for (j, scale) in prior_scales(&trend, &spec.seasonalities, config)
      .into_iter()
      .enumerate()
    {
      a[(n + j, j)] = (noise / (scale * scale)).sqrt();
    }
    let mut b = DVector::zeros(n + p);
    b.rows_mut(0, n).copy_from(&y_vec);

    let coefficients = solve_least_squares(a, &b)?;
    let residuals = &y_vec - &x * &coefficients;
    let residual_std = (residuals.norm_squared() / (n - p) as f64).sqrt() * y_scale;

    debug!(
      asset = series.asset_id(),
      changepoints = trend.changepoints.len(),
      seasonalities = spec.seasonalities.len(),
      residual_std,
      "fitted forecast model"
    );

    Ok(Self {
      asset_id: series.asset_id().to_string(),
      first_date,
      last_date: series.dates()[n - 1],
      span_days,
      y_scale,
      log_transform: config.log_transform,
      trend,
      seasonalities: spec.seasonalities,
      coefficients,
      residual_std,
      n_observations: n,
    })
  }

  pub fn asset_id(&self) -> &str {
    &self.asset_id
  }

  pub fn last_date(&self) -> NaiveDate {
    self.last_date
  }

  pub fn n_observations(&self) -> usize {
    self.n_observations
  }

  pub fn n_changepoints(&self) -> usize {
    self.trend.changepoints.len()
  }

  pub fn seasonalities(&self) -> &[Seasonality] {
    &self.seasonalities
  }

  /// Residual standard deviation in model units (log price when log-transformed).
  pub fn residual_std(&self) -> f64 {
    self.residual_std
  }

  /// `(trend, seasonal)` at `date`, in model units.
  pub fn components(&self, date: NaiveDate) -> (f64, f64) {
    let d = (date - self.first_date).num_days() as f64;
    let mut row = Vec::with_capacity(self.coefficients.len());
    self.trend.extend_row(d / self.span_days, &mut row);
    let n_trend = row.len();
    let epoch_day = days_since_epoch(self.first_date) + d;
    for s in &self.seasonalities {
      s.extend_row(epoch_day, &mut row);
    }

    let beta = self.coefficients.as_slice();
    let trend: f64 = row[..n_trend]
      .iter()
      .zip(&beta[..n_trend])
      .map(|(x, b)| x * b)
      .sum();
    let seasonal: f64 = row[n_trend..]
      .iter()
      .zip(&beta[n_trend..])
      .map(|(x, b)| x * b)
      .sum();

    (trend * self.y_scale, seasonal * self.y_scale)
  }

  /// Point prediction in price units.
  pub fn predict(&self, date: NaiveDate) -> f64 {
    let (trend, seasonal) = self.components(date);
    self.to_price(trend + seasonal)
  }

  /// Trend slope per day at `date`, in model units.
  pub fn trend_slope(&self, date: NaiveDate) -> f64 {
    let t = (date - self.first_date).num_days() as f64 / self.span_days;
    self.trend.slope_at(self.coefficients.as_slice(), t) * self.y_scale / self.span_days
  }

  /// Central interval of probability `width` around the prediction, in price units.
  pub fn interval(&self, date: NaiveDate, width: f64) -> Result<(f64, f64)> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| PortfolioError::Numerical(e.to_string()))?;
    let z = normal.inverse_cdf(0.5 + width / 2.0);
    let (trend, seasonal) = self.components(date);
    let center = trend + seasonal;
    let half = z * self.residual_std;
    Ok((self.to_price(center - half), self.to_price(center + half)))
  }

  fn to_price(&self, value: f64) -> f64 {
    if self.log_transform {
      value.exp()
    } else {
      value
    }
  }
}

fn days_since_epoch(date: NaiveDate) -> f64 {
  // NaiveDate::default() is 1970-01-01.
  (date - NaiveDate::default()).num_days() as f64
}

fn design_matrix(
  trend: &PiecewiseLinearTrend,
  seasonalities: &[Seasonality],
  t: &[f64],
  epoch_days: &[f64],
) -> DMatrix<f64> {
  let p = trend.n_columns() + seasonalities.iter().map(|s| s.n_columns()).sum::<usize>();
  let mut flat = Vec::with_capacity(t.len() * p);
  for (&ti, &di) in t.iter().zip(epoch_days.iter()) {
    trend.extend_row(ti, &mut flat);
    for s in seasonalities {
      s.extend_row(di, &mut flat);
    }
  }
  DMatrix::from_row_slice(t.len(), p, &flat)
}

/// Intercept plus seasonal columns, the part of the design that sparse
/// sampling (e.g. trading days only) can make deficient.
fn seasonal_block(seasonalities: &[Seasonality], epoch_days: &[f64]) -> DMatrix<f64> {
  let p = 1 + seasonalities.iter().map(|s| s.n_columns()).sum::<usize>();
  let mut flat = Vec::with_capacity(epoch_days.len() * p);
  for &d in epoch_days {
    flat.push(1.0);
    for s in seasonalities {
      s.extend_row(d, &mut flat);
    }
  }
  DMatrix::from_row_slice(epoch_days.len(), p, &flat)
}

/// Lower the Fourier order to what the observed phases can identify.
///
/// `k` harmonics need `2k + 1` distinct phases together with the intercept, so
/// five trading days per week support weekly order 2 at most.
fn cap_order(mut seasonality: Seasonality, epoch_days: &[f64]) -> Option<Seasonality> {
  let mut phases: Vec<i64> = epoch_days
    .iter()
    .map(|d| (d.rem_euclid(seasonality.period_days) * 1e6).round() as i64)
    .collect();
  phases.sort_unstable();
  phases.dedup();

  let max_order = phases.len().saturating_sub(1) / 2;
  if max_order < seasonality.order {
    debug!(
      seasonality = %seasonality.name,
      requested = seasonality.order,
      phases = phases.len(),
      "capping Fourier order"
    );
    seasonality.order = max_order;
  }
  (seasonality.order > 0).then_some(seasonality)
}

fn prior_scales(
  trend: &PiecewiseLinearTrend,
  seasonalities: &[Seasonality],
  config: &ForecasterConfig,
) -> Vec<f64> {
  let mut scales = vec![TREND_PRIOR_SCALE; 2];
  scales.extend(std::iter::repeat(config.changepoint_prior_scale).take(trend.changepoints.len()));
  for s in seasonalities {
    scales.extend(std::iter::repeat(config.seasonality_prior_scale).take(s.n_columns()));
  }
  scales
}

/// Condition number of `x` after scaling every column to unit norm.
fn condition_number(x: &DMatrix<f64>) -> f64 {
  let norms: Vec<f64> = x.column_iter().map(|c| c.norm()).collect();
  if norms.iter().any(|&n| n <= 0.0 || !n.is_finite()) {
    return f64::INFINITY;
  }

  let scaled = DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| x[(i, j)] / norms[j]);
  let sv = scaled.svd(false, false).singular_values;
  let min = sv.min();
  if min > 0.0 {
    sv.max() / min
  } else {
    f64::INFINITY
  }
}

fn solve_least_squares(a: DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
  let svd = a.svd(true, true);
  let eps = SVD_RELATIVE_EPS * svd.singular_values.max();
  svd
    .solve(b, eps)
    .map_err(|e| PortfolioError::Numerical(e.to_string()))
}
