//! # Fourier Seasonality
//!
//! $$
//! s(d) = \sum_{k=1}^{K} a_k \sin\left(\frac{2\pi k d}{P}\right) + b_k \cos\left(\frac{2\pi k d}{P}\right)
//! $$
//!
//! Periodic basis evaluated on absolute days since 1970-01-01, so fitted
//! amplitudes do not depend on where the history starts.

use std::f64::consts::PI;

use serde::Deserialize;
use serde::Serialize;

pub const WEEKLY_PERIOD_DAYS: f64 = 7.0;
pub const YEARLY_PERIOD_DAYS: f64 = 365.25;
pub const DEFAULT_WEEKLY_ORDER: usize = 3;
pub const DEFAULT_YEARLY_ORDER: usize = 10;

/// One periodic component with `order` sine/cosine pairs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
  pub name: String,
  pub period_days: f64,
  pub order: usize,
}

impl Seasonality {
  pub fn weekly(order: usize) -> Self {
    Self {
      name: "weekly".to_string(),
      period_days: WEEKLY_PERIOD_DAYS,
      order,
    }
  }

  pub fn yearly(order: usize) -> Self {
    Self {
      name: "yearly".to_string(),
      period_days: YEARLY_PERIOD_DAYS,
      order,
    }
  }

  pub fn n_columns(&self) -> usize {
    2 * self.order
  }

  /// Append `[sin(2πd/P), cos(2πd/P), .., sin(2πKd/P), cos(2πKd/P)]`.
  pub fn extend_row(&self, epoch_day: f64, row: &mut Vec<f64>) {
    for k in 1..=self.order {
      let arg = 2.0 * PI * k as f64 * epoch_day / self.period_days;
      row.push(arg.sin());
      row.push(arg.cos());
    }
  }
}

/// Whether a built-in seasonality is fitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalityMode {
  /// Enabled with the default order when the history supports it.
  #[default]
  Auto,
  /// Always enabled with this Fourier order.
  Order(usize),
  Disabled,
}

impl SeasonalityMode {
  fn resolve(self, default_order: usize, supported: bool) -> Option<usize> {
    match self {
      SeasonalityMode::Auto if supported => Some(default_order),
      SeasonalityMode::Auto | SeasonalityMode::Disabled => None,
      SeasonalityMode::Order(0) => None,
      SeasonalityMode::Order(order) => Some(order),
    }
  }
}

/// Built-in plus custom seasonalities for a history spanning `span_days` whose
/// closest observations are `min_spacing_days` apart.
///
/// Weekly is auto-enabled for at least two weeks of sub-weekly data, yearly for
/// at least two years of data.
pub fn resolve_seasonalities(
  weekly: SeasonalityMode,
  yearly: SeasonalityMode,
  custom: &[Seasonality],
  span_days: f64,
  min_spacing_days: f64,
) -> Vec<Seasonality> {
  let mut out = Vec::new();

  let weekly_supported =
    span_days >= 2.0 * WEEKLY_PERIOD_DAYS && min_spacing_days < WEEKLY_PERIOD_DAYS;
  if let Some(order) = weekly.resolve(DEFAULT_WEEKLY_ORDER, weekly_supported) {
    out.push(Seasonality::weekly(order));
  }

  let yearly_supported = span_days >= 730.0;
  if let Some(order) = yearly.resolve(DEFAULT_YEARLY_ORDER, yearly_supported) {
    out.push(Seasonality::yearly(order));
  }

  out.extend(
    custom
      .iter()
      .filter(|s| s.order > 0 && s.period_days > 0.0)
      .cloned(),
  );
  out
}
