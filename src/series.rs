//! # Price Series
//!
//! $$
//! r_t = \frac{p_t - p_{t-1}}{p_{t-1}}
//! $$
//!
//! Validated per-asset price history.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::error::PortfolioError;
use crate::error::Result;

/// Ordered `(date, price)` observations for one asset.
///
/// Dates are strictly increasing and prices strictly positive; both are
/// checked by [`TimeSeries::new`], so downstream code can rely on them.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
  asset_id: String,
  dates: Vec<NaiveDate>,
  prices: Vec<f64>,
}

impl TimeSeries {
  pub fn new(asset_id: impl Into<String>, observations: Vec<(NaiveDate, f64)>) -> Result<Self> {
    let asset_id = asset_id.into();
    let invalid = |reason: String| PortfolioError::InvalidSeries {
      asset: asset_id.clone(),
      reason,
    };

    let mut dates = Vec::with_capacity(observations.len());
    let mut prices = Vec::with_capacity(observations.len());

    for (date, price) in observations {
      if !price.is_finite() || price <= 0.0 {
        return Err(invalid(format!("price {price} on {date} is not positive")));
      }
      if let Some(prev) = dates.last() {
        if date <= *prev {
          return Err(invalid(format!("date {date} does not follow {prev}")));
        }
      }
      dates.push(date);
      prices.push(price);
    }

    Ok(Self {
      asset_id,
      dates,
      prices,
    })
  }

  pub fn asset_id(&self) -> &str {
    &self.asset_id
  }

  pub fn len(&self) -> usize {
    self.prices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.prices.is_empty()
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn prices(&self) -> &[f64] {
    &self.prices
  }

  /// Most recent observation.
  pub fn last(&self) -> Option<(NaiveDate, f64)> {
    Some((*self.dates.last()?, *self.prices.last()?))
  }

  /// Elapsed days of every observation relative to the first one.
  pub fn elapsed_days(&self) -> Vec<f64> {
    match self.dates.first() {
      Some(&first) => self
        .dates
        .iter()
        .map(|d| (*d - first).num_days() as f64)
        .collect(),
      None => Vec::new(),
    }
  }

  /// Period-over-period simple returns keyed by the later date.
  pub fn simple_returns(&self) -> Vec<(NaiveDate, f64)> {
    self
      .prices
      .windows(2)
      .zip(self.dates.iter().skip(1))
      .map(|(w, &d)| (d, (w[1] - w[0]) / w[0]))
      .collect()
  }

  /// Observations inside `[start, end]`; `None` leaves that side open.
  pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
    let (dates, prices) = self
      .dates
      .iter()
      .zip(self.prices.iter())
      .filter(|(d, _)| start.map_or(true, |s| **d >= s) && end.map_or(true, |e| **d <= e))
      .map(|(d, p)| (*d, *p))
      .unzip();

    Self {
      asset_id: self.asset_id.clone(),
      dates,
      prices,
    }
  }

  /// Observations whose date is in `dates`.
  pub fn restricted_to(&self, dates: &HashSet<NaiveDate>) -> Self {
    let (dates, prices) = self
      .dates
      .iter()
      .zip(self.prices.iter())
      .filter(|(d, _)| dates.contains(*d))
      .map(|(d, p)| (*d, *p))
      .unzip();

    Self {
      asset_id: self.asset_id.clone(),
      dates,
      prices,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
  }

  #[test]
  fn rejects_unordered_dates() {
    let err = TimeSeries::new("AAPL", vec![(day(2), 1.0), (day(2), 1.1)]).unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidSeries { .. }));
  }

  #[test]
  fn rejects_non_positive_prices() {
    let err = TimeSeries::new("AAPL", vec![(day(1), 1.0), (day(2), 0.0)]).unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidSeries { .. }));
  }

  #[test]
  fn returns_are_keyed_by_later_date() {
    let s = TimeSeries::new("KO", vec![(day(1), 100.0), (day(3), 110.0), (day(4), 99.0)]).unwrap();
    let r = s.simple_returns();
    assert_eq!(r.len(), 2);
    assert_eq!(r[0].0, day(3));
    assert!((r[0].1 - 0.1).abs() < 1e-12);
    assert!((r[1].1 + 0.1).abs() < 1e-12);
    assert_eq!(s.elapsed_days(), vec![0.0, 2.0, 3.0]);
  }

  #[test]
  fn between_clips_both_ends() {
    let s = TimeSeries::new(
      "KO",
      (1..=10).map(|d| (day(d), d as f64)).collect::<Vec<_>>(),
    )
    .unwrap();
    let clipped = s.between(Some(day(3)), Some(day(5)));
    assert_eq!(clipped.prices(), &[3.0, 4.0, 5.0]);
    assert_eq!(clipped.asset_id(), "KO");
    assert_eq!(s.between(None, None).len(), 10);
  }
}
