//! # Series Forecaster
//!
//! $$
//! \hat p_{T+h} = g(T+h) + s(T+h)
//! $$
//!
//! One-step-ahead point forecast and interval for a single asset.

use chrono::Duration;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

use super::model::FittedModel;
use super::seasonality::Seasonality;
use super::seasonality::SeasonalityMode;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::series::TimeSeries;

/// Fitting and extrapolation settings for [`SeriesForecaster`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecasterConfig {
  /// Shortest history accepted.
  pub min_observations: usize,
  /// Requested number of automatic changepoints.
  pub n_changepoints: usize,
  /// Fraction of the history in which changepoints may be placed.
  pub changepoint_range: f64,
  /// Prior scale of changepoint slope deltas; smaller means a stiffer trend.
  pub changepoint_prior_scale: f64,
  /// Prior scale of Fourier amplitudes.
  pub seasonality_prior_scale: f64,
  pub weekly_seasonality: SeasonalityMode,
  pub yearly_seasonality: SeasonalityMode,
  pub custom_seasonalities: Vec<Seasonality>,
  /// Fit on log prices instead of prices.
  pub log_transform: bool,
  /// Probability mass of the forecast interval, `None` to skip it.
  pub interval_width: Option<f64>,
  /// Forecast step in days.
  pub step_days: i64,
  /// Column-normalized condition number above which the model is simplified.
  pub max_condition_number: f64,
}

impl Default for ForecasterConfig {
  fn default() -> Self {
    Self {
      min_observations: 30,
      n_changepoints: 25,
      changepoint_range: 0.8,
      changepoint_prior_scale: 0.05,
      seasonality_prior_scale: 10.0,
      weekly_seasonality: SeasonalityMode::Auto,
      yearly_seasonality: SeasonalityMode::Auto,
      custom_seasonalities: Vec::new(),
      log_transform: false,
      interval_width: Some(0.8),
      step_days: 1,
      max_condition_number: 1e10,
    }
  }
}

impl ForecasterConfig {
  pub fn validate(&self) -> Result<()> {
    let invalid = |msg: &str| Err(PortfolioError::InvalidParameter(msg.to_string()));

    if self.min_observations < 3 {
      return invalid("min_observations must be at least 3");
    }
    if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
      return invalid("changepoint_range must be in (0, 1]");
    }
    if !(self.changepoint_prior_scale > 0.0 && self.changepoint_prior_scale.is_finite()) {
      return invalid("changepoint_prior_scale must be positive");
    }
    if !(self.seasonality_prior_scale > 0.0 && self.seasonality_prior_scale.is_finite()) {
      return invalid("seasonality_prior_scale must be positive");
    }
    if let Some(width) = self.interval_width {
      if !(width > 0.0 && width < 1.0) {
        return invalid("interval_width must be in (0, 1)");
      }
    }
    if self.step_days < 1 {
      return invalid("step_days must be at least 1");
    }
    if !(self.max_condition_number > 1.0) {
      return invalid("max_condition_number must exceed 1");
    }
    Ok(())
  }
}

/// One-step-ahead forecast for one asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
  pub asset_id: String,
  pub forecast_date: NaiveDate,
  /// Predicted price, strictly positive.
  pub point_forecast: f64,
  pub lower_bound: Option<f64>,
  pub upper_bound: Option<f64>,
  /// Trend component at the forecast date (model units).
  pub trend: f64,
  /// Seasonal component at the forecast date (model units).
  pub seasonal: f64,
}

/// Fits the additive trend/seasonality model and extrapolates one step.
#[derive(Clone, Debug, Default)]
pub struct SeriesForecaster {
  config: ForecasterConfig,
}

impl SeriesForecaster {
  pub fn new(config: ForecasterConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &ForecasterConfig {
    &self.config
  }

  pub fn fit(&self, series: &TimeSeries) -> Result<FittedModel> {
    FittedModel::fit(series, &self.config)
  }

  pub fn fit_and_forecast(&self, series: &TimeSeries) -> Result<ForecastResult> {
    let model = self.fit(series)?;
    let forecast_date = model.last_date() + Duration::days(self.config.step_days);

    let (trend, seasonal) = model.components(forecast_date);
    let point_forecast = model.predict(forecast_date);
    if !(point_forecast.is_finite() && point_forecast > 0.0) {
      return Err(PortfolioError::NonPositiveForecast {
        asset: series.asset_id().to_string(),
        value: point_forecast,
      });
    }

    let (lower_bound, upper_bound) = match self.config.interval_width {
      Some(width) => {
        let (lo, hi) = model.interval(forecast_date, width)?;
        (Some(lo), Some(hi))
      }
      None => (None, None),
    };

    Ok(ForecastResult {
      asset_id: series.asset_id().to_string(),
      forecast_date,
      point_forecast,
      lower_bound,
      upper_bound,
      trend,
      seasonal,
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use chrono::Datelike;

  use super::*;

  fn series_from(asset: &str, values: &[f64], step: i64) -> TimeSeries {
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    TimeSeries::new(
      asset,
      values
        .iter()
        .enumerate()
        .map(|(i, &v)| (start + Duration::days(step * i as i64), v))
        .collect(),
    )
    .unwrap()
  }

  fn noisy(n: usize) -> Vec<f64> {
    (0..n)
      .map(|i| {
        let x = i as f64;
        100.0 + 0.3 * x + 2.0 * (x * 0.9).sin() + 0.7 * (x * 2.3).cos()
      })
      .collect()
  }

  #[test]
  fn linear_series_continues_slope() {
    let values: Vec<f64> = (0..45).map(|i| 20.0 + 1.5 * i as f64).collect();
    let series = series_from("LIN", &values, 1);
    let forecast = SeriesForecaster::default()
      .fit_and_forecast(&series)
      .unwrap();

    assert_eq!(
      forecast.forecast_date,
      NaiveDate::from_ymd_opt(2024, 4, 15).unwrap()
    );
    assert_relative_eq!(forecast.point_forecast, 20.0 + 1.5 * 45.0, epsilon = 1e-6);
  }

  #[test]
  fn irregular_spacing_uses_elapsed_time() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let offsets: Vec<i64> = (0..40).map(|i| i + i / 5 * 2).collect();
    let series = TimeSeries::new(
      "GAP",
      offsets
        .iter()
        .map(|&d| (start + Duration::days(d), 10.0 + 0.25 * d as f64))
        .collect(),
    )
    .unwrap();

    let forecast = SeriesForecaster::default()
      .fit_and_forecast(&series)
      .unwrap();
    let last = *offsets.last().unwrap();
    assert_relative_eq!(
      forecast.point_forecast,
      10.0 + 0.25 * (last + 1) as f64,
      epsilon = 1e-6
    );
  }

  #[test]
  fn trading_day_history_follows_latest_trend_segment() {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let price = |d: i64| {
      let d = d as f64;
      if d <= 300.0 { 40.0 + 0.2 * d } else { 100.0 - 0.1 * (d - 300.0) }
    };
    let series = TimeSeries::new(
      "TRADING",
      (0..500)
        .map(|d| (start + Duration::days(d), d))
        .filter(|(date, _)| date.weekday().number_from_monday() <= 5)
        .map(|(date, d)| (date, price(d)))
        .collect(),
    )
    .unwrap();

    let forecaster = SeriesForecaster::default();
    assert!(forecaster.fit(&series).unwrap().n_changepoints() > 0);

    let forecast = forecaster.fit_and_forecast(&series).unwrap();
    let last = series.last().unwrap();
    let offset = (forecast.forecast_date - start).num_days();
    assert!(forecast.point_forecast < last.1);
    assert!((forecast.point_forecast - price(offset)).abs() < 0.5);
  }

  #[test]
  fn forecast_is_deterministic() {
    let series = series_from("DET", &noisy(120), 1);
    let forecaster = SeriesForecaster::default();
    let a = forecaster.fit_and_forecast(&series).unwrap();
    let b = forecaster.fit_and_forecast(&series).unwrap();
    assert_eq!(a.point_forecast, b.point_forecast);
    assert_eq!(a, b);
  }

  #[test]
  fn short_series_is_rejected() {
    let series = series_from("SHORT", &[1.0, 2.0, 3.0], 1);
    let err = SeriesForecaster::default()
      .fit_and_forecast(&series)
      .unwrap_err();
    assert!(matches!(
      err,
      PortfolioError::InsufficientData {
        required: 30,
        actual: 3,
        ..
      }
    ));
  }

  #[test]
  fn interval_brackets_point_and_components_add_up() {
    let series = series_from("INT", &noisy(90), 1);
    let forecast = SeriesForecaster::default()
      .fit_and_forecast(&series)
      .unwrap();

    let lo = forecast.lower_bound.unwrap();
    let hi = forecast.upper_bound.unwrap();
    assert!(lo < forecast.point_forecast && forecast.point_forecast < hi);
    assert_relative_eq!(
      forecast.trend + forecast.seasonal,
      forecast.point_forecast,
      epsilon = 1e-9
    );
  }

  #[test]
  fn interval_can_be_disabled() {
    let config = ForecasterConfig {
      interval_width: None,
      step_days: 7,
      ..ForecasterConfig::default()
    };
    let series = series_from("WEEK", &noisy(35), 7);
    let forecast = SeriesForecaster::new(config)
      .fit_and_forecast(&series)
      .unwrap();
    assert!(forecast.lower_bound.is_none() && forecast.upper_bound.is_none());
    assert_eq!(
      forecast.forecast_date,
      series.last().unwrap().0 + Duration::days(7)
    );
  }

  #[test]
  fn collapsing_series_reports_non_positive_forecast() {
    let values: Vec<f64> = (0..30).map(|i| 29.5 - i as f64).collect();
    let series = series_from("DOWN", &values, 1);
    let err = SeriesForecaster::default()
      .fit_and_forecast(&series)
      .unwrap_err();
    assert!(matches!(err, PortfolioError::NonPositiveForecast { .. }));
  }

  #[test]
  fn validate_rejects_bad_interval() {
    let config = ForecasterConfig {
      interval_width: Some(1.5),
      ..ForecasterConfig::default()
    };
    assert!(matches!(
      config.validate(),
      Err(PortfolioError::InvalidParameter(_))
    ));
    assert!(ForecasterConfig::default().validate().is_ok());
  }
}
