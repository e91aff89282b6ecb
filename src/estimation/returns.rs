//! # Expected Returns
//!
//! $$
//! \mu_i = \frac{\hat p_i - p_i}{p_i}
//! $$
//!
//! Single-period expected returns implied by the forecasts.

use std::collections::HashMap;
use std::collections::HashSet;

use nalgebra::DVector;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::forecast::ForecastResult;

/// Expected returns in asset order.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnVector {
  assets: Vec<String>,
  values: DVector<f64>,
}

impl ReturnVector {
  pub fn new(assets: Vec<String>, values: Vec<f64>) -> Result<Self> {
    if assets.len() != values.len() {
      return Err(PortfolioError::AssetMismatch(format!(
        "{} assets but {} returns",
        assets.len(),
        values.len()
      )));
    }
    ensure_unique(&assets)?;
    if let Some((asset, value)) = assets.iter().zip(&values).find(|(_, v)| !v.is_finite()) {
      return Err(PortfolioError::Numerical(format!(
        "expected return of `{asset}` is {value}"
      )));
    }

    Ok(Self {
      assets,
      values: DVector::from_vec(values),
    })
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn values(&self) -> &DVector<f64> {
    &self.values
  }

  pub fn len(&self) -> usize {
    self.assets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.assets.is_empty()
  }

  pub fn get(&self, asset: &str) -> Option<f64> {
    self
      .assets
      .iter()
      .position(|a| a == asset)
      .map(|i| self.values[i])
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .assets
      .iter()
      .map(String::as_str)
      .zip(self.values.iter().copied())
  }
}

pub(crate) fn ensure_unique(assets: &[String]) -> Result<()> {
  let mut seen = HashSet::with_capacity(assets.len());
  match assets.iter().find(|a| !seen.insert(a.as_str())) {
    Some(dup) => Err(PortfolioError::AssetMismatch(format!(
      "asset `{dup}` appears more than once"
    ))),
    None => Ok(()),
  }
}

/// Expected return per asset of `last_prices`, in that order.
///
/// Every priced asset needs exactly one forecast and vice versa.
pub fn expected_returns(
  last_prices: &[(String, f64)],
  forecasts: &[ForecastResult],
) -> Result<ReturnVector> {
  let by_asset: HashMap<&str, &ForecastResult> = forecasts
    .iter()
    .map(|f| (f.asset_id.as_str(), f))
    .collect();
  if by_asset.len() != forecasts.len() || forecasts.len() != last_prices.len() {
    return Err(PortfolioError::AssetMismatch(format!(
      "{} priced assets but {} forecasts",
      last_prices.len(),
      forecasts.len()
    )));
  }

  let mut assets = Vec::with_capacity(last_prices.len());
  let mut values = Vec::with_capacity(last_prices.len());

  for (asset, price) in last_prices {
    if !(price.is_finite() && *price > 0.0) {
      return Err(PortfolioError::InvalidPrice {
        asset: asset.clone(),
        price: *price,
      });
    }
    let forecast = by_asset.get(asset.as_str()).ok_or_else(|| {
      PortfolioError::AssetMismatch(format!("no forecast for asset `{asset}`"))
    })?;

    assets.push(asset.clone());
    values.push((forecast.point_forecast - price) / price);
  }

  ReturnVector::new(assets, values)
}
