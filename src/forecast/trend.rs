//! # Piecewise-Linear Trend
//!
//! $$
//! g(t) = m + k\,t + \sum_j \delta_j (t - s_j)_+
//! $$
//!
//! Changepoint placement and design columns for the trend, on time scaled to `[0, 1]`.

/// Trend basis: intercept, slope and one hinge per changepoint.
#[derive(Clone, Debug, PartialEq)]
pub struct PiecewiseLinearTrend {
  /// Changepoint locations on the scaled time axis.
  pub changepoints: Vec<f64>,
}

impl PiecewiseLinearTrend {
  /// Place up to `requested` changepoints at evenly spaced observations inside
  /// the first `range` fraction of the history.
  ///
  /// The count is capped at `floor(n * range) - 1` so every changepoint has
  /// observations on both sides.
  pub fn place(t: &[f64], requested: usize, range: f64) -> Self {
    let hist_size = (t.len() as f64 * range.clamp(0.0, 1.0)).floor() as usize;
    let count = requested.min(hist_size.saturating_sub(1));
    if count == 0 {
      return Self {
        changepoints: Vec::new(),
      };
    }

    let last = (hist_size - 1) as f64;
    let mut changepoints: Vec<f64> = (1..=count)
      .map(|i| {
        let idx = (last * i as f64 / count as f64).round() as usize;
        t[idx]
      })
      .collect();
    changepoints.dedup();

    Self { changepoints }
  }

  pub fn n_columns(&self) -> usize {
    2 + self.changepoints.len()
  }

  /// Append this basis evaluated at scaled time `t` to a design row.
  pub fn extend_row(&self, t: f64, row: &mut Vec<f64>) {
    row.push(1.0);
    row.push(t);
    row.extend(self.changepoints.iter().map(|&s| (t - s).max(0.0)));
  }

  /// Slope in effect at scaled time `t` for fitted coefficients `[m, k, δ..]`.
  pub fn slope_at(&self, coefficients: &[f64], t: f64) -> f64 {
    let k = coefficients.get(1).copied().unwrap_or(0.0);
    k + self
      .changepoints
      .iter()
      .zip(coefficients.iter().skip(2))
      .filter(|(s, _)| t >= **s)
      .map(|(_, d)| d)
      .sum::<f64>()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn grid(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
  }

  #[test]
  fn changepoints_stay_inside_range() {
    let t = grid(100);
    let trend = PiecewiseLinearTrend::place(&t, 25, 0.8);
    assert_eq!(trend.changepoints.len(), 25);
    assert!(trend.changepoints.iter().all(|&s| s > 0.0 && s <= 0.8));
    assert!(trend.changepoints.windows(2).all(|w| w[0] < w[1]));
  }

  #[test]
  fn count_is_capped_by_history() {
    let t = grid(10);
    let trend = PiecewiseLinearTrend::place(&t, 25, 0.8);
    assert_eq!(trend.changepoints.len(), 7);
    assert_eq!(trend.n_columns(), 9);
  }

  #[test]
  fn hinge_columns_are_zero_before_changepoint() {
    let trend = PiecewiseLinearTrend {
      changepoints: vec![0.5],
    };
    let mut row = Vec::new();
    trend.extend_row(0.25, &mut row);
    assert_eq!(row, vec![1.0, 0.25, 0.0]);

    row.clear();
    trend.extend_row(0.75, &mut row);
    assert_eq!(row, vec![1.0, 0.75, 0.25]);

    assert_eq!(trend.slope_at(&[0.0, 1.0, 2.0], 0.25), 1.0);
    assert_eq!(trend.slope_at(&[0.0, 1.0, 2.0], 0.75), 3.0);
  }
}
