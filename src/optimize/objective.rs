//! # Mean-Variance Objective
//!
//! $$
//! f(\mathbf{w}) = -\mu^\top\mathbf{w} + \lambda\,\mathbf{w}^\top\Sigma\mathbf{w},\quad
//! \nabla f = -\mu + 2\lambda\Sigma\mathbf{w},\quad \nabla^2 f = 2\lambda\Sigma
//! $$
//!
//! Negated mean-variance utility exposed through the `argmin` problem traits.

use argmin::core::CostFunction;
use argmin::core::Error;
use argmin::core::Gradient;
use argmin::core::Hessian;
use impl_new_derive::ImplNew;
use nalgebra::DMatrix;
use nalgebra::DVector;

#[derive(ImplNew, Clone, Debug)]
pub struct MeanVarianceObjective {
  pub mu: DVector<f64>,
  pub sigma: DMatrix<f64>,
  pub risk_aversion: f64,
}

impl MeanVarianceObjective {
  /// Utility `μᵀw − λwᵀΣw`, the quantity being maximized.
  pub fn utility(&self, w: &DVector<f64>) -> f64 {
    self.mu.dot(w) - self.risk_aversion * w.dot(&(&self.sigma * w))
  }
}

impl CostFunction for MeanVarianceObjective {
  type Param = DVector<f64>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> Result<Self::Output, Error> {
    Ok(-self.utility(w))
  }
}

impl Gradient for MeanVarianceObjective {
  type Param = DVector<f64>;
  type Gradient = DVector<f64>;

  fn gradient(&self, w: &Self::Param) -> Result<Self::Gradient, Error> {
    Ok(&self.sigma * w * (2.0 * self.risk_aversion) - &self.mu)
  }
}

impl Hessian for MeanVarianceObjective {
  type Param = DVector<f64>;
  type Hessian = DMatrix<f64>;

  fn hessian(&self, _w: &Self::Param) -> Result<Self::Hessian, Error> {
    Ok(&self.sigma * (2.0 * self.risk_aversion))
  }
}
