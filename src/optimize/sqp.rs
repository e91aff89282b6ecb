//! # Sequential Quadratic Programming
//!
//! $$
//! \min_{p}\ \nabla f(x)^\top p + \tfrac12 p^\top \nabla^2 f(x)\, p
//! \quad\text{s.t.}\quad a^\top p = 0,\ \ l - x \le p \le u - x
//! $$
//!
//! Bound- and equality-constrained minimizer for smooth objectives. Each outer
//! iteration solves the quadratic model with a primal active-set method and
//! takes an Armijo step along its solution.

use argmin::core::CostFunction;
use argmin::core::Gradient;
use argmin::core::Hessian;
use nalgebra::DMatrix;
use nalgebra::DVector;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::estimation::regularize;

/// Armijo sufficient-decrease constant.
const ARMIJO_C: f64 = 1e-4;
/// Smallest backtracking step before the line search gives up.
const MIN_STEP: f64 = 1e-12;
/// Active-set step length treated as zero.
const SUBPROBLEM_STEP_EPS: f64 = 1e-13;
/// Relative tolerance on negative bound multipliers.
const MULTIPLIER_EPS: f64 = 1e-10;
/// Equality residual accepted for the starting point.
const FEASIBILITY_EPS: f64 = 1e-14;
const BISECTION_STEPS: usize = 200;

/// Objectives the solver can minimize: value, gradient and Hessian over `DVector<f64>`.
pub trait SmoothObjective:
  CostFunction<Param = DVector<f64>, Output = f64>
  + Gradient<Param = DVector<f64>, Gradient = DVector<f64>>
  + Hessian<Param = DVector<f64>, Hessian = DMatrix<f64>>
{
}

impl<T> SmoothObjective for T where
  T: CostFunction<Param = DVector<f64>, Output = f64>
    + Gradient<Param = DVector<f64>, Gradient = DVector<f64>>
    + Hessian<Param = DVector<f64>, Hessian = DMatrix<f64>>
{
}

/// Constrained minimization behind which the portfolio solver sits.
pub trait ConstrainedMinimizer {
  fn minimize<O: SmoothObjective>(
    &self,
    objective: &O,
    equality: &LinearEquality,
    bounds: &Bounds,
    initial_guess: DVector<f64>,
  ) -> Result<SolverOutcome>;
}

/// Single linear equality `aᵀx = b`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearEquality {
  pub coefficients: DVector<f64>,
  pub rhs: f64,
}

impl LinearEquality {
  /// `Σxᵢ = total` over `n` variables.
  pub fn sum_to(n: usize, total: f64) -> Self {
    Self {
      coefficients: DVector::from_element(n, 1.0),
      rhs: total,
    }
  }
}

/// Box constraints `lower ≤ x ≤ upper`.
#[derive(Clone, Debug, PartialEq)]
pub struct Bounds {
  pub lower: DVector<f64>,
  pub upper: DVector<f64>,
}

impl Bounds {
  pub fn uniform(n: usize, lower: f64, upper: f64) -> Self {
    Self {
      lower: DVector::from_element(n, lower),
      upper: DVector::from_element(n, upper),
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SolverOutcome {
  pub x: DVector<f64>,
  /// Objective value at `x`.
  pub cost: f64,
  pub iterations: usize,
  pub converged: bool,
}

/// Tolerances and iteration caps of [`SqpSolver`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
  /// Infinity norm of the QP step below which the solve has converged.
  pub tolerance: f64,
  /// Cap on outer SQP iterations.
  pub max_iterations: usize,
  /// Cap on active-set iterations per QP subproblem.
  pub max_subproblem_iterations: usize,
}

impl Default for SolverConfig {
  fn default() -> Self {
    Self {
      tolerance: 1e-10,
      max_iterations: 100,
      max_subproblem_iterations: 500,
    }
  }
}

impl SolverConfig {
  pub fn validate(&self) -> Result<()> {
    if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
      return Err(PortfolioError::InvalidParameter(
        "solver tolerance must be positive".to_string(),
      ));
    }
    if self.max_iterations == 0 || self.max_subproblem_iterations == 0 {
      return Err(PortfolioError::InvalidParameter(
        "solver iteration caps must be at least 1".to_string(),
      ));
    }
    Ok(())
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ActiveBound {
  Lower,
  Upper,
}

struct Subproblem {
  step: DVector<f64>,
  optimal: bool,
}

#[derive(Clone, Debug, Default)]
pub struct SqpSolver {
  config: SolverConfig,
}

impl SqpSolver {
  pub fn new(config: SolverConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &SolverConfig {
    &self.config
  }

  /// Primal active-set solve of the bound-constrained QP model around the current iterate.
  ///
  /// Starts from `p = 0` (feasible because the iterate is) and keeps the
  /// equality `aᵀp = 0` in every step.
  fn solve_subproblem(
    &self,
    hessian: &DMatrix<f64>,
    gradient: &DVector<f64>,
    a: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
  ) -> Result<Subproblem> {
    let n = gradient.len();
    let mut p = DVector::<f64>::zeros(n);
    let mut active: Vec<Option<ActiveBound>> = vec![None; n];

    for _ in 0..self.config.max_subproblem_iterations {
      let free: Vec<usize> = (0..n).filter(|&i| active[i].is_none()).collect();
      let model_grad = hessian * &p + gradient;
      let (direction, nu) = equality_newton_step(hessian, a, &model_grad, &free)?;

      if direction.amax() <= SUBPROBLEM_STEP_EPS {
        let scale = 1.0 + model_grad.amax();
        let mut worst: Option<(usize, f64)> = None;
        for (i, bound) in active.iter().enumerate() {
          let Some(bound) = bound else { continue };
          let z = model_grad[i] + nu * a[i];
          let multiplier = match bound {
            ActiveBound::Lower => z,
            ActiveBound::Upper => -z,
          };
          if multiplier < -MULTIPLIER_EPS * scale && worst.map_or(true, |(_, m)| multiplier < m) {
            worst = Some((i, multiplier));
          }
        }

        match worst {
          Some((i, _)) => active[i] = None,
          None => return Ok(Subproblem { step: p, optimal: true }),
        }
        continue;
      }

      let mut alpha = 1.0;
      let mut blocking = None;
      for &i in &free {
        let d = direction[i];
        let (ratio, bound) = if d < 0.0 {
          ((lower[i] - p[i]) / d, ActiveBound::Lower)
        } else if d > 0.0 {
          ((upper[i] - p[i]) / d, ActiveBound::Upper)
        } else {
          continue;
        };
        if ratio < alpha {
          alpha = ratio;
          blocking = Some((i, bound));
        }
      }

      p += direction * alpha.max(0.0);
      if let Some((i, bound)) = blocking {
        p[i] = match bound {
          ActiveBound::Lower => lower[i],
          ActiveBound::Upper => upper[i],
        };
        active[i] = Some(bound);
      }
    }

    Ok(Subproblem { step: p, optimal: false })
  }
}

impl ConstrainedMinimizer for SqpSolver {
  fn minimize<O: SmoothObjective>(
    &self,
    objective: &O,
    equality: &LinearEquality,
    bounds: &Bounds,
    initial_guess: DVector<f64>,
  ) -> Result<SolverOutcome> {
    self.config.validate()?;
    check_dimensions(equality, bounds, initial_guess.len())?;

    let a = &equality.coefficients;
    let mut x = project_feasible(initial_guess, equality, bounds)?;
    let mut fx = eval(objective.cost(&x))?;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < self.config.max_iterations {
      iterations += 1;

      let gradient = eval(objective.gradient(&x))?;
      let (hessian, _) = regularize(&eval(objective.hessian(&x))?)?;
      let lower = &bounds.lower - &x;
      let upper = &bounds.upper - &x;
      let qp = self.solve_subproblem(&hessian, &gradient, a, &lower, &upper)?;

      if qp.optimal && qp.step.amax() <= self.config.tolerance {
        converged = true;
        break;
      }

      let slope = gradient.dot(&qp.step);
      let mut alpha = 1.0;
      let accepted = loop {
        let candidate = clamp(&x + &qp.step * alpha, bounds);
        let fc = eval(objective.cost(&candidate))?;
        if fc <= fx + ARMIJO_C * alpha * slope {
          break Some((candidate, fc));
        }
        alpha *= 0.5;
        if alpha < MIN_STEP {
          break None;
        }
      };

      match accepted {
        Some((candidate, fc)) => {
          x = candidate;
          fx = fc;
        }
        None => {
          debug!(iterations, "line search stalled");
          break;
        }
      }
    }

    debug!(iterations, converged, cost = fx, "sqp finished");

    Ok(SolverOutcome {
      x,
      cost: fx,
      iterations,
      converged,
    })
  }
}

fn eval<T>(value: std::result::Result<T, argmin::core::Error>) -> Result<T> {
  value.map_err(|e| PortfolioError::Numerical(format!("objective evaluation failed: {e}")))
}

fn check_dimensions(equality: &LinearEquality, bounds: &Bounds, n: usize) -> Result<()> {
  if n == 0 {
    return Err(PortfolioError::InvalidParameter(
      "cannot minimize over zero variables".to_string(),
    ));
  }
  if equality.coefficients.len() != n || bounds.lower.len() != n || bounds.upper.len() != n {
    return Err(PortfolioError::InvalidParameter(format!(
      "constraint dimensions do not match {n} variables"
    )));
  }
  if bounds.lower.iter().zip(bounds.upper.iter()).any(|(l, u)| !(l <= u)) {
    return Err(PortfolioError::InvalidParameter(
      "lower bounds must not exceed upper bounds".to_string(),
    ));
  }
  Ok(())
}

fn clamp(x: DVector<f64>, bounds: &Bounds) -> DVector<f64> {
  x.zip_zip_map(&bounds.lower, &bounds.upper, |v, l, u| v.max(l).min(u))
}

/// Newton step on the free variables under `a_Fᵀd = 0`, with the equality multiplier.
///
/// ```text
/// [ H_FF  a_F ] [ d ]   [ -g_F ]
/// [ a_Fᵀ   0  ] [ ν ] = [   0  ]
/// ```
fn equality_newton_step(
  hessian: &DMatrix<f64>,
  a: &DVector<f64>,
  model_grad: &DVector<f64>,
  free: &[usize],
) -> Result<(DVector<f64>, f64)> {
  let n = model_grad.len();
  let m = free.len();
  if m == 0 {
    return Ok((DVector::zeros(n), 0.0));
  }

  let mut kkt = DMatrix::<f64>::zeros(m + 1, m + 1);
  let mut rhs = DVector::<f64>::zeros(m + 1);
  for (r, &i) in free.iter().enumerate() {
    for (c, &j) in free.iter().enumerate() {
      kkt[(r, c)] = hessian[(i, j)];
    }
    kkt[(r, m)] = a[i];
    kkt[(m, r)] = a[i];
    rhs[r] = -model_grad[i];
  }

  let solution = kkt
    .lu()
    .solve(&rhs)
    .ok_or_else(|| PortfolioError::Numerical("singular KKT system in QP subproblem".to_string()))?;

  let mut direction = DVector::<f64>::zeros(n);
  for (r, &i) in free.iter().enumerate() {
    direction[i] = solution[r];
  }
  Ok((direction, solution[m]))
}

/// Closest-in-direction feasible point: `clamp(x₀ − τa)` with `τ` found by bisection.
fn project_feasible(x0: DVector<f64>, equality: &LinearEquality, bounds: &Bounds) -> Result<DVector<f64>> {
  let a = &equality.coefficients;
  let b = equality.rhs;
  let within = x0
    .iter()
    .zip(bounds.lower.iter().zip(bounds.upper.iter()))
    .all(|(v, (l, u))| l <= v && v <= u);
  if within && (a.dot(&x0) - b).abs() <= FEASIBILITY_EPS {
    return Ok(x0);
  }

  let shifted = |tau: f64| clamp(&x0 - a * tau, bounds);
  let residual = |tau: f64| a.dot(&shifted(tau)) - b;

  let (mut lo, mut hi) = (-1.0, 1.0);
  let mut expansions = 0;
  while residual(lo) < 0.0 || residual(hi) > 0.0 {
    lo *= 2.0;
    hi *= 2.0;
    expansions += 1;
    if expansions > 64 {
      return Err(PortfolioError::InvalidParameter(
        "equality constraint cannot be met within the bounds".to_string(),
      ));
    }
  }

  for _ in 0..BISECTION_STEPS {
    let mid = 0.5 * (lo + hi);
    let r = residual(mid);
    if r.abs() <= FEASIBILITY_EPS {
      return Ok(shifted(mid));
    }
    if r > 0.0 {
      lo = mid;
    } else {
      hi = mid;
    }
  }

  Ok(shifted(0.5 * (lo + hi)))
}
