//! # Optimize
//!
//! $$
//! \min_{\mathbf{w}}\ -\mu^\top\mathbf{w}+\lambda\,\mathbf{w}^\top\Sigma\mathbf{w}
//! $$
//!
//! Constrained mean-variance allocation solved by sequential quadratic programming.

pub mod objective;
pub mod portfolio;
pub mod sqp;
pub mod types;

pub use objective::MeanVarianceObjective;
pub use portfolio::PortfolioOptimizer;
pub use portfolio::normalize_weights;
pub use sqp::Bounds;
pub use sqp::ConstrainedMinimizer;
pub use sqp::LinearEquality;
pub use sqp::SmoothObjective;
pub use sqp::SolverConfig;
pub use sqp::SolverOutcome;
pub use sqp::SqpSolver;
pub use types::OptimizationResult;
pub use types::PortfolioWeights;
