//! # forecast-portfolio
//!
//! $$
//! \hat p_i = g_i(T+h) + s_i(T+h),\qquad
//! \mathbf{w}^\* = \arg\max_{\mathbf{w}}\ \mu^\top\mathbf{w}-\lambda\,\mathbf{w}^\top\Sigma\mathbf{w}
//! $$
//!
//! Per-asset trend/seasonality price forecasts feeding a floor-constrained
//! mean-variance allocation.

pub mod config;
pub mod error;
pub mod estimation;
pub mod forecast;
pub mod io;
pub mod optimize;
pub mod pipeline;
pub mod series;

pub use config::PipelineConfig;
pub use error::PortfolioError;
pub use error::Result;
pub use estimation::CovarianceMatrix;
pub use estimation::ReturnEstimator;
pub use estimation::ReturnVector;
pub use forecast::ForecastResult;
pub use forecast::SeriesForecaster;
pub use optimize::OptimizationResult;
pub use optimize::PortfolioOptimizer;
pub use optimize::PortfolioWeights;
pub use pipeline::AssetAllocation;
pub use pipeline::PortfolioPipeline;
pub use pipeline::PortfolioReport;
pub use series::TimeSeries;
