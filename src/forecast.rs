//! # Forecast
//!
//! $$
//! y(t) = g(t) + s(t) + \varepsilon_t
//! $$
//!
//! Additive trend + seasonality price model fitted by regularized least squares.

pub mod forecaster;
pub mod model;
pub mod seasonality;
pub mod trend;

pub use forecaster::ForecastResult;
pub use forecaster::ForecasterConfig;
pub use forecaster::SeriesForecaster;
pub use model::FittedModel;
pub use model::ModelSpec;
pub use seasonality::Seasonality;
pub use seasonality::SeasonalityMode;
pub use trend::PiecewiseLinearTrend;
