//! Short-horizon forecasters
//!
//! Every forecaster maps a private column copy of the history plus a horizon
//! to a [`ForecastOutcome`]. Recoverable problems (short history, model fit
//! errors) never escape: the forecaster degrades to the linear trend instead.
//! Bad parameters and non-finite input fail the slot.

pub mod regression;
pub mod support_resistance;
pub mod technical;
pub mod trend;

pub use regression::RegressionForecaster;
pub use support_resistance::SupportResistanceForecaster;
pub use technical::TechnicalForecaster;
pub use trend::linear_trend;

use tracing::warn;

use crate::error::ForecastError;
use crate::indicators::PriceColumns;
use crate::types::{ForecastMethod, ForecastOutcome};

/// Common contract of the three ensemble members
pub trait Forecaster: Send + Sync {
    /// Ensemble slot this forecaster fills
    fn method(&self) -> ForecastMethod;

    /// Produce `horizon` predicted closes. `seed` drives any randomness.
    fn forecast(&self, history: &PriceColumns, horizon: usize, seed: u64) -> ForecastOutcome;
}

/// Replace a failed computation with the linear-trend fallback.
///
/// Only recoverable errors degrade; anything else fails the slot outright.
pub(crate) fn degrade(
    method: ForecastMethod,
    history: &PriceColumns,
    horizon: usize,
    error: ForecastError,
) -> ForecastOutcome {
    let reason = error.to_string();
    if !error.is_recoverable() {
        warn!(method = %method, reason = %reason, "Forecaster failed");
        return ForecastOutcome::Failed { reason };
    }
    warn!(method = %method, reason = %reason, "Forecaster degraded to linear trend");
    match linear_trend(history, horizon) {
        Ok(forecast) => ForecastOutcome::Degraded { forecast, reason },
        Err(fallback_err) => ForecastOutcome::Failed {
            reason: format!("{}; fallback: {}", reason, fallback_err),
        },
    }
}
