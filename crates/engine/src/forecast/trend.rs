//! Linear-trend extrapolation, the shared fallback path

use crate::error::{ForecastError, ForecastResult};
use crate::indicators::{linear_slope, PriceColumns};
use crate::types::{Forecast, ForecastDetail, ForecastMethod};

/// Fit a least-squares line through every close and step it forward from the
/// last close. A single bar yields a flat path.
pub fn linear_trend(history: &PriceColumns, horizon: usize) -> ForecastResult<Forecast> {
    let last = history.last_close().ok_or(ForecastError::InsufficientData {
        required: 1,
        actual: 0,
    })?;
    if !last.is_finite() {
        return Err(ForecastError::InvalidParameter(
            "last close is not a finite number".to_string(),
        ));
    }
    let slope = linear_slope(&history.close);
    let slope = if slope.is_finite() { slope } else { 0.0 };
    let prices = (1..=horizon).map(|step| last + slope * step as f64).collect();
    Ok(Forecast::new(ForecastMethod::LinearTrend, prices).with_detail(ForecastDetail::Trend { slope }))
}
