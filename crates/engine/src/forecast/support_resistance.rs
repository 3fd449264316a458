//! Trend projection bounded by the nearest pivot levels

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{degrade, Forecaster};
use crate::error::{ForecastError, ForecastResult};
use crate::indicators::{linear_slope, support_resistance, PriceColumns};
use crate::types::{Forecast, ForecastDetail, ForecastMethod, ForecastOutcome, LevelSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportResistanceConfig {
    /// Half-width of the pivot neighbourhood
    pub pivot_window: usize,
    /// Closes used for the trend slope
    pub trend_window: usize,
    /// Fraction of the distance to a breached level actually travelled
    pub damping: f64,
    /// Default distance to a missing level as a fraction of price
    pub default_band: f64,
}

impl Default for SupportResistanceConfig {
    fn default() -> Self {
        Self {
            pivot_window: 5,
            trend_window: 10,
            damping: 0.8,
            default_band: 0.05,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SupportResistanceForecaster {
    config: SupportResistanceConfig,
}

impl SupportResistanceForecaster {
    pub fn new(config: SupportResistanceConfig) -> Self {
        Self { config }
    }

    /// Pivots, nearest levels around the last close, and the recent slope
    pub fn levels(&self, history: &PriceColumns) -> ForecastResult<LevelSummary> {
        let cfg = &self.config;
        let required = cfg.trend_window.max(2);
        if history.len() < required {
            return Err(ForecastError::InsufficientData {
                required,
                actual: history.len(),
            });
        }
        let current = history.last_close().unwrap_or(f64::NAN);
        if !current.is_finite() {
            return Err(ForecastError::InvalidParameter(
                "last close is not a finite number".to_string(),
            ));
        }

        let pivots = support_resistance(history, cfg.pivot_window);
        let next_resistance = pivots
            .resistance
            .iter()
            .copied()
            .filter(|r| *r > current)
            .reduce(f64::min)
            .unwrap_or(current * (1.0 + cfg.default_band));
        let next_support = pivots
            .support
            .iter()
            .copied()
            .filter(|s| *s < current)
            .reduce(f64::max)
            .unwrap_or(current * (1.0 - cfg.default_band));

        let recent = &history.close[history.len() - cfg.trend_window..];
        Ok(LevelSummary {
            resistance_levels: pivots.resistance,
            support_levels: pivots.support,
            next_resistance,
            next_support,
            slope: linear_slope(recent),
        })
    }

    fn compute(&self, history: &PriceColumns, horizon: usize) -> ForecastResult<Forecast> {
        let levels = self.levels(history)?;
        let damping = self.config.damping;
        let mut current = history.last_close().unwrap_or(f64::NAN);
        let mut prices = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let projected = current + levels.slope;
            let next = if projected > levels.next_resistance {
                current + damping * (levels.next_resistance - current)
            } else if projected < levels.next_support {
                current + damping * (levels.next_support - current)
            } else {
                projected
            };
            prices.push(next);
            current = next;
        }
        debug!(
            resistance = levels.next_resistance,
            support = levels.next_support,
            slope = levels.slope,
            "Support/resistance levels"
        );
        Ok(Forecast::new(ForecastMethod::SupportResistance, prices)
            .with_detail(ForecastDetail::SupportResistance(levels)))
    }
}

impl Forecaster for SupportResistanceForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::SupportResistance
    }

    fn forecast(&self, history: &PriceColumns, horizon: usize, _seed: u64) -> ForecastOutcome {
        match self.compute(history, horizon) {
            Ok(forecast) => ForecastOutcome::Computed { forecast },
            Err(err) => degrade(self.method(), history, horizon, err),
        }
    }
}
