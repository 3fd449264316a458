//! Technical-indicator extrapolation
//!
//! Four discrete signals are read off the final historical bar (MACD vs its
//! signal line, RSI extremes, MA5 vs MA20, close vs Bollinger bands), blended
//! into one drift in [-1, 1], and compounded at up to 1% per step. Signals are
//! held constant across the horizon.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{degrade, Forecaster};
use crate::error::{ForecastError, ForecastResult};
use crate::indicators::{bollinger, last_finite, macd, rsi, sma, PriceColumns};
use crate::types::{Forecast, ForecastDetail, ForecastMethod, ForecastOutcome, TechnicalSignals};

/// Relative tolerance under which two indicator values count as equal
const TIE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalConfig {
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub ma_fast: usize,
    pub ma_slow: usize,
    pub bb_period: usize,
    pub bb_multiplier: f64,
    pub macd_weight: f64,
    pub rsi_weight: f64,
    pub ma_weight: f64,
    pub bollinger_weight: f64,
    /// Largest fractional move per step
    pub max_step_change: f64,
}

impl Default for TechnicalConfig {
    fn default() -> Self {
        Self {
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            ma_fast: 5,
            ma_slow: 20,
            bb_period: 20,
            bb_multiplier: 2.0,
            macd_weight: 0.3,
            rsi_weight: 0.2,
            ma_weight: 0.3,
            bollinger_weight: 0.2,
            max_step_change: 0.01,
        }
    }
}

impl TechnicalConfig {
    /// Bars needed before every signal is defined
    pub fn min_bars(&self) -> usize {
        self.macd_slow
            .max(self.ma_slow)
            .max(self.bb_period)
            .max(self.rsi_period + 1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TechnicalForecaster {
    config: TechnicalConfig,
}

impl TechnicalForecaster {
    pub fn new(config: TechnicalConfig) -> Self {
        Self { config }
    }

    /// Discrete signals of the final bar
    pub fn signals(&self, history: &PriceColumns) -> ForecastResult<TechnicalSignals> {
        let cfg = &self.config;
        let required = cfg.min_bars();
        if history.len() < required {
            return Err(ForecastError::InsufficientData {
                required,
                actual: history.len(),
            });
        }
        let closes = &history.close;
        let price = history.last_close().unwrap_or(f64::NAN);
        if !price.is_finite() {
            return Err(ForecastError::InvalidParameter(
                "last close is not a finite number".to_string(),
            ));
        }
        let tolerance = price.abs() * TIE_TOLERANCE;

        let m = macd(closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        let macd_signal = compare(last_value(&m.macd)?, last_value(&m.signal)?, tolerance);

        let rsi_signal = match last_finite(&rsi(closes, cfg.rsi_period)) {
            Some(v) if v > cfg.rsi_overbought => -1,
            Some(v) if v < cfg.rsi_oversold => 1,
            _ => 0,
        };

        let ma_fast = last_value(&sma(closes, cfg.ma_fast))?;
        let ma_slow = last_value(&sma(closes, cfg.ma_slow))?;
        let ma_signal = compare(ma_fast, ma_slow, tolerance);

        let bands = bollinger(closes, cfg.bb_period, cfg.bb_multiplier);
        let upper = last_value(&bands.upper)?;
        let lower = last_value(&bands.lower)?;
        let bollinger_signal = if price > upper + tolerance {
            -1
        } else if price < lower - tolerance {
            1
        } else {
            0
        };

        let combined = (cfg.macd_weight * macd_signal as f64
            + cfg.rsi_weight * rsi_signal as f64
            + cfg.ma_weight * ma_signal as f64
            + cfg.bollinger_weight * bollinger_signal as f64)
            .clamp(-1.0, 1.0);

        Ok(TechnicalSignals {
            macd: macd_signal,
            rsi: rsi_signal,
            ma: ma_signal,
            bollinger: bollinger_signal,
            combined,
        })
    }

    fn compute(&self, history: &PriceColumns, horizon: usize) -> ForecastResult<Forecast> {
        let signals = self.signals(history)?;
        let mut price = history.last_close().unwrap_or(f64::NAN);
        let step = 1.0 + signals.combined * self.config.max_step_change;
        let prices = (0..horizon)
            .map(|_| {
                price *= step;
                price
            })
            .collect();
        debug!(
            macd = signals.macd,
            rsi = signals.rsi,
            ma = signals.ma,
            bollinger = signals.bollinger,
            combined = signals.combined,
            "Technical signals"
        );
        Ok(Forecast::new(ForecastMethod::Technical, prices)
            .with_detail(ForecastDetail::Technical(signals)))
    }
}

impl Forecaster for TechnicalForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::Technical
    }

    fn forecast(&self, history: &PriceColumns, horizon: usize, _seed: u64) -> ForecastOutcome {
        match self.compute(history, horizon) {
            Ok(forecast) => ForecastOutcome::Computed { forecast },
            Err(err) => degrade(self.method(), history, horizon, err),
        }
    }
}

fn compare(a: f64, b: f64, tolerance: f64) -> i8 {
    if a > b + tolerance {
        1
    } else if a < b - tolerance {
        -1
    } else {
        0
    }
}

fn last_value(series: &[f64]) -> ForecastResult<f64> {
    match series.last() {
        Some(v) if v.is_finite() => Ok(*v),
        _ => Err(ForecastError::InsufficientData {
            required: series.len() + 1,
            actual: series.len(),
        }),
    }
}
