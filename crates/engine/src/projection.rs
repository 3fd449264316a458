//! Synthetic OHLCV bars for a forecast path
//!
//! Renderers want candles, not a bare close path. Each projected bar opens at
//! the previous close, gets a random wick on both sides and a volume drawn
//! around the recent average. Timestamps continue from the last real bar.

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};
use crate::types::{decimal_to_f64, Bar, Forecast};

const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Bar spacing in milliseconds
    pub interval_ms: i64,
    /// Skip Saturdays and Sundays for daily (or longer) intervals
    pub skip_weekends: bool,
    /// Std of the relative wick size
    pub wick_std: f64,
    /// Largest relative wick
    pub max_wick: f64,
    /// Recent average volume; 0 uses the last bar's volume
    pub average_volume: f64,
    /// Std of volume as a fraction of the average
    pub volume_jitter: f64,
    /// Lowest volume as a fraction of the average
    pub volume_floor: f64,
    pub decimals: u32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            interval_ms: DAY_MS,
            skip_weekends: true,
            wick_std: 0.01,
            max_wick: 0.01,
            average_volume: 0.0,
            volume_jitter: 0.3,
            volume_floor: 0.1,
            decimals: 4,
        }
    }
}

/// Standard normal sample (Box-Muller)
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Next timestamp after `ts`, skipping weekends when configured
pub fn next_timestamp(ts: i64, config: &ProjectionConfig) -> i64 {
    let interval = config.interval_ms.max(1);
    let mut next = ts + interval;
    if config.skip_weekends && interval >= DAY_MS {
        while let Some(dt) = DateTime::<Utc>::from_timestamp_millis(next) {
            if !matches!(dt.weekday(), Weekday::Sat | Weekday::Sun) {
                break;
            }
            next = (dt + Duration::days(1)).timestamp_millis();
        }
    }
    next
}

fn to_decimal(value: f64, decimals: u32) -> ForecastResult<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(decimals))
        .ok_or_else(|| ForecastError::InvalidParameter(format!("cannot represent {}", value)))
}

/// Turn a close path into bars following `last_bar`.
///
/// Every returned bar satisfies `low <= min(open, close) <= max(open, close) <= high`.
pub fn project_bars<R: Rng>(
    last_bar: &Bar,
    forecast: &Forecast,
    config: &ProjectionConfig,
    rng: &mut R,
) -> ForecastResult<Vec<Bar>> {
    if !forecast.is_usable() {
        return Err(ForecastError::InvalidParameter(
            "forecast path is empty or not finite".to_string(),
        ));
    }
    let avg_volume = if config.average_volume > 0.0 {
        config.average_volume
    } else {
        decimal_to_f64(last_bar.volume).max(0.0)
    };

    let mut bars = Vec::with_capacity(forecast.len());
    let mut prev_close = last_bar.close;
    let mut timestamp = last_bar.timestamp;
    for &price in &forecast.prices {
        timestamp = next_timestamp(timestamp, config);
        let open = prev_close;
        let close = to_decimal(price, config.decimals)?;

        let up = (standard_normal(rng) * config.wick_std).abs().min(config.max_wick);
        let down = (standard_normal(rng) * config.wick_std).abs().min(config.max_wick);
        let top = decimal_to_f64(open.max(close));
        let bottom = decimal_to_f64(open.min(close));
        let high = to_decimal(top * (1.0 + up), config.decimals)?.max(open.max(close));
        let low = to_decimal(bottom * (1.0 - down), config.decimals)?.min(open.min(close));

        let volume = (avg_volume + standard_normal(rng) * config.volume_jitter * avg_volume)
            .max(avg_volume * config.volume_floor);
        let volume = to_decimal(volume, 0)?;

        bars.push(Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
        prev_close = close;
    }
    Ok(bars)
}

/// Mean volume of the last `n` bars
pub fn recent_average_volume(bars: &[Bar], n: usize) -> f64 {
    let tail = &bars[bars.len().saturating_sub(n)..];
    if tail.is_empty() {
        return 0.0;
    }
    tail.iter().map(|b| decimal_to_f64(b.volume)).sum::<f64>() / tail.len() as f64
}
