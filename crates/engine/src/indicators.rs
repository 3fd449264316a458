//! Indicator library
//!
//! Stateless transforms over an immutable view of an OHLCV series. Every
//! function returns a freshly allocated series aligned 1:1 with its input;
//! warm-up positions that the lookback window cannot cover hold `NaN`
//! unless the indicator documents a neutral fallback instead.

use serde::{Deserialize, Serialize};
use ta::indicators::{
    BollingerBands, ExponentialMovingAverage, MovingAverageConvergenceDivergence,
    SimpleMovingAverage,
};
use ta::Next;

use crate::types::{decimal_to_f64, Bar};

/// Denominator floor for ratios over flat windows
pub const EPSILON: f64 = 1e-8;

/// Neutral oscillator value used when a window is undefined
pub const NEUTRAL_OSCILLATOR: f64 = 50.0;

/// ATR fallback as a fraction of price when there are fewer than two bars
pub const ATR_FALLBACK_RATIO: f64 = 0.02;

// ============================================================================
// Column view
// ============================================================================

/// Column-oriented private copy of an OHLCV series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceColumns {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl PriceColumns {
    pub fn from_bars(bars: &[Bar]) -> Self {
        let mut cols = Self {
            open: Vec::with_capacity(bars.len()),
            high: Vec::with_capacity(bars.len()),
            low: Vec::with_capacity(bars.len()),
            close: Vec::with_capacity(bars.len()),
            volume: Vec::with_capacity(bars.len()),
        };
        for bar in bars {
            cols.open.push(decimal_to_f64(bar.open));
            cols.high.push(decimal_to_f64(bar.high));
            cols.low.push(decimal_to_f64(bar.low));
            cols.close.push(decimal_to_f64(bar.close));
            cols.volume.push(decimal_to_f64(bar.volume));
        }
        cols
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.close.last().copied()
    }
}

// ============================================================================
// Moving averages
// ============================================================================

/// Simple moving average, `NaN` for the first `period - 1` positions
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(ind) => ind,
        Err(_) => return out,
    };
    for (i, &v) in values.iter().enumerate() {
        let avg = indicator.next(v);
        if i + 1 >= period {
            out[i] = avg;
        }
    }
    out
}

/// Exponential moving average with `alpha = 2 / (period + 1)`, seeded with the
/// first value so the series is defined from the first position.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut indicator = match ExponentialMovingAverage::new(period.max(1)) {
        Ok(ind) => ind,
        Err(_) => return vec![f64::NAN; values.len()],
    };
    values.iter().map(|&v| indicator.next(v)).collect()
}

/// MACD line, signal line and histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> Macd {
    let mut out = Macd {
        macd: Vec::with_capacity(closes.len()),
        signal: Vec::with_capacity(closes.len()),
        histogram: Vec::with_capacity(closes.len()),
    };
    let mut indicator = match MovingAverageConvergenceDivergence::new(
        fast.max(1),
        slow.max(1),
        signal_period.max(1),
    ) {
        Ok(ind) => ind,
        Err(_) => {
            let nan = vec![f64::NAN; closes.len()];
            out.macd = nan.clone();
            out.signal = nan.clone();
            out.histogram = nan;
            return out;
        }
    };
    for &close in closes {
        let step = indicator.next(close);
        out.macd.push(step.macd);
        out.signal.push(step.signal);
        out.histogram.push(step.histogram);
    }
    out
}

// ============================================================================
// Oscillators
// ============================================================================

/// RSI from rolling means of gains and losses.
///
/// Defined from index `period`. A window with neither gains nor losses is
/// neutral (50); a window without losses is 100.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return out;
    }
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    for i in period..n {
        let window = &deltas[i - period..i];
        let gain = window.iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
        let loss = -window.iter().filter(|d| **d < 0.0).sum::<f64>() / period as f64;
        out[i] = if gain + loss < EPSILON {
            NEUTRAL_OSCILLATOR
        } else if loss < EPSILON {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        };
    }
    out
}

/// KDJ stochastic oscillator series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kdj {
    pub rsv: Vec<f64>,
    pub k: Vec<f64>,
    pub d: Vec<f64>,
    pub j: Vec<f64>,
}

impl Kdj {
    fn neutral(len: usize) -> Self {
        Self {
            rsv: vec![NEUTRAL_OSCILLATOR; len],
            k: vec![NEUTRAL_OSCILLATOR; len],
            d: vec![NEUTRAL_OSCILLATOR; len],
            j: vec![NEUTRAL_OSCILLATOR; len],
        }
    }
}

/// KDJ(n, m1, m2).
///
/// RSV is 50 where the window is incomplete or the price range is flat.
/// K and D are seeded at 50; K, D and J are clamped to [0, 100] afterwards.
/// Fewer than `n` bars yields constant 50s.
pub fn kdj(cols: &PriceColumns, n: usize, m1: usize, m2: usize) -> Kdj {
    let len = cols.len();
    if n == 0 || len < n {
        return Kdj::neutral(len);
    }

    let mut rsv = vec![NEUTRAL_OSCILLATOR; len];
    for i in (n - 1)..len {
        let lowest = cols.low[i + 1 - n..=i]
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        let highest = cols.high[i + 1 - n..=i]
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let range = highest - lowest;
        if range.is_finite() && range > EPSILON {
            rsv[i] = (cols.close[i] - lowest) / range * 100.0;
        }
    }

    let alpha_k = 1.0 / m1.max(1) as f64;
    let alpha_d = 1.0 / m2.max(1) as f64;
    let mut k = vec![NEUTRAL_OSCILLATOR; len];
    let mut d = vec![NEUTRAL_OSCILLATOR; len];
    for i in 1..len {
        k[i] = (1.0 - alpha_k) * k[i - 1] + alpha_k * rsv[i];
        d[i] = (1.0 - alpha_d) * d[i - 1] + alpha_d * k[i];
    }
    let j: Vec<f64> = k
        .iter()
        .zip(d.iter())
        .map(|(k, d)| (3.0 * k - 2.0 * d).clamp(0.0, 100.0))
        .collect();

    Kdj {
        rsv,
        k: k.into_iter().map(|v| v.clamp(0.0, 100.0)).collect(),
        d: d.into_iter().map(|v| v.clamp(0.0, 100.0)).collect(),
        j,
    }
}

// ============================================================================
// Volatility
// ============================================================================

/// True range per bar; the first bar has no previous close and uses high − low
pub fn true_range(cols: &PriceColumns) -> Vec<f64> {
    (0..cols.len())
        .map(|i| {
            let hl = cols.high[i] - cols.low[i];
            if i == 0 {
                return hl;
            }
            let prev_close = cols.close[i - 1];
            hl.max((cols.high[i] - prev_close).abs())
                .max((cols.low[i] - prev_close).abs())
        })
        .collect()
}

/// Wilder ATR seeded by the simple average of the first `period` true ranges.
///
/// Positions before the seed carry the expanding mean of the true ranges seen
/// so far. With fewer than two bars every position is `close * 0.02`.
pub fn atr(cols: &PriceColumns, period: usize) -> Vec<f64> {
    let len = cols.len();
    if len < 2 {
        return cols.close.iter().map(|c| c * ATR_FALLBACK_RATIO).collect();
    }
    let period = period.max(1);
    let tr = true_range(cols);
    let mut out = Vec::with_capacity(len);
    let mut running = 0.0;
    for (i, &range) in tr.iter().enumerate() {
        if i < period {
            running += range;
            out.push(running / (i + 1) as f64);
        } else {
            let prev = out[i - 1];
            out.push(((period - 1) as f64 * prev + range) / period as f64);
        }
    }
    out
}

/// Bollinger bands (middle = SMA, upper/lower = middle ± k·σ)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bollinger {
    pub middle: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger(closes: &[f64], period: usize, multiplier: f64) -> Bollinger {
    let n = closes.len();
    let mut bands = Bollinger {
        middle: vec![f64::NAN; n],
        upper: vec![f64::NAN; n],
        lower: vec![f64::NAN; n],
    };
    let mut indicator = match BollingerBands::new(period, multiplier) {
        Ok(ind) => ind,
        Err(_) => return bands,
    };
    for (i, &close) in closes.iter().enumerate() {
        let out = indicator.next(close);
        if i + 1 >= period {
            bands.middle[i] = out.average;
            bands.upper[i] = out.upper;
            bands.lower[i] = out.lower;
        }
    }
    bands
}

// ============================================================================
// Support / resistance
// ============================================================================

/// Pivot levels, resistance highest first and support lowest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportResistance {
    pub resistance: Vec<f64>,
    pub support: Vec<f64>,
}

const MAX_LEVELS: usize = 5;

/// Bars whose high (low) is the extreme of the ±`window` neighbourhood.
///
/// Only bars with a full neighbourhood on both sides qualify. Returns at most
/// five deduplicated levels per side.
pub fn support_resistance(cols: &PriceColumns, window: usize) -> SupportResistance {
    let len = cols.len();
    let mut resistance = Vec::new();
    let mut support = Vec::new();
    if len > 2 * window {
        for i in window..(len - window) {
            let hood = (i - window)..=(i + window);
            let max_high = cols.high[hood.clone()]
                .iter()
                .cloned()
                .fold(f64::NEG_INFINITY, f64::max);
            let min_low = cols.low[hood]
                .iter()
                .cloned()
                .fold(f64::INFINITY, f64::min);
            if cols.high[i] == max_high {
                resistance.push(cols.high[i]);
            }
            if cols.low[i] == min_low {
                support.push(cols.low[i]);
            }
        }
    }

    resistance.sort_by(|a, b| b.total_cmp(a));
    resistance.dedup();
    resistance.truncate(MAX_LEVELS);

    support.sort_by(|a, b| a.total_cmp(b));
    support.dedup();
    support.truncate(MAX_LEVELS);

    SupportResistance {
        resistance,
        support,
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Fractional change from the previous value; `NaN` at 0 and after a zero
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        let prev = values[i - 1];
        if prev != 0.0 {
            out[i] = (values[i] - prev) / prev;
        }
    }
    out
}

/// Least-squares slope of `values` against their index (0 for fewer than 2)
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / nf;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den.abs() < f64::EPSILON {
        0.0
    } else {
        num / den
    }
}

/// Last finite value of a series
pub fn last_finite(values: &[f64]) -> Option<f64> {
    values.iter().rev().find(|v| v.is_finite()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn make_bars(prices: &[f64]) -> Vec<Bar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let price = Decimal::from_str_exact(&format!("{:.2}", p)).unwrap();
                Bar {
                    timestamp: (i as i64) * 86_400_000,
                    open: price,
                    high: price + dec!(1),
                    low: price - dec!(1),
                    close: price,
                    volume: dec!(1000),
                }
            })
            .collect()
    }

    fn flat_bars(n: usize, price: f64) -> Vec<Bar> {
        let price = Decimal::from_str_exact(&format!("{:.2}", price)).unwrap();
        (0..n)
            .map(|i| Bar {
                timestamp: i as i64,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: dec!(500),
            })
            .collect()
    }

    #[test]
    fn test_sma_warmup_is_nan() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert!(out[0].is_nan() && out[1].is_nan());
        assert!((out[2] - 2.0).abs() < 1e-12);
        assert!((out[4] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_ema_constant_series_stays_flat() {
        let out = ema(&[100.0; 40], 12);
        assert_eq!(out.len(), 40);
        assert!(out.iter().all(|v| (v - 100.0).abs() < 1e-9));
    }

    #[test]
    fn test_ema_seeded_with_first_value() {
        let out = ema(&[10.0, 20.0, 20.0], 3);
        assert_eq!(out[0], 10.0);
        // alpha = 0.5
        assert!((out[1] - 15.0).abs() < 1e-12);
        assert!((out[2] - 17.5).abs() < 1e-12);
    }

    #[test]
    fn test_macd_flat_is_zero() {
        let m = macd(&[50.0; 30], 12, 26, 9);
        assert_eq!(m.macd.len(), 30);
        assert!(m.macd.iter().all(|v| v.abs() < 1e-9));
        assert!(m.histogram.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_macd_rising_is_positive() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let m = macd(&closes, 12, 26, 9);
        let last = m.macd.len() - 1;
        assert!(m.macd[last] > 0.0);
        assert!(m.macd[last] > m.signal[last]);
    }

    #[test]
    fn test_macd_matches_its_ema_legs() {
        let closes: Vec<f64> = (0..60)
            .map(|t| 50.0 + 4.0 * (t as f64 * 0.35).sin())
            .collect();
        let m = macd(&closes, 12, 26, 9);
        let fast = ema(&closes, 12);
        let slow = ema(&closes, 26);
        let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema(&line, 9);
        for i in 0..closes.len() {
            assert!((m.macd[i] - line[i]).abs() < 1e-9);
            assert!((m.signal[i] - signal[i]).abs() < 1e-9);
            assert!((m.histogram[i] - (line[i] - signal[i])).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rsi_bounds_and_neutral() {
        let flat = rsi(&[10.0; 20], 14);
        assert!(flat[13].is_nan());
        assert_eq!(flat[14], 50.0);

        let rising: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert_eq!(rsi(&rising, 14)[19], 100.0);

        let mixed: Vec<f64> = (0..30).map(|i| 50.0 + ((i * 7) % 5) as f64).collect();
        for v in rsi(&mixed, 14).into_iter().filter(|v| !v.is_nan()) {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn test_kdj_short_series_is_neutral() {
        let cols = PriceColumns::from_bars(&make_bars(&[10.0, 11.0, 12.0]));
        let out = kdj(&cols, 9, 3, 3);
        assert_eq!(out.k, vec![50.0; 3]);
        assert_eq!(out.j, vec![50.0; 3]);
    }

    #[test]
    fn test_kdj_flat_series_is_constant_fifty() {
        let cols = PriceColumns::from_bars(&flat_bars(30, 100.0));
        let out = kdj(&cols, 9, 3, 3);
        assert!(out.rsv.iter().all(|v| *v == 50.0));
        assert!(out.k.iter().all(|v| *v == 50.0));
        assert!(out.d.iter().all(|v| *v == 50.0));
        assert!(out.j.iter().all(|v| *v == 50.0));
    }

    #[test]
    fn test_kdj_values_clamped() {
        let mut prices: Vec<f64> = (0..20).map(|i| 100.0 + (i as f64) * 3.0).collect();
        prices.extend((0..20).map(|i| 160.0 - (i as f64) * 5.0));
        let cols = PriceColumns::from_bars(&make_bars(&prices));
        let out = kdj(&cols, 9, 3, 3);
        for series in [&out.k, &out.d, &out.j] {
            assert!(series.iter().all(|v| (0.0..=100.0).contains(v)));
        }
    }

    #[test]
    fn test_kdj_rising_rsv_trends_high() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let cols = PriceColumns::from_bars(&make_bars(&prices));
        let out = kdj(&cols, 9, 3, 3);
        let last = out.rsv.len() - 1;
        assert!(out.rsv[last] > 80.0);
        assert!(out.k[last] > out.k[10]);
    }

    #[test]
    fn test_atr_non_negative_and_flat_converges() {
        let cols = PriceColumns::from_bars(&make_bars(&[10.0, 12.0, 9.0, 15.0, 14.0, 13.0]));
        assert!(atr(&cols, 3).iter().all(|v| *v >= 0.0));

        let flat = PriceColumns::from_bars(&flat_bars(40, 25.0));
        let out = atr(&flat, 14);
        assert_eq!(out.len(), 40);
        assert!(out.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_atr_seed_is_simple_average() {
        let cols = PriceColumns::from_bars(&make_bars(&[10.0, 10.0, 10.0, 10.0, 10.0]));
        // high - low = 2 on every bar, no gaps
        let out = atr(&cols, 3);
        assert!((out[2] - 2.0).abs() < 1e-12);
        assert!((out[4] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_atr_single_bar_fallback() {
        let cols = PriceColumns::from_bars(&make_bars(&[50.0]));
        assert_eq!(atr(&cols, 14), vec![1.0]);
    }

    #[test]
    fn test_support_resistance_pivots() {
        let prices = [10.0, 11.0, 12.0, 13.0, 14.0, 20.0, 14.0, 13.0, 12.0, 11.0, 10.0, 9.0];
        let cols = PriceColumns::from_bars(&make_bars(&prices));
        let levels = support_resistance(&cols, 5);
        assert_eq!(levels.resistance, vec![21.0]);
        assert!(levels.support.is_empty());
    }

    #[test]
    fn test_support_resistance_dedup_and_limit() {
        let mut prices = Vec::new();
        for _ in 0..10 {
            prices.extend([10.0, 12.0, 14.0, 16.0, 14.0, 12.0]);
        }
        let cols = PriceColumns::from_bars(&make_bars(&prices));
        let levels = support_resistance(&cols, 2);
        assert_eq!(levels.resistance, vec![17.0]);
        assert_eq!(levels.support, vec![9.0]);
    }

    #[test]
    fn test_linear_slope() {
        assert_eq!(linear_slope(&[5.0]), 0.0);
        let line: Vec<f64> = (0..10).map(|i| 3.0 + 2.0 * i as f64).collect();
        assert!((linear_slope(&line) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_pct_change() {
        let out = pct_change(&[100.0, 110.0, 99.0]);
        assert!(out[0].is_nan());
        assert!((out[1] - 0.1).abs() < 1e-12);
        assert!((out[2] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_bollinger_flat_collapses() {
        let bands = bollinger(&[10.0; 25], 20, 2.0);
        assert!(bands.upper[18].is_nan());
        assert!((bands.upper[24] - 10.0).abs() < 1e-9);
        assert!((bands.lower[24] - 10.0).abs() < 1e-9);
    }
}
