//! Lookback-window feature table for the regression forecaster
//!
//! Each bar contributes six values: close, volume, MA5, MA10, RSI14 and the
//! one-bar pct change. A training row flattens `window` consecutive bars
//! (bar-major) and its target is the close of the bar right after the window.

use crate::error::{ForecastError, ForecastResult};
use crate::indicators::{pct_change, rsi, sma, PriceColumns, NEUTRAL_OSCILLATOR};

pub const FEATURES_PER_BAR: usize = 6;

const CLOSE: usize = 0;
const PCT_CHANGE: usize = 5;

/// Per-bar feature vector `[close, volume, ma5, ma10, rsi14, pct_change]`
pub type BarFeatures = [f64; FEATURES_PER_BAR];

/// Supervised-learning table built from one history
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub window: usize,
    /// Per-bar features for the whole history
    pub bars: Vec<BarFeatures>,
    /// Flattened windows, `window * FEATURES_PER_BAR` wide
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl FeatureTable {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.window * FEATURES_PER_BAR
    }

    /// Per-bar features of the most recent `window` bars
    pub fn last_window(&self) -> &[BarFeatures] {
        let start = self.bars.len().saturating_sub(self.window);
        &self.bars[start..]
    }
}

/// Per-bar features with warm-up gaps substituted (MA → close, RSI → 50, pct → 0)
pub fn bar_features(cols: &PriceColumns) -> Vec<BarFeatures> {
    let ma5 = sma(&cols.close, 5);
    let ma10 = sma(&cols.close, 10);
    let rsi14 = rsi(&cols.close, 14);
    let pct = pct_change(&cols.close);

    (0..cols.len())
        .map(|i| {
            let close = cols.close[i];
            [
                close,
                cols.volume[i],
                or_else(ma5[i], close),
                or_else(ma10[i], close),
                or_else(rsi14[i], NEUTRAL_OSCILLATOR),
                or_else(pct[i], 0.0),
            ]
        })
        .collect()
}

fn or_else(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Flatten consecutive per-bar features into one model row
pub fn flatten_window(window: &[BarFeatures]) -> Vec<f64> {
    window.iter().flat_map(|f| f.iter().copied()).collect()
}

/// Build the table; fails with `InsufficientData` when fewer than `min_rows`
/// labelled rows fit into the history.
pub fn build_table(
    cols: &PriceColumns,
    window: usize,
    min_rows: usize,
) -> ForecastResult<FeatureTable> {
    if window == 0 {
        return Err(ForecastError::InvalidParameter(
            "feature window must be at least one bar".to_string(),
        ));
    }
    let required = window + min_rows.max(1);
    if cols.len() < required {
        return Err(ForecastError::InsufficientData {
            required,
            actual: cols.len(),
        });
    }

    let bars = bar_features(cols);
    let mut rows = Vec::with_capacity(bars.len() - window);
    let mut targets = Vec::with_capacity(bars.len() - window);
    for i in window..bars.len() {
        rows.push(flatten_window(&bars[i - window..i]));
        targets.push(cols.close[i]);
    }

    Ok(FeatureTable {
        window,
        bars,
        rows,
        targets,
    })
}

/// Synthetic successor bar used by autoregressive forecasting.
///
/// Volume, moving averages and RSI are carried forward from `last`; only the
/// close and the pct change reflect the predicted price.
pub fn roll_forward(last: &BarFeatures, predicted_close: f64) -> BarFeatures {
    let mut next = *last;
    let prev_close = last[CLOSE];
    next[CLOSE] = predicted_close;
    next[PCT_CHANGE] = if prev_close != 0.0 {
        (predicted_close - prev_close) / prev_close
    } else {
        0.0
    };
    next
}

// ============================================================================
// Standardization
// ============================================================================

/// Zero-mean, unit-variance scaling fitted on training rows only
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Population statistics per column; zero-variance columns get scale 1
    pub fn fit(rows: &[Vec<f64>]) -> ForecastResult<Self> {
        let first = rows.first().ok_or(ForecastError::InsufficientData {
            required: 1,
            actual: 0,
        })?;
        let width = first.len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(ForecastError::InvalidParameter(
                "feature rows have different widths".to_string(),
            ));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; width];
        for row in rows {
            for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *acc += (v - m).powi(2);
            }
        }
        let scale = var
            .into_iter()
            .map(|v| {
                let std = (v / n).sqrt();
                if std.is_finite() && std > 0.0 {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self { mean, scale })
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Bar;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn make_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let price = Decimal::from(100 + i as i64);
                Bar {
                    timestamp: i as i64,
                    open: price,
                    high: price + dec!(1),
                    low: price - dec!(1),
                    close: price,
                    volume: dec!(1000) + Decimal::from(i as i64),
                }
            })
            .collect()
    }

    #[test]
    fn test_table_shape() {
        let cols = PriceColumns::from_bars(&make_bars(25));
        let table = build_table(&cols, 10, 10).unwrap();
        assert_eq!(table.n_rows(), 15);
        assert_eq!(table.n_features(), 60);
        assert!(table.rows.iter().all(|r| r.len() == 60));
        // first row covers bars 0..10, target is bar 10
        assert_eq!(table.targets[0], 110.0);
        assert_eq!(table.rows[0][0], 100.0);
        assert_eq!(table.last_window().len(), 10);
    }

    #[test]
    fn test_table_requires_min_rows() {
        let cols = PriceColumns::from_bars(&make_bars(19));
        assert_eq!(
            build_table(&cols, 10, 10),
            Err(ForecastError::InsufficientData {
                required: 20,
                actual: 19
            })
        );
        let cols = PriceColumns::from_bars(&make_bars(20));
        assert_eq!(build_table(&cols, 10, 10).unwrap().n_rows(), 10);
    }

    #[test]
    fn test_warmup_substitution() {
        let cols = PriceColumns::from_bars(&make_bars(3));
        let feats = bar_features(&cols);
        assert_eq!(feats[0], [100.0, 1000.0, 100.0, 100.0, 50.0, 0.0]);
        assert!(feats.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_roll_forward_carries_stale_fields() {
        let last: BarFeatures = [100.0, 5000.0, 98.0, 97.0, 61.0, 0.01];
        let next = roll_forward(&last, 102.0);
        assert_eq!(next[0], 102.0);
        assert!((next[5] - 0.02).abs() < 1e-12);
        assert_eq!(&next[1..5], &last[1..5]);
    }

    #[test]
    fn test_scaler_zero_variance_column() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        assert_eq!(scaler.mean, vec![2.0, 5.0]);
        assert_eq!(scaler.scale, vec![1.0, 1.0]);
        assert_eq!(scaler.transform(&rows), vec![vec![-1.0, 0.0], vec![1.0, 0.0]]);
    }

    #[test]
    fn test_scaler_rejects_empty() {
        assert!(StandardScaler::fit(&[]).is_err());
    }
}
