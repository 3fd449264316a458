//! Trading signal scorer
//!
//! Turns the ensemble path plus the latest KDJ and MACD state into a discrete
//! recommendation. `total = macd_score + trend_score + kdj_score`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::{kdj, macd, PriceColumns, NEUTRAL_OSCILLATOR};
use crate::types::{Bar, Recommendation, TradingSignal};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdjConfig {
    pub n: usize,
    pub m1: usize,
    pub m2: usize,
}

impl Default for KdjConfig {
    fn default() -> Self {
        Self { n: 9, m1: 3, m2: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdConfig {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
    /// History length below which the MACD score is 0
    pub min_bars: usize,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
            min_bars: 26,
        }
    }
}

/// Latest and previous KDJ values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KdjSnapshot {
    pub k: f64,
    pub d: f64,
    pub j: f64,
    pub prev_k: Option<f64>,
    pub prev_d: Option<f64>,
}

impl Default for KdjSnapshot {
    fn default() -> Self {
        Self {
            k: NEUTRAL_OSCILLATOR,
            d: NEUTRAL_OSCILLATOR,
            j: NEUTRAL_OSCILLATOR,
            prev_k: None,
            prev_d: None,
        }
    }
}

impl KdjSnapshot {
    pub fn from_history(history: &PriceColumns, config: &KdjConfig) -> Self {
        let series = kdj(history, config.n, config.m1, config.m2);
        let n = series.k.len();
        if n == 0 {
            return Self::default();
        }
        Self {
            k: series.k[n - 1],
            d: series.d[n - 1],
            j: series.j[n - 1],
            prev_k: (n >= 2).then(|| series.k[n - 2]),
            prev_d: (n >= 2).then(|| series.d[n - 2]),
        }
    }
}

/// Latest and previous MACD / signal values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdSnapshot {
    pub macd: f64,
    pub signal: f64,
    pub prev_macd: Option<f64>,
    pub prev_signal: Option<f64>,
}

impl MacdSnapshot {
    /// `None` when the history is shorter than `config.min_bars`
    pub fn from_history(history: &PriceColumns, config: &MacdConfig) -> Option<Self> {
        if history.len() < config.min_bars.max(1) {
            return None;
        }
        let series = macd(&history.close, config.fast, config.slow, config.signal);
        let n = series.macd.len();
        Some(Self {
            macd: series.macd[n - 1],
            signal: series.signal[n - 1],
            prev_macd: (n >= 2).then(|| series.macd[n - 2]),
            prev_signal: (n >= 2).then(|| series.signal[n - 2]),
        })
    }
}

// ============================================================================
// Sub-scores
// ============================================================================

pub fn kdj_score(snapshot: &KdjSnapshot) -> i32 {
    let (k, d, j) = (snapshot.k, snapshot.d, snapshot.j);
    let mut score = if k < 20.0 && d < 20.0 {
        2
    } else if k < 30.0 && d < 30.0 {
        1
    } else if k > 80.0 && d > 80.0 {
        -2
    } else if k > 70.0 && d > 70.0 {
        -1
    } else {
        0
    };

    if let (Some(prev_k), Some(prev_d)) = (snapshot.prev_k, snapshot.prev_d) {
        if prev_k <= prev_d && k > d {
            score += 1;
        } else if prev_k >= prev_d && k < d {
            score -= 1;
        }
    }

    if j < 10.0 {
        score += 1;
    } else if j > 90.0 {
        score -= 1;
    }
    score
}

pub fn macd_score(snapshot: Option<&MacdSnapshot>) -> i32 {
    let Some(s) = snapshot else {
        return 0;
    };
    if let (Some(prev_macd), Some(prev_signal)) = (s.prev_macd, s.prev_signal) {
        if prev_macd <= prev_signal && s.macd > s.signal {
            return 2;
        }
        if prev_macd >= prev_signal && s.macd < s.signal {
            return -2;
        }
    }
    if s.macd > 0.0 {
        1
    } else if s.macd < 0.0 {
        -1
    } else {
        0
    }
}

/// `(last - first) / first * 100`; 0 for paths shorter than two points
pub fn trend_pct(path: &[f64]) -> f64 {
    match (path.first(), path.last()) {
        (Some(&first), Some(&last)) if path.len() >= 2 && first > 0.0 => {
            (last - first) / first * 100.0
        }
        _ => 0.0,
    }
}

pub fn trend_score(pct: f64) -> i32 {
    if pct > 2.0 {
        2
    } else if pct > 0.5 {
        1
    } else if pct > -0.5 {
        0
    } else if pct > -2.0 {
        -1
    } else {
        -2
    }
}

/// Combine the sub-scores into a signal
pub fn score(kdj: &KdjSnapshot, macd: Option<&MacdSnapshot>, path: &[f64]) -> TradingSignal {
    let kdj_score = kdj_score(kdj);
    let macd_score = macd_score(macd);
    let pred_trend_pct = trend_pct(path);
    let trend_score = trend_score(pred_trend_pct);
    let total = macd_score + trend_score + kdj_score;
    let recommendation = Recommendation::from_score(total);

    debug!(kdj_score, macd_score, trend_score, total, "Trading signal scored");

    TradingSignal {
        recommendation,
        confidence: recommendation.confidence_label(),
        score: total,
        macd_score,
        trend_score,
        kdj_score,
        pred_trend_pct,
        current_k: kdj.k,
        current_d: kdj.d,
        current_j: kdj.j,
    }
}

/// Scores a forecast path against the history it was derived from
#[derive(Debug, Clone, Default)]
pub struct SignalScorer {
    pub kdj: KdjConfig,
    pub macd: MacdConfig,
}

impl SignalScorer {
    pub fn new(kdj: KdjConfig, macd: MacdConfig) -> Self {
        Self { kdj, macd }
    }

    pub fn score_history(&self, history: &[Bar], path: &[f64]) -> TradingSignal {
        let columns = PriceColumns::from_bars(history);
        let kdj = KdjSnapshot::from_history(&columns, &self.kdj);
        let macd = MacdSnapshot::from_history(&columns, &self.macd);
        score(&kdj, macd.as_ref(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kdj_at(k: f64, d: f64, j: f64) -> KdjSnapshot {
        KdjSnapshot {
            k,
            d,
            j,
            prev_k: Some(k),
            prev_d: Some(d),
        }
    }

    fn macd_at(macd: f64, signal: f64, prev_macd: f64, prev_signal: f64) -> MacdSnapshot {
        MacdSnapshot {
            macd,
            signal,
            prev_macd: Some(prev_macd),
            prev_signal: Some(prev_signal),
        }
    }

    fn kdj_fresh(k: f64, d: f64, j: f64) -> KdjSnapshot {
        KdjSnapshot {
            prev_k: None,
            prev_d: None,
            ..kdj_at(k, d, j)
        }
    }

    #[test]
    fn test_kdj_buckets() {
        assert_eq!(kdj_score(&kdj_fresh(15.0, 18.0, 20.0)), 2);
        assert_eq!(kdj_score(&kdj_fresh(25.0, 28.0, 20.0)), 1);
        assert_eq!(kdj_score(&kdj_fresh(85.0, 82.0, 85.0)), -2);
        assert_eq!(kdj_score(&kdj_fresh(75.0, 72.0, 80.0)), -1);
        assert_eq!(kdj_score(&KdjSnapshot::default()), 0);
    }

    #[test]
    fn test_kdj_cross_and_j_extremes() {
        let golden = KdjSnapshot {
            k: 55.0,
            d: 50.0,
            j: 65.0,
            prev_k: Some(48.0),
            prev_d: Some(50.0),
        };
        assert_eq!(kdj_score(&golden), 1);

        let death = KdjSnapshot {
            k: 45.0,
            d: 50.0,
            j: 35.0,
            prev_k: Some(52.0),
            prev_d: Some(50.0),
        };
        assert_eq!(kdj_score(&death), -1);

        // equal K and D on both bars is neither cross
        assert_eq!(kdj_score(&kdj_at(50.0, 50.0, 50.0)), 0);
        assert_eq!(kdj_score(&kdj_at(85.0, 85.0, 100.0)), -3);
        assert_eq!(kdj_score(&kdj_at(10.0, 10.0, 5.0)), 3);
    }

    #[test]
    fn test_macd_crossovers() {
        assert_eq!(macd_score(None), 0);
        assert_eq!(macd_score(Some(&macd_at(0.5, 0.2, 0.1, 0.2))), 2);
        assert_eq!(macd_score(Some(&macd_at(-0.5, -0.2, -0.1, -0.2))), -2);
        assert_eq!(macd_score(Some(&macd_at(0.5, 0.2, 0.4, 0.1))), 1);
        assert_eq!(macd_score(Some(&macd_at(-0.5, -0.2, -0.6, -0.3))), -1);
    }

    #[test]
    fn test_trend_score_bands() {
        assert_eq!(trend_score(trend_pct(&[100.0, 103.0])), 2);
        assert_eq!(trend_score(trend_pct(&[100.0, 101.0])), 1);
        assert_eq!(trend_score(trend_pct(&[100.0, 100.2])), 0);
        assert_eq!(trend_score(trend_pct(&[100.0, 99.0])), -1);
        assert_eq!(trend_score(trend_pct(&[100.0, 90.0])), -2);
        assert_eq!(trend_pct(&[100.0]), 0.0);
        assert_eq!(trend_pct(&[]), 0.0);
    }

    #[test]
    fn test_total_monotone_in_macd() {
        let kdj = kdj_at(50.0, 50.0, 50.0);
        let path = [100.0, 101.0];
        // ordered from bearish crossover to bullish crossover
        let snapshots = [
            macd_at(-0.5, -0.2, -0.1, -0.2),
            macd_at(-0.5, -0.6, -0.6, -0.7),
            macd_at(0.0, 0.0, 0.0, 0.0),
            macd_at(0.5, 0.2, 0.4, 0.1),
            macd_at(0.5, 0.2, 0.1, 0.2),
        ];
        let macd_scores: Vec<i32> = snapshots.iter().map(|m| macd_score(Some(m))).collect();
        assert_eq!(macd_scores, vec![-2, -1, 0, 1, 2]);

        let totals: Vec<i32> = snapshots
            .iter()
            .map(|m| score(&kdj, Some(m), &path).score)
            .collect();
        assert!(totals.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_score_fields() {
        let signal = score(&kdj_at(50.0, 50.0, 50.0), None, &[100.0, 105.0]);
        assert_eq!(signal.score, 2);
        assert_eq!(signal.recommendation, Recommendation::Buy);
        assert!((signal.pred_trend_pct - 5.0).abs() < 1e-9);
        assert_eq!(signal.current_k, 50.0);
    }
}
