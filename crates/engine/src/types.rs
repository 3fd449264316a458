//! Types for the forecasting pipeline

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ForecastError, ForecastResult};

/// A single OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time in milliseconds since the Unix epoch
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Bar {
    pub fn close_f64(&self) -> f64 {
        decimal_to_f64(self.close)
    }

    /// Whether `low <= min(open, close) <= max(open, close) <= high` holds
    pub fn is_consistent(&self) -> bool {
        self.low <= self.open.min(self.close) && self.open.max(self.close) <= self.high
    }
}

pub(crate) fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

/// Check that timestamps are strictly increasing (no duplicates)
pub fn validate_history(bars: &[Bar]) -> ForecastResult<()> {
    for (i, pair) in bars.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(ForecastError::UnorderedHistory { index: i + 1 });
        }
    }
    Ok(())
}

/// Which method produced a forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    Technical,
    MachineLearning,
    SupportResistance,
    LinearTrend,
    Ensemble,
    SimpleAverage,
}

impl std::fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForecastMethod::Technical => write!(f, "technical"),
            ForecastMethod::MachineLearning => write!(f, "machine_learning"),
            ForecastMethod::SupportResistance => write!(f, "support_resistance"),
            ForecastMethod::LinearTrend => write!(f, "linear_trend"),
            ForecastMethod::Ensemble => write!(f, "ensemble"),
            ForecastMethod::SimpleAverage => write!(f, "simple_average"),
        }
    }
}

/// Discrete technical signals, each in {-1, 0, +1}
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSignals {
    pub macd: i8,
    pub rsi: i8,
    pub ma: i8,
    pub bollinger: i8,
    /// Weighted combination in [-1, 1]
    pub combined: f64,
}

/// Price levels used by the support/resistance forecaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub resistance_levels: Vec<f64>,
    pub support_levels: Vec<f64>,
    pub next_resistance: f64,
    pub next_support: f64,
    pub slope: f64,
}

/// Method-specific information attached to a forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForecastDetail {
    Technical(TechnicalSignals),
    Regression { training_rows: usize, n_estimators: usize },
    SupportResistance(LevelSummary),
    Trend { slope: f64 },
}

/// An ordered path of predicted closes, one per future step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub method: ForecastMethod,
    pub prices: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ForecastDetail>,
}

impl Forecast {
    pub fn new(method: ForecastMethod, prices: Vec<f64>) -> Self {
        Self {
            method,
            prices,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: ForecastDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Usable as an ensemble input: non-empty and every price finite
    pub fn is_usable(&self) -> bool {
        !self.prices.is_empty() && self.prices.iter().all(|p| p.is_finite())
    }
}

/// Result of a single forecaster call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastOutcome {
    /// The method ran as designed
    Computed { forecast: Forecast },
    /// The method fell back to a simpler estimate
    Degraded { forecast: Forecast, reason: String },
    /// No usable path could be produced
    Failed { reason: String },
}

impl ForecastOutcome {
    pub fn forecast(&self) -> Option<&Forecast> {
        match self {
            ForecastOutcome::Computed { forecast } | ForecastOutcome::Degraded { forecast, .. } => {
                Some(forecast)
            }
            ForecastOutcome::Failed { .. } => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, ForecastOutcome::Computed { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ForecastOutcome::Degraded { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ForecastOutcome::Failed { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ForecastOutcome::Computed { .. } => None,
            ForecastOutcome::Degraded { reason, .. } | ForecastOutcome::Failed { reason } => {
                Some(reason)
            }
        }
    }
}

/// Weights of the three forecasters in the ensemble
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub technical: f64,
    pub ml: f64,
    pub support_resistance: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            technical: 0.3,
            ml: 0.4,
            support_resistance: 0.3,
        }
    }
}

impl EnsembleWeights {
    pub fn new(technical: f64, ml: f64, support_resistance: f64) -> Self {
        Self {
            technical,
            ml,
            support_resistance,
        }
    }

    pub fn sum(&self) -> f64 {
        self.technical + self.ml + self.support_resistance
    }

    /// Rescale so the weights sum to 1.
    ///
    /// Negative or non-finite weights, or an all-zero set, are rejected.
    pub fn normalized(&self) -> ForecastResult<Self> {
        let parts = [self.technical, self.ml, self.support_resistance];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ForecastError::InvalidWeights(format!(
                "weights must be finite and non-negative, got {:?}",
                parts
            )));
        }
        let total = self.sum();
        if total <= 0.0 {
            return Err(ForecastError::InvalidWeights(
                "weights sum to zero".to_string(),
            ));
        }
        if (total - 1.0).abs() < 1e-12 {
            return Ok(*self);
        }
        Ok(Self {
            technical: self.technical / total,
            ml: self.ml / total,
            support_resistance: self.support_resistance / total,
        })
    }

    pub fn weight_for(&self, method: ForecastMethod) -> f64 {
        match method {
            ForecastMethod::Technical => self.technical,
            ForecastMethod::MachineLearning => self.ml,
            ForecastMethod::SupportResistance => self.support_resistance,
            _ => 0.0,
        }
    }
}

/// Output of one `predict_short_term` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleResult {
    /// Outcome of each forecaster, keyed by the forecaster slot
    pub outcomes: BTreeMap<ForecastMethod, ForecastOutcome>,
    pub ensemble: Forecast,
    /// 1 − mean coefficient of variation across models, clamped to [0, 1]
    pub confidence: f64,
    /// Unclamped 1 − mean coefficient of variation
    pub price_consistency: f64,
    /// Mean per-step standard deviation across models
    pub mean_std_deviation: f64,
    /// Weights actually applied to the combined path
    pub weights: EnsembleWeights,
}

impl EnsembleResult {
    pub fn forecast(&self, method: ForecastMethod) -> Option<&Forecast> {
        self.outcomes.get(&method).and_then(|o| o.forecast())
    }

    pub fn is_fully_computed(&self) -> bool {
        self.outcomes.values().all(|o| o.is_computed())
    }
}

/// Ordinal recommendation produced by the signal scorer, strongest buy first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    LightBuy,
    Hold,
    LightSell,
    StrongSell,
}

impl Recommendation {
    /// Map a total score onto the recommendation thresholds
    pub fn from_score(total: i32) -> Self {
        if total >= 4 {
            Recommendation::StrongBuy
        } else if total >= 2 {
            Recommendation::Buy
        } else if total >= 0 {
            Recommendation::LightBuy
        } else if total >= -1 {
            Recommendation::Hold
        } else if total >= -3 {
            Recommendation::LightSell
        } else {
            Recommendation::StrongSell
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "strong buy",
            Recommendation::Buy => "buy",
            Recommendation::LightBuy => "light buy",
            Recommendation::Hold => "hold/watch",
            Recommendation::LightSell => "light sell",
            Recommendation::StrongSell => "strong sell",
        }
    }

    pub fn confidence_label(&self) -> ConfidenceLabel {
        match self {
            Recommendation::StrongBuy | Recommendation::StrongSell => ConfidenceLabel::VeryHigh,
            Recommendation::Buy => ConfidenceLabel::High,
            Recommendation::LightBuy | Recommendation::LightSell => ConfidenceLabel::Medium,
            Recommendation::Hold => ConfidenceLabel::Cautious,
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Presentational confidence bucket, not a probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLabel {
    VeryHigh,
    High,
    Medium,
    Cautious,
}

impl std::fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceLabel::VeryHigh => write!(f, "very high"),
            ConfidenceLabel::High => write!(f, "high"),
            ConfidenceLabel::Medium => write!(f, "medium"),
            ConfidenceLabel::Cautious => write!(f, "cautious"),
        }
    }
}

/// Buy/sell recommendation derived from the ensemble path and KDJ/MACD state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub recommendation: Recommendation,
    pub confidence: ConfidenceLabel,
    pub score: i32,
    pub macd_score: i32,
    pub trend_score: i32,
    pub kdj_score: i32,
    /// Ensemble trend `(last - first) / first * 100`
    pub pred_trend_pct: f64,
    pub current_k: f64,
    pub current_d: f64,
    pub current_j: f64,
}
