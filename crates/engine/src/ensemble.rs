//! Ensemble predictor
//!
//! Runs the technical, regression and support/resistance forecasters on a
//! private copy of the history and blends their paths:
//!
//! - all three usable: weighted average with the normalized weights
//! - some failed: unweighted mean of the survivors
//! - exactly one usable: that path alone
//! - none usable: [`ForecastError::TotalFailure`]
//!
//! Confidence is `1 - mean(std / mean)` across the surviving paths, clamped to
//! [0, 1]. A single surviving path has no dispersion to measure and reports 0.5.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::{ForecastError, ForecastResult};
use crate::forecast::regression::RegressionConfig;
use crate::forecast::support_resistance::SupportResistanceConfig;
use crate::forecast::technical::TechnicalConfig;
use crate::forecast::{
    Forecaster, RegressionForecaster, SupportResistanceForecaster, TechnicalForecaster,
};
use crate::indicators::{PriceColumns, EPSILON};
use crate::scorer::{KdjConfig, MacdConfig};
use crate::types::{
    validate_history, Bar, EnsembleResult, EnsembleWeights, Forecast, ForecastMethod,
    ForecastOutcome,
};

/// Confidence reported when only one path survives
pub const SINGLE_PATH_CONFIDENCE: f64 = 0.5;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub weights: EnsembleWeights,
    /// Seed for every randomized model
    pub seed: u64,
    pub technical: TechnicalConfig,
    pub regression: RegressionConfig,
    pub support_resistance: SupportResistanceConfig,
    pub kdj: KdjConfig,
    pub macd: MacdConfig,
}

impl PredictorConfig {
    pub fn with_weights(mut self, weights: EnsembleWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

// ============================================================================
// Predictor
// ============================================================================

pub struct EnsemblePredictor {
    config: PredictorConfig,
    technical: TechnicalForecaster,
    regression: RegressionForecaster,
    support_resistance: SupportResistanceForecaster,
}

impl Default for EnsemblePredictor {
    fn default() -> Self {
        Self::new(PredictorConfig::default())
    }
}

impl EnsemblePredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            technical: TechnicalForecaster::new(config.technical.clone()),
            regression: RegressionForecaster::new(config.regression.clone()),
            support_resistance: SupportResistanceForecaster::new(config.support_resistance.clone()),
            config,
        }
    }

    fn forecasters(&self) -> [&dyn Forecaster; 3] {
        [&self.technical, &self.regression, &self.support_resistance]
    }

    /// Forecast `horizon` closes past the end of `history`
    pub fn predict_short_term(
        &self,
        history: &[Bar],
        horizon: usize,
    ) -> ForecastResult<EnsembleResult> {
        if horizon == 0 {
            return Err(ForecastError::InvalidHorizon);
        }
        validate_history(history)?;
        let weights = self.config.weights.normalized()?;
        let columns = PriceColumns::from_bars(history);

        info!(
            bars = history.len(),
            horizon,
            seed = self.config.seed,
            "Running ensemble prediction"
        );

        let mut outcomes = BTreeMap::new();
        for forecaster in self.forecasters() {
            let outcome = forecaster.forecast(&columns, horizon, self.config.seed);
            match &outcome {
                ForecastOutcome::Computed { forecast } => {
                    debug!(method = %forecaster.method(), last = ?forecast.prices.last(), "Forecast computed");
                }
                ForecastOutcome::Degraded { reason, .. } => {
                    debug!(method = %forecaster.method(), reason = %reason, "Forecast degraded");
                }
                ForecastOutcome::Failed { reason } => {
                    warn!(method = %forecaster.method(), reason = %reason, "Forecaster failed");
                }
            }
            outcomes.insert(forecaster.method(), outcome);
        }

        let result = combine(outcomes, &weights, horizon)?;
        info!(
            method = %result.ensemble.method,
            confidence = result.confidence,
            "Ensemble prediction complete"
        );
        Ok(result)
    }
}

// ============================================================================
// Combination
// ============================================================================

/// Blend per-method outcomes into an [`EnsembleResult`].
///
/// `weights` must already be normalized. Paths of the wrong length or with
/// non-finite prices are treated as failed.
pub fn combine(
    outcomes: BTreeMap<ForecastMethod, ForecastOutcome>,
    weights: &EnsembleWeights,
    horizon: usize,
) -> ForecastResult<EnsembleResult> {
    let usable: Vec<(ForecastMethod, &Forecast)> = outcomes
        .iter()
        .filter_map(|(method, outcome)| outcome.forecast().map(|f| (*method, f)))
        .filter(|(_, f)| f.is_usable() && f.len() == horizon)
        .collect();

    let (ensemble, applied) = match usable.len() {
        0 => {
            let reasons: Vec<String> = outcomes
                .iter()
                .map(|(method, outcome)| {
                    format!("{}: {}", method, outcome.reason().unwrap_or("unusable path"))
                })
                .collect();
            return Err(ForecastError::TotalFailure(reasons.join("; ")));
        }
        1 => {
            let (method, forecast) = usable[0];
            let applied = single_weight(method);
            (Forecast::new(method, forecast.prices.clone()), applied)
        }
        n if n == outcomes.len() && n == 3 => {
            let mut prices = vec![0.0; horizon];
            for (method, forecast) in &usable {
                let w = weights.weight_for(*method);
                for (acc, p) in prices.iter_mut().zip(&forecast.prices) {
                    *acc += w * p;
                }
            }
            (Forecast::new(ForecastMethod::Ensemble, prices), *weights)
        }
        n => {
            let share = 1.0 / n as f64;
            let prices = (0..horizon)
                .map(|i| usable.iter().map(|(_, f)| f.prices[i]).sum::<f64>() / n as f64)
                .collect();
            let mut applied = EnsembleWeights::new(0.0, 0.0, 0.0);
            for (method, _) in &usable {
                set_weight(&mut applied, *method, share);
            }
            (Forecast::new(ForecastMethod::SimpleAverage, prices), applied)
        }
    };

    let paths: Vec<&[f64]> = usable.iter().map(|(_, f)| f.prices.as_slice()).collect();
    let stats = dispersion(&paths);

    Ok(EnsembleResult {
        outcomes,
        ensemble,
        confidence: stats.confidence,
        price_consistency: stats.price_consistency,
        mean_std_deviation: stats.mean_std_deviation,
        weights: applied,
    })
}

fn single_weight(method: ForecastMethod) -> EnsembleWeights {
    let mut weights = EnsembleWeights::new(0.0, 0.0, 0.0);
    set_weight(&mut weights, method, 1.0);
    weights
}

fn set_weight(weights: &mut EnsembleWeights, method: ForecastMethod, value: f64) {
    match method {
        ForecastMethod::Technical => weights.technical = value,
        ForecastMethod::MachineLearning => weights.ml = value,
        ForecastMethod::SupportResistance => weights.support_resistance = value,
        _ => {}
    }
}

/// Cross-model agreement statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispersion {
    pub confidence: f64,
    pub price_consistency: f64,
    pub mean_std_deviation: f64,
}

/// Per-step population std and coefficient of variation, averaged over steps
pub fn dispersion(paths: &[&[f64]]) -> Dispersion {
    let steps = paths.iter().map(|p| p.len()).min().unwrap_or(0);
    if paths.len() < 2 || steps == 0 {
        return Dispersion {
            confidence: SINGLE_PATH_CONFIDENCE,
            price_consistency: SINGLE_PATH_CONFIDENCE,
            mean_std_deviation: 0.0,
        };
    }

    let k = paths.len() as f64;
    let mut total_cv = 0.0;
    let mut total_std = 0.0;
    for i in 0..steps {
        let column: Vec<f64> = paths.iter().map(|p| p[i]).collect();
        let max = column.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = column.iter().cloned().fold(f64::INFINITY, f64::min);
        let mean = column.iter().sum::<f64>() / k;
        let std = if max == min {
            0.0
        } else {
            (column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / k).sqrt()
        };
        let cv = if std == 0.0 {
            0.0
        } else if mean.abs() < EPSILON {
            1.0
        } else {
            std / mean.abs()
        };
        total_cv += cv;
        total_std += std;
    }

    let consistency = 1.0 - total_cv / steps as f64;
    Dispersion {
        confidence: consistency.clamp(0.0, 1.0),
        price_consistency: consistency,
        mean_std_deviation: total_std / steps as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn computed(method: ForecastMethod, prices: Vec<f64>) -> ForecastOutcome {
        ForecastOutcome::Computed {
            forecast: Forecast::new(method, prices),
        }
    }

    fn failed() -> ForecastOutcome {
        ForecastOutcome::Failed {
            reason: "no data".to_string(),
        }
    }

    fn outcomes(
        tech: ForecastOutcome,
        ml: ForecastOutcome,
        sr: ForecastOutcome,
    ) -> BTreeMap<ForecastMethod, ForecastOutcome> {
        BTreeMap::from([
            (ForecastMethod::Technical, tech),
            (ForecastMethod::MachineLearning, ml),
            (ForecastMethod::SupportResistance, sr),
        ])
    }

    #[test]
    fn test_identical_paths_full_confidence() {
        let path = vec![101.0, 102.5, 99.0];
        let result = combine(
            outcomes(
                computed(ForecastMethod::Technical, path.clone()),
                computed(ForecastMethod::MachineLearning, path.clone()),
                computed(ForecastMethod::SupportResistance, path.clone()),
            ),
            &EnsembleWeights::default(),
            3,
        )
        .unwrap();
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.mean_std_deviation, 0.0);
        assert_eq!(result.ensemble.method, ForecastMethod::Ensemble);
        for (a, b) in result.ensemble.prices.iter().zip(&path) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_large_dispersion_low_confidence() {
        let result = combine(
            outcomes(
                computed(ForecastMethod::Technical, vec![1.0, 1.0]),
                computed(ForecastMethod::MachineLearning, vec![100.0, 100.0]),
                computed(ForecastMethod::SupportResistance, vec![1000.0, 1000.0]),
            ),
            &EnsembleWeights::default(),
            2,
        )
        .unwrap();
        assert!(result.confidence < 0.01);
        assert!(result.price_consistency < 0.0);
    }

    #[test]
    fn test_weighted_average() {
        let result = combine(
            outcomes(
                computed(ForecastMethod::Technical, vec![10.0]),
                computed(ForecastMethod::MachineLearning, vec![20.0]),
                computed(ForecastMethod::SupportResistance, vec![30.0]),
            ),
            &EnsembleWeights::default(),
            1,
        )
        .unwrap();
        assert!((result.ensemble.prices[0] - 20.0).abs() < 1e-9);

        let tech_only = EnsembleWeights::new(1.0, 0.0, 0.0).normalized().unwrap();
        let result = combine(
            outcomes(
                computed(ForecastMethod::Technical, vec![10.0, 11.0]),
                computed(ForecastMethod::MachineLearning, vec![20.0, 21.0]),
                computed(ForecastMethod::SupportResistance, vec![30.0, 31.0]),
            ),
            &tech_only,
            2,
        )
        .unwrap();
        assert_eq!(result.ensemble.prices, vec![10.0, 11.0]);
    }

    #[test]
    fn test_failure_falls_back_to_simple_mean() {
        let result = combine(
            outcomes(
                computed(ForecastMethod::Technical, vec![10.0]),
                failed(),
                computed(ForecastMethod::SupportResistance, vec![30.0]),
            ),
            &EnsembleWeights::default(),
            1,
        )
        .unwrap();
        assert_eq!(result.ensemble.method, ForecastMethod::SimpleAverage);
        assert_eq!(result.ensemble.prices, vec![20.0]);
        assert_eq!(result.weights, EnsembleWeights::new(0.5, 0.0, 0.5));
    }

    #[test]
    fn test_single_survivor_used_alone() {
        let result = combine(
            outcomes(
                failed(),
                computed(ForecastMethod::MachineLearning, vec![42.0, 43.0]),
                failed(),
            ),
            &EnsembleWeights::default(),
            2,
        )
        .unwrap();
        assert_eq!(result.ensemble.method, ForecastMethod::MachineLearning);
        assert_eq!(result.ensemble.prices, vec![42.0, 43.0]);
        assert_eq!(result.confidence, SINGLE_PATH_CONFIDENCE);
    }

    #[test]
    fn test_total_failure() {
        let err = combine(
            outcomes(failed(), failed(), failed()),
            &EnsembleWeights::default(),
            2,
        )
        .unwrap_err();
        assert!(matches!(err, ForecastError::TotalFailure(_)));
    }

    #[test]
    fn test_non_finite_path_is_unusable() {
        let result = combine(
            outcomes(
                computed(ForecastMethod::Technical, vec![f64::NAN]),
                computed(ForecastMethod::MachineLearning, vec![20.0]),
                computed(ForecastMethod::SupportResistance, vec![30.0]),
            ),
            &EnsembleWeights::default(),
            1,
        )
        .unwrap();
        assert_eq!(result.ensemble.prices, vec![25.0]);
    }

    #[test]
    fn test_rejects_zero_horizon_and_bad_weights() {
        let predictor = EnsemblePredictor::default();
        assert_eq!(
            predictor.predict_short_term(&[], 0).unwrap_err(),
            ForecastError::InvalidHorizon
        );

        let config = PredictorConfig::default().with_weights(EnsembleWeights::new(0.0, 0.0, 0.0));
        let predictor = EnsemblePredictor::new(config);
        assert!(matches!(
            predictor.predict_short_term(&[], 3).unwrap_err(),
            ForecastError::InvalidWeights(_)
        ));
    }

    #[test]
    fn test_empty_history_is_total_failure() {
        let err = EnsemblePredictor::default()
            .predict_short_term(&[], 3)
            .unwrap_err();
        assert!(matches!(err, ForecastError::TotalFailure(_)));
    }
}
