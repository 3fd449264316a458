//! Random-forest regression over lagged feature windows
//!
//! Trains on the standardized feature table and forecasts autoregressively:
//! each prediction becomes the close of a synthetic bar appended to the window
//! before the next step. Synthetic bars reuse volume, MA and RSI of the most
//! recent bar, so only close and pct change move during the horizon.

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::{debug, warn};

use super::{degrade, Forecaster};
use crate::error::{ForecastError, ForecastResult};
use crate::features::{build_table, flatten_window, roll_forward, StandardScaler};
use crate::indicators::PriceColumns;
use crate::types::{Forecast, ForecastDetail, ForecastMethod, ForecastOutcome};

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    /// Lookback window in bars
    pub window: usize,
    pub n_estimators: usize,
    /// Labelled rows required before fitting
    pub min_rows: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            window: 10,
            n_estimators: 50,
            min_rows: 10,
            max_depth: None,
            min_samples_split: 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegressionForecaster {
    config: RegressionConfig,
}

impl RegressionForecaster {
    pub fn new(config: RegressionConfig) -> Self {
        Self { config }
    }

    fn compute(&self, history: &PriceColumns, horizon: usize, seed: u64) -> ForecastResult<Forecast> {
        let cfg = &self.config;
        let table = build_table(history, cfg.window, cfg.min_rows)?;
        if table
            .rows
            .iter()
            .flatten()
            .chain(table.targets.iter())
            .any(|v| !v.is_finite())
        {
            return Err(ForecastError::ModelFit(
                "feature table contains non-finite values".to_string(),
            ));
        }

        let scaler = StandardScaler::fit(&table.rows)?;
        let n_features = table.n_features();
        let x_data: Vec<f64> = scaler.transform(&table.rows).into_iter().flatten().collect();
        let x = DenseMatrix::new(table.n_rows(), n_features, x_data, false);

        let mut params = RandomForestRegressorParameters::default()
            .with_n_trees(cfg.n_estimators.max(1))
            .with_m(n_features)
            .with_min_samples_split(cfg.min_samples_split.max(2))
            .with_seed(seed);
        if let Some(depth) = cfg.max_depth {
            params = params.with_max_depth(depth);
        }

        let model: Forest = RandomForestRegressor::fit(&x, &table.targets, params)
            .map_err(|e| ForecastError::ModelFit(e.to_string()))?;

        let mut window = table.last_window().to_vec();
        let mut prices = Vec::with_capacity(horizon);
        for step in 0..horizon {
            let row = scaler.transform_row(&flatten_window(&window));
            let x_next = DenseMatrix::new(1, n_features, row, false);
            let predicted = model
                .predict(&x_next)
                .map_err(|e| ForecastError::ModelFit(e.to_string()))?
                .first()
                .copied()
                .unwrap_or(f64::NAN);
            if !predicted.is_finite() {
                warn!(step, "Regression produced a non-finite prediction");
                return Err(ForecastError::ModelFit(format!(
                    "non-finite prediction at step {}",
                    step + 1
                )));
            }
            prices.push(predicted);

            let last = match window.last() {
                Some(last) => *last,
                None => break,
            };
            window.remove(0);
            window.push(roll_forward(&last, predicted));
        }

        debug!(
            rows = table.n_rows(),
            features = n_features,
            trees = cfg.n_estimators,
            seed,
            "Regression forecast complete"
        );
        Ok(Forecast::new(ForecastMethod::MachineLearning, prices).with_detail(
            ForecastDetail::Regression {
                training_rows: table.n_rows(),
                n_estimators: cfg.n_estimators,
            },
        ))
    }
}

impl Forecaster for RegressionForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::MachineLearning
    }

    fn forecast(&self, history: &PriceColumns, horizon: usize, seed: u64) -> ForecastOutcome {
        match self.compute(history, horizon, seed) {
            Ok(forecast) => ForecastOutcome::Computed { forecast },
            Err(err) => degrade(self.method(), history, horizon, err),
        }
    }
}
