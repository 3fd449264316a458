//! Error types for the forecasting pipeline

use thiserror::Error;

/// Errors raised by indicators, forecasters and the ensemble.
///
/// `InsufficientData` and `ModelFit` never leave a forecaster: they are turned
/// into a degraded forecast. `InvalidParameter` inside a forecaster marks the
/// slot as failed. The rest are returned to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("Insufficient data: need {required} bars, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Model fit error: {0}")]
    ModelFit(String),

    #[error("Invalid ensemble weights: {0}")]
    InvalidWeights(String),

    #[error("Horizon must be at least one step")]
    InvalidHorizon,

    #[error("History timestamps are not strictly increasing at bar {index}")]
    UnorderedHistory { index: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("All forecasters failed: {0}")]
    TotalFailure(String),
}

pub type ForecastResult<T> = Result<T, ForecastError>;

impl ForecastError {
    /// Whether a forecaster may absorb this error by falling back to a trend line
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ForecastError::InsufficientData { .. } | ForecastError::ModelFit(_)
        )
    }
}
