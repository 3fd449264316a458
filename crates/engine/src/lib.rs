//! Stockcast Engine - multi-model short-term price forecasting
//!
//! Provides:
//! - Indicator library (KDJ, ATR, MACD, RSI, moving averages, Bollinger, pivots)
//! - Technical, random-forest and support/resistance forecasters
//! - Weighted ensemble with a dispersion-based confidence score
//! - KDJ/MACD/trend trading signal scorer
//! - History providers (Binance public klines, JSON files)

pub mod api;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod forecast;
pub mod indicators;
pub mod projection;
pub mod scorer;
pub mod seed;
pub mod summary;
pub mod types;

// Re-exports for convenience
pub use api::{BinanceClient, FileHistoryProvider, HistoryProvider, HistoryRequest};
pub use ensemble::{EnsemblePredictor, PredictorConfig};
pub use error::{ForecastError, ForecastResult};
pub use forecast::{
    Forecaster, RegressionForecaster, SupportResistanceForecaster, TechnicalForecaster,
};
pub use projection::{project_bars, ProjectionConfig};
pub use scorer::SignalScorer;
pub use seed::seed_from_symbol;
pub use summary::ForecastSummary;
pub use types::*;
