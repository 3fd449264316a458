//! Per-symbol forecast summary

use serde::{Deserialize, Serialize};

use crate::types::{EnsembleResult, ForecastMethod};

/// Predicted prices relative to the current price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub current_price: f64,
    pub method: ForecastMethod,
    pub predicted_prices: Vec<f64>,
    /// `predicted - current` per step
    pub changes: Vec<f64>,
    /// `(predicted - current) / current * 100` per step
    pub change_pcts: Vec<f64>,
    pub confidence: f64,
}

impl ForecastSummary {
    pub fn new(current_price: f64, result: &EnsembleResult) -> Self {
        let predicted_prices = result.ensemble.prices.clone();
        let changes: Vec<f64> = predicted_prices.iter().map(|p| p - current_price).collect();
        let change_pcts = changes
            .iter()
            .map(|c| {
                if current_price != 0.0 {
                    c / current_price * 100.0
                } else {
                    0.0
                }
            })
            .collect();
        Self {
            current_price,
            method: result.ensemble.method,
            predicted_prices,
            changes,
            change_pcts,
            confidence: result.confidence,
        }
    }

    pub fn next_price(&self) -> Option<f64> {
        self.predicted_prices.first().copied()
    }

    pub fn next_change_pct(&self) -> Option<f64> {
        self.change_pcts.first().copied()
    }

    pub fn final_change_pct(&self) -> Option<f64> {
        self.change_pcts.last().copied()
    }
}
