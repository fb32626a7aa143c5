use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Bundle metadata pinning the feature schema and the country universe.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelMetadata {
    /// Feature ordering the regressors and scaler were trained against.
    pub feature_names: Vec<String>,
    pub model_version: String,
    /// Attention softmax temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// The universe U, in adjacency row order.
    pub countries: Vec<String>,
}

fn default_temperature() -> f64 {
    0.25
}

/// Sign of the aggregate prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN")]
    Down,
    #[serde(rename = "FLAT")]
    Flat,
}

impl Direction {
    #[must_use]
    pub fn of_delta(delta: f64) -> Self {
        if delta > 0.0 {
            Self::Up
        } else if delta < 0.0 {
            Self::Down
        } else {
            Self::Flat
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Flat => "FLAT",
        };
        f.write_str(name)
    }
}

/// One country's share of the aggregate prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountryAttribution {
    /// The country regressor's unweighted delta.
    pub raw_delta: f64,
    /// Normalized attention; sums to 1 across scored countries.
    pub attention_weight: f64,
    /// `raw_delta * attention_weight`.
    pub contribution: f64,
    /// `|contribution|` as a share of the total, in percent.
    pub percentage: f64,
}

/// The inference engine's output for one feature date.
#[derive(Debug, Clone)]
pub struct PredictionReport {
    /// Date of the features the prediction was made from.
    pub target_date: NaiveDate,
    /// The trading day the delta applies to.
    pub prediction_for_date: NaiveDate,
    /// Last WTI close in the dataset.
    pub reference_close: f64,
    pub predicted_delta: f64,
    pub predicted_close: f64,
    pub direction: Direction,
    /// Attribution per scored country.
    pub per_country: BTreeMap<String, CountryAttribution>,
    /// Universe countries that could not be scored (absent from the dataset
    /// or without a regressor).
    pub skipped: Vec<String>,
    pub total_abs_contribution: f64,
    pub model_version: String,
}

impl PredictionReport {
    /// The `n` largest contributors by absolute contribution.
    #[must_use]
    pub fn top_contributors(&self, n: usize) -> Vec<(&str, &CountryAttribution)> {
        let mut entries: Vec<_> = self
            .per_country
            .iter()
            .map(|(country, attribution)| (country.as_str(), attribution))
            .collect();
        entries.sort_by(|a, b| {
            b.1.contribution
                .abs()
                .partial_cmp(&a.1.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries.truncate(n);
        entries
    }
}
