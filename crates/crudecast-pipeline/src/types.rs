use chrono::NaiveDate;
use crudecast_gdelt::ThemeCategory;

use crate::names;

/// One cell of the aligned country x day grid.
///
/// Event fields are zero for silent days; price fields are forward-filled
/// from the most recent prior trading day.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRow {
    pub country: String,
    pub date: NaiveDate,
    pub event_count: u64,
    pub avg_tone: f64,
    pub tone_std: f64,
    pub unique_sources: u64,
    pub theme_counts: [u64; ThemeCategory::COUNT],
    pub wti_price: f64,
    pub brent_price: f64,
}

/// One engineered row: the canonical feature vector for a country x day.
///
/// `values` is ordered exactly as [`names::feature_names`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub country: String,
    pub date: NaiveDate,
    pub values: Vec<f64>,
}

/// The immutable per-day publication of feature rows.
///
/// Rows keep the aligner's lexicographic `(country, date)` order. The
/// content hash is derived from the canonical JSON payload, so identical
/// inputs hash identically across runs.
#[derive(Debug, Clone)]
pub struct ProcessedDataset {
    pub target_date: NaiveDate,
    pub feature_names: Vec<String>,
    pub rows: Vec<FeatureRow>,
    /// Countries with fewer than [`names::MAX_LOOKBACK`] rows; their early
    /// features are zero-filled rather than history-backed.
    pub cold_start: Vec<String>,
}

impl ProcessedDataset {
    /// Assemble a dataset, deriving the cold-start list from row counts.
    #[must_use]
    pub fn new(target_date: NaiveDate, rows: Vec<FeatureRow>) -> Self {
        let mut counts: std::collections::BTreeMap<&str, usize> = std::collections::BTreeMap::new();
        for row in &rows {
            *counts.entry(row.country.as_str()).or_default() += 1;
        }
        let cold_start = counts
            .iter()
            .filter(|(_, n)| **n < names::MAX_LOOKBACK)
            .map(|(c, _)| (*c).to_string())
            .collect();

        Self {
            target_date,
            feature_names: names::feature_names(),
            rows,
            cold_start,
        }
    }

    /// Latest date present in the dataset, if any.
    #[must_use]
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.date).max()
    }

    /// Last row (in grid order) for `country` on the latest date.
    #[must_use]
    pub fn latest_row_for(&self, country: &str) -> Option<&FeatureRow> {
        let latest = self.latest_date()?;
        self.rows
            .iter()
            .rev()
            .find(|r| r.date == latest && r.country == country)
    }

    /// Value of a named feature in a row, by schema position.
    #[must_use]
    pub fn feature_value(&self, row: &FeatureRow, name: &str) -> Option<f64> {
        let idx = self.feature_names.iter().position(|n| n == name)?;
        row.values.get(idx).copied()
    }
}
