//! Prediction history blob.
//!
//! Every inference appends (or overwrites) one record keyed by its feature
//! date, and backfills the actual outcome onto whichever earlier record
//! predicted this date. The blob lives in the artifact store next to the
//! processed datasets and keeps a bounded trailing window.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crudecast_pipeline::{ArtifactStore, StoreError};

use crate::error::ModelError;
use crate::types::{Direction, PredictionReport};

/// Records retained in the blob (roughly six months of trading days).
pub const HISTORY_WINDOW: usize = 120;

const HISTORY_KEY_SUFFIX: &str = "predictions/history.json";

/// One prediction, with its outcome filled in once known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub feature_date: NaiveDate,
    pub prediction_for_date: NaiveDate,
    pub reference_close: f64,
    pub predicted_delta: f64,
    pub predicted_close: f64,
    pub direction: Direction,
    pub total_abs_contribution: f64,
    pub model_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_price: Option<f64>,
}

impl PredictionRecord {
    fn from_report(report: &PredictionReport) -> Self {
        Self {
            feature_date: report.target_date,
            prediction_for_date: report.prediction_for_date,
            reference_close: report.reference_close,
            predicted_delta: report.predicted_delta,
            predicted_close: report.predicted_close,
            direction: report.direction,
            total_abs_contribution: report.total_abs_contribution,
            model_version: report.model_version.clone(),
            actual_close: None,
            actual_delta: None,
            error_delta: None,
            error_price: None,
        }
    }
}

/// What a history update did.
#[derive(Debug, Clone, Copy)]
pub struct HistoryUpdate {
    pub history_len: usize,
    /// Earlier records whose actual outcome was filled in by this update.
    pub updated_outcomes: usize,
}

/// Fold a new report into the history blob and write it back.
///
/// The new report's reference close is the realised close for any earlier
/// record that predicted this feature date, so those records get their
/// `actual_*` and `error_*` fields filled. The blob is kept sorted by
/// feature date and truncated to [`HISTORY_WINDOW`].
///
/// # Errors
///
/// Propagates store failures; a corrupt existing blob is replaced rather
/// than failing the update.
pub fn update_history(
    store: &dyn ArtifactStore,
    processed_prefix: &str,
    report: &PredictionReport,
) -> Result<HistoryUpdate, ModelError> {
    let key = format!("{processed_prefix}{HISTORY_KEY_SUFFIX}");
    let mut history = load_history(store, &key)?;

    let mut updated_outcomes = 0;
    for record in &mut history {
        if record.prediction_for_date == report.target_date && record.actual_close.is_none() {
            let actual_delta = report.reference_close - record.reference_close;
            record.actual_close = Some(report.reference_close);
            record.actual_delta = Some(actual_delta);
            record.error_delta = Some(record.predicted_delta - actual_delta);
            record.error_price = Some(record.predicted_close - report.reference_close);
            updated_outcomes += 1;
        }
    }

    let new_record = PredictionRecord::from_report(report);
    match history
        .iter_mut()
        .find(|r| r.feature_date == new_record.feature_date)
    {
        Some(existing) => *existing = new_record,
        None => history.push(new_record),
    }

    history.sort_by_key(|r| r.feature_date);
    if history.len() > HISTORY_WINDOW {
        let excess = history.len() - HISTORY_WINDOW;
        history.drain(..excess);
    }

    let payload = serde_json::to_vec(&history).map_err(|e| ModelError::Invalid {
        artifact: key.clone(),
        reason: format!("serialize: {e}"),
    })?;
    store.put(&key, &payload).map_err(ModelError::from)?;

    Ok(HistoryUpdate {
        history_len: history.len(),
        updated_outcomes,
    })
}

fn load_history(
    store: &dyn ArtifactStore,
    key: &str,
) -> Result<Vec<PredictionRecord>, ModelError> {
    match store.get(key) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(history) => Ok(history),
            Err(e) => {
                tracing::warn!(key, error = %e, "prediction history unreadable — starting fresh");
                Ok(Vec::new())
            }
        },
        Err(StoreError::NotFound(_)) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}
