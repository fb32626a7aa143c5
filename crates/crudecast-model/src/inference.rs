//! The two-stage inference engine.
//!
//! Stage one scores each universe country with its own regressor on the
//! latest feature row. Stage two folds the per-country deltas into one
//! aggregate through a temperature-scaled attention layer whose salience is
//! the country's adjacency-row sum weighted by its signal magnitude.

use std::collections::BTreeMap;

use crudecast_core::dates::next_business_day;
use crudecast_pipeline::ProcessedDataset;

use crate::bundle::ModelBundle;
use crate::error::ModelError;
use crate::types::{CountryAttribution, Direction, PredictionReport};

/// Predict the next trading day's WTI delta from the latest date in
/// `dataset`.
///
/// # Errors
///
/// - [`ModelError::SchemaMismatch`] when the dataset's feature schema is
///   not exactly the bundle's.
/// - [`ModelError::NoScorableCountries`] when no universe country has both
///   a latest row and a regressor.
/// - [`ModelError::InvariantViolation`] if the attention or the aggregate
///   comes out non-finite.
pub fn predict(
    dataset: &ProcessedDataset,
    bundle: &ModelBundle,
) -> Result<PredictionReport, ModelError> {
    check_schema(dataset, bundle)?;

    let target_date = dataset.latest_date().ok_or_else(|| {
        ModelError::NoScorableCountries("dataset has no rows".to_string())
    })?;

    // Stage one: per-country raw deltas, in universe order.
    let mut countries: Vec<&str> = Vec::new();
    let mut raw_deltas: Vec<f64> = Vec::new();
    let mut salience: Vec<f64> = Vec::new();
    let mut skipped: Vec<String> = Vec::new();

    for (index, country) in bundle.metadata.countries.iter().enumerate() {
        let Some(row) = dataset.latest_row_for(country) else {
            skipped.push(country.clone());
            continue;
        };
        let Some(regressor) = bundle.regressors.get(country) else {
            skipped.push(country.clone());
            continue;
        };

        let mut features = row.values.clone();
        bundle.scaler.transform(&mut features);
        let raw_delta = regressor.predict(&features);

        countries.push(country);
        raw_deltas.push(raw_delta);
        salience.push(bundle.adjacency.row_sum(index) * raw_delta.abs());
    }

    if countries.is_empty() {
        return Err(ModelError::NoScorableCountries(format!(
            "none of the {} universe countries had data and a regressor",
            bundle.metadata.countries.len()
        )));
    }
    if !skipped.is_empty() {
        tracing::warn!(count = skipped.len(), countries = ?skipped, "countries skipped at inference");
    }

    // Stage two: temperature softmax over salience.
    let attention = tempered_softmax(&salience, bundle.metadata.temperature);

    let mut predicted_delta = 0.0;
    let mut total_abs_contribution = 0.0;
    let mut per_country = BTreeMap::new();
    for ((country, raw_delta), weight) in countries.iter().zip(&raw_deltas).zip(&attention) {
        let contribution = raw_delta * weight;
        predicted_delta += contribution;
        total_abs_contribution += contribution.abs();
        per_country.insert(
            (*country).to_string(),
            CountryAttribution {
                raw_delta: *raw_delta,
                attention_weight: *weight,
                contribution,
                percentage: 0.0,
            },
        );
    }
    for attribution in per_country.values_mut() {
        attribution.percentage = if total_abs_contribution > 0.0 {
            attribution.contribution.abs() / total_abs_contribution * 100.0
        } else {
            0.0
        };
    }

    if !predicted_delta.is_finite() || attention.iter().any(|w| !w.is_finite()) {
        return Err(ModelError::InvariantViolation(
            "non-finite attention or aggregate delta".to_string(),
        ));
    }

    let reference_close = dataset
        .rows
        .iter()
        .rev()
        .find(|row| row.date == target_date)
        .and_then(|row| dataset.feature_value(row, "wti_price"))
        .ok_or_else(|| {
            ModelError::InvariantViolation("dataset rows lack a wti_price column".to_string())
        })?;

    Ok(PredictionReport {
        target_date,
        prediction_for_date: next_business_day(target_date),
        reference_close,
        predicted_delta,
        predicted_close: reference_close + predicted_delta,
        direction: Direction::of_delta(predicted_delta),
        per_country,
        skipped,
        total_abs_contribution,
        model_version: bundle.metadata.model_version.clone(),
    })
}

fn check_schema(dataset: &ProcessedDataset, bundle: &ModelBundle) -> Result<(), ModelError> {
    let dataset_names = &dataset.feature_names;
    let model_names = &bundle.metadata.feature_names;
    if dataset_names.len() != model_names.len() {
        return Err(ModelError::SchemaMismatch {
            reason: format!(
                "dataset has {} feature columns, model expects {}",
                dataset_names.len(),
                model_names.len()
            ),
        });
    }
    if let Some(position) = dataset_names
        .iter()
        .zip(model_names)
        .position(|(a, b)| a != b)
    {
        return Err(ModelError::SchemaMismatch {
            reason: format!(
                "feature {position} differs: dataset '{}', model '{}'",
                dataset_names[position], model_names[position]
            ),
        });
    }
    Ok(())
}

/// Numerically stable softmax with temperature.
///
/// Subtracts the max score before exponentiation. Scaling all scores and
/// the temperature by the same constant leaves the output unchanged.
pub(crate) fn tempered_softmax(scores: &[f64], temperature: f64) -> Vec<f64> {
    let t = if temperature > 0.0 { temperature } else { 1.0 };
    let max_score = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| ((s - max_score) / t).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.iter().map(|e| e / sum).collect()
    } else {
        // Degenerate scores: fall back to uniform attention.
        vec![1.0 / scores.len() as f64; scores.len()]
    }
}
