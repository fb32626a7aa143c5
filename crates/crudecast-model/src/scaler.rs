//! Affine per-feature scaler.

use serde::Deserialize;

use crate::error::ModelError;

#[derive(Debug, Deserialize)]
struct ScalerJson {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

/// Per-feature affine transform: `x' = (x - mean) / scale`.
///
/// A zero scale entry (a constant training column) passes the centred value
/// through unscaled instead of dividing by zero.
#[derive(Debug, Clone)]
pub struct FeatureScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl FeatureScaler {
    /// Parse and validate a scaler artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] on malformed JSON or mismatched
    /// vector lengths.
    pub fn from_json(artifact: &str, json: &[u8]) -> Result<Self, ModelError> {
        let invalid = |reason: String| ModelError::Invalid {
            artifact: artifact.to_string(),
            reason,
        };
        let scaler: ScalerJson =
            serde_json::from_slice(json).map_err(|e| invalid(format!("JSON parse error: {e}")))?;
        if scaler.mean.len() != scaler.scale.len() {
            return Err(invalid(format!(
                "mean has {} entries, scale has {}",
                scaler.mean.len(),
                scaler.scale.len()
            )));
        }
        if scaler.mean.is_empty() {
            return Err(invalid("empty scaler".to_string()));
        }
        Ok(Self {
            mean: scaler.mean,
            scale: scaler.scale,
        })
    }

    /// Identity scaler for `n` features.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self {
            mean: vec![0.0; n],
            scale: vec![1.0; n],
        }
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Scale a feature vector in place.
    pub fn transform(&self, features: &mut [f64]) {
        for (i, value) in features.iter_mut().enumerate() {
            let mean = self.mean.get(i).copied().unwrap_or(0.0);
            let scale = self.scale.get(i).copied().unwrap_or(1.0);
            let denom = if scale == 0.0 { 1.0 } else { scale };
            *value = (*value - mean) / denom;
        }
    }
}
