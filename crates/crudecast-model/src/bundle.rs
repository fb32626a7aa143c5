//! Model bundle loading and process-wide memoisation.
//!
//! A bundle lives under `trained_models/<run_id>/artifacts/` in the
//! artifact store: `metadata.json`, `scaler.json`, `adjacency.json`, and
//! one `regressor_<CCC>.json` per country. Everything is immutable after
//! load and shared behind `Arc` across concurrent inference calls.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crudecast_pipeline::{ArtifactStore, StoreError};

use crate::error::ModelError;
use crate::regressor::{load_regressor, Regressor};
use crate::scaler::FeatureScaler;
use crate::types::ModelMetadata;

/// Square adjacency matrix over the universe, with precomputed row sums.
#[derive(Debug, Clone)]
pub struct Adjacency {
    rows: Vec<Vec<f64>>,
    row_sums: Vec<f64>,
}

impl Adjacency {
    /// Validate an N x N matrix for a universe of `n` countries.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] when the matrix is not N x N.
    pub fn new(rows: Vec<Vec<f64>>, n: usize) -> Result<Self, ModelError> {
        if rows.len() != n || rows.iter().any(|row| row.len() != n) {
            return Err(ModelError::Invalid {
                artifact: "adjacency.json".to_string(),
                reason: format!("expected a {n}x{n} matrix"),
            });
        }
        let row_sums = rows.iter().map(|row| row.iter().sum()).collect();
        Ok(Self { rows, row_sums })
    }

    /// Sum of one country's adjacency row (its graph centrality).
    #[must_use]
    pub fn row_sum(&self, index: usize) -> f64 {
        self.row_sums.get(index).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn n(&self) -> usize {
        self.rows.len()
    }
}

/// The immutable trained-model bundle.
pub struct ModelBundle {
    pub run_id: String,
    pub metadata: ModelMetadata,
    pub scaler: FeatureScaler,
    pub adjacency: Adjacency,
    /// Per-country regressors; universe countries without one are skipped
    /// at inference.
    pub regressors: BTreeMap<String, Arc<dyn Regressor>>,
}

impl ModelBundle {
    /// Load only the metadata of a run (cheap; used for the universe).
    ///
    /// # Errors
    ///
    /// [`ModelError::Missing`] when the run or its metadata is absent,
    /// [`ModelError::Invalid`] when it does not parse.
    pub fn load_metadata(
        store: &dyn ArtifactStore,
        models_prefix: &str,
        run_id: &str,
    ) -> Result<ModelMetadata, ModelError> {
        let key = artifact_key(models_prefix, run_id, "metadata.json");
        let bytes = get_required(store, &key, run_id, "metadata.json")?;
        let metadata: ModelMetadata =
            serde_json::from_slice(&bytes).map_err(|e| ModelError::Invalid {
                artifact: key,
                reason: format!("JSON parse error: {e}"),
            })?;
        if metadata.countries.is_empty() {
            return Err(ModelError::Invalid {
                artifact: "metadata.json".to_string(),
                reason: "empty country universe".to_string(),
            });
        }
        if metadata.feature_names.is_empty() {
            return Err(ModelError::Invalid {
                artifact: "metadata.json".to_string(),
                reason: "empty feature list".to_string(),
            });
        }
        Ok(metadata)
    }

    /// Load a full bundle for `run_id`.
    ///
    /// A missing per-country regressor is a warning (the country is skipped
    /// at inference); a missing scaler, adjacency, or metadata is fatal, as
    /// is a bundle with no regressors at all.
    ///
    /// # Errors
    ///
    /// [`ModelError::Missing`] / [`ModelError::Invalid`] per artifact.
    pub fn load(
        store: &dyn ArtifactStore,
        models_prefix: &str,
        run_id: &str,
    ) -> Result<Self, ModelError> {
        let metadata = Self::load_metadata(store, models_prefix, run_id)?;

        let scaler_key = artifact_key(models_prefix, run_id, "scaler.json");
        let scaler = FeatureScaler::from_json(
            &scaler_key,
            &get_required(store, &scaler_key, run_id, "scaler.json")?,
        )?;
        if scaler.n_features() != metadata.feature_names.len() {
            return Err(ModelError::Invalid {
                artifact: scaler_key,
                reason: format!(
                    "scaler covers {} features, metadata lists {}",
                    scaler.n_features(),
                    metadata.feature_names.len()
                ),
            });
        }

        let adjacency_key = artifact_key(models_prefix, run_id, "adjacency.json");
        let raw: Vec<Vec<f64>> = serde_json::from_slice(&get_required(
            store,
            &adjacency_key,
            run_id,
            "adjacency.json",
        )?)
        .map_err(|e| ModelError::Invalid {
            artifact: adjacency_key,
            reason: format!("JSON parse error: {e}"),
        })?;
        let adjacency = Adjacency::new(raw, metadata.countries.len())?;

        let mut regressors: BTreeMap<String, Arc<dyn Regressor>> = BTreeMap::new();
        for country in &metadata.countries {
            let name = format!("regressor_{country}.json");
            let key = artifact_key(models_prefix, run_id, &name);
            match store.get(&key) {
                Ok(bytes) => {
                    let regressor = load_regressor(&key, &bytes)?;
                    regressors.insert(country.clone(), Arc::from(regressor));
                }
                Err(StoreError::NotFound(_)) => {
                    tracing::warn!(%country, run_id, "no regressor artifact — country will be skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        if regressors.is_empty() {
            return Err(ModelError::Missing {
                run_id: run_id.to_string(),
                artifact: "any regressor_<country>.json".to_string(),
            });
        }

        tracing::info!(
            run_id,
            countries = metadata.countries.len(),
            regressors = regressors.len(),
            version = %metadata.model_version,
            "model bundle loaded"
        );

        Ok(Self {
            run_id: run_id.to_string(),
            metadata,
            scaler,
            adjacency,
            regressors,
        })
    }
}

fn artifact_key(models_prefix: &str, run_id: &str, name: &str) -> String {
    format!("{models_prefix}{run_id}/artifacts/{name}")
}

fn get_required(
    store: &dyn ArtifactStore,
    key: &str,
    run_id: &str,
    artifact: &str,
) -> Result<Vec<u8>, ModelError> {
    match store.get(key) {
        Ok(bytes) => Ok(bytes),
        Err(StoreError::NotFound(_)) => Err(ModelError::Missing {
            run_id: run_id.to_string(),
            artifact: artifact.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Load-once memoisation of the bundle for the process lifetime.
///
/// Initialised lazily on first use and released when the owning context is
/// dropped at shutdown.
#[derive(Default)]
pub struct ModelCache {
    bundle: Mutex<Option<Arc<ModelBundle>>>,
}

impl ModelCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The memoised bundle, loading it on first call.
    ///
    /// # Errors
    ///
    /// Propagates [`ModelBundle::load`] failures; failures are not cached,
    /// so a later call retries.
    pub fn load_or_init(
        &self,
        store: &dyn ArtifactStore,
        models_prefix: &str,
        run_id: &str,
    ) -> Result<Arc<ModelBundle>, ModelError> {
        let mut slot = self
            .bundle
            .lock()
            .map_err(|_| ModelError::InvariantViolation("model cache lock poisoned".to_string()))?;
        if let Some(bundle) = slot.as_ref() {
            return Ok(Arc::clone(bundle));
        }
        let bundle = Arc::new(ModelBundle::load(store, models_prefix, run_id)?);
        *slot = Some(Arc::clone(&bundle));
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crudecast_pipeline::{ArtifactStore as _, FsStore};

    fn write_bundle(store: &FsStore, run_id: &str, countries: &[&str], n_features: usize) {
        let metadata = serde_json::json!({
            "feature_names": (0..n_features).map(|i| format!("f{i}")).collect::<Vec<_>>(),
            "model_version": run_id,
            "temperature": 0.25,
            "countries": countries,
        });
        store
            .put(
                &format!("trained_models/{run_id}/artifacts/metadata.json"),
                &serde_json::to_vec(&metadata).unwrap(),
            )
            .unwrap();

        let scaler = serde_json::json!({
            "mean": vec![0.0; n_features],
            "scale": vec![1.0; n_features],
        });
        store
            .put(
                &format!("trained_models/{run_id}/artifacts/scaler.json"),
                &serde_json::to_vec(&scaler).unwrap(),
            )
            .unwrap();

        let n = countries.len();
        let adjacency: Vec<Vec<f64>> = (0..n).map(|_| vec![1.0; n]).collect();
        store
            .put(
                &format!("trained_models/{run_id}/artifacts/adjacency.json"),
                &serde_json::to_vec(&adjacency).unwrap(),
            )
            .unwrap();

        for country in countries {
            let regressor = serde_json::json!({
                "model_type": "linear",
                "coefficients": vec![0.1; n_features],
                "intercept": 0.0,
            });
            store
                .put(
                    &format!("trained_models/{run_id}/artifacts/regressor_{country}.json"),
                    &serde_json::to_vec(&regressor).unwrap(),
                )
                .unwrap();
        }
    }

    #[test]
    fn load_reads_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        write_bundle(&store, "run_1", &["SAU", "USA"], 4);

        let bundle = ModelBundle::load(&store, "trained_models/", "run_1").unwrap();
        assert_eq!(bundle.metadata.countries, vec!["SAU", "USA"]);
        assert_eq!(bundle.regressors.len(), 2);
        assert_eq!(bundle.adjacency.n(), 2);
        assert!((bundle.adjacency.row_sum(0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn missing_run_is_model_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let result = ModelBundle::load(&store, "trained_models/", "run_missing");
        assert!(matches!(result, Err(ModelError::Missing { .. })));
    }

    #[test]
    fn missing_country_regressor_is_skipped_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        write_bundle(&store, "run_1", &["SAU", "USA"], 4);
        // Remove one regressor after the fact.
        std::fs::remove_file(
            dir.path()
                .join("trained_models/run_1/artifacts/regressor_SAU.json"),
        )
        .unwrap();

        let bundle = ModelBundle::load(&store, "trained_models/", "run_1").unwrap();
        assert_eq!(bundle.regressors.len(), 1);
        assert!(bundle.regressors.contains_key("USA"));
    }

    #[test]
    fn scaler_feature_count_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        write_bundle(&store, "run_1", &["USA"], 4);
        store
            .put(
                "trained_models/run_1/artifacts/scaler.json",
                br#"{"mean": [0.0], "scale": [1.0]}"#,
            )
            .unwrap();
        let result = ModelBundle::load(&store, "trained_models/", "run_1");
        assert!(matches!(result, Err(ModelError::Invalid { .. })));
    }

    #[test]
    fn non_square_adjacency_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        write_bundle(&store, "run_1", &["SAU", "USA"], 4);
        store
            .put(
                "trained_models/run_1/artifacts/adjacency.json",
                b"[[1.0, 2.0]]",
            )
            .unwrap();
        let result = ModelBundle::load(&store, "trained_models/", "run_1");
        assert!(matches!(result, Err(ModelError::Invalid { .. })));
    }

    #[test]
    fn cache_loads_once_and_shares() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        write_bundle(&store, "run_1", &["USA"], 4);

        let cache = ModelCache::new();
        let a = cache
            .load_or_init(&store, "trained_models/", "run_1")
            .unwrap();
        // Corrupt the metadata on disk; the cached bundle must still serve.
        store
            .put("trained_models/run_1/artifacts/metadata.json", b"{}")
            .unwrap();
        let b = cache
            .load_or_init(&store, "trained_models/", "run_1")
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
