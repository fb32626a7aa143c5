//! Artifact storage: the capability trait, the filesystem implementation,
//! and the dataset codec.
//!
//! Keys are object-store style (`/`-separated, sortable); the filesystem
//! implementation maps them onto paths under a root directory. Publication
//! is write-to-temp plus atomic rename, so a concurrent reader sees either
//! the old artifact or the new one, never a torn write.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::names;
use crate::types::{FeatureRow, ProcessedDataset};

/// Object-store access: list/get/put.
///
/// Implementations are shared behind `Arc` and must tolerate concurrent
/// readers; `put` must be atomic per key.
pub trait ArtifactStore: Send + Sync {
    /// Keys under `prefix`, sorted ascending.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Filesystem-backed store rooted at a directory.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/') {
            path.push(part);
        }
        path
    }

    fn collect_keys(
        &self,
        dir: &Path,
        rel: &str,
        keys: &mut Vec<String>,
    ) -> Result<(), StoreError> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let child_rel = if rel.is_empty() {
                name.clone()
            } else {
                format!("{rel}/{name}")
            };
            if entry.file_type()?.is_dir() {
                self.collect_keys(&entry.path(), &child_rel, keys)?;
            } else {
                keys.push(child_rel);
            }
        }
        Ok(())
    }
}

impl ArtifactStore for FsStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        self.collect_keys(&self.root, "", &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tmp_name.push_str(".tmp");
        let tmp = path.with_file_name(tmp_name);
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Result of a dataset publication.
#[derive(Debug, Clone)]
pub struct PublishedArtifact {
    pub key: String,
    pub content_hash: String,
}

/// Dataset-level operations on top of an [`ArtifactStore`].
#[derive(Clone)]
pub struct DatasetStore {
    store: Arc<dyn ArtifactStore>,
    prefix: String,
}

const DATASET_STEM: &str = "final_aligned_data_";
const DATASET_SUFFIX: &str = ".json.gz";

impl DatasetStore {
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>, prefix: &str) -> Self {
        Self {
            store,
            prefix: prefix.to_string(),
        }
    }

    /// The store key for a target date.
    #[must_use]
    pub fn key_for(&self, date: NaiveDate) -> String {
        format!(
            "{}{}{}{}",
            self.prefix,
            DATASET_STEM,
            date.format("%Y%m%d"),
            DATASET_SUFFIX
        )
    }

    /// Serialize and publish a dataset, overwriting any prior publication
    /// for the same date atomically.
    ///
    /// # Errors
    ///
    /// Propagates store write failures.
    pub fn publish(&self, dataset: &ProcessedDataset) -> Result<PublishedArtifact, StoreError> {
        let key = self.key_for(dataset.target_date);
        let json = encode_rows(dataset);
        let content_hash = hex_sha256(&json);

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        let compressed = encoder.finish()?;

        self.store.put(&key, &compressed)?;
        Ok(PublishedArtifact { key, content_hash })
    }

    /// Content hash a dataset would publish under, without writing.
    #[must_use]
    pub fn content_hash(dataset: &ProcessedDataset) -> String {
        hex_sha256(&encode_rows(dataset))
    }

    /// Load the dataset published for `date`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when absent, [`StoreError::Corrupt`] when
    /// the payload does not decode to the canonical schema.
    pub fn load_for(&self, date: NaiveDate) -> Result<ProcessedDataset, StoreError> {
        let key = self.key_for(date);
        let bytes = self.store.get(&key)?;
        decode_dataset(&key, &bytes, date)
    }

    /// Load the dataset with the lexicographically greatest key.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when nothing has been published yet.
    pub fn load_latest(&self) -> Result<ProcessedDataset, StoreError> {
        let keys = self.store.list(&self.prefix)?;
        let latest = keys
            .into_iter()
            .filter(|k| self.date_of_key(k).is_some())
            .max()
            .ok_or_else(|| StoreError::NotFound(format!("{}{DATASET_STEM}*", self.prefix)))?;
        let date = self
            .date_of_key(&latest)
            .ok_or_else(|| StoreError::Corrupt {
                key: latest.clone(),
                reason: "undated dataset key".to_string(),
            })?;
        let bytes = self.store.get(&latest)?;
        decode_dataset(&latest, &bytes, date)
    }

    /// Target dates of all published datasets, ascending.
    ///
    /// # Errors
    ///
    /// Propagates store listing failures.
    pub fn published_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let keys = self.store.list(&self.prefix)?;
        Ok(keys.iter().filter_map(|k| self.date_of_key(k)).collect())
    }

    fn date_of_key(&self, key: &str) -> Option<NaiveDate> {
        let stem = key
            .strip_prefix(&self.prefix)?
            .strip_prefix(DATASET_STEM)?
            .strip_suffix(DATASET_SUFFIX)?;
        NaiveDate::parse_from_str(stem, "%Y%m%d").ok()
    }
}

/// Canonical JSON payload: an array of row objects, keys sorted, one object
/// per feature row with `date` and `country` alongside the feature fields.
fn encode_rows(dataset: &ProcessedDataset) -> Vec<u8> {
    let rows: Vec<serde_json::Value> = dataset
        .rows
        .iter()
        .map(|row| {
            let mut fields: BTreeMap<String, serde_json::Value> = BTreeMap::new();
            fields.insert(
                "date".to_string(),
                serde_json::Value::String(row.date.format("%Y-%m-%d").to_string()),
            );
            fields.insert(
                "country".to_string(),
                serde_json::Value::String(row.country.clone()),
            );
            for (name, value) in dataset.feature_names.iter().zip(&row.values) {
                fields.insert(name.clone(), json_number(*value));
            }
            serde_json::Value::Object(fields.into_iter().collect())
        })
        .collect();
    serde_json::to_vec(&rows).unwrap_or_default()
}

/// Finite-only numeric encoding; the engineer guarantees no NaN/inf reach
/// serialization, and 0 stands in if one ever does.
fn json_number(value: f64) -> serde_json::Value {
    serde_json::Number::from_f64(if value.is_finite() { value } else { 0.0 })
        .map_or(serde_json::Value::Null, serde_json::Value::Number)
}

fn decode_dataset(
    key: &str,
    compressed: &[u8],
    target_date: NaiveDate,
) -> Result<ProcessedDataset, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        key: key.to_string(),
        reason,
    };

    let mut decoder = GzDecoder::new(compressed);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| corrupt(format!("gzip: {e}")))?;

    let raw: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_slice(&json).map_err(|e| corrupt(format!("json: {e}")))?;

    let expected_names = names::feature_names();
    let mut rows = Vec::with_capacity(raw.len());
    for object in &raw {
        if object.len() != expected_names.len() + 2 {
            return Err(corrupt(format!(
                "row has {} fields, expected {}",
                object.len(),
                expected_names.len() + 2
            )));
        }
        let date = object
            .get("date")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .ok_or_else(|| corrupt("missing or invalid date field".to_string()))?;
        let country = object
            .get("country")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| corrupt("missing country field".to_string()))?
            .to_string();

        let mut values = Vec::with_capacity(expected_names.len());
        for name in &expected_names {
            let value = object
                .get(name)
                .and_then(serde_json::Value::as_f64)
                .ok_or_else(|| corrupt(format!("missing feature field {name}")))?;
            values.push(value);
        }
        rows.push(FeatureRow {
            country,
            date,
            values,
        });
    }

    Ok(ProcessedDataset::new(target_date, rows))
}

fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
