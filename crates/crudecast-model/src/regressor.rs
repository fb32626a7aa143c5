//! Per-country regressors loaded from exported JSON artifacts.
//!
//! The trained artifacts are opaque to the rest of the system: everything
//! downstream depends only on the "scalar delta from a fixed-length feature
//! vector" capability. A tagged `model_type` field selects the concrete
//! implementation at load time.
//!
//! The gradient-boosted format mirrors a standard sklearn export: staged
//! regression trees as flat node arrays, a learning rate, and an initial
//! prediction. Traversal sends NaN and `<= threshold` left.

use serde::Deserialize;

use crate::error::ModelError;

/// Scalar-prediction capability shared by all regressor kinds.
pub trait Regressor: Send + Sync {
    /// Predict a price delta from a scaled feature vector.
    fn predict(&self, features: &[f64]) -> f64;

    /// Number of features the regressor was trained on.
    fn n_features(&self) -> usize;
}

/// A single node in a regression tree.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeNode {
    /// Feature index to split on; -1 marks a leaf.
    pub feature: i32,
    pub threshold: f64,
    /// Child indices; -1 on leaves.
    pub left: i32,
    pub right: i32,
    /// Leaf prediction; `None` on internal nodes.
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TreeJson {
    nodes: Vec<TreeNode>,
}

#[derive(Debug, Deserialize)]
struct GradientBoostedJson {
    model_type: String,
    n_features: usize,
    n_estimators: usize,
    learning_rate: f64,
    /// Initial prediction (the training-set mean target).
    init_value: f64,
    stages: Vec<TreeJson>,
}

/// Gradient-boosted regression trees loaded from a JSON export.
#[derive(Debug, Clone)]
pub struct GradientBoostedRegressor {
    n_features: usize,
    learning_rate: f64,
    init_value: f64,
    stages: Vec<Vec<TreeNode>>,
}

impl GradientBoostedRegressor {
    /// Parse and validate an exported model.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] on a wrong tag, malformed JSON, or
    /// inconsistent stage/estimator counts.
    pub fn from_json(artifact: &str, json: &[u8]) -> Result<Self, ModelError> {
        let invalid = |reason: String| ModelError::Invalid {
            artifact: artifact.to_string(),
            reason,
        };

        let model: GradientBoostedJson =
            serde_json::from_slice(json).map_err(|e| invalid(format!("JSON parse error: {e}")))?;

        if model.model_type != "gradient_boosted" {
            return Err(invalid(format!(
                "expected model_type 'gradient_boosted', got '{}'",
                model.model_type
            )));
        }
        if model.n_features == 0 {
            return Err(invalid("n_features must be positive".to_string()));
        }
        if model.stages.len() != model.n_estimators {
            return Err(invalid(format!(
                "n_estimators ({}) does not match stages count ({})",
                model.n_estimators,
                model.stages.len()
            )));
        }
        if model.learning_rate <= 0.0 || model.learning_rate > 1.0 {
            return Err(invalid(format!(
                "learning_rate {} outside (0, 1]",
                model.learning_rate
            )));
        }
        for (i, stage) in model.stages.iter().enumerate() {
            if stage.nodes.is_empty() {
                return Err(invalid(format!("stage {i} has no nodes")));
            }
        }

        Ok(Self {
            n_features: model.n_features,
            learning_rate: model.learning_rate,
            init_value: model.init_value,
            stages: model.stages.into_iter().map(|t| t.nodes).collect(),
        })
    }

    /// Traverse one tree to its leaf value.
    #[inline]
    fn traverse(nodes: &[TreeNode], features: &[f64]) -> f64 {
        let mut node_idx = 0usize;
        loop {
            let node = &nodes[node_idx];
            if node.feature < 0 {
                return node.value.unwrap_or(0.0);
            }
            let feature_val = features
                .get(node.feature as usize)
                .copied()
                .unwrap_or(f64::NAN);
            // NaN or <= threshold goes left.
            if feature_val.is_nan() || feature_val <= node.threshold {
                node_idx = node.left as usize;
            } else {
                node_idx = node.right as usize;
            }
        }
    }
}

impl Regressor for GradientBoostedRegressor {
    fn predict(&self, features: &[f64]) -> f64 {
        let mut prediction = self.init_value;
        for stage in &self.stages {
            prediction += self.learning_rate * Self::traverse(stage, features);
        }
        prediction
    }

    fn n_features(&self) -> usize {
        self.n_features
    }
}

#[derive(Debug, Deserialize)]
struct LinearJson {
    model_type: String,
    coefficients: Vec<f64>,
    intercept: f64,
}

/// Plain linear regressor; the fallback artifact kind.
#[derive(Debug, Clone)]
pub struct LinearRegressor {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearRegressor {
    /// Parse and validate an exported linear model.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] on a wrong tag or malformed JSON.
    pub fn from_json(artifact: &str, json: &[u8]) -> Result<Self, ModelError> {
        let invalid = |reason: String| ModelError::Invalid {
            artifact: artifact.to_string(),
            reason,
        };
        let model: LinearJson =
            serde_json::from_slice(json).map_err(|e| invalid(format!("JSON parse error: {e}")))?;
        if model.model_type != "linear" {
            return Err(invalid(format!(
                "expected model_type 'linear', got '{}'",
                model.model_type
            )));
        }
        if model.coefficients.is_empty() {
            return Err(invalid("empty coefficient vector".to_string()));
        }
        Ok(Self {
            coefficients: model.coefficients,
            intercept: model.intercept,
        })
    }
}

impl Regressor for LinearRegressor {
    fn predict(&self, features: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(c, f)| c * f)
                .sum::<f64>()
    }

    fn n_features(&self) -> usize {
        self.coefficients.len()
    }
}

#[derive(Debug, Deserialize)]
struct TaggedArtifact {
    model_type: String,
}

/// Load a regressor artifact, dispatching on its `model_type` tag.
///
/// # Errors
///
/// Returns [`ModelError::Invalid`] for unknown tags or malformed payloads.
pub fn load_regressor(artifact: &str, json: &[u8]) -> Result<Box<dyn Regressor>, ModelError> {
    let tagged: TaggedArtifact =
        serde_json::from_slice(json).map_err(|e| ModelError::Invalid {
            artifact: artifact.to_string(),
            reason: format!("JSON parse error: {e}"),
        })?;
    match tagged.model_type.as_str() {
        "gradient_boosted" => Ok(Box::new(GradientBoostedRegressor::from_json(
            artifact, json,
        )?)),
        "linear" => Ok(Box::new(LinearRegressor::from_json(artifact, json)?)),
        other => Err(ModelError::Invalid {
            artifact: artifact.to_string(),
            reason: format!("unknown model_type '{other}'"),
        }),
    }
}
