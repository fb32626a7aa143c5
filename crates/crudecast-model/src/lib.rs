//! Model loading and hierarchical inference.
//!
//! Loads the trained bundle (per-country regressors, feature scaler,
//! adjacency matrix, metadata) from the artifact store and produces the
//! two-stage prediction: per-country deltas from gradient-boosted
//! regressors, combined by a temperature-scaled attention layer into one
//! aggregate delta with per-country attribution.

pub mod bundle;
pub mod error;
pub mod history;
pub mod inference;
pub mod regressor;
pub mod scaler;
pub mod types;

pub use bundle::{ModelBundle, ModelCache};
pub use error::ModelError;
pub use history::{update_history, HistoryUpdate, PredictionRecord};
pub use inference::predict;
pub use regressor::{GradientBoostedRegressor, LinearRegressor, Regressor};
pub use scaler::FeatureScaler;
pub use types::{CountryAttribution, Direction, ModelMetadata, PredictionReport};
