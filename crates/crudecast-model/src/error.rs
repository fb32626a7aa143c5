use thiserror::Error;

use crudecast_pipeline::StoreError;

/// Errors from model loading and inference.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The requested run id is absent or incomplete.
    #[error("model run {run_id} is missing {artifact}")]
    Missing { run_id: String, artifact: String },

    /// An artifact exists but does not decode or validate.
    #[error("invalid model artifact {artifact}: {reason}")]
    Invalid { artifact: String, reason: String },

    /// Dataset feature schema differs from the bundle's.
    #[error("feature schema mismatch: {reason}")]
    SchemaMismatch { reason: String },

    /// No country could be scored; data is not ready for inference.
    #[error("no scorable countries: {0}")]
    NoScorableCountries(String),

    /// Non-finite attention or aggregate after clamping; a bug, not data.
    #[error("internal invariant violation: {0}")]
    InvariantViolation(String),
}
