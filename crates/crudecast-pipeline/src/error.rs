use thiserror::Error;

/// Errors from the artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    /// The artifact exists but does not decode to the expected schema.
    #[error("corrupt artifact {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("artifact store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by a pipeline run, classified into soft/hard terminal
/// states by the orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("event ingestion failed: {0}")]
    Gdelt(#[from] crudecast_gdelt::GdeltError),

    #[error("price ingestion failed: {0}")]
    Price(#[from] crudecast_prices::PriceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Alignment produced no usable grid for the day.
    #[error("no aligned data for {0}")]
    EmptyGrid(chrono::NaiveDate),

    /// A pure stage broke one of its own guarantees; a bug, not bad data.
    #[error("internal invariant violation: {0}")]
    Invariant(String),

    /// Another run for the same target date is already in flight.
    #[error("run already in flight for {0}")]
    InFlight(chrono::NaiveDate),

    #[error("run cancelled")]
    Cancelled,
}
