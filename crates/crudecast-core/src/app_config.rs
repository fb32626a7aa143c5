use std::path::PathBuf;

/// Application configuration, loaded from environment variables.
///
/// Held by the pipeline context and shared by reference; never mutated after
/// load.
#[derive(Clone)]
pub struct AppConfig {
    /// Root of the artifact store (the bucket analogue).
    pub data_dir: PathBuf,
    /// Key prefix for published datasets.
    pub processed_prefix: String,
    /// Key prefix for trained model bundles.
    pub models_prefix: String,
    /// Run id selecting the model bundle used at inference.
    pub model_run_id: String,
    /// Credential for the daily price service.
    pub price_api_key: String,
    pub log_level: String,
    /// Trailing business-day count of the country x day grid.
    pub lookback_days: u32,
    /// Concurrent event-bundle downloads.
    pub event_bundle_concurrency: usize,
    /// Fraction of the 96 daily bundles that must parse for the day to count.
    pub min_event_bundles_fraction: f64,
    /// Fallback attention temperature when the bundle metadata omits one.
    pub prediction_temperature: f64,
    /// How many countries the attribution listing is truncated to.
    pub top_countries_count: usize,
    pub gdelt_base_url: String,
    pub price_base_url: String,
    pub bundle_timeout_secs: u64,
    pub day_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("data_dir", &self.data_dir)
            .field("processed_prefix", &self.processed_prefix)
            .field("models_prefix", &self.models_prefix)
            .field("model_run_id", &self.model_run_id)
            .field("price_api_key", &"[redacted]")
            .field("log_level", &self.log_level)
            .field("lookback_days", &self.lookback_days)
            .field("event_bundle_concurrency", &self.event_bundle_concurrency)
            .field(
                "min_event_bundles_fraction",
                &self.min_event_bundles_fraction,
            )
            .field("prediction_temperature", &self.prediction_temperature)
            .field("top_countries_count", &self.top_countries_count)
            .field("gdelt_base_url", &self.gdelt_base_url)
            .field("price_base_url", &self.price_base_url)
            .field("bundle_timeout_secs", &self.bundle_timeout_secs)
            .field("day_timeout_secs", &self.day_timeout_secs)
            .finish()
    }
}
