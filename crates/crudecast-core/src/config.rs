use std::path::PathBuf;

use crate::app_config::AppConfig;
use crate::ConfigError;

/// Default public base for the event feed (GDELT v2 GKG).
pub const DEFAULT_GDELT_BASE_URL: &str = "http://data.gdeltproject.org/gdeltv2";
/// Default base for the daily commodity price service.
pub const DEFAULT_PRICE_BASE_URL: &str = "https://www.alphavantage.co";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files — useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual
/// environment so it can be tested with a pure `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_f64 = |var: &str, default: &str| -> Result<f64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<f64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let data_dir = PathBuf::from(require("CRUDECAST_DATA_DIR")?);
    let model_run_id = require("CRUDECAST_MODEL_RUN_ID")?;
    let price_api_key = require("CRUDECAST_PRICE_API_KEY")?;

    let processed_prefix = or_default("CRUDECAST_PROCESSED_PREFIX", "processed_data/");
    let models_prefix = or_default("CRUDECAST_MODELS_PREFIX", "trained_models/");
    let log_level = or_default("CRUDECAST_LOG_LEVEL", "info");

    let lookback_days = parse_u32("CRUDECAST_LOOKBACK_DAYS", "90")?;
    if lookback_days == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "CRUDECAST_LOOKBACK_DAYS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    let event_bundle_concurrency = parse_usize("CRUDECAST_EVENT_BUNDLE_CONCURRENCY", "8")?;
    if event_bundle_concurrency == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "CRUDECAST_EVENT_BUNDLE_CONCURRENCY".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    let min_event_bundles_fraction = parse_f64("CRUDECAST_MIN_EVENT_BUNDLES_FRACTION", "0.5")?;
    if !(0.0..=1.0).contains(&min_event_bundles_fraction) {
        return Err(ConfigError::InvalidEnvVar {
            var: "CRUDECAST_MIN_EVENT_BUNDLES_FRACTION".to_string(),
            reason: "must be within [0.0, 1.0]".to_string(),
        });
    }

    let prediction_temperature = parse_f64("CRUDECAST_PREDICTION_TEMPERATURE", "0.25")?;
    if prediction_temperature <= 0.0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "CRUDECAST_PREDICTION_TEMPERATURE".to_string(),
            reason: "must be positive".to_string(),
        });
    }

    let top_countries_count = parse_usize("CRUDECAST_TOP_COUNTRIES_COUNT", "15")?;

    let gdelt_base_url = or_default("CRUDECAST_GDELT_BASE_URL", DEFAULT_GDELT_BASE_URL);
    let price_base_url = or_default("CRUDECAST_PRICE_BASE_URL", DEFAULT_PRICE_BASE_URL);

    let bundle_timeout_secs = parse_u64("CRUDECAST_BUNDLE_TIMEOUT_SECS", "30")?;
    let day_timeout_secs = parse_u64("CRUDECAST_DAY_TIMEOUT_SECS", "540")?;

    Ok(AppConfig {
        data_dir,
        processed_prefix,
        models_prefix,
        model_run_id,
        price_api_key,
        log_level,
        lookback_days,
        event_bundle_concurrency,
        min_event_bundles_fraction,
        prediction_temperature,
        top_countries_count,
        gdelt_base_url,
        price_base_url,
        bundle_timeout_secs,
        day_timeout_secs,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::env::VarError;

    use super::*;

    fn lookup_from_map<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(VarError::NotPresent)
        }
    }

    /// Returns a map with all required env vars populated with valid values.
    fn full_env<'a>() -> HashMap<&'a str, &'a str> {
        let mut m = HashMap::new();
        m.insert("CRUDECAST_DATA_DIR", "/var/lib/crudecast");
        m.insert("CRUDECAST_MODEL_RUN_ID", "run_20251101_090727");
        m.insert("CRUDECAST_PRICE_API_KEY", "test-key");
        m
    }

    #[test]
    fn fails_without_data_dir() {
        let map: HashMap<&str, &str> = HashMap::new();
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "CRUDECAST_DATA_DIR"),
            "expected MissingEnvVar(CRUDECAST_DATA_DIR), got: {result:?}"
        );
    }

    #[test]
    fn fails_without_model_run_id() {
        let mut map: HashMap<&str, &str> = HashMap::new();
        map.insert("CRUDECAST_DATA_DIR", "/tmp/x");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "CRUDECAST_MODEL_RUN_ID"),
            "expected MissingEnvVar(CRUDECAST_MODEL_RUN_ID), got: {result:?}"
        );
    }

    #[test]
    fn fails_without_price_api_key() {
        let mut map: HashMap<&str, &str> = HashMap::new();
        map.insert("CRUDECAST_DATA_DIR", "/tmp/x");
        map.insert("CRUDECAST_MODEL_RUN_ID", "run_1");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "CRUDECAST_PRICE_API_KEY"),
            "expected MissingEnvVar(CRUDECAST_PRICE_API_KEY), got: {result:?}"
        );
    }

    #[test]
    fn succeeds_with_defaults() {
        let map = full_env();
        let cfg = build_app_config(lookup_from_map(&map)).expect("config should load");
        assert_eq!(cfg.processed_prefix, "processed_data/");
        assert_eq!(cfg.models_prefix, "trained_models/");
        assert_eq!(cfg.lookback_days, 90);
        assert_eq!(cfg.event_bundle_concurrency, 8);
        assert!((cfg.min_event_bundles_fraction - 0.5).abs() < f64::EPSILON);
        assert!((cfg.prediction_temperature - 0.25).abs() < f64::EPSILON);
        assert_eq!(cfg.top_countries_count, 15);
        assert_eq!(cfg.gdelt_base_url, DEFAULT_GDELT_BASE_URL);
        assert_eq!(cfg.price_base_url, DEFAULT_PRICE_BASE_URL);
        assert_eq!(cfg.bundle_timeout_secs, 30);
        assert_eq!(cfg.day_timeout_secs, 540);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn lookback_days_override() {
        let mut map = full_env();
        map.insert("CRUDECAST_LOOKBACK_DAYS", "30");
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();
        assert_eq!(cfg.lookback_days, 30);
    }

    #[test]
    fn lookback_days_zero_rejected() {
        let mut map = full_env();
        map.insert("CRUDECAST_LOOKBACK_DAYS", "0");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "CRUDECAST_LOOKBACK_DAYS"),
            "expected InvalidEnvVar(CRUDECAST_LOOKBACK_DAYS), got: {result:?}"
        );
    }

    #[test]
    fn bundle_fraction_out_of_range_rejected() {
        let mut map = full_env();
        map.insert("CRUDECAST_MIN_EVENT_BUNDLES_FRACTION", "1.5");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "CRUDECAST_MIN_EVENT_BUNDLES_FRACTION"),
            "expected InvalidEnvVar, got: {result:?}"
        );
    }

    #[test]
    fn temperature_must_be_positive() {
        let mut map = full_env();
        map.insert("CRUDECAST_PREDICTION_TEMPERATURE", "0");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "CRUDECAST_PREDICTION_TEMPERATURE"),
            "expected InvalidEnvVar, got: {result:?}"
        );
    }

    #[test]
    fn concurrency_not_a_number_rejected() {
        let mut map = full_env();
        map.insert("CRUDECAST_EVENT_BUNDLE_CONCURRENCY", "many");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "CRUDECAST_EVENT_BUNDLE_CONCURRENCY"),
            "expected InvalidEnvVar, got: {result:?}"
        );
    }

    #[test]
    fn debug_redacts_api_key() {
        let map = full_env();
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("test-key"), "secret leaked: {rendered}");
        assert!(rendered.contains("[redacted]"));
    }
}
