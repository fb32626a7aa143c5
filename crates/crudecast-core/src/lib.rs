//! Shared configuration and calendar primitives for crudecast.
//!
//! Everything downstream (fetchers, pipeline, inference, CLI) receives its
//! settings through [`AppConfig`], loaded once at process start and threaded
//! through explicitly; there is no process-global configuration state.

pub mod app_config;
pub mod config;
pub mod dates;
pub mod error;

pub use app_config::AppConfig;
pub use config::{load_app_config, load_app_config_from_env};
pub use error::ConfigError;
