use thiserror::Error;

/// Errors returned by the event-bundle client.
#[derive(Debug, Error)]
pub enum GdeltError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid base URL '{0}'")]
    InvalidBaseUrl(String),

    /// Too few bundles survived fetching and parsing for the day to count.
    #[error("only {ok} of {total} event bundles usable (floor {required})")]
    TooFewBundles {
        ok: usize,
        required: usize,
        total: usize,
    },

    /// The whole-day wall clock expired before all bundles were in.
    #[error("event fetch for the day exceeded {timeout_secs}s")]
    DayTimeout { timeout_secs: u64 },
}
