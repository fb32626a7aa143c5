use thiserror::Error;

/// Errors returned by the price client and fetcher.
#[derive(Debug, Error)]
pub enum PriceError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid base URL '{0}'")]
    InvalidBaseUrl(String),

    /// The service answered with its rate-limit marker instead of data.
    #[error("price service rate limited: {0}")]
    RateLimited(String),

    /// The service answered, but not with a usable series.
    #[error("price service error: {0}")]
    Api(String),

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Upstream failed and no fresh-enough snapshot was cached.
    #[error("price upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}
