//! HTTP client for the daily event-bundle feed.
//!
//! The upstream publishes 96 bundles per day at 15-minute boundaries, each
//! addressed as `<base>/YYYYMMDDhhmmss.gkg.csv.zip`. Bundles are fetched
//! with bounded concurrency; a missing bundle (404) or an unreadable one is
//! skipped with a warning, and the day only fails when the surviving count
//! drops below the configured floor.

use std::time::Duration;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode, Url};

use crate::error::GdeltError;
use crate::parse::parse_bundle;
use crate::types::{DayEvents, EventRecord, FetchStats};

/// Bundles published per day (24 hours x 4 quarter-hours).
pub const BUNDLES_PER_DAY: usize = 96;

const USER_AGENT: &str = "crudecast/0.1 (event-ingestion)";

/// Knobs for a single-day fetch, resolved from `AppConfig` by the caller.
#[derive(Debug, Clone, Copy)]
pub struct FetchDayOptions {
    /// Concurrent bundle downloads.
    pub concurrency: usize,
    /// Fraction of [`BUNDLES_PER_DAY`] that must be usable.
    pub min_bundle_fraction: f64,
    /// Wall clock for the whole day; `None` disables the limit.
    pub day_timeout: Option<Duration>,
}

impl Default for FetchDayOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            min_bundle_fraction: 0.5,
            day_timeout: Some(Duration::from_secs(540)),
        }
    }
}

/// Client for the event-bundle feed.
///
/// Use [`GkgClient::new`] for production or [`GkgClient::with_base_url`] to
/// point at a mock server in tests.
pub struct GkgClient {
    client: Client,
    base_url: Url,
}

impl GkgClient {
    /// Creates a client with a per-bundle request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GdeltError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`GdeltError::InvalidBaseUrl`] for an
    /// unparseable base URL.
    pub fn new(base_url: &str, bundle_timeout_secs: u64) -> Result<Self, GdeltError> {
        Self::with_base_url(base_url, bundle_timeout_secs)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Same as [`GkgClient::new`].
    pub fn with_base_url(base_url: &str, bundle_timeout_secs: u64) -> Result<Self, GdeltError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(bundle_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|_| GdeltError::InvalidBaseUrl(base_url.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Fetch and parse all bundles for one day.
    ///
    /// Bundle download order is irrelevant to the result; records are
    /// returned in no particular order and carry only rows stamped inside
    /// `date`.
    ///
    /// # Errors
    ///
    /// - [`GdeltError::TooFewBundles`] when fewer than the configured floor
    ///   of bundles were usable.
    /// - [`GdeltError::DayTimeout`] when the whole-day wall clock expired.
    pub async fn fetch_day(
        &self,
        date: NaiveDate,
        opts: FetchDayOptions,
    ) -> Result<DayEvents, GdeltError> {
        let fetch_all = self.fetch_day_inner(date, opts);
        match opts.day_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch_all)
                .await
                .map_err(|_| GdeltError::DayTimeout {
                    timeout_secs: limit.as_secs(),
                })?,
            None => fetch_all.await,
        }
    }

    async fn fetch_day_inner(
        &self,
        date: NaiveDate,
        opts: FetchDayOptions,
    ) -> Result<DayEvents, GdeltError> {
        let timestamps = bundle_timestamps(date);

        let outcomes: Vec<BundleOutcome> = stream::iter(timestamps)
            .map(|timestamp| self.fetch_bundle(date, timestamp))
            .buffer_unordered(opts.concurrency.max(1))
            .collect()
            .await;

        let mut stats = FetchStats::default();
        let mut records: Vec<EventRecord> = Vec::new();
        for outcome in outcomes {
            match outcome {
                BundleOutcome::Parsed {
                    records: mut bundle_records,
                    stats: bundle_stats,
                } => {
                    stats.bundles_ok += 1;
                    stats.rows_parsed += bundle_stats.rows_parsed;
                    stats.rows_dropped += bundle_stats.rows_dropped;
                    stats.rows_out_of_day += bundle_stats.rows_out_of_day;
                    records.append(&mut bundle_records);
                }
                BundleOutcome::Missing => stats.bundles_missing += 1,
                BundleOutcome::Failed => stats.bundles_failed += 1,
            }
        }

        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
        let required = (BUNDLES_PER_DAY as f64 * opts.min_bundle_fraction).ceil() as usize;
        if stats.bundles_ok < required {
            return Err(GdeltError::TooFewBundles {
                ok: stats.bundles_ok,
                required,
                total: BUNDLES_PER_DAY,
            });
        }

        tracing::info!(
            date = %date,
            bundles_ok = stats.bundles_ok,
            bundles_missing = stats.bundles_missing,
            bundles_failed = stats.bundles_failed,
            rows = stats.rows_parsed,
            rows_dropped = stats.rows_dropped,
            "fetched event bundles"
        );

        Ok(DayEvents {
            date,
            records,
            stats,
        })
    }

    /// Fetch and parse one bundle, classifying the result.
    ///
    /// A 5xx response is retried once before the bundle is written off.
    async fn fetch_bundle(&self, date: NaiveDate, timestamp: String) -> BundleOutcome {
        let url = match self.base_url.join(&format!("{timestamp}.gkg.csv.zip")) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(%timestamp, error = %e, "bad bundle URL");
                return BundleOutcome::Failed;
            }
        };

        let mut attempts = 0;
        let bytes = loop {
            attempts += 1;
            match self.client.get(url.clone()).send().await {
                Ok(response) => match response.status() {
                    StatusCode::NOT_FOUND => {
                        tracing::debug!(%timestamp, "bundle missing upstream");
                        return BundleOutcome::Missing;
                    }
                    status if status.is_server_error() && attempts == 1 => {
                        tracing::warn!(%timestamp, %status, "server error — retrying bundle once");
                        continue;
                    }
                    status if !status.is_success() => {
                        tracing::warn!(%timestamp, %status, "bundle fetch failed");
                        return BundleOutcome::Failed;
                    }
                    _ => match response.bytes().await {
                        Ok(bytes) => break bytes,
                        Err(e) => {
                            tracing::warn!(%timestamp, error = %e, "bundle body read failed");
                            return BundleOutcome::Failed;
                        }
                    },
                },
                Err(e) if attempts == 1 => {
                    tracing::warn!(%timestamp, error = %e, "bundle fetch failed — retrying once");
                }
                Err(e) => {
                    tracing::warn!(%timestamp, error = %e, "bundle fetch failed");
                    return BundleOutcome::Failed;
                }
            }
        };

        let mut stats = FetchStats::default();
        match parse_bundle(&bytes, date, &mut stats) {
            Some(records) => BundleOutcome::Parsed { records, stats },
            None => {
                tracing::warn!(%timestamp, "bundle archive unreadable");
                BundleOutcome::Failed
            }
        }
    }
}

enum BundleOutcome {
    Parsed {
        records: Vec<EventRecord>,
        stats: FetchStats,
    },
    Missing,
    Failed,
}

/// The 96 `YYYYMMDDhhmmss` bundle names for one day.
fn bundle_timestamps(date: NaiveDate) -> Vec<String> {
    let day = date.format("%Y%m%d");
    let mut names = Vec::with_capacity(BUNDLES_PER_DAY);
    for hour in 0..24 {
        for minute in ["00", "15", "30", "45"] {
            names.push(format!("{day}{hour:02}{minute}00"));
        }
    }
    names
}
