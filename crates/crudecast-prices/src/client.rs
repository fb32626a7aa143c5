//! HTTP client and fetcher for the daily commodity price service.
//!
//! [`PriceClient`] speaks the wire protocol for one instrument at a time;
//! [`PriceFetcher`] composes the two instruments, the snapshot cache, and
//! the inner join into the window the aligner consumes.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate};
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::cache::PriceCache;
use crate::error::PriceError;
use crate::retry::retry_with_backoff;
use crate::types::{Instrument, PricePoint, PriceWindow};

const USER_AGENT: &str = "crudecast/0.1 (price-ingestion)";
const MAX_RETRIES: u32 = 2;
const BACKOFF_BASE_MS: u64 = 1_000;

#[derive(Debug, Deserialize)]
struct PriceResponse {
    /// Rate-limit marker fields; the service returns one of these instead of
    /// `data` when throttling.
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(default)]
    data: Vec<PriceEntry>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    date: String,
    /// Close value as a string; non-trading placeholders (`"."`) appear here.
    value: String,
}

/// Client for the daily price REST API.
pub struct PriceClient {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl PriceClient {
    /// Creates a client pointed at `base_url` (production or a wiremock URI).
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`PriceError::InvalidBaseUrl`] for an
    /// unparseable base URL.
    pub fn with_base_url(
        api_key: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, PriceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|_| PriceError::InvalidBaseUrl(base_url.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url,
        })
    }

    /// Fetches the full daily close series for one instrument.
    ///
    /// Transient failures are retried with back-off; a rate-limit marker is
    /// surfaced immediately as [`PriceError::RateLimited`].
    ///
    /// # Errors
    ///
    /// - [`PriceError::RateLimited`] on the service's throttle marker.
    /// - [`PriceError::Api`] when the envelope carries no data.
    /// - [`PriceError::Http`] / [`PriceError::Deserialize`] on transport or
    ///   shape failures.
    pub async fn fetch_series(
        &self,
        instrument: Instrument,
    ) -> Result<BTreeMap<NaiveDate, f64>, PriceError> {
        retry_with_backoff(MAX_RETRIES, BACKOFF_BASE_MS, || {
            self.fetch_series_once(instrument)
        })
        .await
    }

    async fn fetch_series_once(
        &self,
        instrument: Instrument,
    ) -> Result<BTreeMap<NaiveDate, f64>, PriceError> {
        let mut url = self.base_url.join("query").map_err(|_| {
            PriceError::InvalidBaseUrl(self.base_url.to_string())
        })?;
        url.query_pairs_mut()
            .append_pair("function", instrument.function_name())
            .append_pair("interval", "daily")
            .append_pair("apikey", &self.api_key);

        let response = self.client.get(url.clone()).send().await?;
        let response = response.error_for_status()?;
        let body = response.text().await?;
        let parsed: PriceResponse =
            serde_json::from_str(&body).map_err(|e| PriceError::Deserialize {
                context: format!("{instrument} series"),
                source: e,
            })?;

        if let Some(marker) = parsed.note.or(parsed.information) {
            return Err(PriceError::RateLimited(marker));
        }
        if parsed.data.is_empty() {
            return Err(PriceError::Api(format!(
                "no data array in {instrument} response"
            )));
        }

        let mut series = BTreeMap::new();
        let mut skipped = 0u32;
        for entry in parsed.data {
            let Ok(date) = NaiveDate::parse_from_str(&entry.date, "%Y-%m-%d") else {
                skipped += 1;
                continue;
            };
            // "." marks non-trading placeholders.
            let Ok(value) = entry.value.parse::<f64>() else {
                skipped += 1;
                continue;
            };
            if value > 0.0 {
                series.insert(date, value);
            } else {
                skipped += 1;
            }
        }
        if skipped > 0 {
            tracing::debug!(%instrument, skipped, "skipped unusable price entries");
        }
        if series.is_empty() {
            return Err(PriceError::Api(format!(
                "{instrument} series contained no usable entries"
            )));
        }
        Ok(series)
    }
}

/// Two-instrument fetcher with snapshot fallback.
pub struct PriceFetcher {
    client: PriceClient,
    cache: PriceCache,
}

impl PriceFetcher {
    #[must_use]
    pub fn new(client: PriceClient) -> Self {
        Self {
            client,
            cache: PriceCache::new(),
        }
    }

    /// Fetch the trailing joined price window ending at `end_date`.
    ///
    /// Both instruments are fetched in parallel. When either live fetch
    /// fails (including rate limiting) but both instruments have a snapshot
    /// at most 24 h old, the cached window is returned with `stale = true`.
    ///
    /// The window spans twice `lookback_days` calendar days so the grid
    /// builder always finds enough business days inside it.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::UpstreamUnavailable`] when a live series is
    /// missing and no fresh-enough snapshot covers for it.
    pub async fn fetch_prices(
        &self,
        end_date: NaiveDate,
        lookback_days: u32,
    ) -> Result<PriceWindow, PriceError> {
        let (wti, brent) = tokio::join!(
            self.client.fetch_series(Instrument::Wti),
            self.client.fetch_series(Instrument::Brent),
        );

        let mut stale = false;
        let wti = self.resolve(Instrument::Wti, wti, &mut stale).await?;
        let brent = self.resolve(Instrument::Brent, brent, &mut stale).await?;

        let start_date = end_date - ChronoDuration::days(2 * i64::from(lookback_days));
        let points = join_series(&wti, &brent, start_date, end_date);
        Ok(PriceWindow { points, stale })
    }

    /// Use the live series and refresh the cache, or fall back to a fresh
    /// snapshot, or fail soft.
    async fn resolve(
        &self,
        instrument: Instrument,
        live: Result<BTreeMap<NaiveDate, f64>, PriceError>,
        stale: &mut bool,
    ) -> Result<BTreeMap<NaiveDate, f64>, PriceError> {
        match live {
            Ok(series) => {
                self.cache.store(instrument, series.clone()).await;
                Ok(series)
            }
            Err(e) => {
                tracing::warn!(%instrument, error = %e, "live price fetch failed — trying snapshot");
                match self.cache.fresh(instrument).await {
                    Some(series) => {
                        *stale = true;
                        Ok(series)
                    }
                    None => Err(PriceError::UpstreamUnavailable(format!(
                        "{instrument} fetch failed with no usable snapshot: {e}"
                    ))),
                }
            }
        }
    }
}

/// Inner-join the two series on date inside `[start_date, end_date]`.
fn join_series(
    wti: &BTreeMap<NaiveDate, f64>,
    brent: &BTreeMap<NaiveDate, f64>,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Vec<PricePoint> {
    wti.range(start_date..=end_date)
        .filter_map(|(date, wti_close)| {
            brent.get(date).map(|brent_close| PricePoint {
                date: *date,
                wti_close: *wti_close,
                brent_close: *brent_close,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn series(entries: &[(NaiveDate, f64)]) -> BTreeMap<NaiveDate, f64> {
        entries.iter().copied().collect()
    }

    #[test]
    fn join_series_is_an_inner_join() {
        let wti = series(&[(d(2025, 3, 7), 79.5), (d(2025, 3, 10), 80.0)]);
        let brent = series(&[(d(2025, 3, 10), 83.0), (d(2025, 3, 11), 83.5)]);
        let points = join_series(&wti, &brent, d(2025, 1, 1), d(2025, 3, 31));
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].date, d(2025, 3, 10));
        assert!((points[0].wti_close - 80.0).abs() < 1e-12);
        assert!((points[0].brent_close - 83.0).abs() < 1e-12);
    }

    #[test]
    fn join_series_respects_window_bounds() {
        let wti = series(&[(d(2025, 1, 1), 70.0), (d(2025, 3, 10), 80.0)]);
        let brent = series(&[(d(2025, 1, 1), 73.0), (d(2025, 3, 10), 83.0)]);
        let points = join_series(&wti, &brent, d(2025, 3, 1), d(2025, 3, 31));
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].date, d(2025, 3, 10));
    }

    #[test]
    fn join_series_is_ascending() {
        let wti = series(&[(d(2025, 3, 10), 80.0), (d(2025, 3, 7), 79.5)]);
        let brent = series(&[(d(2025, 3, 7), 82.5), (d(2025, 3, 10), 83.0)]);
        let points = join_series(&wti, &brent, d(2025, 1, 1), d(2025, 3, 31));
        assert_eq!(points.len(), 2);
        assert!(points[0].date < points[1].date);
    }
}
