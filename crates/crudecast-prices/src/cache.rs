//! Per-instrument snapshot cache.
//!
//! Holds at most one entry per instrument. The fetcher is the only writer;
//! readers take a clone of the series under the lock and never observe a
//! half-written snapshot.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use crate::types::Instrument;

/// How long a snapshot stays usable as a fallback.
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct Snapshot {
    fetched_at: DateTime<Utc>,
    series: BTreeMap<NaiveDate, f64>,
}

/// At-most-one cached close series per instrument, with a TTL.
#[derive(Debug, Default)]
pub struct PriceCache {
    entries: Mutex<HashMap<Instrument, Snapshot>>,
}

impl PriceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot for `instrument`.
    pub async fn store(&self, instrument: Instrument, series: BTreeMap<NaiveDate, f64>) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            instrument,
            Snapshot {
                fetched_at: Utc::now(),
                series,
            },
        );
    }

    /// A clone of the cached series, if present and fresher than the TTL.
    pub async fn fresh(&self, instrument: Instrument) -> Option<BTreeMap<NaiveDate, f64>> {
        let entries = self.entries.lock().await;
        let snapshot = entries.get(&instrument)?;
        let age = Utc::now().signed_duration_since(snapshot.fetched_at);
        if age.to_std().ok()? <= SNAPSHOT_TTL {
            Some(snapshot.series.clone())
        } else {
            None
        }
    }
}
