use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};

use crate::themes::ThemeCategory;

/// One parsed global-event record.
///
/// Country and theme sets are deduplicated at parse time; `tone` is the
/// first numeric component of the upstream tone field (roughly [-20, 20]).
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Record timestamp; always within the fetched day's UTC bounds.
    pub timestamp: DateTime<Utc>,
    /// Common name of the publishing source.
    pub source_id: String,
    /// 3-letter country codes mentioned by the record.
    pub countries: BTreeSet<String>,
    pub tone: f64,
    /// Uppercased theme tokens with their char-offset suffixes stripped.
    pub themes: BTreeSet<String>,
}

/// Parse/fetch counters for one day of bundles.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchStats {
    pub bundles_ok: usize,
    pub bundles_missing: usize,
    pub bundles_failed: usize,
    pub rows_parsed: u64,
    /// Rows dropped for malformed fields.
    pub rows_dropped: u64,
    /// Rows dropped because their timestamp fell outside the target day.
    pub rows_out_of_day: u64,
}

/// All records fetched for one day, plus the counters describing how the
/// fetch went.
#[derive(Debug, Clone)]
pub struct DayEvents {
    pub date: NaiveDate,
    pub records: Vec<EventRecord>,
    pub stats: FetchStats,
}

/// Country x day event summary, the aggregator's output.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedEvent {
    pub country: String,
    pub date: NaiveDate,
    /// Number of events touching the country.
    pub event_count: u64,
    /// Mean tone across those events.
    pub avg_tone: f64,
    /// Sample standard deviation of tone; 0 when `event_count <= 1`.
    pub tone_std: f64,
    /// Distinct publishing sources.
    pub unique_sources: u64,
    /// Events per theme category, indexed by [`ThemeCategory::ALL`] order.
    pub theme_counts: [u64; ThemeCategory::COUNT],
}

impl AggregatedEvent {
    /// An all-zero summary for a silent country x day cell.
    #[must_use]
    pub fn empty(country: &str, date: NaiveDate) -> Self {
        Self {
            country: country.to_string(),
            date,
            event_count: 0,
            avg_tone: 0.0,
            tone_std: 0.0,
            unique_sources: 0,
            theme_counts: [0; ThemeCategory::COUNT],
        }
    }

    /// Count for one theme category.
    #[must_use]
    pub fn theme_count(&self, category: ThemeCategory) -> u64 {
        self.theme_counts[category as usize]
    }
}
