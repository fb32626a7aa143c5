//! Country x day grid construction.
//!
//! Merges the aggregated event summaries and the joined price window into
//! one row per `(country, date)` over the canonical grid U x D. The output
//! order (country, then date, both ascending) is load-bearing: the
//! feature engineer computes lags positionally within each country group.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use crudecast_core::dates::is_business_day;
use crudecast_gdelt::AggregatedEvent;
use crudecast_prices::PricePoint;

use crate::types::AlignedRow;

/// The contiguous calendar-day window ending at `target_date` that contains
/// `lookback_days` business days, ascending.
fn grid_dates(target_date: NaiveDate, lookback_days: u32) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut business_seen = 0u32;
    let mut day = target_date;
    loop {
        dates.push(day);
        if is_business_day(day) {
            business_seen += 1;
            if business_seen >= lookback_days {
                break;
            }
        }
        day -= Duration::days(1);
    }
    dates.reverse();
    dates
}

/// Build the aligned grid.
///
/// - Event cells with no [`AggregatedEvent`] are zero-filled: a silent day
///   is a zero day, not a stale one.
/// - Price columns are forward-filled from the nearest preceding trading
///   day inside the window; dates before the first available price are
///   dropped from the whole grid.
/// - Countries outside `universe` never appear (the aggregator already
///   enforces this; the grid iterates the universe directly).
#[must_use]
pub fn align(
    aggregated: &[AggregatedEvent],
    prices: &[PricePoint],
    universe: &BTreeSet<String>,
    target_date: NaiveDate,
    lookback_days: u32,
) -> Vec<AlignedRow> {
    let dates = grid_dates(target_date, lookback_days);

    let price_by_date: BTreeMap<NaiveDate, (f64, f64)> = prices
        .iter()
        .map(|p| (p.date, (p.wti_close, p.brent_close)))
        .collect();

    // Forward fill prices across the window; None until the first quote.
    let mut filled: Vec<(NaiveDate, Option<(f64, f64)>)> = Vec::with_capacity(dates.len());
    let mut last: Option<(f64, f64)> = None;
    for date in &dates {
        if let Some(quote) = price_by_date.get(date) {
            last = Some(*quote);
        }
        filled.push((*date, last));
    }
    let dropped = filled.iter().filter(|(_, quote)| quote.is_none()).count();
    if dropped > 0 {
        tracing::debug!(
            dropped,
            "grid dates without a prior price dropped from the window"
        );
    }

    let events: BTreeMap<(&str, NaiveDate), &AggregatedEvent> = aggregated
        .iter()
        .map(|event| ((event.country.as_str(), event.date), event))
        .collect();

    let mut rows = Vec::with_capacity(universe.len() * filled.len());
    for country in universe {
        for (date, quote) in &filled {
            let Some((wti_price, brent_price)) = quote else {
                continue;
            };
            let row = match events.get(&(country.as_str(), *date)) {
                Some(event) => AlignedRow {
                    country: country.clone(),
                    date: *date,
                    event_count: event.event_count,
                    avg_tone: event.avg_tone,
                    tone_std: event.tone_std,
                    unique_sources: event.unique_sources,
                    theme_counts: event.theme_counts,
                    wti_price: *wti_price,
                    brent_price: *brent_price,
                },
                None => AlignedRow {
                    country: country.clone(),
                    date: *date,
                    event_count: 0,
                    avg_tone: 0.0,
                    tone_std: 0.0,
                    unique_sources: 0,
                    theme_counts: [0; crudecast_gdelt::ThemeCategory::COUNT],
                    wti_price: *wti_price,
                    brent_price: *brent_price,
                },
            };
            rows.push(row);
        }
    }
    rows
}
