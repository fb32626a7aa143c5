//! Calendar helpers for the business-day grid.
//!
//! The grid treats Monday through Friday as business days; exchange holidays
//! show up the same way weekends do (no price point) and are handled by the
//! aligner's forward fill rather than a holiday table.

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};

/// Whether `date` is a weekday.
#[must_use]
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The closest business day strictly after `date`.
#[must_use]
pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut day = date + Duration::days(1);
    while !is_business_day(day) {
        day += Duration::days(1);
    }
    day
}

/// The closest business day strictly before `date`.
#[must_use]
pub fn previous_business_day(date: NaiveDate) -> NaiveDate {
    let mut day = date - Duration::days(1);
    while !is_business_day(day) {
        day -= Duration::days(1);
    }
    day
}

/// Default pipeline target: yesterday in UTC.
///
/// The event feed finalises a day's bundles only after the day has fully
/// elapsed, so "today" is never a valid target.
#[must_use]
pub fn default_target_date() -> NaiveDate {
    Utc::now().date_naive() - Duration::days(1)
}

/// Compact `YYYYMMDD` rendering used in artifact keys and bundle names.
#[must_use]
pub fn yyyymmdd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Parse a `YYYY-MM-DD` CLI argument.
///
/// # Errors
///
/// Returns the underlying chrono parse error message.
pub fn parse_iso_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("invalid date '{raw}': {e}"))
}
