//! Country x day aggregation of parsed event records.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::themes::ThemeCategory;
use crate::types::{AggregatedEvent, EventRecord};

#[derive(Default)]
struct CountryAccum {
    tones: Vec<f64>,
    sources: BTreeSet<String>,
    theme_counts: [u64; ThemeCategory::COUNT],
}

/// Aggregate one day of events per country.
///
/// Each record contributes once to every country in its country set that is
/// inside `universe`; countries outside the universe are dropped here, at
/// the schema boundary. A record counts at most once per theme category no
/// matter how many of its tokens map there.
///
/// Output is sorted by country code. Countries with no events are absent;
/// the aligner zero-fills them onto the grid.
#[must_use]
pub fn aggregate(
    records: &[EventRecord],
    date: NaiveDate,
    universe: &BTreeSet<String>,
) -> Vec<AggregatedEvent> {
    let mut accums: BTreeMap<&str, CountryAccum> = BTreeMap::new();

    for record in records {
        let categories = record_categories(record);
        for country in &record.countries {
            if !universe.contains(country) {
                continue;
            }
            let accum = accums.entry(country.as_str()).or_default();
            accum.tones.push(record.tone);
            if !record.source_id.is_empty() {
                accum.sources.insert(record.source_id.clone());
            }
            for category in &categories {
                accum.theme_counts[*category as usize] += 1;
            }
        }
    }

    accums
        .into_iter()
        .map(|(country, accum)| {
            let n = accum.tones.len();
            AggregatedEvent {
                country: country.to_string(),
                date,
                event_count: n as u64,
                avg_tone: mean(&accum.tones),
                tone_std: sample_std(&accum.tones),
                unique_sources: accum.sources.len() as u64,
                theme_counts: accum.theme_counts,
            }
        })
        .collect()
}

/// Distinct theme categories a record maps to.
fn record_categories(record: &EventRecord) -> BTreeSet<ThemeCategory> {
    record
        .themes
        .iter()
        .filter_map(|token| ThemeCategory::of_token(token))
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; 0 for fewer than two observations.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn record(countries: &[&str], tone: f64, source: &str, themes: &[&str]) -> EventRecord {
        EventRecord {
            timestamp: Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap(),
            source_id: source.to_string(),
            countries: countries.iter().map(|c| (*c).to_string()).collect(),
            tone,
            themes: themes.iter().map(|t| (*t).to_string()).collect(),
        }
    }

    fn universe(codes: &[&str]) -> BTreeSet<String> {
        codes.iter().map(|c| (*c).to_string()).collect()
    }

    #[test]
    fn single_event_has_zero_tone_std() {
        // One event with tone -3.2 for SAU: std must be 0, not NaN.
        let records = vec![record(&["SAU"], -3.2, "a.com", &[])];
        let agg = aggregate(&records, d(2025, 3, 10), &universe(&["SAU"]));
        assert_eq!(agg.len(), 1);
        assert_eq!(agg[0].event_count, 1);
        assert!((agg[0].avg_tone + 3.2).abs() < 1e-12);
        assert_eq!(agg[0].tone_std, 0.0);
        assert_eq!(agg[0].unique_sources, 1);
    }

    #[test]
    fn countries_outside_universe_are_dropped() {
        let records = vec![record(&["USA", "XYZ"], 1.0, "a.com", &[])];
        let agg = aggregate(&records, d(2025, 3, 10), &universe(&["USA"]));
        assert_eq!(agg.len(), 1);
        assert_eq!(agg[0].country, "USA");
    }

    #[test]
    fn event_counts_and_sources() {
        let records = vec![
            record(&["USA"], 2.0, "a.com", &[]),
            record(&["USA"], -2.0, "b.com", &[]),
            record(&["USA"], 0.0, "a.com", &[]),
        ];
        let agg = aggregate(&records, d(2025, 3, 10), &universe(&["USA"]));
        assert_eq!(agg[0].event_count, 3);
        assert_eq!(agg[0].unique_sources, 2);
        assert!((agg[0].avg_tone).abs() < 1e-12);
        // Sample std of [2, -2, 0] = 2.
        assert!((agg[0].tone_std - 2.0).abs() < 1e-12);
    }

    #[test]
    fn one_event_touches_multiple_countries() {
        let records = vec![record(&["USA", "RUS"], 1.5, "a.com", &["ENV_OIL"])];
        let agg = aggregate(&records, d(2025, 3, 10), &universe(&["RUS", "USA"]));
        assert_eq!(agg.len(), 2);
        assert_eq!(agg[0].country, "RUS");
        assert_eq!(agg[1].country, "USA");
        for entry in &agg {
            assert_eq!(entry.event_count, 1);
            assert_eq!(entry.theme_count(ThemeCategory::Energy), 1);
        }
    }

    #[test]
    fn record_counts_once_per_category() {
        // Two energy tokens, one conflict token: energy count is still 1.
        let records = vec![record(
            &["USA"],
            0.5,
            "a.com",
            &["ENV_OIL", "ENV_NATURALGAS", "ARMEDCONFLICT"],
        )];
        let agg = aggregate(&records, d(2025, 3, 10), &universe(&["USA"]));
        assert_eq!(agg[0].theme_count(ThemeCategory::Energy), 1);
        assert_eq!(agg[0].theme_count(ThemeCategory::Conflict), 1);
        assert_eq!(agg[0].theme_count(ThemeCategory::Trade), 0);
    }

    #[test]
    fn uncategorised_themes_count_nowhere() {
        let records = vec![record(&["USA"], 0.5, "a.com", &["TAX_FNCACT_FARMER"])];
        let agg = aggregate(&records, d(2025, 3, 10), &universe(&["USA"]));
        assert_eq!(agg[0].theme_counts, [0; ThemeCategory::COUNT]);
    }

    #[test]
    fn empty_input_empty_output() {
        let agg = aggregate(&[], d(2025, 3, 10), &universe(&["USA"]));
        assert!(agg.is_empty());
    }
}
