//! GKG bundle parsing.
//!
//! Bundles are zip archives holding a single tab-delimited file with a fixed
//! positional column layout. Only four columns matter here: the record
//! timestamp, the source common name, the themes list, and the tone tuple.
//! Row-level problems never fail a bundle; bad rows are dropped and counted.

use std::collections::BTreeSet;
use std::io::{Cursor, Read};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::types::{EventRecord, FetchStats};

// Positional indices into the GKG tab-delimited layout.
const COL_DATE: usize = 1;
const COL_SOURCE: usize = 3;
const COL_THEMES: usize = 8;
const COL_LOCATIONS: usize = 10;
const COL_TONE: usize = 16;

/// Minimum number of columns a row needs to cover all extracted fields.
const MIN_COLUMNS: usize = COL_TONE + 1;

/// Unzip a bundle and parse its records, keeping only rows whose timestamp
/// falls inside `date` (UTC).
///
/// Returns `None` when the archive itself is unreadable; the caller treats
/// that as a failed bundle. Row failures are tallied into `stats`.
pub(crate) fn parse_bundle(
    bytes: &[u8],
    date: NaiveDate,
    stats: &mut FetchStats,
) -> Option<Vec<EventRecord>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).ok()?;
    if archive.is_empty() {
        return None;
    }
    let mut raw = Vec::new();
    archive.by_index(0).ok()?.read_to_end(&mut raw).ok()?;
    // Bundles are nominally UTF-8 but occasionally carry latin-1 bytes;
    // lossy decoding keeps the row instead of dropping the bundle.
    let text = String::from_utf8_lossy(&raw);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quoting(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for row in reader.records() {
        let Ok(row) = row else {
            stats.rows_dropped += 1;
            continue;
        };
        match parse_row(&row, date) {
            RowOutcome::Record(record) => {
                stats.rows_parsed += 1;
                records.push(record);
            }
            RowOutcome::OutOfDay => stats.rows_out_of_day += 1,
            RowOutcome::Malformed => stats.rows_dropped += 1,
        }
    }
    Some(records)
}

enum RowOutcome {
    Record(EventRecord),
    OutOfDay,
    Malformed,
}

fn parse_row(row: &csv::StringRecord, date: NaiveDate) -> RowOutcome {
    if row.len() < MIN_COLUMNS {
        return RowOutcome::Malformed;
    }

    let Some(timestamp) = parse_timestamp(row.get(COL_DATE).unwrap_or_default()) else {
        return RowOutcome::Malformed;
    };
    if timestamp.date_naive() != date {
        return RowOutcome::OutOfDay;
    }

    let Some(tone) = extract_tone(row.get(COL_TONE).unwrap_or_default()) else {
        return RowOutcome::Malformed;
    };

    let countries = extract_countries(row.get(COL_LOCATIONS).unwrap_or_default());
    let themes = extract_themes(row.get(COL_THEMES).unwrap_or_default());
    let source_id = row.get(COL_SOURCE).unwrap_or_default().trim().to_string();

    RowOutcome::Record(EventRecord {
        timestamp,
        source_id,
        countries,
        tone,
        themes,
    })
}

/// Parse the `YYYYMMDDhhmmss` record timestamp as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Extract the deduplicated 3-letter country codes from the locations field.
///
/// Entries look like `1#United States#US#USA#38#-97#US`; the fourth `#`
/// field is the 3-letter code and is kept when present and well-formed.
pub(crate) fn extract_countries(locations: &str) -> BTreeSet<String> {
    let mut countries = BTreeSet::new();
    for entry in locations.split(';') {
        let mut parts = entry.split('#');
        let code3 = parts.nth(3).unwrap_or_default().trim();
        if code3.len() == 3 && code3.chars().all(|c| c.is_ascii_alphabetic()) {
            countries.insert(code3.to_ascii_uppercase());
        }
    }
    countries
}

/// First numeric component of the comma-separated tone tuple.
pub(crate) fn extract_tone(tone: &str) -> Option<f64> {
    tone.split(',').next()?.trim().parse::<f64>().ok()
}

/// Deduplicated theme tokens with their trailing char-offset stripped.
///
/// Entries look like `ENV_OIL,215`; everything from the first comma on is
/// positional metadata, not part of the token.
pub(crate) fn extract_themes(themes: &str) -> BTreeSet<String> {
    themes
        .split(';')
        .filter_map(|entry| {
            let token = entry.split(',').next().unwrap_or_default().trim();
            if token.is_empty() {
                None
            } else {
                Some(token.to_ascii_uppercase())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_countries_keeps_three_letter_codes() {
        let locations = "1#United States#US#USA#38#-97#US;4#Moscow, Russia#RU#RUS#55.75#37.6#RU";
        let countries = extract_countries(locations);
        assert_eq!(
            countries.into_iter().collect::<Vec<_>>(),
            vec!["RUS".to_string(), "USA".to_string()]
        );
    }

    #[test]
    fn extract_countries_skips_empty_code3() {
        let locations = "1#Somewhere#XX##0#0#XX";
        assert!(extract_countries(locations).is_empty());
    }

    #[test]
    fn extract_countries_dedups() {
        let locations = "1#A#US#USA#0#0#US;1#B#US#USA#1#1#US";
        assert_eq!(extract_countries(locations).len(), 1);
    }

    #[test]
    fn extract_countries_empty_field() {
        assert!(extract_countries("").is_empty());
    }

    #[test]
    fn extract_tone_takes_first_component() {
        assert_eq!(extract_tone("-3.2,1.1,4.3,5.4,21,0,170"), Some(-3.2));
        assert_eq!(extract_tone("2.5"), Some(2.5));
    }

    #[test]
    fn extract_tone_rejects_garbage() {
        assert_eq!(extract_tone(""), None);
        assert_eq!(extract_tone("n/a,1.0"), None);
    }

    #[test]
    fn extract_themes_strips_offsets_and_dedups() {
        let themes = "ENV_OIL,215;ARMEDCONFLICT,90;env_oil,400;;";
        let parsed = extract_themes(themes);
        assert_eq!(
            parsed.into_iter().collect::<Vec<_>>(),
            vec!["ARMEDCONFLICT".to_string(), "ENV_OIL".to_string()]
        );
    }

    fn sample_row(timestamp: &str, tone: &str) -> String {
        let mut cols = vec![String::new(); 27];
        cols[0] = format!("{timestamp}-0");
        cols[COL_DATE] = timestamp.to_string();
        cols[COL_SOURCE] = "example.com".to_string();
        cols[COL_THEMES] = "ENV_OIL,10;TRADE_DISPUTE,44".to_string();
        cols[COL_LOCATIONS] = "1#United States#US#USA#38#-97#US".to_string();
        cols[COL_TONE] = tone.to_string();
        cols.join("\t")
    }

    fn zip_bundle(content: &str) -> Vec<u8> {
        use std::io::Write;
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            writer
                .start_file(
                    "20250310000000.gkg.csv",
                    zip::write::SimpleFileOptions::default(),
                )
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn parse_bundle_extracts_records() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let content = format!(
            "{}\n{}\n",
            sample_row("20250310120000", "-3.2,1.1,4.3,5.4,21,0,170"),
            sample_row("20250310121500", "1.5,2.0,0.5,2.5,10,0,80"),
        );
        let mut stats = FetchStats::default();
        let records = parse_bundle(&zip_bundle(&content), date, &mut stats).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(stats.rows_parsed, 2);
        assert_eq!(stats.rows_dropped, 0);
        assert!((records[0].tone + 3.2).abs() < 1e-12);
        assert!(records[0].countries.contains("USA"));
        assert!(records[0].themes.contains("ENV_OIL"));
        assert_eq!(records[0].source_id, "example.com");
    }

    #[test]
    fn parse_bundle_drops_out_of_day_rows() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let content = format!("{}\n", sample_row("20250311000000", "1.0"));
        let mut stats = FetchStats::default();
        let records = parse_bundle(&zip_bundle(&content), date, &mut stats).unwrap();
        assert!(records.is_empty());
        assert_eq!(stats.rows_out_of_day, 1);
    }

    #[test]
    fn parse_bundle_counts_malformed_rows() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let content = format!(
            "short\trow\n{}\n{}\n",
            sample_row("not-a-date", "1.0"),
            sample_row("20250310080000", "2.0"),
        );
        let mut stats = FetchStats::default();
        let records = parse_bundle(&zip_bundle(&content), date, &mut stats).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(stats.rows_dropped, 2);
    }

    #[test]
    fn parse_bundle_rejects_non_zip_payload() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let mut stats = FetchStats::default();
        assert!(parse_bundle(b"not a zip archive", date, &mut stats).is_none());
    }
}
