//! Integration tests for `GkgClient` using wiremock HTTP mocks.
//!
//! Unmatched bundle URLs get wiremock's default 404, which doubles as the
//! "bundle missing upstream" case.

use std::io::{Cursor, Write};
use std::time::Duration;

use chrono::NaiveDate;
use crudecast_gdelt::{FetchDayOptions, GdeltError, GkgClient};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn target_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

/// Build a zipped single-file bundle with the given tab-delimited rows.
fn zip_bundle(rows: &[String]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
        writer
            .start_file("bundle.gkg.csv", zip::write::SimpleFileOptions::default())
            .unwrap();
        let content = rows.join("\n");
        writer.write_all(content.as_bytes()).unwrap();
        writer.finish().unwrap();
    }
    buf
}

/// One GKG row with the columns the parser reads populated.
fn gkg_row(timestamp: &str, source: &str, themes: &str, locations: &str, tone: &str) -> String {
    let mut cols = vec![String::new(); 27];
    cols[0] = format!("{timestamp}-0");
    cols[1] = timestamp.to_string();
    cols[3] = source.to_string();
    cols[8] = themes.to_string();
    cols[10] = locations.to_string();
    cols[16] = tone.to_string();
    cols.join("\t")
}

fn options(min_fraction: f64) -> FetchDayOptions {
    FetchDayOptions {
        concurrency: 8,
        min_bundle_fraction: min_fraction,
        day_timeout: Some(Duration::from_secs(30)),
    }
}

#[tokio::test]
async fn fetch_day_parses_served_bundles_and_skips_missing() {
    let server = MockServer::start().await;

    let bundle = zip_bundle(&[
        gkg_row(
            "20250310001500",
            "example.com",
            "ENV_OIL,10",
            "1#United States#US#USA#38#-97#US",
            "-2.5,1.0,3.5,4.5,20,0,150",
        ),
        gkg_row(
            "20250310001500",
            "other.org",
            "ARMEDCONFLICT,44",
            "4#Riyadh, Saudi Arabia#SA#SAU#24.6#46.7#SA",
            "1.25,2.0,0.75,2.75,12,0,90",
        ),
    ]);

    Mock::given(method("GET"))
        .and(path("/20250310001500.gkg.csv.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bundle))
        .mount(&server)
        .await;

    let client = GkgClient::with_base_url(&server.uri(), 30).unwrap();
    // Floor of 0 so one served bundle out of 96 still succeeds.
    let day = client
        .fetch_day(target_date(), options(0.0))
        .await
        .expect("day should succeed with floor 0");

    assert_eq!(day.records.len(), 2);
    assert_eq!(day.stats.bundles_ok, 1);
    assert_eq!(day.stats.bundles_missing, 95);
    assert_eq!(day.stats.rows_parsed, 2);

    let usa = day
        .records
        .iter()
        .find(|r| r.countries.contains("USA"))
        .expect("USA record present");
    assert!((usa.tone + 2.5).abs() < 1e-12);
    assert!(usa.themes.contains("ENV_OIL"));
}

#[tokio::test]
async fn fetch_day_fails_below_bundle_floor() {
    let server = MockServer::start().await;
    // Nothing mounted: all 96 bundles 404.
    let client = GkgClient::with_base_url(&server.uri(), 30).unwrap();

    let result = client.fetch_day(target_date(), options(0.5)).await;
    match result {
        Err(GdeltError::TooFewBundles {
            ok,
            required,
            total,
        }) => {
            assert_eq!(ok, 0);
            assert_eq!(required, 48);
            assert_eq!(total, 96);
        }
        other => panic!("expected TooFewBundles, got {other:?}"),
    }
}

#[tokio::test]
async fn fetch_day_retries_server_errors_once() {
    let server = MockServer::start().await;

    let bundle = zip_bundle(&[gkg_row(
        "20250310120000",
        "example.com",
        "",
        "1#United States#US#USA#38#-97#US",
        "0.5",
    )]);

    // First call 500, second call succeeds.
    Mock::given(method("GET"))
        .and(path("/20250310120000.gkg.csv.zip"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/20250310120000.gkg.csv.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bundle))
        .mount(&server)
        .await;

    let client = GkgClient::with_base_url(&server.uri(), 30).unwrap();
    let day = client
        .fetch_day(target_date(), options(0.0))
        .await
        .expect("retried bundle should be counted");

    assert_eq!(day.stats.bundles_ok, 1);
    assert_eq!(day.records.len(), 1);
}

#[tokio::test]
async fn corrupt_bundle_counts_as_failed_not_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/20250310000000.gkg.csv.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"garbage".to_vec()))
        .mount(&server)
        .await;

    let client = GkgClient::with_base_url(&server.uri(), 30).unwrap();
    let day = client
        .fetch_day(target_date(), options(0.0))
        .await
        .expect("corrupt bundle is recoverable");

    assert_eq!(day.stats.bundles_failed, 1);
    assert_eq!(day.stats.bundles_missing, 95);
    assert!(day.records.is_empty());
}
