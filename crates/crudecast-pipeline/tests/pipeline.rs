//! End-to-end pipeline tests: mock event and price upstreams, a temp-dir
//! artifact store, and the full run/backfill state machine.

use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use crudecast_core::AppConfig;
use crudecast_gdelt::GkgClient;
use crudecast_pipeline::{
    backfill, run, FsStore, PipelineContext, RunOptions, RunStatus,
};
use crudecast_prices::{PriceClient, PriceFetcher};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn universe(codes: &[&str]) -> BTreeSet<String> {
    codes.iter().map(|c| (*c).to_string()).collect()
}

fn test_config(data_dir: PathBuf, gdelt_url: &str, price_url: &str) -> AppConfig {
    AppConfig {
        data_dir,
        processed_prefix: "processed_data/".to_string(),
        models_prefix: "trained_models/".to_string(),
        model_run_id: "run_test".to_string(),
        price_api_key: "test-key".to_string(),
        log_level: "info".to_string(),
        lookback_days: 2,
        event_bundle_concurrency: 8,
        // Floor 0: all-404 event days still pass, keeping mocks small.
        min_event_bundles_fraction: 0.0,
        prediction_temperature: 0.25,
        top_countries_count: 15,
        gdelt_base_url: gdelt_url.to_string(),
        price_base_url: price_url.to_string(),
        bundle_timeout_secs: 5,
        day_timeout_secs: 120,
    }
}

fn test_context(
    data_dir: PathBuf,
    gdelt_url: &str,
    price_url: &str,
) -> PipelineContext {
    let config = test_config(data_dir.clone(), gdelt_url, price_url);
    let gdelt = GkgClient::with_base_url(gdelt_url, 5).unwrap();
    let prices = PriceFetcher::new(PriceClient::with_base_url("test-key", 5, price_url).unwrap());
    let store = Arc::new(FsStore::new(data_dir));
    PipelineContext::with_parts(config, gdelt, prices, store)
}

fn zip_bundle(rows: &[String]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
        writer
            .start_file("bundle.gkg.csv", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(rows.join("\n").as_bytes()).unwrap();
        writer.finish().unwrap();
    }
    buf
}

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

fn price_body(entries: &[(&str, &str)]) -> serde_json::Value {
    let data: Vec<_> = entries
        .iter()
        .map(|(date, value)| serde_json::json!({ "date": date, "value": value }))
        .collect();
    serde_json::json!({ "interval": "daily", "data": data })
}

async fn mount_prices(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("function", "WTI"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(price_body(&[("2025-03-10", "80.00"), ("2025-03-07", "79.50")])),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("function", "BRENT"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(price_body(&[("2025-03-10", "83.00"), ("2025-03-07", "82.50")])),
        )
        .mount(server)
        .await;
}

/// One bundle on the target day with a single USA event (tone -3.2).
async fn mount_target_day_events(server: &MockServer) {
    let bundle = zip_bundle(&[gkg_row(
        "20250310120000",
        "example.com",
        "ENV_OIL,10",
        "1#United States#US#USA#38#-97#US",
        "-3.2,1.1,4.3,5.4,21,0,170",
    )]);
    Mock::given(method("GET"))
        .and(path("/20250310120000.gkg.csv.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bundle))
        .mount(server)
        .await;
}

#[tokio::test]
async fn run_publishes_an_aligned_featurized_dataset() {
    let events = MockServer::start().await;
    let prices = MockServer::start().await;
    mount_prices(&prices).await;
    mount_target_day_events(&events).await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path().to_path_buf(), &events.uri(), &prices.uri());
    let target = d(2025, 3, 10);

    let outcome = run(&ctx, target, &universe(&["USA"]), &RunOptions::default()).await;
    let RunStatus::Completed { key, rows, .. } = &outcome.status else {
        panic!("expected completion, got {:?}", outcome.status);
    };
    assert_eq!(
        key.as_deref(),
        Some("processed_data/final_aligned_data_20250310.json.gz")
    );
    // Grid: USA x (Fri, Sat, Sun, Mon).
    assert_eq!(*rows, 4);

    let dataset = ctx.datasets().load_for(target).unwrap();
    let monday = dataset.latest_row_for("USA").unwrap();
    assert_eq!(monday.date, target);

    // Prices forward-filled over the weekend, delta realised on Monday.
    let value = |name: &str| dataset.feature_value(monday, name).unwrap();
    assert!((value("wti_price") - 80.0).abs() < 1e-9);
    assert!((value("wti_delta") - 0.5).abs() < 1e-9);
    assert!((value("wti_return") - 0.5 / 79.5).abs() < 1e-9);

    // The single mocked event landed on the target cell.
    assert!((value("event_count") - 1.0).abs() < 1e-9);
    assert!((value("avg_tone") + 3.2).abs() < 1e-9);
    assert!((value("tone_std")).abs() < 1e-9);
    assert!((value("theme_energy") - 1.0).abs() < 1e-9);

    let saturday = dataset
        .rows
        .iter()
        .find(|r| r.date == d(2025, 3, 8))
        .unwrap();
    assert!((dataset.feature_value(saturday, "wti_price").unwrap() - 79.5).abs() < 1e-9);
    assert!((dataset.feature_value(saturday, "wti_delta").unwrap()).abs() < 1e-9);
}

#[tokio::test]
async fn rerunning_reproduces_the_same_content_hash() {
    let events = MockServer::start().await;
    let prices = MockServer::start().await;
    mount_prices(&prices).await;
    mount_target_day_events(&events).await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path().to_path_buf(), &events.uri(), &prices.uri());
    let target = d(2025, 3, 10);
    let countries = universe(&["USA"]);

    let first = run(&ctx, target, &countries, &RunOptions::default()).await;
    let second = run(&ctx, target, &countries, &RunOptions::default()).await;

    let hash_of = |status: &RunStatus| match status {
        RunStatus::Completed { content_hash, .. } => content_hash.clone(),
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(hash_of(&first.status), hash_of(&second.status));
}

#[tokio::test]
async fn dry_run_skips_publication() {
    let events = MockServer::start().await;
    let prices = MockServer::start().await;
    mount_prices(&prices).await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path().to_path_buf(), &events.uri(), &prices.uri());
    let target = d(2025, 3, 10);

    let opts = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };
    let outcome = run(&ctx, target, &universe(&["USA"]), &opts).await;
    let RunStatus::Completed { key, .. } = &outcome.status else {
        panic!("expected completion, got {:?}", outcome.status);
    };
    assert!(key.is_none());
    assert!(ctx.datasets().load_for(target).is_err());
}

#[tokio::test]
async fn rate_limited_prices_without_snapshot_fail_soft() {
    let events = MockServer::start().await;
    let prices = MockServer::start().await;
    let limited = serde_json::json!({ "Note": "rate limit reached" });
    for function in ["WTI", "BRENT"] {
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("function", function))
            .respond_with(ResponseTemplate::new(200).set_body_json(&limited))
            .mount(&prices)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path().to_path_buf(), &events.uri(), &prices.uri());

    let outcome = run(
        &ctx,
        d(2025, 3, 10),
        &universe(&["USA"]),
        &RunOptions::default(),
    )
    .await;
    assert!(
        matches!(outcome.status, RunStatus::FailedSoft { .. }),
        "expected soft failure, got {:?}",
        outcome.status
    );
    assert!(ctx.datasets().load_for(d(2025, 3, 10)).is_err());
}

#[tokio::test]
async fn backfill_records_failures_and_coverage_only_grows() {
    let events = MockServer::start().await;
    let prices = MockServer::start().await;
    mount_prices(&prices).await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path().to_path_buf(), &events.uri(), &prices.uri());
    let countries = universe(&["USA"]);

    let report = backfill(
        &ctx,
        d(2025, 3, 9),
        d(2025, 3, 10),
        &countries,
        &RunOptions::default(),
    )
    .await;
    assert_eq!(report.total(), 2);
    assert_eq!(report.succeeded, vec![d(2025, 3, 9), d(2025, 3, 10)]);

    let before = ctx.datasets().published_dates().unwrap();

    // A day with no prior price in its window fails soft and is recorded.
    let report = backfill(
        &ctx,
        d(2024, 1, 2),
        d(2024, 1, 2),
        &countries,
        &RunOptions::default(),
    )
    .await;
    assert_eq!(report.failed.len(), 1);

    let after = ctx.datasets().published_dates().unwrap();
    assert!(after.len() >= before.len());
    for date in &before {
        assert!(after.contains(date), "coverage shrank: lost {date}");
    }
}
