use std::collections::BTreeSet;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crudecast_core::dates::{default_target_date, parse_iso_date};
use crudecast_model::{predict, update_history, ModelBundle, ModelCache};
use crudecast_pipeline::{backfill, run, PipelineContext, RunOptions, RunStatus};

#[derive(Debug, Parser)]
#[command(name = "crudecast")]
#[command(about = "Oil price prediction pipeline: event ingestion, feature engineering, inference")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the data pipeline for one target date and publish the dataset
    Run {
        /// Target date (YYYY-MM-DD); defaults to yesterday UTC
        #[arg(long)]
        date: Option<String>,

        /// Run every stage but skip publication
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the pipeline for every day in a date range, recording failures
    Backfill {
        /// First date (YYYY-MM-DD), inclusive
        #[arg(long)]
        start: String,

        /// Last date (YYYY-MM-DD), inclusive
        #[arg(long)]
        end: String,
    },
    /// Predict the next trading day's WTI delta from a published dataset
    Predict {
        /// Dataset target date (YYYY-MM-DD); defaults to the latest published
        #[arg(long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| {
        let level = std::env::var("CRUDECAST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(level)
    })?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Run { date, dry_run }) => {
            let target_date = parse_date_or_exit(date.as_deref());
            run_pipeline(target_date, dry_run).await
        }
        Some(Commands::Backfill { start, end }) => {
            let start = parse_date_or_exit(Some(&start));
            let end = parse_date_or_exit(Some(&end));
            run_backfill(start, end).await
        }
        Some(Commands::Predict { date }) => {
            let date = date.as_deref().map(|raw| parse_date_or_exit(Some(raw)));
            run_predict(date)
        }
        None => {
            println!("crudecast: use `run`, `backfill`, or `predict` (see --help)");
            Ok(())
        }
    }
}

async fn run_pipeline(target_date: NaiveDate, dry_run: bool) -> anyhow::Result<()> {
    let ctx = build_context_or_exit();
    let universe = load_universe_or_exit(&ctx);
    let opts = RunOptions {
        dry_run,
        ..RunOptions::default()
    };

    let outcome = run(&ctx, target_date, &universe, &opts).await;
    match outcome.status {
        RunStatus::Completed {
            key,
            content_hash,
            rows,
            stale_prices,
        } => {
            match key {
                Some(key) => println!("published {key} ({rows} rows, sha256 {content_hash})"),
                None => println!("dry run complete ({rows} rows, sha256 {content_hash})"),
            }
            if stale_prices {
                println!("warning: price window came from a stale snapshot");
            }
            Ok(())
        }
        RunStatus::FailedSoft { reason } => {
            println!("run for {target_date} failed soft: {reason}");
            println!("the previous publication remains authoritative; retry next schedule");
            Ok(())
        }
        RunStatus::FailedHard { reason } => {
            anyhow::bail!("run for {target_date} failed hard: {reason}")
        }
    }
}

async fn run_backfill(start: NaiveDate, end: NaiveDate) -> anyhow::Result<()> {
    if end < start {
        anyhow::bail!("backfill end {end} precedes start {start}");
    }
    let ctx = build_context_or_exit();
    let universe = load_universe_or_exit(&ctx);

    let report = backfill(&ctx, start, end, &universe, &RunOptions::default()).await;
    println!(
        "backfill {start}..{end}: {}/{} days published",
        report.succeeded.len(),
        report.total()
    );
    for (date, reason) in &report.failed {
        println!("  {date}: {reason}");
    }
    Ok(())
}

fn run_predict(date: Option<NaiveDate>) -> anyhow::Result<()> {
    let ctx = build_context_or_exit();
    let cache = ModelCache::new();
    let store = ctx.store();
    let bundle = cache
        .load_or_init(
            store.as_ref(),
            &ctx.config.models_prefix,
            &ctx.config.model_run_id,
        )
        .map_err(|e| anyhow::anyhow!("model bundle unavailable: {e}"))?;

    let dataset = match date {
        Some(date) => ctx.datasets().load_for(date),
        None => ctx.datasets().load_latest(),
    }
    .map_err(|e| anyhow::anyhow!("no processed dataset: {e}"))?;

    let report = predict(&dataset, &bundle)?;
    let history = update_history(store.as_ref(), &ctx.config.processed_prefix, &report)?;

    println!(
        "{} -> {}: predicted delta {:+.4} ({}), close {:.2} -> {:.2}",
        report.target_date,
        report.prediction_for_date,
        report.predicted_delta,
        report.direction,
        report.reference_close,
        report.predicted_close,
    );
    if !report.skipped.is_empty() {
        println!("skipped countries: {}", report.skipped.join(", "));
    }
    println!("top contributors:");
    for (country, attribution) in report.top_contributors(ctx.config.top_countries_count) {
        println!(
            "  {country}: contribution {:+.5} ({:.1}%), raw {:+.5}, attention {:.3}",
            attribution.contribution,
            attribution.percentage,
            attribution.raw_delta,
            attribution.attention_weight,
        );
    }
    println!(
        "history: {} records, {} outcomes realised",
        history.history_len, history.updated_outcomes
    );
    Ok(())
}

fn parse_date_or_exit(raw: Option<&str>) -> NaiveDate {
    match raw {
        None => default_target_date(),
        Some(raw) => parse_iso_date(raw).unwrap_or_else(|e| {
            eprintln!("error: {e}");
            std::process::exit(1);
        }),
    }
}

fn build_context_or_exit() -> PipelineContext {
    let config = crudecast_core::load_app_config().unwrap_or_else(|e| {
        eprintln!("error: invalid configuration: {e}");
        eprintln!("hint: copy .env.example to .env and fill the required values");
        std::process::exit(1);
    });
    PipelineContext::new(config).unwrap_or_else(|e| {
        eprintln!("error: failed to initialise pipeline: {e}");
        std::process::exit(1);
    })
}

fn load_universe_or_exit(ctx: &PipelineContext) -> BTreeSet<String> {
    let store = ctx.store();
    let metadata = ModelBundle::load_metadata(
        store.as_ref(),
        &ctx.config.models_prefix,
        &ctx.config.model_run_id,
    )
    .unwrap_or_else(|e| {
        eprintln!("error: cannot load model metadata for the country universe: {e}");
        std::process::exit(1);
    });
    metadata.countries.into_iter().collect()
}
