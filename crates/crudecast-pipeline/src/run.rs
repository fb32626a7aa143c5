//! Pipeline orchestration: the per-day state machine and backfill loop.
//!
//! A run drives fetch -> aggregate -> align -> featurize -> publish for one
//! target date. Component errors are classified into soft failures (retry
//! next scheduled run; the previous publication stays authoritative) and
//! hard failures (schema or storage inconsistencies needing an operator).
//!
//! The in-flight guard is process-local; cross-instance safety relies on
//! the artifact store's atomic-rename publication, which makes concurrent
//! identical runs converge on the same artifact.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use crudecast_core::AppConfig;
use crudecast_gdelt::{aggregate, AggregatedEvent, FetchDayOptions, GkgClient};
use crudecast_prices::{PriceClient, PriceFetcher};

use crate::align::align;
use crate::error::{PipelineError, StoreError};
use crate::features::engineer;
use crate::store::{ArtifactStore, DatasetStore, FsStore};
use crate::types::ProcessedDataset;

/// Calendar days of event history fetched before the target date.
///
/// Matches the feature engine's maximum lookback: rows further back only
/// serve as price history, where events are zero anyway.
pub const EVENT_HISTORY_DAYS: usize = crate::names::MAX_LOOKBACK;

/// Everything a run needs, built once at process start.
///
/// Clients, the store handle, and the price snapshot cache live here for
/// the life of the process; nothing in the context is global.
pub struct PipelineContext {
    pub config: AppConfig,
    gdelt: GkgClient,
    prices: PriceFetcher,
    store: Arc<dyn ArtifactStore>,
    datasets: DatasetStore,
    in_flight: Mutex<BTreeSet<NaiveDate>>,
}

impl PipelineContext {
    /// Build a context against the configured upstreams and data directory.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when either HTTP client cannot be built.
    pub fn new(config: AppConfig) -> Result<Self, PipelineError> {
        let gdelt = GkgClient::new(&config.gdelt_base_url, config.bundle_timeout_secs)?;
        let price_client =
            PriceClient::with_base_url(&config.price_api_key, 30, &config.price_base_url)?;
        let store: Arc<dyn ArtifactStore> = Arc::new(FsStore::new(config.data_dir.clone()));
        Ok(Self::with_parts(
            config,
            gdelt,
            PriceFetcher::new(price_client),
            store,
        ))
    }

    /// Assemble a context from pre-built parts (tests point the clients at
    /// mock servers and the store at a temp dir).
    #[must_use]
    pub fn with_parts(
        config: AppConfig,
        gdelt: GkgClient,
        prices: PriceFetcher,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        let datasets = DatasetStore::new(Arc::clone(&store), &config.processed_prefix);
        Self {
            config,
            gdelt,
            prices,
            store,
            datasets,
            in_flight: Mutex::new(BTreeSet::new()),
        }
    }

    #[must_use]
    pub fn datasets(&self) -> &DatasetStore {
        &self.datasets
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn ArtifactStore> {
        Arc::clone(&self.store)
    }

    fn fetch_day_options(&self) -> FetchDayOptions {
        FetchDayOptions {
            concurrency: self.config.event_bundle_concurrency,
            min_bundle_fraction: self.config.min_event_bundles_fraction,
            day_timeout: Some(Duration::from_secs(self.config.day_timeout_secs)),
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Skip publication; everything else runs.
    pub dry_run: bool,
    /// Observed at every state transition; a set flag abandons the run with
    /// nothing published.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl RunOptions {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// States of the per-day pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    FetchingEvents,
    Aggregating,
    FetchingPrices,
    Aligning,
    Featurizing,
    Publishing,
    Done,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::FetchingEvents => "FETCHING_EVENTS",
            Self::Aggregating => "AGGREGATING",
            Self::FetchingPrices => "FETCHING_PRICES",
            Self::Aligning => "ALIGNING",
            Self::Featurizing => "FEATURIZING",
            Self::Publishing => "PUBLISHING",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Terminal result of one run.
#[derive(Debug, Clone)]
pub enum RunStatus {
    Completed {
        /// Publication key; `None` on dry runs.
        key: Option<String>,
        content_hash: String,
        rows: usize,
        /// The price window came from a cached snapshot.
        stale_prices: bool,
    },
    FailedSoft {
        reason: String,
    },
    FailedHard {
        reason: String,
    },
}

/// A run's target date plus its terminal status.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub target_date: NaiveDate,
    pub status: RunStatus,
}

impl RunOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self.status, RunStatus::Completed { .. })
    }
}

/// Releases the in-flight reservation on drop.
struct InFlightGuard<'a> {
    context: &'a PipelineContext,
    date: NaiveDate,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(context: &'a PipelineContext, date: NaiveDate) -> Result<Self, PipelineError> {
        let mut in_flight = context
            .in_flight
            .lock()
            .map_err(|_| PipelineError::Invariant("in-flight lock poisoned".to_string()))?;
        if !in_flight.insert(date) {
            return Err(PipelineError::InFlight(date));
        }
        Ok(Self { context, date })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.context.in_flight.lock() {
            in_flight.remove(&self.date);
        }
    }
}

/// Run the full pipeline for one target date.
///
/// Idempotent: re-running against unchanged upstream data republishes a
/// byte-identical artifact with the same content hash.
pub async fn run(
    ctx: &PipelineContext,
    target_date: NaiveDate,
    universe: &BTreeSet<String>,
    opts: &RunOptions,
) -> RunOutcome {
    let status = match run_inner(ctx, target_date, universe, opts).await {
        Ok(status) => status,
        Err(e) => classify(&e),
    };
    match &status {
        RunStatus::Completed { rows, .. } => {
            tracing::info!(date = %target_date, rows, "pipeline run complete");
        }
        RunStatus::FailedSoft { reason } => {
            tracing::warn!(date = %target_date, %reason, "pipeline run failed soft");
        }
        RunStatus::FailedHard { reason } => {
            tracing::error!(date = %target_date, %reason, "pipeline run failed hard");
        }
    }
    RunOutcome {
        target_date,
        status,
    }
}

async fn run_inner(
    ctx: &PipelineContext,
    target_date: NaiveDate,
    universe: &BTreeSet<String>,
    opts: &RunOptions,
) -> Result<RunStatus, PipelineError> {
    let _guard = InFlightGuard::acquire(ctx, target_date)?;

    let mut state = RunState::Pending;
    let mut transition = |next: RunState| -> Result<(), PipelineError> {
        if opts.cancelled() {
            return Err(PipelineError::Cancelled);
        }
        tracing::debug!(date = %target_date, from = %state, to = %next, "state transition");
        state = next;
        Ok(())
    };

    // Events for the target day and its trailing history, aggregated per
    // day. History days fail lenient (zero-filled); the target day strict.
    transition(RunState::FetchingEvents)?;
    let mut aggregated: Vec<AggregatedEvent> = Vec::new();
    let mut days_fetched = BTreeMap::new();
    for days_ago in (0..=EVENT_HISTORY_DAYS as i64).rev() {
        let date = target_date - chrono::Duration::days(days_ago);
        match ctx.gdelt.fetch_day(date, ctx.fetch_day_options()).await {
            Ok(day) => {
                days_fetched.insert(date, day.records.len());
                aggregated.extend(aggregate(&day.records, date, universe));
            }
            Err(e) if days_ago == 0 => return Err(e.into()),
            Err(e) => {
                tracing::warn!(
                    %date,
                    error = %e,
                    "history day failed — treating as a silent day"
                );
            }
        }
    }

    transition(RunState::Aggregating)?;
    tracing::info!(
        date = %target_date,
        days = days_fetched.len(),
        country_days = aggregated.len(),
        "aggregated event records"
    );

    transition(RunState::FetchingPrices)?;
    let prices = ctx
        .prices
        .fetch_prices(target_date, ctx.config.lookback_days)
        .await?;
    if prices.stale {
        tracing::warn!(date = %target_date, "price window served from stale snapshot");
    }

    transition(RunState::Aligning)?;
    let aligned = align(
        &aggregated,
        &prices.points,
        universe,
        target_date,
        ctx.config.lookback_days,
    );
    if aligned.is_empty() {
        return Err(PipelineError::EmptyGrid(target_date));
    }

    transition(RunState::Featurizing)?;
    let outcome = engineer(&aligned);
    if outcome.clamped_non_finite > 0 {
        tracing::warn!(
            date = %target_date,
            clamped = outcome.clamped_non_finite,
            "non-finite feature values clamped to zero"
        );
    }
    let dataset = ProcessedDataset::new(target_date, outcome.rows);
    if !dataset.cold_start.is_empty() {
        tracing::warn!(
            date = %target_date,
            countries = ?dataset.cold_start,
            "cold-start countries have under-filled history"
        );
    }

    transition(RunState::Publishing)?;
    let rows = dataset.rows.len();
    let (key, content_hash) = if opts.dry_run {
        (None, DatasetStore::content_hash(&dataset))
    } else {
        let published = ctx.datasets.publish(&dataset)?;
        (Some(published.key), published.content_hash)
    };

    transition(RunState::Done)?;
    Ok(RunStatus::Completed {
        key,
        content_hash,
        rows,
        stale_prices: prices.stale,
    })
}

/// Map a component error onto the soft/hard terminal split.
fn classify(error: &PipelineError) -> RunStatus {
    use crudecast_gdelt::GdeltError;
    use crudecast_prices::PriceError;

    let soft = |reason: String| RunStatus::FailedSoft { reason };
    let hard = |reason: String| RunStatus::FailedHard { reason };

    match error {
        PipelineError::Gdelt(e) => match e {
            GdeltError::InvalidBaseUrl(_) => hard(format!("event fetcher: {e}")),
            _ => soft(format!("event fetcher: {e}")),
        },
        PipelineError::Price(e) => match e {
            PriceError::InvalidBaseUrl(_) => hard(format!("price fetcher: {e}")),
            _ => soft(format!("price fetcher: {e}")),
        },
        PipelineError::Store(e) => match e {
            StoreError::NotFound(_) => soft(format!("artifact store: {e}")),
            _ => hard(format!("artifact store: {e}")),
        },
        PipelineError::EmptyGrid(_) | PipelineError::InFlight(_) | PipelineError::Cancelled => {
            soft(error.to_string())
        }
        PipelineError::Invariant(_) => hard(error.to_string()),
    }
}

/// Per-day results of a backfill sweep.
#[derive(Debug, Default)]
pub struct BackfillReport {
    pub succeeded: Vec<NaiveDate>,
    pub failed: Vec<(NaiveDate, String)>,
}

impl BackfillReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Run the pipeline for every day in `[start, end]`, ascending.
///
/// Individual day failures are recorded and the sweep continues; the set of
/// successfully published dates only ever grows across repeated sweeps.
pub async fn backfill(
    ctx: &PipelineContext,
    start: NaiveDate,
    end: NaiveDate,
    universe: &BTreeSet<String>,
    opts: &RunOptions,
) -> BackfillReport {
    let mut report = BackfillReport::default();
    let mut date = start;
    while date <= end {
        if opts.cancelled() {
            tracing::warn!(%date, "backfill cancelled");
            break;
        }
        let outcome = run(ctx, date, universe, opts).await;
        match outcome.status {
            RunStatus::Completed { .. } => report.succeeded.push(date),
            RunStatus::FailedSoft { reason } | RunStatus::FailedHard { reason } => {
                report.failed.push((date, reason));
            }
        }
        date += chrono::Duration::days(1);
    }
    tracing::info!(
        start = %start,
        end = %end,
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "backfill sweep finished"
    );
    report
}
