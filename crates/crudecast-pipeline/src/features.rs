//! Deterministic feature derivation.
//!
//! Consumes the aligned grid country-group by country-group (input order is
//! the aligner's `(country, date)` sort) and emits the canonical feature
//! vector for every row. Each value is a pure function of the group's rows
//! at dates at or before the current one, never reaching back more than
//! [`names::MAX_LOOKBACK`] prior rows.
//!
//! NaN policy: insufficient history yields NaN internally and 0 in the
//! output. Non-finite values (division blow-ups) are clamped to 0 and
//! counted; an output NaN never ships.

use crate::names::{
    EPSILON, MAX_LOOKBACK, NEWS_LAGS, PRICE_LAGS, ROLLING_WINDOWS, RSI_PERIOD, ZSCORE_WINDOW,
};
use crate::types::{AlignedRow, FeatureRow};
use crudecast_gdelt::ThemeCategory;

/// Engineered rows plus derivation counters.
#[derive(Debug)]
pub struct EngineerOutcome {
    pub rows: Vec<FeatureRow>,
    /// Values that came out infinite and were clamped to 0.
    pub clamped_non_finite: u64,
}

/// Derive the canonical feature matrix from the aligned grid.
///
/// `aligned` must be sorted by `(country, date)` ascending, which is what
/// [`crate::align::align`] produces.
#[must_use]
pub fn engineer(aligned: &[AlignedRow]) -> EngineerOutcome {
    let mut rows = Vec::with_capacity(aligned.len());
    let mut clamped = 0u64;

    let mut start = 0;
    while start < aligned.len() {
        let country = &aligned[start].country;
        let end = aligned[start..]
            .iter()
            .position(|r| &r.country != country)
            .map_or(aligned.len(), |offset| start + offset);
        engineer_group(&aligned[start..end], &mut rows, &mut clamped);
        start = end;
    }

    EngineerOutcome {
        rows,
        clamped_non_finite: clamped,
    }
}

/// Price series for one instrument within a country group.
struct InstrumentSeries {
    price: Vec<f64>,
    delta: Vec<f64>,
    ret: Vec<f64>,
}

impl InstrumentSeries {
    fn from_prices(price: Vec<f64>) -> Self {
        let mut delta = vec![f64::NAN; price.len()];
        let mut ret = vec![f64::NAN; price.len()];
        for t in 1..price.len() {
            delta[t] = price[t] - price[t - 1];
            ret[t] = delta[t] / price[t - 1];
        }
        Self { price, delta, ret }
    }
}

fn engineer_group(group: &[AlignedRow], out: &mut Vec<FeatureRow>, clamped: &mut u64) {
    let n_features = crate::names::feature_names().len();
    let wti = InstrumentSeries::from_prices(group.iter().map(|r| r.wti_price).collect());
    let brent = InstrumentSeries::from_prices(group.iter().map(|r| r.brent_price).collect());

    let event_count: Vec<f64> = group.iter().map(|r| r.event_count as f64).collect();
    let avg_tone: Vec<f64> = group.iter().map(|r| r.avg_tone).collect();
    let tone_std: Vec<f64> = group.iter().map(|r| r.tone_std).collect();
    let unique_sources: Vec<f64> = group.iter().map(|r| r.unique_sources as f64).collect();
    let themes: Vec<Vec<f64>> = ThemeCategory::ALL
        .iter()
        .map(|category| {
            group
                .iter()
                .map(|r| r.theme_counts[*category as usize] as f64)
                .collect()
        })
        .collect();
    let news_series = [&avg_tone, &tone_std, &event_count];

    for (t, row) in group.iter().enumerate() {
        let mut values = Vec::with_capacity(n_features);

        for series in [&wti, &brent] {
            push_instrument(&mut values, series, t);
        }

        values.push(event_count[t]);
        values.push(avg_tone[t]);
        values.push(tone_std[t]);
        values.push(unique_sources[t]);
        for series in news_series {
            for lag_offset in NEWS_LAGS {
                values.push(lag(series, t, lag_offset));
            }
        }
        for series in news_series {
            let (change, pct_change) = changes(series, t);
            values.push(change);
            values.push(pct_change);
        }
        for theme in &themes {
            let (change, pct_change) = changes(theme, t);
            let zscore = trailing_zscore(theme, t);
            values.push(theme[t]);
            values.push(change);
            values.push(pct_change);
            values.push(zscore);
            values.push(if zscore > 2.0 { 1.0 } else { 0.0 });
        }

        for value in &mut values {
            if value.is_nan() {
                *value = 0.0;
            } else if value.is_infinite() {
                *value = 0.0;
                *clamped += 1;
            }
        }

        out.push(FeatureRow {
            country: row.country.clone(),
            date: row.date,
            values,
        });
    }
}

fn push_instrument(values: &mut Vec<f64>, series: &InstrumentSeries, t: usize) {
    values.push(series.price[t]);
    values.push(series.delta[t]);
    values.push(series.ret[t]);
    for lag_offset in PRICE_LAGS {
        values.push(lag(&series.price, t, lag_offset));
    }
    for lag_offset in PRICE_LAGS {
        values.push(lag(&series.ret, t, lag_offset));
    }

    let means: Vec<f64> = ROLLING_WINDOWS
        .iter()
        .map(|w| trailing_mean(&series.ret, t, *w))
        .collect();
    for (i, window) in ROLLING_WINDOWS.iter().enumerate() {
        values.push(means[i]);
        values.push(trailing_std(&series.ret, t, *window));
    }
    // momentum_5_20 and momentum_10_30 from the window means above.
    values.push(means[0] - means[2]);
    values.push(means[1] - means[3]);

    let window_start = t.saturating_sub(MAX_LOOKBACK);
    values.push(wilder_rsi(&series.price[window_start..=t]));
}

/// Value `k` rows back within the group; NaN before enough history exists.
fn lag(series: &[f64], t: usize, k: usize) -> f64 {
    if t >= k {
        series[t - k]
    } else {
        f64::NAN
    }
}

/// First difference and its relative change with an epsilon-floored
/// denominator.
fn changes(series: &[f64], t: usize) -> (f64, f64) {
    if t == 0 {
        return (f64::NAN, f64::NAN);
    }
    let change = series[t] - series[t - 1];
    let pct_change = change / series[t - 1].abs().max(EPSILON);
    (change, pct_change)
}

/// The up-to-`w` trailing values ending at `t`, inclusive.
fn trailing_window(series: &[f64], t: usize, w: usize) -> &[f64] {
    let start = (t + 1).saturating_sub(w);
    &series[start..=t]
}

/// Mean over the finite values in the trailing window; NaN when none are.
fn trailing_mean(series: &[f64], t: usize, w: usize) -> f64 {
    let finite: Vec<f64> = trailing_window(series, t, w)
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.iter().sum::<f64>() / finite.len() as f64
}

/// Sample standard deviation over the finite values in the trailing window;
/// NaN below two observations.
fn trailing_std(series: &[f64], t: usize, w: usize) -> f64 {
    let finite: Vec<f64> = trailing_window(series, t, w)
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    if finite.len() < 2 {
        return f64::NAN;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let sum_sq: f64 = finite.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (finite.len() - 1) as f64).sqrt()
}

/// Z-score of `series[t]` against its trailing window; 0 when the window
/// deviation is 0 or undefined.
fn trailing_zscore(series: &[f64], t: usize) -> f64 {
    let std = trailing_std(series, t, ZSCORE_WINDOW);
    if !std.is_finite() || std == 0.0 {
        return 0.0;
    }
    let mean = trailing_mean(series, t, ZSCORE_WINDOW);
    (series[t] - mean) / std
}

/// Wilder RSI over a price slice.
///
/// The first [`RSI_PERIOD`] changes seed the averages with their simple
/// mean; the remainder run the EMA recurrence with alpha = 1/period. All
/// gains and no losses saturate at 100. NaN below period + 1 prices.
fn wilder_rsi(prices: &[f64]) -> f64 {
    if prices.len() < RSI_PERIOD + 1 {
        return f64::NAN;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

    let (mut avg_gain, mut avg_loss) =
        changes
            .iter()
            .take(RSI_PERIOD)
            .fold((0.0, 0.0), |(g, l), &change| {
                if change > 0.0 {
                    (g + change, l)
                } else {
                    (g, l - change)
                }
            });
    avg_gain /= RSI_PERIOD as f64;
    avg_loss /= RSI_PERIOD as f64;

    for &change in changes.iter().skip(RSI_PERIOD) {
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (RSI_PERIOD as f64 - 1.0) + gain) / RSI_PERIOD as f64;
        avg_loss = (avg_loss * (RSI_PERIOD as f64 - 1.0) + loss) / RSI_PERIOD as f64;
    }

    if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - (100.0 / (1.0 + rs))
    }
}
