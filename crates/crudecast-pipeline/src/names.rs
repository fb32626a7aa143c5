//! Canonical feature schema.
//!
//! The single source of truth for feature naming and ordering, shared by the
//! engineer (which emits values in this order), the dataset codec (which
//! validates row keys against it), and the inference engine (which refuses
//! to run unless the model metadata pins exactly this list).

use crudecast_gdelt::ThemeCategory;

/// Price instruments, in column order.
pub const INSTRUMENTS: [&str; 2] = ["wti", "brent"];

/// Lag offsets for price and return columns.
pub const PRICE_LAGS: [usize; 7] = [1, 2, 3, 5, 7, 14, 30];

/// Lag offsets for news columns.
pub const NEWS_LAGS: [usize; 5] = [1, 2, 3, 5, 7];

/// Rolling windows for return moving averages and deviations.
pub const ROLLING_WINDOWS: [usize; 4] = [5, 10, 20, 30];

/// News columns that get lags and change columns.
pub const NEWS_SERIES: [&str; 3] = ["avg_tone", "tone_std", "event_count"];

/// Longest history (in prior rows) any feature may reach back.
pub const MAX_LOOKBACK: usize = 30;

/// RSI smoothing period.
pub const RSI_PERIOD: usize = 14;

/// Window for theme z-scores.
pub const ZSCORE_WINDOW: usize = 30;

/// Denominator floor for percentage changes.
pub const EPSILON: f64 = 1e-9;

/// The full canonical feature-name list, in column order.
#[must_use]
pub fn feature_names() -> Vec<String> {
    let mut names = Vec::new();

    for instrument in INSTRUMENTS {
        names.push(format!("{instrument}_price"));
        names.push(format!("{instrument}_delta"));
        names.push(format!("{instrument}_return"));
        for lag in PRICE_LAGS {
            names.push(format!("{instrument}_price_lag{lag}"));
        }
        for lag in PRICE_LAGS {
            names.push(format!("{instrument}_return_lag{lag}"));
        }
        for window in ROLLING_WINDOWS {
            names.push(format!("{instrument}_return_ma{window}"));
            names.push(format!("{instrument}_return_std{window}"));
        }
        names.push(format!("{instrument}_momentum_5_20"));
        names.push(format!("{instrument}_momentum_10_30"));
        names.push(format!("{instrument}_rsi"));
    }

    names.push("event_count".to_string());
    names.push("avg_tone".to_string());
    names.push("tone_std".to_string());
    names.push("unique_sources".to_string());
    for series in NEWS_SERIES {
        for lag in NEWS_LAGS {
            names.push(format!("{series}_lag{lag}"));
        }
    }
    for series in NEWS_SERIES {
        names.push(format!("{series}_change"));
        names.push(format!("{series}_pct_change"));
    }
    for category in ThemeCategory::ALL {
        let key = category.as_str();
        names.push(format!("theme_{key}"));
        names.push(format!("theme_{key}_change"));
        names.push(format!("theme_{key}_pct_change"));
        names.push(format!("theme_{key}_zscore"));
        names.push(format!("theme_{key}_spike"));
    }

    names
}
