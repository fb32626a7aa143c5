//! Global-event ingestion for crudecast.
//!
//! Pulls one day of GKG bundles (96 files at 15-minute boundaries), parses
//! the tab-delimited records into [`EventRecord`]s, and aggregates them onto
//! the country x day grid consumed by the alignment pipeline. Bundle-level
//! failures are recoverable: a day only fails when fewer than a configurable
//! fraction of its bundles could be fetched and parsed.

pub mod aggregate;
pub mod client;
pub mod error;
mod parse;
pub mod themes;
pub mod types;

pub use aggregate::aggregate;
pub use client::{FetchDayOptions, GkgClient};
pub use error::GdeltError;
pub use themes::ThemeCategory;
pub use types::{AggregatedEvent, DayEvents, EventRecord, FetchStats};
