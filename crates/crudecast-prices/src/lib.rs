//! Daily spot-price ingestion for crudecast.
//!
//! Fetches trailing WTI and Brent close series from the commodity price
//! service, inner-joins them on date, and keeps an at-most-one snapshot per
//! instrument so that a rate-limited or unavailable upstream degrades to a
//! stale-but-served window instead of a failed run.

pub mod cache;
pub mod client;
pub mod error;
mod retry;
pub mod types;

pub use cache::PriceCache;
pub use client::{PriceClient, PriceFetcher};
pub use error::PriceError;
pub use types::{Instrument, PricePoint, PriceWindow};
