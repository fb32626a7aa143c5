use chrono::NaiveDate;

/// The two crude benchmarks the pipeline tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    Wti,
    Brent,
}

impl Instrument {
    pub const ALL: [Instrument; 2] = [Self::Wti, Self::Brent];

    /// Value of the service's `function` query parameter.
    #[must_use]
    pub fn function_name(self) -> &'static str {
        match self {
            Self::Wti => "WTI",
            Self::Brent => "BRENT",
        }
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.function_name())
    }
}

/// One trading day's closes, present only for days where both instruments
/// reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub wti_close: f64,
    pub brent_close: f64,
}

/// A trailing window of joined price points, ascending by date.
#[derive(Debug, Clone)]
pub struct PriceWindow {
    pub points: Vec<PricePoint>,
    /// True when the window was served from a cached snapshot because the
    /// live fetch failed.
    pub stale: bool,
}
