//! Theme taxonomy for event categorisation.
//!
//! Upstream theme tokens are free-form (`ENV_OIL`, `ARMEDCONFLICT`,
//! `ECON_TRADE_DISPUTE`, ...). They are folded into a closed set of six
//! categories via a static keyword table: case-insensitive substring match,
//! first matching category wins for a given token, and one record may still
//! land in several categories through different tokens.

/// The closed category set tracked per country x day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum ThemeCategory {
    Energy = 0,
    Conflict = 1,
    Sanctions = 2,
    Trade = 3,
    Economy = 4,
    Policy = 5,
}

/// Keyword lists per category, scanned in declaration order.
const CATEGORY_KEYWORDS: &[(ThemeCategory, &[&str])] = &[
    (
        ThemeCategory::Energy,
        &[
            "OIL",
            "ENERGY",
            "GAS",
            "PETROLEUM",
            "FUEL",
            "MINING",
            "ECON_ENERGY",
            "OILPRICE",
        ],
    ),
    (
        ThemeCategory::Conflict,
        &[
            "WAR", "CONFLICT", "MILITARY", "ARMED", "VIOLENCE", "KILL", "ATTACK", "TERROR",
        ],
    ),
    (
        ThemeCategory::Sanctions,
        &["SANCTION", "EMBARGO", "BLOCKADE", "RESTRICTION"],
    ),
    (
        ThemeCategory::Trade,
        &["TRADE", "EXPORT", "IMPORT", "TARIFF", "COMMERCE"],
    ),
    (
        ThemeCategory::Economy,
        &[
            "ECON_", "ECONOMY", "INFLATION", "CURRENCY", "FINANCE", "MARKET",
        ],
    ),
    (
        ThemeCategory::Policy,
        &["GOVERNMENT", "POLICY", "REGULATION", "LAW", "LEGAL"],
    ),
];

impl ThemeCategory {
    pub const COUNT: usize = 6;

    /// All categories in canonical (feature-column) order.
    pub const ALL: [ThemeCategory; Self::COUNT] = [
        Self::Energy,
        Self::Conflict,
        Self::Sanctions,
        Self::Trade,
        Self::Economy,
        Self::Policy,
    ];

    /// Lowercase name used in feature columns (`theme_energy`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Energy => "energy",
            Self::Conflict => "conflict",
            Self::Sanctions => "sanctions",
            Self::Trade => "trade",
            Self::Economy => "economy",
            Self::Policy => "policy",
        }
    }

    /// Categorise a single theme token.
    ///
    /// The token is matched uppercased against each category's keyword list
    /// in declaration order; the first category with a matching substring
    /// wins. Unrecognised tokens return `None`.
    #[must_use]
    pub fn of_token(token: &str) -> Option<Self> {
        let upper = token.to_uppercase();
        for (category, keywords) in CATEGORY_KEYWORDS {
            if keywords.iter().any(|k| upper.contains(k)) {
                return Some(*category);
            }
        }
        None
    }
}

impl std::fmt::Display for ThemeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
