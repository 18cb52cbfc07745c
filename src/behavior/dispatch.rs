//! Action Dispatcher: behavior pattern + one uniform draw -> action.
//!
//! Each pattern owns a band table of cumulative upper bounds. A draw selects
//! the first band whose bound is strictly greater than the draw, so bands are
//! lower-inclusive / upper-exclusive and a draw sitting exactly on a boundary
//! belongs to the band that starts there.

use serde::{Deserialize, Serialize};

use crate::agent::BehaviorPattern;

/// User-facing action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Fetch a page of candidates
    Browse,
    /// Open one candidate's profile
    Visit,
    /// Like a recently viewed candidate
    Like,
    /// Unlike a random connection
    Disconnect,
    /// Message a random connection
    SendMessage,
    /// Add a popular tag to the own profile
    ChangeTags,
}

impl Action {
    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Browse => "browse",
            Self::Visit => "visit",
            Self::Like => "like",
            Self::Disconnect => "disconnect",
            Self::SendMessage => "send_message",
            Self::ChangeTags => "change_tags",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One probability band: the action owning `[previous bound, upper)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    /// Cumulative upper bound
    pub upper: f64,
    /// Action owning the band
    pub action: Action,
}

const fn band(upper: f64, action: Action) -> Band {
    Band { upper, action }
}

const EXPLORER: &[Band] = &[
    band(0.48, Action::Visit),
    band(0.76, Action::Browse),
    band(0.90, Action::Like),
    band(0.98, Action::Disconnect),
    band(1.0, Action::ChangeTags),
];

const LIKER: &[Band] = &[
    band(0.48, Action::Like),
    band(0.76, Action::Visit),
    band(0.90, Action::Browse),
    band(0.98, Action::Disconnect),
    band(1.0, Action::ChangeTags),
];

const SOCIAL: &[Band] = &[
    band(0.35, Action::SendMessage),
    band(0.62, Action::Like),
    band(0.80, Action::Visit),
    band(0.92, Action::Disconnect),
    band(1.0, Action::ChangeTags),
];

const ACTIVE: &[Band] = &[
    band(0.22, Action::Like),
    band(0.42, Action::Visit),
    band(0.60, Action::Browse),
    band(0.78, Action::SendMessage),
    band(0.92, Action::Disconnect),
    band(1.0, Action::ChangeTags),
];

const CASUAL: &[Band] = &[
    band(0.32, Action::Browse),
    band(0.54, Action::Visit),
    band(0.74, Action::Like),
    band(0.86, Action::Disconnect),
    band(0.94, Action::SendMessage),
    band(1.0, Action::ChangeTags),
];

/// Band table for a pattern
pub fn band_table(pattern: BehaviorPattern) -> &'static [Band] {
    match pattern {
        BehaviorPattern::Explorer => EXPLORER,
        BehaviorPattern::Liker => LIKER,
        BehaviorPattern::Social => SOCIAL,
        BehaviorPattern::Active => ACTIVE,
        BehaviorPattern::Casual => CASUAL,
    }
}

/// Whether bounds are strictly increasing, positive and end at exactly 1.0
pub fn is_valid_table(table: &[Band]) -> bool {
    let increasing = table
        .iter()
        .try_fold(0.0_f64, |prev, b| (b.upper > prev).then_some(b.upper))
        .is_some();
    #[allow(clippy::float_cmp)]
    let ends_at_one = table.last().is_some_and(|b| b.upper == 1.0);
    increasing && ends_at_one
}

/// Map a uniform draw in `[0, 1)` to an action.
///
/// Draws at or above 1.0 clamp to the last band.
pub fn choose_action(pattern: BehaviorPattern, draw: f64) -> Action {
    let table = band_table(pattern);
    table
        .iter()
        .find(|b| draw < b.upper)
        .or(table.last())
        .map_or(Action::Browse, |b| b.action)
}
