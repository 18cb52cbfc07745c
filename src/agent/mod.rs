//! Simulated user identities.
//!
//! An [`Agent`] is created once from the roster and lives for the whole
//! process. It owns everything that is private to one simulated user: its
//! behavior pattern, its night-shift flag, its [`ViewCache`] and its
//! [`Presence`] record.

mod roster;
mod view_cache;

pub use roster::{Population, Roster, RosterEntry, DEFAULT_PASSWORD};
pub use view_cache::{ViewCache, VIEW_TTL};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Service-side user id of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub i64);

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Behavior pattern: which actions an agent favors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorPattern {
    /// Browses and views profiles
    Explorer,
    /// Likes many profiles
    Liker,
    /// Messages and connects
    Social,
    /// Balanced, low-intensity activity
    Casual,
    /// Does everything often
    Active,
}

impl BehaviorPattern {
    /// Round-robin assignment order
    pub const ALL: [BehaviorPattern; 5] = [
        BehaviorPattern::Explorer,
        BehaviorPattern::Liker,
        BehaviorPattern::Social,
        BehaviorPattern::Casual,
        BehaviorPattern::Active,
    ];

    /// Pattern for the agent at `index` in load order
    pub fn for_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }

    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Explorer => "explorer",
            Self::Liker => "liker",
            Self::Social => "social",
            Self::Casual => "casual",
            Self::Active => "active",
        }
    }
}

impl std::fmt::Display for BehaviorPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Online status and last heartbeat of one agent.
#[derive(Debug, Default)]
pub struct Presence {
    online: AtomicBool,
    last_seen: RwLock<Option<DateTime<Utc>>>,
}

impl Presence {
    /// Mark online and stamp `last_seen`
    pub fn set_online(&self) {
        self.online.store(true, Ordering::Release);
        self.touch();
    }

    /// Mark offline and stamp `last_seen`
    pub fn set_offline(&self) {
        self.online.store(false, Ordering::Release);
        self.touch();
    }

    /// Refresh `last_seen` without changing the online flag
    pub fn touch(&self) {
        if let Ok(mut last_seen) = self.last_seen.write() {
            *last_seen = Some(Utc::now());
        }
    }

    /// Whether the agent is currently online
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Last time the agent was seen (online change or heartbeat)
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen.read().ok().and_then(|t| *t)
    }
}

/// One simulated user.
#[derive(Debug)]
pub struct Agent {
    /// Service-side user id
    pub id: AgentId,
    /// Login name
    pub username: String,
    /// Login password
    pub password: String,
    /// Position in load order
    pub index: usize,
    /// Fixed behavior pattern
    pub pattern: BehaviorPattern,
    /// Active during the quiet window instead of the day
    pub night_shift: bool,
    /// Recently viewed profiles
    pub views: ViewCache,
    /// Online status
    pub presence: Presence,
}

impl Agent {
    /// Create an agent with an empty view cache, offline
    pub fn new(
        id: AgentId,
        username: impl Into<String>,
        password: impl Into<String>,
        index: usize,
        pattern: BehaviorPattern,
        night_shift: bool,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            password: password.into(),
            index,
            pattern,
            night_shift,
            views: ViewCache::new(),
            presence: Presence::default(),
        }
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.username, self.id)
    }
}
