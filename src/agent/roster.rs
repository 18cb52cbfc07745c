//! Roster loading and population assignment.
//!
//! The roster lists the service accounts the simulator may drive. The
//! population is the first `size` roster entries, with behavior pattern and
//! night-shift flag assigned from load order.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Agent, AgentId, BehaviorPattern};
use crate::error::{Result, SimError};

/// Password shared by generated bot accounts.
pub const DEFAULT_PASSWORD: &str = "test123";

/// One account the simulator can log in as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Service-side user id
    pub id: i64,
    /// Login name
    pub username: String,
    /// Password override (falls back to the configured default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Ordered list of accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    /// Accounts in load order
    #[serde(default)]
    pub agents: Vec<RosterEntry>,
}

impl Roster {
    /// Load a roster file.
    ///
    /// `.json` files hold a bare array of entries; anything else is read as
    /// TOML with an `[[agents]]` table array.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SimError::Roster(format!("Failed to read {}: {e}", path.display())))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            let agents: Vec<RosterEntry> = serde_json::from_str(&content)
                .map_err(|e| SimError::Roster(format!("Failed to parse {}: {e}", path.display())))?;
            Ok(Self { agents })
        } else {
            toml::from_str(&content)
                .map_err(|e| SimError::Roster(format!("Failed to parse {}: {e}", path.display())))
        }
    }

    /// Generated roster `bot_1..bot_N` with ids `1..=N`
    pub fn generated(size: usize) -> Self {
        let agents = (1..=size)
            .map(|n| RosterEntry {
                id: n as i64,
                username: format!("bot_{n}"),
                password: None,
            })
            .collect();
        Self { agents }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the roster is empty
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// The agents a simulation run drives.
#[derive(Debug, Clone)]
pub struct Population {
    agents: Vec<Arc<Agent>>,
}

impl Population {
    /// Take the first `size` roster entries and assign pattern and night
    /// shift from load order.
    ///
    /// Agent `i` gets pattern `i mod 5` and is night-shift when
    /// `i % night_shift_every == 0`. A `night_shift_every` of zero disables
    /// night-shift agents.
    pub fn assign(
        roster: &Roster,
        size: usize,
        night_shift_every: usize,
        default_password: &str,
    ) -> Result<Self> {
        let agents: Vec<Arc<Agent>> = roster
            .agents
            .iter()
            .take(size)
            .enumerate()
            .map(|(index, entry)| {
                let night_shift = night_shift_every > 0 && index % night_shift_every == 0;
                Arc::new(Agent::new(
                    AgentId(entry.id),
                    entry.username.clone(),
                    entry
                        .password
                        .clone()
                        .unwrap_or_else(|| default_password.to_string()),
                    index,
                    BehaviorPattern::for_index(index),
                    night_shift,
                ))
            })
            .collect();

        if agents.is_empty() {
            return Err(SimError::EmptyPopulation);
        }

        Ok(Self { agents })
    }

    /// Agents in load order
    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    /// Number of agents
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Always false; an empty population cannot be assigned
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Number of night-shift agents
    pub fn night_shift_count(&self) -> usize {
        self.agents.iter().filter(|a| a.night_shift).count()
    }
}
