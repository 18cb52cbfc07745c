//! Activity records: a best-effort, fire-and-forget trail of what agents did.
//!
//! Emitting a record never blocks and never fails. A sink that cannot keep up
//! drops records and counts the drops; nothing else in the simulator notices.
//!
//! # Sinks
//!
//! | Sink            | Destination                                    |
//! |-----------------|------------------------------------------------|
//! | [`TracingSink`] | `info!` events on target `botsim::activity`    |
//! | [`JsonlSink`]   | one JSON object per line, appended to a file   |
//! | [`MemorySink`]  | in-process buffer                              |
//! | [`NullSink`]    | discarded                                      |

mod jsonl;

pub use jsonl::{JsonlSink, DEFAULT_BUFFER};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::Agent;

/// What an activity record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Fetched a page of candidates
    BrowseProfiles,
    /// Opened a profile
    VisitProfile,
    /// Liked a profile
    LikeProfile,
    /// Like call failed
    LikeProfileFailed,
    /// Removed a like
    UnlikeProfile,
    /// Unlike call failed
    UnlikeFailed,
    /// Sent a message
    SendMessage,
    /// Message call failed
    SendMessageFailed,
    /// Added a tag
    AddTag,
    /// Session started
    WentOnline,
    /// Session ended
    WentOffline,
}

impl ActivityKind {
    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BrowseProfiles => "browse_profiles",
            Self::VisitProfile => "visit_profile",
            Self::LikeProfile => "like_profile",
            Self::LikeProfileFailed => "like_profile_failed",
            Self::UnlikeProfile => "unlike_profile",
            Self::UnlikeFailed => "unlike_failed",
            Self::SendMessage => "send_message",
            Self::SendMessageFailed => "send_message_failed",
            Self::AddTag => "add_tag",
            Self::WentOnline => "went_online",
            Self::WentOffline => "went_offline",
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One thing one agent did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Simulator run that produced the record
    pub run_id: Uuid,
    /// Acting agent's user id
    pub agent_id: i64,
    /// Acting agent's username
    pub agent_username: String,
    /// What happened
    pub action: ActivityKind,
    /// Profile acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<i64>,
    /// Free-text detail (message text, tag, failure status)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// When it happened
    pub at: DateTime<Utc>,
}

impl ActivityRecord {
    /// Record for `agent` stamped now
    pub fn new(run_id: Uuid, agent: &Agent, action: ActivityKind) -> Self {
        Self {
            run_id,
            agent_id: agent.id.0,
            agent_username: agent.username.clone(),
            action,
            target_id: None,
            detail: None,
            at: Utc::now(),
        }
    }

    /// Set the target profile
    pub fn with_target(mut self, target: i64) -> Self {
        self.target_id = Some(target);
        self
    }

    /// Set the detail text
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Destination for activity records.
pub trait ActivitySink: Send + Sync {
    /// Hand off a record. Must not block.
    fn emit(&self, record: ActivityRecord);

    /// Records lost so far
    fn dropped(&self) -> u64 {
        0
    }
}

/// Logs records through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ActivitySink for TracingSink {
    fn emit(&self, record: ActivityRecord) {
        tracing::info!(
            target: "botsim::activity",
            agent = %record.agent_username,
            agent_id = record.agent_id,
            action = %record.action,
            target_id = record.target_id,
            detail = record.detail.as_deref().unwrap_or(""),
            "activity"
        );
    }
}

/// Discards records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ActivitySink for NullSink {
    fn emit(&self, _record: ActivityRecord) {}
}

/// Buffers records in memory, up to an optional cap.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<ActivityRecord>>,
    capacity: Option<usize>,
    dropped: AtomicU64,
}

impl MemorySink {
    /// Unbounded buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer that drops records past `capacity`
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Copy of every buffered record
    pub fn records(&self) -> Vec<ActivityRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Buffered records of one kind
    pub fn of_kind(&self, kind: ActivityKind) -> Vec<ActivityRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.action == kind)
            .collect()
    }
}

impl ActivitySink for MemorySink {
    fn emit(&self, record: ActivityRecord) {
        let Ok(mut records) = self.records.lock() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if self.capacity.is_some_and(|cap| records.len() >= cap) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        records.push(record);
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
