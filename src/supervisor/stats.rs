//! Simulation statistics.
//!
//! Tracks action outcomes, sessions and concurrent occupancy of the session
//! gate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::actions::Outcome;

/// Thread-safe simulation counters
#[derive(Debug)]
pub struct SimStats {
    /// Actions whose service call succeeded
    actions_completed: AtomicU64,
    /// Actions that had nothing to do
    actions_skipped: AtomicU64,
    /// Actions whose service call failed
    actions_failed: AtomicU64,
    /// Sessions entered
    sessions_started: AtomicU64,
    /// Sessions left
    sessions_completed: AtomicU64,
    /// Agents holding a session slot right now
    in_session: AtomicU64,
    /// Highest `in_session` ever observed
    peak_in_session: AtomicU64,
    /// Failed logins
    auth_failures: AtomicU64,
    /// Start time
    started_at: Instant,
}

impl Default for SimStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SimStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            actions_completed: AtomicU64::new(0),
            actions_skipped: AtomicU64::new(0),
            actions_failed: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            sessions_completed: AtomicU64::new(0),
            in_session: AtomicU64::new(0),
            peak_in_session: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record one action outcome
    pub fn record_outcome(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Completed => &self.actions_completed,
            Outcome::Skipped => &self.actions_skipped,
            Outcome::Failed => &self.actions_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed login
    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// An agent entered a session; updates the peak
    pub fn enter_session(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
        let now = self.in_session.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_session.fetch_max(now, Ordering::SeqCst);
    }

    /// An agent left its session
    pub fn leave_session(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
        self.in_session.fetch_sub(1, Ordering::SeqCst);
    }

    /// Agents in session right now
    pub fn in_session(&self) -> u64 {
        self.in_session.load(Ordering::SeqCst)
    }

    /// Highest number of agents ever in session at once
    pub fn peak_in_session(&self) -> u64 {
        self.peak_in_session.load(Ordering::SeqCst)
    }

    /// Total actions performed, whatever the outcome
    pub fn total_actions(&self) -> u64 {
        self.actions_completed.load(Ordering::Relaxed)
            + self.actions_skipped.load(Ordering::Relaxed)
            + self.actions_failed.load(Ordering::Relaxed)
    }

    /// Failed logins so far
    pub fn auth_failures(&self) -> u64 {
        self.auth_failures.load(Ordering::Relaxed)
    }

    /// Sessions entered so far
    pub fn sessions_started(&self) -> u64 {
        self.sessions_started.load(Ordering::Relaxed)
    }

    /// Get summary as JSON-compatible struct
    pub fn summary(&self, activity_dropped: u64) -> StatsSummary {
        let uptime = self.started_at.elapsed();
        let total = self.total_actions();
        StatsSummary {
            actions_completed: self.actions_completed.load(Ordering::Relaxed),
            actions_skipped: self.actions_skipped.load(Ordering::Relaxed),
            actions_failed: self.actions_failed.load(Ordering::Relaxed),
            sessions_started: self.sessions_started(),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            in_session: self.in_session(),
            peak_in_session: self.peak_in_session(),
            auth_failures: self.auth_failures(),
            activity_dropped,
            uptime_secs: uptime.as_secs(),
            actions_per_minute: if uptime.as_secs_f64() > 0.0 {
                total as f64 * 60.0 / uptime.as_secs_f64()
            } else {
                0.0
            },
        }
    }
}

/// Statistics summary for serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    /// Actions whose service call succeeded.
    pub actions_completed: u64,
    /// Actions skipped for lack of a target or by choice.
    pub actions_skipped: u64,
    /// Actions whose service call failed.
    pub actions_failed: u64,
    /// Sessions entered.
    pub sessions_started: u64,
    /// Sessions left.
    pub sessions_completed: u64,
    /// Agents in session when the summary was taken.
    pub in_session: u64,
    /// Highest concurrent session count.
    pub peak_in_session: u64,
    /// Failed logins.
    pub auth_failures: u64,
    /// Activity records lost by the sink.
    pub activity_dropped: u64,
    /// Wall-clock seconds since start.
    pub uptime_secs: u64,
    /// Average action rate.
    pub actions_per_minute: f64,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "actions ok/skip/fail {}/{}/{}, sessions {}/{}, in session {} (peak {}), auth failures {}, dropped records {}",
            self.actions_completed,
            self.actions_skipped,
            self.actions_failed,
            self.sessions_completed,
            self.sessions_started,
            self.in_session,
            self.peak_in_session,
            self.auth_failures,
            self.activity_dropped,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_counters() {
        let stats = SimStats::new();
        stats.record_outcome(Outcome::Completed);
        stats.record_outcome(Outcome::Completed);
        stats.record_outcome(Outcome::Failed);
        stats.record_outcome(Outcome::Skipped);

        let summary = stats.summary(4);
        assert_eq!(summary.actions_completed, 2);
        assert_eq!(summary.actions_failed, 1);
        assert_eq!(summary.actions_skipped, 1);
        assert_eq!(summary.activity_dropped, 4);
        assert_eq!(stats.total_actions(), 4);
    }

    #[test]
    fn test_peak_tracks_highest_occupancy() {
        let stats = SimStats::new();
        stats.enter_session();
        stats.enter_session();
        stats.leave_session();
        stats.enter_session();
        stats.leave_session();
        stats.leave_session();

        assert_eq!(stats.in_session(), 0);
        assert_eq!(stats.peak_in_session(), 2);
        assert_eq!(stats.sessions_started(), 3);
    }

    #[test]
    fn test_summary_serializes() {
        let value = serde_json::to_value(SimStats::new().summary(0)).unwrap();
        assert_eq!(value["peak_in_session"], 0);
        assert!(value.get("actions_per_minute").is_some());
    }
}
