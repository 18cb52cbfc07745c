//! Time-of-day sources and the daily quiet window.

use std::time::Duration;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

const SECS_PER_DAY: u32 = 24 * 60 * 60;

/// Source of the local time of day.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current local time of day
    fn time_of_day(&self) -> NaiveTime;
}

/// Wall clock in the local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn time_of_day(&self) -> NaiveTime {
        chrono::Local::now().time()
    }
}

/// Clock that starts at a chosen time of day and advances with tokio time.
///
/// Under a paused tokio runtime it moves only when the runtime auto-advances,
/// so schedulers can be driven through whole days in tests and rehearsals.
#[derive(Debug, Clone, Copy)]
pub struct VirtualClock {
    start: NaiveTime,
    origin: tokio::time::Instant,
}

impl VirtualClock {
    /// Clock reading `start` now
    pub fn starting_at(start: NaiveTime) -> Self {
        Self {
            start,
            origin: tokio::time::Instant::now(),
        }
    }

    /// Clock reading `hour:00` now; hours wrap at 24
    pub fn at_hour(hour: u32) -> Self {
        let start = NaiveTime::from_num_seconds_from_midnight_opt((hour % 24) * 3600, 0)
            .unwrap_or(NaiveTime::MIN);
        Self::starting_at(start)
    }
}

impl Clock for VirtualClock {
    fn time_of_day(&self) -> NaiveTime {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        // Adding a signed duration to NaiveTime wraps around midnight.
        self.start + elapsed
    }
}

/// Daily hour range during which regular agents stay offline.
///
/// `start_hour` is inclusive and `end_hour` exclusive. A window whose start
/// is after its end wraps past midnight; equal hours mean no quiet window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietWindow {
    /// First quiet hour (0-23)
    pub start_hour: u32,
    /// First active hour after the window (0-23)
    pub end_hour: u32,
}

impl Default for QuietWindow {
    fn default() -> Self {
        Self {
            start_hour: 1,
            end_hour: 7,
        }
    }
}

impl QuietWindow {
    /// Window from `start_hour` to `end_hour`
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    /// Whether both hours are in `0..24`
    pub fn is_valid(&self) -> bool {
        self.start_hour < 24 && self.end_hour < 24
    }

    /// Whether `time` falls inside the window
    pub fn contains(&self, time: NaiveTime) -> bool {
        let hour = time.hour();
        match self.start_hour.cmp(&self.end_hour) {
            std::cmp::Ordering::Less => hour >= self.start_hour && hour < self.end_hour,
            std::cmp::Ordering::Greater => hour >= self.start_hour || hour < self.end_hour,
            std::cmp::Ordering::Equal => false,
        }
    }

    /// Time from `time` until the window's end, to the second
    pub fn until_end(&self, time: NaiveTime) -> Duration {
        let end = self.end_hour * 3600;
        let now = time.num_seconds_from_midnight();
        let secs = (end + SECS_PER_DAY - now) % SECS_PER_DAY;
        Duration::from_secs(u64::from(secs))
    }
}
