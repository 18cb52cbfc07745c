//! Session Runner: one bounded burst of agent activity.
//!
//! # Session Kinds
//!
//! | Kind           | Weight | Shape    | Duration   | Pacing     |
//! |----------------|--------|----------|------------|------------|
//! | `QuickCheckIn` | 35     | scripted | -          | quick      |
//! | `Casual`       | 20     | timed    | 3-8 min    | medium     |
//! | `RapidFire`    | 17     | timed    | 2-5 min    | quick      |
//! | `Deliberate`   | 15     | timed    | 5-10 min   | considered |
//! | `DeepDive`     | 13     | timed    | 8-15 min   | considered |
//!
//! A scripted session runs `visit, pause, like, pause, visit, pause, like`.
//! A timed session repeats `dispatch, act, pause` until its duration has
//! elapsed. Pauses never drop below `min_action_gap`, so a zero pacing
//! function cannot spin.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::actions::{ActionContext, Outcome};
use crate::behavior::{choose_action, Action};
use crate::shutdown::Shutdown;
use crate::supervisor::SimStats;

/// Fixed QuickCheckIn script.
pub const QUICK_CHECK_IN: [Action; 4] = [Action::Visit, Action::Like, Action::Visit, Action::Like];

/// Floor applied to every pause.
pub const MIN_ACTION_GAP: Duration = Duration::from_millis(250);

/// Kind of session, drawn once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Short scripted visit/like check-in
    QuickCheckIn,
    /// Long, slow browsing session
    DeepDive,
    /// Short burst of fast actions
    RapidFire,
    /// Medium session with long pauses
    Deliberate,
    /// Medium session with medium pauses
    Casual,
}

impl SessionKind {
    /// All kinds in draw order
    pub const ALL: [SessionKind; 5] = [
        SessionKind::QuickCheckIn,
        SessionKind::Casual,
        SessionKind::RapidFire,
        SessionKind::Deliberate,
        SessionKind::DeepDive,
    ];

    /// Relative draw weight (sums to 100 over all kinds)
    pub fn weight(&self) -> u32 {
        match self {
            Self::QuickCheckIn => 35,
            Self::Casual => 20,
            Self::RapidFire => 17,
            Self::Deliberate => 15,
            Self::DeepDive => 13,
        }
    }

    /// Pacing band between actions
    pub fn pace(&self) -> Pace {
        match self {
            Self::QuickCheckIn | Self::RapidFire => Pace::Quick,
            Self::Casual => Pace::Medium,
            Self::Deliberate | Self::DeepDive => Pace::Considered,
        }
    }

    /// Whether the session follows the fixed script instead of a timer
    pub fn is_scripted(&self) -> bool {
        matches!(self, Self::QuickCheckIn)
    }

    /// Map a draw in `[0, 1)` onto the weighted kinds
    pub fn from_draw(draw: f64) -> Self {
        let total: u32 = Self::ALL.iter().map(SessionKind::weight).sum();
        let mut upper = 0.0;
        for kind in Self::ALL {
            upper += f64::from(kind.weight()) / f64::from(total);
            if draw < upper {
                return kind;
            }
        }
        Self::DeepDive
    }

    /// Draw a kind
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_draw(rng.gen())
    }

    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::QuickCheckIn => "quick_check_in",
            Self::DeepDive => "deep_dive",
            Self::RapidFire => "rapid_fire",
            Self::Deliberate => "deliberate",
            Self::Casual => "casual",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Pacing band between two actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pace {
    /// 0.5-2 s
    Quick,
    /// 2-8 s
    Medium,
    /// 5-30 s
    Considered,
}

/// Inclusive duration range sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationRange {
    /// Lower bound
    pub min: Duration,
    /// Upper bound
    pub max: Duration,
}

impl DurationRange {
    /// Range between two durations
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Range in whole seconds
    pub const fn secs(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    /// Range in whole minutes
    pub const fn minutes(min: u64, max: u64) -> Self {
        Self::secs(min.saturating_mul(60), max.saturating_mul(60))
    }

    /// Range in milliseconds
    pub const fn millis(min: u64, max: u64) -> Self {
        Self::new(Duration::from_millis(min), Duration::from_millis(max))
    }

    /// `min <= max`
    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    /// Uniform sample; a degenerate or inverted range yields `min`
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }
}

/// Session shape tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Floor applied to every pause
    pub min_action_gap: Duration,
    /// Quick pacing band
    pub quick: DurationRange,
    /// Medium pacing band
    pub medium: DurationRange,
    /// Considered pacing band
    pub considered: DurationRange,
    /// DeepDive length
    pub deep_dive: DurationRange,
    /// RapidFire length
    pub rapid_fire: DurationRange,
    /// Deliberate length
    pub deliberate: DurationRange,
    /// Casual length
    pub casual: DurationRange,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            min_action_gap: MIN_ACTION_GAP,
            quick: DurationRange::millis(500, 2_000),
            medium: DurationRange::secs(2, 8),
            considered: DurationRange::secs(5, 30),
            deep_dive: DurationRange::minutes(8, 15),
            rapid_fire: DurationRange::minutes(2, 5),
            deliberate: DurationRange::minutes(5, 10),
            casual: DurationRange::minutes(3, 8),
        }
    }
}

impl SessionSettings {
    /// Delay band for a pace
    pub fn pace_range(&self, pace: Pace) -> DurationRange {
        match pace {
            Pace::Quick => self.quick,
            Pace::Medium => self.medium,
            Pace::Considered => self.considered,
        }
    }

    /// Length of a timed session kind; `None` for the scripted one
    pub fn duration_range(&self, kind: SessionKind) -> Option<DurationRange> {
        match kind {
            SessionKind::QuickCheckIn => None,
            SessionKind::DeepDive => Some(self.deep_dive),
            SessionKind::RapidFire => Some(self.rapid_fire),
            SessionKind::Deliberate => Some(self.deliberate),
            SessionKind::Casual => Some(self.casual),
        }
    }
}

/// What one session did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Session kind
    pub kind: SessionKind,
    /// Actions whose call succeeded
    pub completed: u32,
    /// Actions with nothing to do
    pub skipped: u32,
    /// Actions whose call failed
    pub failed: u32,
    /// Time spent in the session
    pub elapsed: Duration,
    /// Ended early by shutdown
    pub interrupted: bool,
}

impl SessionReport {
    fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            completed: 0,
            skipped: 0,
            failed: 0,
            elapsed: Duration::ZERO,
            interrupted: false,
        }
    }

    /// Total actions performed
    pub fn actions(&self) -> u32 {
        self.completed + self.skipped + self.failed
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Completed => self.completed += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

/// Runs sessions for one agent.
pub struct SessionRunner<'a> {
    ctx: ActionContext<'a>,
    settings: &'a SessionSettings,
    stats: &'a SimStats,
    shutdown: &'a Shutdown,
}

impl<'a> SessionRunner<'a> {
    /// Create a runner
    pub fn new(
        ctx: ActionContext<'a>,
        settings: &'a SessionSettings,
        stats: &'a SimStats,
        shutdown: &'a Shutdown,
    ) -> Self {
        Self {
            ctx,
            settings,
            stats,
            shutdown,
        }
    }

    /// Run one session of `kind`, drawing its length and pacing from settings
    pub async fn run<R: Rng + Send>(&self, kind: SessionKind, rng: &mut R) -> SessionReport {
        let pace = self.settings.pace_range(kind.pace());
        match self.settings.duration_range(kind) {
            None => self.run_scripted(pace, rng).await,
            Some(range) => {
                let duration = range.sample(rng);
                self.run_timed(kind, duration, |rng: &mut R| pace.sample(rng), rng)
                    .await
            },
        }
    }

    /// Run the fixed check-in script, pausing between steps
    pub async fn run_scripted<R: Rng + Send>(&self, pace: DurationRange, rng: &mut R) -> SessionReport {
        let started = Instant::now();
        let mut report = SessionReport::new(SessionKind::QuickCheckIn);

        for (step, action) in QUICK_CHECK_IN.iter().enumerate() {
            if self.shutdown.is_triggered() {
                report.interrupted = true;
                break;
            }
            if step > 0 {
                let delay = pace.sample(rng).max(self.settings.min_action_gap);
                if !self.shutdown.sleep(delay).await {
                    report.interrupted = true;
                    break;
                }
            }
            let outcome = self.ctx.perform(*action, rng).await;
            self.note(&mut report, outcome);
        }

        report.elapsed = started.elapsed();
        report
    }

    /// Dispatch actions until `duration` has elapsed.
    ///
    /// At least one action runs. The loop only ends once the duration has
    /// passed (or shutdown fires), and `pacing` is floored at
    /// `min_action_gap`.
    pub async fn run_timed<R, F>(
        &self,
        kind: SessionKind,
        duration: Duration,
        mut pacing: F,
        rng: &mut R,
    ) -> SessionReport
    where
        R: Rng + Send,
        F: FnMut(&mut R) -> Duration + Send,
    {
        let started = Instant::now();
        let deadline = started + duration;
        let mut report = SessionReport::new(kind);

        loop {
            if self.shutdown.is_triggered() {
                report.interrupted = true;
                break;
            }

            let action = choose_action(self.ctx.agent.pattern, rng.gen());
            let outcome = self.ctx.perform(action, rng).await;
            self.note(&mut report, outcome);

            if Instant::now() >= deadline {
                break;
            }
            let delay = pacing(rng).max(self.settings.min_action_gap);
            if !self.shutdown.sleep(delay).await {
                report.interrupted = true;
                break;
            }
        }

        report.elapsed = started.elapsed();
        tracing::debug!(
            agent = %self.ctx.agent.username,
            kind = %kind,
            actions = report.actions(),
            "Timed session finished"
        );
        report
    }

    fn note(&self, report: &mut SessionReport, outcome: Outcome) {
        report.record(outcome);
        self.stats.record_outcome(outcome);
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    use super::*;
    use crate::actions::ActionSettings;
    use crate::activity::NullSink;
    use crate::agent::{Agent, AgentId, BehaviorPattern};
    use crate::service::{BearerToken, ScriptedService, ServiceApi};

    #[test]
    fn test_kind_weights_sum_to_100() {
        let total: u32 = SessionKind::ALL.iter().map(SessionKind::weight).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_kind_from_draw_bands() {
        assert_eq!(SessionKind::from_draw(0.0), SessionKind::QuickCheckIn);
        assert_eq!(SessionKind::from_draw(0.34), SessionKind::QuickCheckIn);
        assert_eq!(SessionKind::from_draw(0.36), SessionKind::Casual);
        assert_eq!(SessionKind::from_draw(0.60), SessionKind::RapidFire);
        assert_eq!(SessionKind::from_draw(0.80), SessionKind::Deliberate);
        assert_eq!(SessionKind::from_draw(0.95), SessionKind::DeepDive);
        assert_eq!(SessionKind::from_draw(0.999_999), SessionKind::DeepDive);
    }

    #[test]
    fn test_kind_draw_favors_check_ins() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let draws: Vec<_> = (0..2000).map(|_| SessionKind::draw(&mut rng)).collect();
        let quick = draws.iter().filter(|k| **k == SessionKind::QuickCheckIn).count();
        let deep = draws.iter().filter(|k| **k == SessionKind::DeepDive).count();
        assert!(quick > deep * 2);
    }

    #[test]
    fn test_duration_range_sample_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let range = DurationRange::secs(5, 30);
        for _ in 0..200 {
            let d = range.sample(&mut rng);
            assert!(d >= range.min && d <= range.max);
        }
        assert_eq!(DurationRange::secs(9, 2).sample(&mut rng), Duration::from_secs(9));
        assert!(!DurationRange::secs(9, 2).is_valid());
    }

    #[test]
    fn test_minutes_saturate() {
        let range = DurationRange::minutes(2, u64::MAX);
        assert_eq!(range.min, Duration::from_secs(120));
        assert_eq!(range.max, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_only_quick_check_in_is_scripted() {
        let settings = SessionSettings::default();
        for kind in SessionKind::ALL {
            assert_eq!(kind.is_scripted(), settings.duration_range(kind).is_none());
        }
    }

    struct Fixture {
        service: ScriptedService,
        agent: Agent,
        token: BearerToken,
        sink: NullSink,
        actions: ActionSettings,
        settings: SessionSettings,
        stats: SimStats,
        shutdown: Shutdown,
    }

    impl Fixture {
        async fn new(pattern: BehaviorPattern) -> Self {
            let service = ScriptedService::demo(1, 6, "test123");
            let token = service.authenticate("bot_1", "test123").await.unwrap();
            Self {
                service,
                agent: Agent::new(AgentId(1), "bot_1", "test123", 0, pattern, false),
                token,
                sink: NullSink,
                actions: ActionSettings::default(),
                settings: SessionSettings::default(),
                stats: SimStats::new(),
                shutdown: Shutdown::new(),
            }
        }

        fn runner(&self) -> SessionRunner<'_> {
            let ctx = ActionContext {
                agent: &self.agent,
                service: &self.service,
                token: &self.token,
                sink: &self.sink,
                settings: &self.actions,
                run_id: Uuid::nil(),
            };
            SessionRunner::new(ctx, &self.settings, &self.stats, &self.shutdown)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_zero_pacing_terminates_after_duration() {
        let f = Fixture::new(BehaviorPattern::Explorer).await;
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let duration = Duration::from_secs(10);

        let report = f
            .runner()
            .run_timed(SessionKind::RapidFire, duration, |_: &mut ChaCha8Rng| Duration::ZERO, &mut rng)
            .await;

        assert!(report.actions() >= 1);
        assert!(report.elapsed >= duration);
        assert!(!report.interrupted);
        // Bounded by the action-gap floor.
        let ceiling = (duration.as_millis() / MIN_ACTION_GAP.as_millis()) as u32 + 1;
        assert!(report.actions() <= ceiling);
        assert_eq!(f.stats.total_actions(), u64::from(report.actions()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_zero_duration_runs_one_action() {
        let f = Fixture::new(BehaviorPattern::Casual).await;
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let report = f
            .runner()
            .run_timed(SessionKind::Casual, Duration::ZERO, |_: &mut ChaCha8Rng| Duration::ZERO, &mut rng)
            .await;
        assert_eq!(report.actions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_session_order() {
        let f = Fixture::new(BehaviorPattern::Liker).await;
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let report = f
            .runner()
            .run_scripted(f.settings.quick, &mut rng)
            .await;
        assert_eq!(report.kind, SessionKind::QuickCheckIn);
        assert_eq!(report.actions(), 4);

        let calls: Vec<_> = f
            .service
            .calls()
            .iter()
            .map(|c| c.call)
            .filter(|c| *c == "visit" || *c == "like")
            .collect();
        assert_eq!(calls.first(), Some(&"visit"));
        // Three pauses of at least half a second each.
        assert!(report.elapsed >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_timed_session() {
        let f = Fixture::new(BehaviorPattern::Active).await;
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let shutdown = f.shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            shutdown.trigger();
        });

        let report = f
            .runner()
            .run_timed(
                SessionKind::DeepDive,
                Duration::from_secs(3600),
                |_: &mut ChaCha8Rng| Duration::from_secs(5),
                &mut rng,
            )
            .await;
        assert!(report.interrupted);
        assert!(report.elapsed < Duration::from_secs(3600));
    }
}
