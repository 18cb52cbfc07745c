//! Agent Scheduler: the per-agent control loop.
//!
//! ```text
//!  Staggering ──► OfflineWait ──► Authenticating ──► InSession ──► CoolingDown
//!                     ▲                 │                              │
//!                     └──── retry ──────┘                              │
//!                     └────────────────────────────────────────────────┘
//! ```
//!
//! Every state polls the shutdown signal on entry and every sleep is
//! interruptible; a triggered signal moves the scheduler to `Stopped`.
//! InSession holds a [`SessionGate`] slot for the whole session and always
//! ends by marking the agent offline.

mod clock;
mod gate;

pub use clock::{Clock, QuietWindow, SystemClock, VirtualClock};
pub use gate::{SessionGate, SessionSlot};

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use rand::Rng;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::actions::ActionContext;
use crate::activity::{ActivityKind, ActivityRecord, ActivitySink};
use crate::agent::Agent;
use crate::service::{BearerToken, ServiceApi};
use crate::session::{DurationRange, SessionKind, SessionRunner};
use crate::shutdown::Shutdown;
use crate::supervisor::{SimSettings, SimStats};

/// Scheduler states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// One-time start delay
    Staggering,
    /// Waiting out the quiet window
    OfflineWait,
    /// Logging in
    Authenticating,
    /// Holding a gate slot and running a session
    InSession,
    /// Pause between sessions
    CoolingDown,
    /// Shutdown observed
    Stopped,
}

impl SchedulerState {
    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Staggering => "staggering",
            Self::OfflineWait => "offline_wait",
            Self::Authenticating => "authenticating",
            Self::InSession => "in_session",
            Self::CoolingDown => "cooling_down",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Scheduler timing.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    /// Hours regular agents stay offline
    pub quiet_window: QuietWindow,
    /// Start delay per position in load order
    pub stagger_step: Duration,
    /// Extra random start delay, up to this much
    pub stagger_jitter: Duration,
    /// Pause between sessions
    pub cooldown: DurationRange,
    /// Pause between sessions for night-shift agents outside the quiet window
    pub night_shift_day_cooldown: DurationRange,
    /// Wait after a failed login
    pub auth_retry: Duration,
    /// Presence refresh period while in session
    pub heartbeat_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            quiet_window: QuietWindow::default(),
            stagger_step: Duration::from_secs(2),
            stagger_jitter: Duration::from_secs(5),
            cooldown: DurationRange::minutes(2, 10),
            night_shift_day_cooldown: DurationRange::minutes(30, 90),
            auth_retry: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(45),
        }
    }
}

impl SchedulerSettings {
    /// How long an agent must wait before its next session may start.
    ///
    /// Regular agents inside the quiet window wait until it ends; night-shift
    /// agents never wait here.
    pub fn offline_wait(&self, night_shift: bool, now: NaiveTime) -> Option<Duration> {
        if night_shift || !self.quiet_window.contains(now) {
            return None;
        }
        Some(self.quiet_window.until_end(now))
    }

    /// Cooldown band after a session
    pub fn cooldown_range(&self, night_shift: bool, now: NaiveTime) -> DurationRange {
        if night_shift && !self.quiet_window.contains(now) {
            self.night_shift_day_cooldown
        } else {
            self.cooldown
        }
    }

    /// Start delay for the agent at `index`
    pub fn stagger<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Duration {
        let base = self
            .stagger_step
            .saturating_mul(u32::try_from(index).unwrap_or(u32::MAX));
        let jitter = DurationRange::new(Duration::ZERO, self.stagger_jitter).sample(rng);
        base.saturating_add(jitter)
    }
}

/// Handles shared by every scheduler in a run.
#[derive(Clone)]
pub struct SchedulerContext {
    /// Service client
    pub service: Arc<dyn ServiceApi>,
    /// Activity destination
    pub sink: Arc<dyn ActivitySink>,
    /// Session cap
    pub gate: SessionGate,
    /// Time-of-day source
    pub clock: Arc<dyn Clock>,
    /// Counters
    pub stats: Arc<SimStats>,
    /// Stop signal
    pub shutdown: Shutdown,
    /// Tuning
    pub settings: Arc<SimSettings>,
    /// Run id stamped on activity records
    pub run_id: Uuid,
}

/// State machine driving one agent.
pub struct AgentScheduler {
    agent: Arc<Agent>,
    ctx: SchedulerContext,
    state: SchedulerState,
    token: Option<BearerToken>,
}

impl AgentScheduler {
    /// Scheduler in `Staggering`
    pub fn new(agent: Arc<Agent>, ctx: SchedulerContext) -> Self {
        Self {
            agent,
            ctx,
            state: SchedulerState::Staggering,
            token: None,
        }
    }

    /// Current state
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Agent driven by this scheduler
    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    /// Loop until shutdown
    pub async fn run<R: Rng + Send>(mut self, mut rng: R) {
        tracing::debug!(agent = %self.agent, pattern = %self.agent.pattern, night_shift = self.agent.night_shift, "Scheduler started");
        while self.step(&mut rng).await != SchedulerState::Stopped {}
        tracing::debug!(agent = %self.agent, "Scheduler stopped");
    }

    /// Execute the current state and move to the next one
    pub async fn step<R: Rng + Send>(&mut self, rng: &mut R) -> SchedulerState {
        let next = if self.ctx.shutdown.is_triggered() {
            SchedulerState::Stopped
        } else {
            match self.state {
                SchedulerState::Staggering => self.stagger(rng).await,
                SchedulerState::OfflineWait => self.offline_wait().await,
                SchedulerState::Authenticating => self.authenticate().await,
                SchedulerState::InSession => self.in_session(rng).await,
                SchedulerState::CoolingDown => self.cool_down(rng).await,
                SchedulerState::Stopped => SchedulerState::Stopped,
            }
        };
        tracing::trace!(agent = %self.agent.username, from = %self.state, to = %next, "Transition");
        self.state = next;
        next
    }

    async fn pause(&self, duration: Duration, then: SchedulerState) -> SchedulerState {
        if self.ctx.shutdown.sleep(duration).await {
            then
        } else {
            SchedulerState::Stopped
        }
    }

    async fn stagger<R: Rng + Send>(&self, rng: &mut R) -> SchedulerState {
        let delay = self.ctx.settings.scheduler.stagger(self.agent.index, rng);
        self.pause(delay, SchedulerState::OfflineWait).await
    }

    async fn offline_wait(&self) -> SchedulerState {
        let now = self.ctx.clock.time_of_day();
        match self
            .ctx
            .settings
            .scheduler
            .offline_wait(self.agent.night_shift, now)
        {
            Some(wait) => {
                tracing::info!(agent = %self.agent.username, "Quiet hours, offline for {}s", wait.as_secs());
                self.pause(wait, SchedulerState::Authenticating).await
            },
            None => SchedulerState::Authenticating,
        }
    }

    async fn authenticate(&mut self) -> SchedulerState {
        match self
            .ctx
            .service
            .authenticate(&self.agent.username, &self.agent.password)
            .await
        {
            Ok(token) => {
                self.token = Some(token);
                SchedulerState::InSession
            },
            Err(e) => {
                self.ctx.stats.record_auth_failure();
                let retry = self.ctx.settings.scheduler.auth_retry;
                tracing::warn!(agent = %self.agent.username, "Login failed, retrying in {}s: {}", retry.as_secs(), e);
                self.pause(retry, SchedulerState::OfflineWait).await
            },
        }
    }

    async fn in_session<R: Rng + Send>(&mut self, rng: &mut R) -> SchedulerState {
        let Some(token) = self.token.take() else {
            return SchedulerState::Authenticating;
        };

        let slot = tokio::select! {
            biased;
            () = self.ctx.shutdown.triggered() => None,
            slot = self.ctx.gate.enter() => slot,
        };
        let Some(slot) = slot else {
            return SchedulerState::Stopped;
        };

        self.go_online(&token).await;
        let heartbeat = spawn_heartbeat(
            self.ctx.service.clone(),
            self.agent.clone(),
            token.clone(),
            self.ctx.settings.scheduler.heartbeat_interval,
        );

        let kind = SessionKind::draw(rng);
        tracing::info!(agent = %self.agent.username, kind = %kind, "Session started");
        let action_ctx = ActionContext {
            agent: &self.agent,
            service: self.ctx.service.as_ref(),
            token: &token,
            sink: self.ctx.sink.as_ref(),
            settings: &self.ctx.settings.actions,
            run_id: self.ctx.run_id,
        };
        let runner = SessionRunner::new(
            action_ctx,
            &self.ctx.settings.session,
            &self.ctx.stats,
            &self.ctx.shutdown,
        );
        let report = runner.run(kind, rng).await;

        heartbeat.abort();
        drop(slot);
        self.go_offline(&token).await;

        tracing::info!(
            agent = %self.agent.username,
            kind = %kind,
            actions = report.actions(),
            failed = report.failed,
            elapsed_secs = report.elapsed.as_secs(),
            "Session finished"
        );
        SchedulerState::CoolingDown
    }

    async fn cool_down<R: Rng + Send>(&self, rng: &mut R) -> SchedulerState {
        let now = self.ctx.clock.time_of_day();
        let range = self
            .ctx
            .settings
            .scheduler
            .cooldown_range(self.agent.night_shift, now);
        let delay = range.sample(rng);
        tracing::debug!(agent = %self.agent.username, "Cooling down for {}s", delay.as_secs());
        self.pause(delay, SchedulerState::OfflineWait).await
    }

    async fn go_online(&self, token: &BearerToken) {
        if let Err(e) = self.ctx.service.touch_presence(token).await {
            tracing::debug!(agent = %self.agent.username, "Presence refresh failed: {}", e);
        }
        self.agent.presence.set_online();
        self.ctx.sink.emit(ActivityRecord::new(
            self.ctx.run_id,
            &self.agent,
            ActivityKind::WentOnline,
        ));
    }

    async fn go_offline(&self, token: &BearerToken) {
        if let Err(e) = self.ctx.service.sign_out(token).await {
            tracing::debug!(agent = %self.agent.username, "Sign-out failed: {}", e);
        }
        self.agent.presence.set_offline();
        self.ctx.sink.emit(ActivityRecord::new(
            self.ctx.run_id,
            &self.agent,
            ActivityKind::WentOffline,
        ));
    }
}

/// Refresh the agent's presence every `interval` until aborted.
pub fn spawn_heartbeat(
    service: Arc<dyn ServiceApi>,
    agent: Arc<Agent>,
    token: BearerToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; going online already touched presence.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match service.touch_presence(&token).await {
                Ok(()) => agent.presence.touch(),
                Err(e) => tracing::debug!(agent = %agent.username, "Heartbeat failed: {}", e),
            }
        }
    })
}
