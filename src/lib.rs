//! # botsim - Synthetic-Agent Traffic Simulator
//!
//! Drives a population of autonomous bot agents against a social/matching
//! service's HTTP API, producing human-like usage (browsing, visiting,
//! liking, messaging, disconnecting, tagging) for load generation, demo data
//! and behavioral testing.
//!
//! ## Architecture
//!
//! ```text
//!  Supervisor ──► N × AgentScheduler ──► SessionGate (cap) ──► SessionRunner
//!                                                                   │
//!                      ActionDispatcher ◄───────────────────────────┘
//!                             │
//!                      Action Library ──► ServiceApi ──► remote service
//!                             │
//!                             └──► ActivitySink (best effort)
//! ```
//!
//! Each agent runs its own scheduler loop; the only shared resource is the
//! session gate, which caps how many agents are in a session at once.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use botsim::{Population, Roster, ScriptedService, SimSettings, Supervisor, TracingSink};
//!
//! # async fn demo() -> botsim::Result<()> {
//! let roster = Roster::generated(7);
//! let population = Population::assign(&roster, 7, 7, "test123")?;
//! let service = Arc::new(ScriptedService::demo(7, 20, "test123"));
//!
//! let supervisor = Supervisor::new(population, service, Arc::new(TracingSink), SimSettings::default(), 2);
//! let shutdown = supervisor.shutdown();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     shutdown.trigger();
//! });
//! let summary = supervisor.run().await;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`agent`]: Agents, behavior patterns, view cache, roster loading
//! - [`behavior`]: Weighted selector and action dispatcher
//! - [`actions`]: One function per user-facing action
//! - [`session`]: Session kinds, pacing and the session runner
//! - [`scheduler`]: Per-agent state machine, quiet window, session gate
//! - [`supervisor`]: Population launch and statistics
//! - [`service`]: Service API trait, HTTP client, scripted stand-in
//! - [`activity`]: Activity records and sinks
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod actions;
pub mod activity;
pub mod agent;
pub mod behavior;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod shutdown;
pub mod supervisor;

// Re-exports for convenience
pub use actions::{ActionContext, ActionSettings, Outcome};
pub use activity::{
    ActivityKind, ActivityRecord, ActivitySink, JsonlSink, MemorySink, NullSink, TracingSink,
};
pub use agent::{Agent, AgentId, BehaviorPattern, Population, Roster, RosterEntry, ViewCache};
pub use behavior::{Action, BiasPolicy, SelectorConfig, WeightedSelector};
pub use config::{Config, SinkKind};
pub use error::{Result, SimError};
pub use scheduler::{AgentScheduler, Clock, QuietWindow, SchedulerState, SystemClock, VirtualClock};
pub use service::{HttpService, HttpServiceConfig, ScriptedService, ServiceApi};
pub use session::{SessionKind, SessionRunner, SessionSettings};
pub use shutdown::Shutdown;
pub use supervisor::{SimSettings, SimStats, StatsSummary, Supervisor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
