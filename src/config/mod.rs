//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files (`--config`, or `<config dir>/botsim/config.toml`)
//! - Environment variables (`BOTSIM_*`)
//! - CLI arguments (applied by the binary last)
//!
//! ```toml
//! [service]
//! base_url = "http://localhost:8080"
//!
//! [population]
//! size = 20
//! seed = 7
//!
//! [scheduler]
//! concurrency = 4
//! quiet_start_hour = 1
//! quiet_end_hour = 7
//!
//! [behavior]
//! selector_policy = "favor_underexposed"
//!
//! [activity]
//! sink = "jsonl"
//! path = "activity.jsonl"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::actions::{ActionSettings, DEFAULT_PHRASES};
use crate::agent::DEFAULT_PASSWORD;
use crate::behavior::{BiasPolicy, SelectorConfig};
use crate::error::{Result, SimError};
use crate::scheduler::{QuietWindow, SchedulerSettings};
use crate::service::HttpServiceConfig;
use crate::session::{DurationRange, SessionSettings};
use crate::supervisor::SimSettings;

/// Environment variable overriding `service.base_url`
pub const ENV_SERVER_URL: &str = "BOTSIM_SERVER_URL";
/// Environment variable overriding `population.size`
pub const ENV_BOTS: &str = "BOTSIM_BOTS";
/// Environment variable overriding `scheduler.concurrency`
pub const ENV_CONCURRENCY: &str = "BOTSIM_CONCURRENCY";
/// Environment variable overriding `population.roster`
pub const ENV_ROSTER: &str = "BOTSIM_ROSTER";
/// Environment variable overriding `population.seed`
pub const ENV_SEED: &str = "BOTSIM_SEED";

/// Longest configurable session, in minutes
pub const MAX_SESSION_MINUTES: u64 = 24 * 60;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Target service
    #[serde(default)]
    pub service: ServiceConfig,

    /// Agent population
    #[serde(default)]
    pub population: PopulationConfig,

    /// Scheduler timing and concurrency
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Session shapes
    #[serde(default)]
    pub session: SessionConfig,

    /// Action tuning
    #[serde(default)]
    pub behavior: BehaviorConfig,

    /// Activity record destination
    #[serde(default)]
    pub activity: ActivityConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SimError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| SimError::Config(format!("Failed to parse config: {e}")))
    }

    /// Defaults overlaid with environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Default config file location, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("botsim").join("config.toml"))
    }

    /// Load `path`, else the default file when it exists, else defaults;
    /// then overlay environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => {
                    tracing::debug!("Using config file {}", path.display());
                    Self::from_file(path)?
                },
                None => Self::default(),
            },
        };
        config.apply_env();
        Ok(config)
    }

    /// Overlay `BOTSIM_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Overlay variables from any lookup; unparsable values are ignored
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_SERVER_URL) {
            self.service.base_url = url;
        }
        if let Some(size) = lookup(ENV_BOTS).and_then(|v| v.parse().ok()) {
            self.population.size = size;
        }
        if let Some(n) = lookup(ENV_CONCURRENCY).and_then(|v| v.parse().ok()) {
            self.scheduler.concurrency = n;
        }
        if let Some(roster) = lookup(ENV_ROSTER) {
            self.population.roster = Some(PathBuf::from(roster));
        }
        if let Some(seed) = lookup(ENV_SEED).and_then(|v| v.parse().ok()) {
            self.population.seed = Some(seed);
        }
    }

    /// Reject settings the simulator cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SimError::Config(msg));

        if self.service.base_url.trim().is_empty() {
            return invalid("service.base_url is empty".to_string());
        }
        if self.service.browse_limit == 0 {
            return invalid("service.browse_limit must be at least 1".to_string());
        }
        if self.scheduler.concurrency == 0 {
            return invalid("scheduler.concurrency must be at least 1".to_string());
        }
        if self.scheduler.quiet_start_hour >= 24 || self.scheduler.quiet_end_hour >= 24 {
            return invalid("quiet window hours must be between 0 and 23".to_string());
        }
        for (name, p) in [
            ("behavior.bias_probability", self.behavior.bias_probability),
            ("behavior.non_response_probability", self.behavior.non_response_probability),
            ("behavior.tag_add_probability", self.behavior.tag_add_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return invalid(format!("{name} must be within [0, 1], got {p}"));
            }
        }
        for (name, [min, max]) in self.ranges() {
            if min > max {
                return invalid(format!("{name} range is inverted: {min} > {max}"));
            }
        }
        for (name, [_, max]) in self.minute_ranges() {
            if max > MAX_SESSION_MINUTES {
                return invalid(format!(
                    "{name} upper bound {max} exceeds {MAX_SESSION_MINUTES} minutes"
                ));
            }
        }
        if self.session.min_action_gap_ms == 0 {
            return invalid("session.min_action_gap_ms must be at least 1".to_string());
        }
        if self.session.casual_minutes[1] == 0
            || self.session.deep_dive_minutes[1] == 0
            || self.session.rapid_fire_minutes[1] == 0
            || self.session.deliberate_minutes[1] == 0
        {
            return invalid("session durations must be longer than zero minutes".to_string());
        }
        if self.behavior.phrases.is_empty() {
            return invalid("behavior.phrases is empty".to_string());
        }
        if self.activity.sink == SinkKind::Jsonl && self.activity.path.is_none() {
            return invalid("activity.path is required for the jsonl sink".to_string());
        }
        Ok(())
    }

    fn minute_ranges(&self) -> [(&'static str, [u64; 2]); 4] {
        let n = &self.session;
        [
            ("session.deep_dive_minutes", n.deep_dive_minutes),
            ("session.rapid_fire_minutes", n.rapid_fire_minutes),
            ("session.deliberate_minutes", n.deliberate_minutes),
            ("session.casual_minutes", n.casual_minutes),
        ]
    }

    fn ranges(&self) -> [(&'static str, [u64; 2]); 9] {
        let s = &self.scheduler;
        [
            ("scheduler.cooldown_secs", s.cooldown_secs),
            ("scheduler.night_shift_cooldown_secs", s.night_shift_cooldown_secs),
            ("session.quick_ms", self.session.quick_ms),
            ("session.medium_secs", self.session.medium_secs),
            ("session.considered_secs", self.session.considered_secs),
            ("session.deep_dive_minutes", self.session.deep_dive_minutes),
            ("session.rapid_fire_minutes", self.session.rapid_fire_minutes),
            ("session.deliberate_minutes", self.session.deliberate_minutes),
            ("session.casual_minutes", self.session.casual_minutes),
        ]
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SimError::Config(format!("Failed to render config: {e}")))
    }

    /// HTTP client settings
    pub fn http_config(&self) -> HttpServiceConfig {
        HttpServiceConfig {
            base_url: self.service.base_url.clone(),
            timeout: Duration::from_secs(self.service.timeout_secs),
        }
    }

    /// Runtime settings for schedulers, sessions and actions
    pub fn sim_settings(&self) -> SimSettings {
        let s = &self.scheduler;
        let n = &self.session;
        let b = &self.behavior;
        SimSettings {
            scheduler: SchedulerSettings {
                quiet_window: QuietWindow::new(s.quiet_start_hour, s.quiet_end_hour),
                stagger_step: Duration::from_secs(s.stagger_step_secs),
                stagger_jitter: Duration::from_secs(s.stagger_jitter_secs),
                cooldown: DurationRange::secs(s.cooldown_secs[0], s.cooldown_secs[1]),
                night_shift_day_cooldown: DurationRange::secs(
                    s.night_shift_cooldown_secs[0],
                    s.night_shift_cooldown_secs[1],
                ),
                auth_retry: Duration::from_secs(s.auth_retry_secs),
                heartbeat_interval: Duration::from_secs(s.heartbeat_secs.max(1)),
            },
            session: SessionSettings {
                min_action_gap: Duration::from_millis(n.min_action_gap_ms),
                quick: DurationRange::millis(n.quick_ms[0], n.quick_ms[1]),
                medium: DurationRange::secs(n.medium_secs[0], n.medium_secs[1]),
                considered: DurationRange::secs(n.considered_secs[0], n.considered_secs[1]),
                deep_dive: DurationRange::minutes(n.deep_dive_minutes[0], n.deep_dive_minutes[1]),
                rapid_fire: DurationRange::minutes(n.rapid_fire_minutes[0], n.rapid_fire_minutes[1]),
                deliberate: DurationRange::minutes(n.deliberate_minutes[0], n.deliberate_minutes[1]),
                casual: DurationRange::minutes(n.casual_minutes[0], n.casual_minutes[1]),
            },
            actions: ActionSettings {
                browse_limit: self.service.browse_limit,
                selector: SelectorConfig {
                    policy: b.selector_policy,
                    bias_probability: b.bias_probability,
                },
                non_response_probability: b.non_response_probability,
                tag_add_probability: b.tag_add_probability,
                like_retry_pause: Duration::from_secs(b.like_retry_pause_secs),
                phrases: b.phrases.clone(),
            },
        }
    }
}

/// Target service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service root URL
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Candidates requested per browse
    pub browse_limit: usize,

    /// Password for roster entries without one
    pub default_password: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 10,
            browse_limit: 20,
            default_password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

/// Population configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Number of agents
    pub size: usize,

    /// Roster file (TOML or JSON); generated `bot_N` accounts when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roster: Option<PathBuf>,

    /// Every Nth agent (by load order) works the night shift; 0 disables
    pub night_shift_every: usize,

    /// Seed for reproducible agent RNGs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: 10,
            roster: None,
            night_shift_every: 7,
            seed: None,
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Agents allowed in session at once
    pub concurrency: usize,

    /// First quiet hour (local time)
    pub quiet_start_hour: u32,

    /// First active hour after the quiet window
    pub quiet_end_hour: u32,

    /// Start delay per agent index in seconds
    pub stagger_step_secs: u64,

    /// Maximum extra random start delay in seconds
    pub stagger_jitter_secs: u64,

    /// Cooldown between sessions `[min, max]` in seconds
    pub cooldown_secs: [u64; 2],

    /// Daytime cooldown for night-shift agents `[min, max]` in seconds
    pub night_shift_cooldown_secs: [u64; 2],

    /// Wait after a failed login in seconds
    pub auth_retry_secs: u64,

    /// Presence heartbeat period in seconds
    pub heartbeat_secs: u64,

    /// Stats log period in seconds
    pub stats_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            quiet_start_hour: 1,
            quiet_end_hour: 7,
            stagger_step_secs: 2,
            stagger_jitter_secs: 5,
            cooldown_secs: [120, 600],
            night_shift_cooldown_secs: [1800, 5400],
            auth_retry_secs: 60,
            heartbeat_secs: 45,
            stats_interval_secs: 60,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Floor on every pause in milliseconds
    pub min_action_gap_ms: u64,

    /// Quick pacing `[min, max]` in milliseconds
    pub quick_ms: [u64; 2],

    /// Medium pacing `[min, max]` in seconds
    pub medium_secs: [u64; 2],

    /// Considered pacing `[min, max]` in seconds
    pub considered_secs: [u64; 2],

    /// DeepDive length `[min, max]` in minutes
    pub deep_dive_minutes: [u64; 2],

    /// RapidFire length `[min, max]` in minutes
    pub rapid_fire_minutes: [u64; 2],

    /// Deliberate length `[min, max]` in minutes
    pub deliberate_minutes: [u64; 2],

    /// Casual length `[min, max]` in minutes
    pub casual_minutes: [u64; 2],
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_action_gap_ms: 250,
            quick_ms: [500, 2_000],
            medium_secs: [2, 8],
            considered_secs: [5, 30],
            deep_dive_minutes: [8, 15],
            rapid_fire_minutes: [2, 5],
            deliberate_minutes: [5, 10],
            casual_minutes: [3, 8],
        }
    }
}

/// Behavior configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Candidate selection policy
    pub selector_policy: BiasPolicy,

    /// Probability of taking the biased slice
    pub bias_probability: f64,

    /// Probability that a messaging agent stays silent
    pub non_response_probability: f64,

    /// Probability that a tag action adds a tag
    pub tag_add_probability: f64,

    /// Pause before retrying a like after visiting, in seconds
    pub like_retry_pause_secs: u64,

    /// Message texts
    pub phrases: Vec<String>,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        let actions = ActionSettings::default();
        Self {
            selector_policy: actions.selector.policy,
            bias_probability: actions.selector.bias_probability,
            non_response_probability: actions.non_response_probability,
            tag_add_probability: actions.tag_add_probability,
            like_retry_pause_secs: actions.like_retry_pause.as_secs(),
            phrases: DEFAULT_PHRASES.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Activity sink kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// `tracing` events
    #[default]
    Tracing,
    /// JSON Lines file
    Jsonl,
    /// In-process buffer
    Memory,
    /// Discard
    None,
}

impl SinkKind {
    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tracing => "tracing",
            Self::Jsonl => "jsonl",
            Self::Memory => "memory",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tracing" | "log" => Ok(Self::Tracing),
            "jsonl" | "json" => Ok(Self::Jsonl),
            "memory" => Ok(Self::Memory),
            "none" | "off" => Ok(Self::None),
            _ => Err(format!("Unknown activity sink: {s}")),
        }
    }
}

/// Activity configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Destination kind
    pub sink: SinkKind,

    /// File for the jsonl sink
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Records buffered ahead of the jsonl writer, or held by the memory sink
    pub buffer: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Tracing,
            path: None,
            buffer: crate::activity::DEFAULT_BUFFER,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.base_url, "http://localhost:8080");
        assert_eq!(config.scheduler.concurrency, 5);
        assert_eq!(config.population.night_shift_every, 7);
        assert_eq!(config.behavior.selector_policy, BiasPolicy::FavorPopular);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_match_runtime_defaults() {
        let settings = Config::default().sim_settings();
        assert_eq!(settings, SimSettings::default());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [service]
            base_url = "http://matcha.test:3000"

            [population]
            size = 25
            seed = 99

            [scheduler]
            concurrency = 3
            quiet_start_hour = 23
            quiet_end_hour = 6

            [behavior]
            selector_policy = "favor_underexposed"
            non_response_probability = 0.1

            [activity]
            sink = "jsonl"
            path = "/tmp/activity.jsonl"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.service.base_url, "http://matcha.test:3000");
        assert_eq!(config.service.timeout_secs, 10);
        assert_eq!(config.population.size, 25);
        assert_eq!(config.population.seed, Some(99));
        assert_eq!(config.behavior.selector_policy, BiasPolicy::FavorUnderexposed);
        assert_eq!(config.activity.sink, SinkKind::Jsonl);
        assert!(config.validate().is_ok());

        let settings = config.sim_settings();
        assert_eq!(settings.scheduler.quiet_window, QuietWindow::new(23, 6));
        assert!((settings.actions.non_response_probability - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.population.size = 3;
        config.population.roster = Some(PathBuf::from("roster.toml"));
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
        assert!(Config::from_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            (ENV_SERVER_URL, "http://env.test"),
            (ENV_BOTS, "40"),
            (ENV_CONCURRENCY, "not-a-number"),
            (ENV_SEED, "5"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_vars(|k| vars.get(k).map(ToString::to_string));
        assert_eq!(config.service.base_url, "http://env.test");
        assert_eq!(config.population.size, 40);
        assert_eq!(config.scheduler.concurrency, 5);
        assert_eq!(config.population.seed, Some(5));
        assert_eq!(config.population.roster, None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.behavior.bias_probability = 1.5;
        assert!(matches!(config.validate(), Err(SimError::Config(_))));

        let mut config = Config::default();
        config.scheduler.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.cooldown_secs = [600, 60];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.quiet_end_hour = 24;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.activity.sink = SinkKind::Jsonl;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_busy_loop_and_huge_sessions() {
        let mut config = Config::default();
        config.session.min_action_gap_ms = 0;
        config.session.quick_ms = [0, 0];
        assert!(matches!(config.validate(), Err(SimError::Config(_))));

        let mut config = Config::default();
        config.session.deep_dive_minutes = [10, u64::MAX];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.casual_minutes = [MAX_SESSION_MINUTES, MAX_SESSION_MINUTES];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sink_kind_parse() {
        assert_eq!("jsonl".parse::<SinkKind>().unwrap(), SinkKind::Jsonl);
        assert_eq!("OFF".parse::<SinkKind>().unwrap(), SinkKind::None);
        assert!("kafka".parse::<SinkKind>().is_err());
    }
}
