//! Simulator error types.
//!
//! # Error Classification
//!
//! Errors fall into the three recovery classes the simulator distinguishes:
//!
//! - **Recoverable, silent**: a single action's network call failed
//!   (`Network`, `UnexpectedStatus`, `Rejected`, `Json`). The action library
//!   logs these and the agent's loop carries on.
//! - **Recoverable with cooldown**: `Authentication`. The agent's scheduler
//!   pauses and retries from the top of its loop.
//! - **Startup only**: `Config`, `Roster`, `EmptyPopulation`, `Io`. These can
//!   only surface before any agent is launched.

use thiserror::Error;

/// Simulator errors.
#[derive(Error, Debug)]
pub enum SimError {
    /// Transport failure or client-side timeout.
    #[error("Network error: {0}")]
    Network(String),

    /// The service answered with a non-success HTTP status.
    #[error("{call} returned status {status}")]
    UnexpectedStatus {
        /// Service call that failed.
        call: &'static str,
        /// HTTP status code.
        status: u16,
    },

    /// The service answered 2xx but flagged the envelope as unsuccessful.
    #[error("{call} rejected: {reason}")]
    Rejected {
        /// Service call that failed.
        call: &'static str,
        /// Error text from the envelope, if any.
        reason: String,
    },

    /// Credentials were refused.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Roster file could not be read or parsed.
    #[error("Roster error: {0}")]
    Roster(String),

    /// No agents to simulate.
    #[error("No agents loaded; provide a roster or a population size above zero")]
    EmptyPopulation,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for simulator operations
pub type Result<T> = std::result::Result<T, SimError>;

impl From<reqwest::Error> for SimError {
    fn from(err: reqwest::Error) -> Self {
        SimError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for SimError {
    fn from(err: toml::de::Error) -> Self {
        SimError::Config(err.to_string())
    }
}

impl SimError {
    /// Whether this error came from talking to the service (as opposed to
    /// local setup).
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SimError::Network(_)
                | SimError::UnexpectedStatus { .. }
                | SimError::Rejected { .. }
                | SimError::Authentication(_)
                | SimError::Json(_)
        )
    }
}
