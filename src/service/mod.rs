//! Client side of the matching service's network API.
//!
//! The simulator only ever talks to the service through [`ServiceApi`]. Two
//! backends implement it:
//!
//! - [`HttpService`]: the real HTTP+JSON API (reqwest)
//! - [`ScriptedService`]: an in-memory stand-in used for rehearsal runs and tests
//!
//! # Calls
//!
//! | Call              | Purpose                             |
//! |-------------------|-------------------------------------|
//! | `authenticate`    | exchange credentials for a token    |
//! | `list_candidates` | browse pool for selection           |
//! | `get_profile`     | visit a profile                     |
//! | `create_like`     | like a profile                      |
//! | `remove_like`     | unlike (disconnect)                 |
//! | `list_connections`| mutual-like partners                |
//! | `send_message`    | message a connection                |
//! | `list_popular_tags` / `add_tag` | tag mutation          |
//! | `touch_presence`  | mark online / refresh last seen     |
//! | `sign_out`        | end the authenticated session       |

mod http;
mod scripted;

pub use http::{HttpService, HttpServiceConfig};
pub use scripted::{ScriptedCall, ScriptedService, DEFAULT_HISTORY};

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Bearer credential returned by `authenticate`.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(Arc<str>);

impl BearerToken {
    /// Wrap a raw token string
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }

    /// Raw token for the `Authorization` header
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(..)")
    }
}

/// Browse result projected to what selection needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Profile id
    pub id: i64,
    /// Popularity ("fame") score
    #[serde(default, alias = "fame_rating")]
    pub popularity: f64,
    /// Whether the profile belongs to another bot
    #[serde(default, alias = "is_bot")]
    pub bot: bool,
}

impl Candidate {
    /// Human candidate
    pub fn human(id: i64, popularity: f64) -> Self {
        Self {
            id,
            popularity,
            bot: false,
        }
    }

    /// Bot candidate
    pub fn bot(id: i64, popularity: f64) -> Self {
        Self {
            id,
            popularity,
            bot: true,
        }
    }
}

/// Capability calls the simulator needs from the service.
///
/// Every call except `authenticate` carries the bearer token. Any non-2xx
/// answer, unsuccessful envelope, transport error or timeout comes back as an
/// `Err`.
pub trait ServiceApi: Send + Sync {
    /// Exchange credentials for a bearer token.
    fn authenticate<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<BearerToken>>;

    /// Fetch up to `limit` browse candidates.
    fn list_candidates<'a>(
        &'a self,
        token: &'a BearerToken,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<Candidate>>>;

    /// Request one profile's detail.
    fn get_profile<'a>(&'a self, token: &'a BearerToken, id: i64) -> BoxFuture<'a, Result<()>>;

    /// Like a profile.
    fn create_like<'a>(&'a self, token: &'a BearerToken, id: i64) -> BoxFuture<'a, Result<()>>;

    /// Remove a like.
    fn remove_like<'a>(&'a self, token: &'a BearerToken, id: i64) -> BoxFuture<'a, Result<()>>;

    /// Ids of mutual-like partners.
    fn list_connections<'a>(&'a self, token: &'a BearerToken) -> BoxFuture<'a, Result<Vec<i64>>>;

    /// Send one message to a connection.
    fn send_message<'a>(
        &'a self,
        token: &'a BearerToken,
        id: i64,
        text: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Currently popular tags.
    fn list_popular_tags<'a>(&'a self, token: &'a BearerToken)
        -> BoxFuture<'a, Result<Vec<String>>>;

    /// Add a tag to the caller's profile.
    fn add_tag<'a>(&'a self, token: &'a BearerToken, tag: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Mark the caller online and refresh its last-seen time.
    fn touch_presence<'a>(&'a self, token: &'a BearerToken) -> BoxFuture<'a, Result<()>>;

    /// End the authenticated session.
    fn sign_out<'a>(&'a self, token: &'a BearerToken) -> BoxFuture<'a, Result<()>>;
}
