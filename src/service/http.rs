//! HTTP+JSON backend for [`ServiceApi`].
//!
//! Every response body is an envelope:
//!
//! ```text
//! { "success": true,  "data": <payload> }
//! { "success": false, "error": "reason" }
//! ```
//!
//! Calls whose payload the simulator ignores (visit, like, message, ...) only
//! look at the status code.
//!
//! Browse entries that omit `is_bot` are classified against the ids given to
//! [`HttpService::with_known_bots`], normally the loaded population.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{BearerToken, Candidate, ServiceApi};
use crate::error::{Result, SimError};

/// HTTP backend configuration
#[derive(Debug, Clone)]
pub struct HttpServiceConfig {
    /// Service root, e.g. `http://localhost:8080`
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for HttpServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Debug, Deserialize)]
struct BrowseData {
    #[serde(default)]
    profiles: Vec<BrowseEntry>,
}

#[derive(Debug, Deserialize)]
struct BrowseEntry {
    id: i64,
    #[serde(default)]
    fame_rating: f64,
    is_bot: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ConnectionEntry {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct PopularTagsData {
    #[serde(default)]
    popular_tags: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    tag: String,
}

/// Service client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpService {
    client: Client,
    base_url: String,
    known_bots: Arc<HashSet<i64>>,
}

impl HttpService {
    /// Build a client with the configured timeout
    pub fn new(config: HttpServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SimError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            known_bots: Arc::default(),
        })
    }

    /// Treat these profile ids as bots when a browse entry has no `is_bot`
    pub fn with_known_bots(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.known_bots = Arc::new(ids.into_iter().collect());
        self
    }

    /// Service root this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(call: &'static str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SimError::UnexpectedStatus {
                call,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn expect_ok(call: &'static str, request: RequestBuilder) -> Result<()> {
        Self::send(call, request).await.map(drop)
    }

    async fn expect_data<T: DeserializeOwned>(
        call: &'static str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = Self::send(call, request).await?;
        let bytes = response.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;

        if !envelope.success {
            return Err(SimError::Rejected {
                call,
                reason: envelope.error.unwrap_or_default(),
            });
        }

        envelope.data.ok_or_else(|| SimError::Rejected {
            call,
            reason: "missing data".to_string(),
        })
    }
}

impl ServiceApi for HttpService {
    fn authenticate<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<BearerToken>> {
        async move {
            let request = self
                .client
                .post(self.url("/api/login"))
                .json(&json!({ "username": username, "password": password }));

            // The service answers 401 with an envelope; surface its reason.
            let response = request.send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;
            let envelope: Envelope<LoginData> = serde_json::from_slice(&bytes).map_err(|_| {
                SimError::Authentication(format!("login returned status {}", status.as_u16()))
            })?;

            match envelope.data {
                Some(data) if envelope.success && status.is_success() => {
                    Ok(BearerToken::new(data.token))
                },
                _ => Err(SimError::Authentication(
                    envelope
                        .error
                        .unwrap_or_else(|| format!("login returned status {}", status.as_u16())),
                )),
            }
        }
        .boxed()
    }

    fn list_candidates<'a>(
        &'a self,
        token: &'a BearerToken,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<Candidate>>> {
        async move {
            let request = self
                .client
                .get(self.url("/api/browse"))
                .query(&[("limit", limit)])
                .bearer_auth(token.as_str());
            let data: BrowseData = Self::expect_data("browse", request).await?;
            Ok(data
                .profiles
                .into_iter()
                .map(|entry| Candidate {
                    id: entry.id,
                    popularity: entry.fame_rating,
                    bot: entry
                        .is_bot
                        .unwrap_or_else(|| self.known_bots.contains(&entry.id)),
                })
                .collect())
        }
        .boxed()
    }

    fn get_profile<'a>(&'a self, token: &'a BearerToken, id: i64) -> BoxFuture<'a, Result<()>> {
        let request = self
            .client
            .get(self.url(&format!("/api/user/{id}")))
            .bearer_auth(token.as_str());
        Self::expect_ok("visit", request).boxed()
    }

    fn create_like<'a>(&'a self, token: &'a BearerToken, id: i64) -> BoxFuture<'a, Result<()>> {
        let request = self
            .client
            .post(self.url(&format!("/api/like/{id}")))
            .bearer_auth(token.as_str());
        Self::expect_ok("like", request).boxed()
    }

    fn remove_like<'a>(&'a self, token: &'a BearerToken, id: i64) -> BoxFuture<'a, Result<()>> {
        let request = self
            .client
            .post(self.url(&format!("/api/unlike/{id}")))
            .bearer_auth(token.as_str());
        Self::expect_ok("unlike", request).boxed()
    }

    fn list_connections<'a>(&'a self, token: &'a BearerToken) -> BoxFuture<'a, Result<Vec<i64>>> {
        async move {
            let request = self
                .client
                .get(self.url("/api/connections"))
                .bearer_auth(token.as_str());
            let entries: Vec<ConnectionEntry> = Self::expect_data("connections", request).await?;
            Ok(entries.into_iter().map(|c| c.id).collect())
        }
        .boxed()
    }

    fn send_message<'a>(
        &'a self,
        token: &'a BearerToken,
        id: i64,
        text: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let request = self
            .client
            .post(self.url(&format!("/api/messages/{id}")))
            .bearer_auth(token.as_str())
            .json(&json!({ "content": text }));
        Self::expect_ok("send_message", request).boxed()
    }

    fn list_popular_tags<'a>(
        &'a self,
        token: &'a BearerToken,
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        async move {
            let request = self
                .client
                .get(self.url("/api/tags/popular"))
                .bearer_auth(token.as_str());
            let data: PopularTagsData = Self::expect_data("popular_tags", request).await?;
            Ok(data.popular_tags.into_iter().map(|t| t.tag).collect())
        }
        .boxed()
    }

    fn add_tag<'a>(&'a self, token: &'a BearerToken, tag: &'a str) -> BoxFuture<'a, Result<()>> {
        let request = self
            .client
            .post(self.url("/api/tags/add"))
            .bearer_auth(token.as_str())
            .json(&json!({ "tag": tag }));
        Self::expect_ok("add_tag", request).boxed()
    }

    fn touch_presence<'a>(&'a self, token: &'a BearerToken) -> BoxFuture<'a, Result<()>> {
        let request = self
            .client
            .get(self.url("/api/profile"))
            .bearer_auth(token.as_str());
        Self::expect_ok("presence", request).boxed()
    }

    fn sign_out<'a>(&'a self, token: &'a BearerToken) -> BoxFuture<'a, Result<()>> {
        let request = self
            .client
            .post(self.url("/api/logout"))
            .bearer_auth(token.as_str());
        Self::expect_ok("logout", request).boxed()
    }
}
