//! In-memory stand-in for the matching service.
//!
//! Backs `botsim run --dry-run` and the test suites. It keeps a small social
//! graph (profiles, likes, connections, tags), can inject failures per call,
//! and keeps the most recent calls and messages so callers can assert
//! ordering. Both logs are ring buffers, so a long rehearsal run holds a
//! fixed amount of history.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use super::{BearerToken, Candidate, ServiceApi};
use crate::error::{Result, SimError};

const TOKEN_PREFIX: &str = "scripted:";

/// Calls and messages retained by default
pub const DEFAULT_HISTORY: usize = 65_536;

/// One call received by a [`ScriptedService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCall {
    /// Caller's user id (0 for a failed login)
    pub user: i64,
    /// Call name (`"login"`, `"browse"`, `"visit"`, `"like"`, ...)
    pub call: &'static str,
    /// Target profile, when the call has one
    pub target: Option<i64>,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, (i64, String)>,
    profiles: Vec<Candidate>,
    likes: HashSet<(i64, i64)>,
    connections: HashMap<i64, BTreeSet<i64>>,
    reciprocating: HashSet<i64>,
    popular_tags: Vec<String>,
    user_tags: HashMap<i64, Vec<String>>,
    messages: VecDeque<(i64, i64, String)>,
    online: HashSet<i64>,
    failing: HashSet<&'static str>,
    calls: VecDeque<ScriptedCall>,
    history: usize,
    calls_seen: u64,
}

impl State {
    fn log_call(&mut self, call: ScriptedCall) {
        self.calls_seen += 1;
        push_bounded(&mut self.calls, call, self.history);
    }
}

/// Append to a ring buffer holding at most `cap` items.
fn push_bounded<T>(log: &mut VecDeque<T>, item: T, cap: usize) {
    if cap == 0 {
        return;
    }
    while log.len() >= cap {
        log.pop_front();
    }
    log.push_back(item);
}

/// Scripted, in-memory service.
#[derive(Debug)]
pub struct ScriptedService {
    state: Mutex<State>,
    latency: Option<Duration>,
}

impl Default for ScriptedService {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                history: DEFAULT_HISTORY,
                ..State::default()
            }),
            latency: None,
        }
    }
}

impl ScriptedService {
    /// Empty service: no accounts, no profiles
    pub fn new() -> Self {
        Self::default()
    }

    /// Service for a rehearsal run.
    ///
    /// Registers `bot_1..bot_N` (ids `1..=N`, password `password`) and
    /// lists `humans` human profiles after them. See [`Self::populated`].
    pub fn demo(bots: usize, humans: usize, password: &str) -> Self {
        Self::populated(
            (1..=bots as i64).map(|n| (n, format!("bot_{n}"), password.to_string())),
            humans,
        )
    }

    /// Service whose accounts are `accounts` as `(id, username, password)`.
    ///
    /// Every account is also a browsable bot profile. `humans` human profiles
    /// with spread-out popularity get ids after the highest account id, and
    /// every third of them likes back.
    pub fn populated(
        accounts: impl IntoIterator<Item = (i64, String, String)>,
        humans: usize,
    ) -> Self {
        let service = Self::new();
        {
            let mut state = service.lock();
            let mut last_id = 0;
            for (id, username, password) in accounts {
                state.accounts.insert(username, (id, password));
                state.profiles.push(Candidate::bot(id, (id % 10) as f64));
                last_id = last_id.max(id);
            }
            let first_human = last_id + 1;
            for (i, id) in (first_human..first_human + humans as i64).enumerate() {
                state
                    .profiles
                    .push(Candidate::human(id, ((i * 37) % 100) as f64 / 4.0));
                if i % 3 == 0 {
                    state.reciprocating.insert(id);
                }
            }
            state.popular_tags = ["#travel", "#food", "#music", "#hiking", "#coffee", "#books"]
                .iter()
                .map(ToString::to_string)
                .collect();
        }
        service
    }

    /// Add simulated network latency to every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Keep at most `history` recent calls and messages (0 keeps none)
    pub fn with_history(self, history: usize) -> Self {
        {
            let mut state = self.lock();
            state.history = history;
            while state.calls.len() > history {
                state.calls.pop_front();
            }
            while state.messages.len() > history {
                state.messages.pop_front();
            }
        }
        self
    }

    /// Register a login
    pub fn add_account(&self, id: i64, username: &str, password: &str) {
        self.lock()
            .accounts
            .insert(username.to_string(), (id, password.to_string()));
    }

    /// Add a browsable profile
    pub fn add_profile(&self, candidate: Candidate) {
        self.lock().profiles.push(candidate);
    }

    /// Create a mutual connection between two users
    pub fn connect(&self, a: i64, b: i64) {
        let mut state = self.lock();
        state.connections.entry(a).or_default().insert(b);
        state.connections.entry(b).or_default().insert(a);
    }

    /// Replace the popular tag list
    pub fn set_popular_tags(&self, tags: &[&str]) {
        self.lock().popular_tags = tags.iter().map(ToString::to_string).collect();
    }

    /// Make every future call named `call` fail with a 503
    pub fn fail_on(&self, call: &'static str) {
        self.lock().failing.insert(call);
    }

    /// Stop failing `call`
    pub fn recover(&self, call: &'static str) {
        self.lock().failing.remove(call);
    }

    /// Retained calls, oldest first
    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.lock().calls.iter().cloned().collect()
    }

    /// Calls received since creation, including ones no longer retained
    pub fn calls_seen(&self) -> u64 {
        self.lock().calls_seen
    }

    /// Number of retained calls named `call`
    pub fn count(&self, call: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.call == call).count()
    }

    /// Tags added by `user`
    pub fn tags_of(&self, user: i64) -> Vec<String> {
        self.lock().user_tags.get(&user).cloned().unwrap_or_default()
    }

    /// Retained messages as `(from, to, text)`, oldest first
    pub fn messages(&self) -> Vec<(i64, i64, String)> {
        self.lock().messages.iter().cloned().collect()
    }

    /// Connections of `user`
    pub fn connections_of(&self, user: i64) -> Vec<i64> {
        self.lock()
            .connections
            .get(&user)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether the service currently considers `user` online
    pub fn is_online(&self, user: i64) -> bool {
        self.lock().online.contains(&user)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Resolve the token, log the call and apply failure injection.
    fn enter(
        &self,
        token: &BearerToken,
        call: &'static str,
        target: Option<i64>,
    ) -> Result<(i64, MutexGuard<'_, State>)> {
        let user = token
            .as_str()
            .strip_prefix(TOKEN_PREFIX)
            .and_then(|id| id.parse::<i64>().ok())
            .ok_or(SimError::UnexpectedStatus { call, status: 401 })?;

        let mut state = self.lock();
        state.log_call(ScriptedCall { user, call, target });
        if state.failing.contains(call) {
            return Err(SimError::UnexpectedStatus { call, status: 503 });
        }
        Ok((user, state))
    }
}

impl ServiceApi for ScriptedService {
    fn authenticate<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<BearerToken>> {
        async move {
            self.delay().await;
            let mut state = self.lock();
            let account = state.accounts.get(username).cloned();
            let user = account.as_ref().map_or(0, |(id, _)| *id);
            state.log_call(ScriptedCall {
                user,
                call: "login",
                target: None,
            });

            if state.failing.contains("login") {
                return Err(SimError::Authentication("service unavailable".to_string()));
            }
            match account {
                Some((id, expected)) if expected == password => {
                    Ok(BearerToken::new(format!("{TOKEN_PREFIX}{id}")))
                },
                _ => Err(SimError::Authentication(
                    "Invalid username or password".to_string(),
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
            self.delay().await;
            let (_, state) = self.enter(token, "browse", None)?;
            Ok(state.profiles.iter().take(limit).cloned().collect())
        }
        .boxed()
    }

    fn get_profile<'a>(&'a self, token: &'a BearerToken, id: i64) -> BoxFuture<'a, Result<()>> {
        async move {
            self.delay().await;
            let (_, state) = self.enter(token, "visit", Some(id))?;
            if state.profiles.iter().any(|p| p.id == id) {
                Ok(())
            } else {
                Err(SimError::UnexpectedStatus {
                    call: "visit",
                    status: 404,
                })
            }
        }
        .boxed()
    }

    fn create_like<'a>(&'a self, token: &'a BearerToken, id: i64) -> BoxFuture<'a, Result<()>> {
        async move {
            self.delay().await;
            let (user, mut state) = self.enter(token, "like", Some(id))?;
            state.likes.insert((user, id));
            let mutual = state.likes.contains(&(id, user)) || state.reciprocating.contains(&id);
            if mutual {
                state.connections.entry(user).or_default().insert(id);
                state.connections.entry(id).or_default().insert(user);
            }
            Ok(())
        }
        .boxed()
    }

    fn remove_like<'a>(&'a self, token: &'a BearerToken, id: i64) -> BoxFuture<'a, Result<()>> {
        async move {
            self.delay().await;
            let (user, mut state) = self.enter(token, "unlike", Some(id))?;
            state.likes.remove(&(user, id));
            if let Some(c) = state.connections.get_mut(&user) {
                c.remove(&id);
            }
            if let Some(c) = state.connections.get_mut(&id) {
                c.remove(&user);
            }
            Ok(())
        }
        .boxed()
    }

    fn list_connections<'a>(&'a self, token: &'a BearerToken) -> BoxFuture<'a, Result<Vec<i64>>> {
        async move {
            self.delay().await;
            let (user, state) = self.enter(token, "connections", None)?;
            Ok(state
                .connections
                .get(&user)
                .map(|c| c.iter().copied().collect())
                .unwrap_or_default())
        }
        .boxed()
    }

    fn send_message<'a>(
        &'a self,
        token: &'a BearerToken,
        id: i64,
        text: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.delay().await;
            let (user, mut state) = self.enter(token, "message", Some(id))?;
            let connected = state
                .connections
                .get(&user)
                .is_some_and(|c| c.contains(&id));
            if !connected {
                return Err(SimError::UnexpectedStatus {
                    call: "message",
                    status: 403,
                });
            }
            let history = state.history;
            push_bounded(&mut state.messages, (user, id, text.to_string()), history);
            Ok(())
        }
        .boxed()
    }

    fn list_popular_tags<'a>(
        &'a self,
        token: &'a BearerToken,
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        async move {
            self.delay().await;
            let (_, state) = self.enter(token, "popular_tags", None)?;
            Ok(state.popular_tags.clone())
        }
        .boxed()
    }

    fn add_tag<'a>(&'a self, token: &'a BearerToken, tag: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            self.delay().await;
            let (user, mut state) = self.enter(token, "add_tag", None)?;
            let tags = state.user_tags.entry(user).or_default();
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
            Ok(())
        }
        .boxed()
    }

    fn touch_presence<'a>(&'a self, token: &'a BearerToken) -> BoxFuture<'a, Result<()>> {
        async move {
            self.delay().await;
            let (user, mut state) = self.enter(token, "presence", None)?;
            state.online.insert(user);
            Ok(())
        }
        .boxed()
    }

    fn sign_out<'a>(&'a self, token: &'a BearerToken) -> BoxFuture<'a, Result<()>> {
        async move {
            self.delay().await;
            let (user, mut state) = self.enter(token, "logout", None)?;
            state.online.remove(&user);
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn login(service: &ScriptedService, user: &str) -> BearerToken {
        service.authenticate(user, "test123").await.unwrap()
    }

    #[tokio::test]
    async fn test_demo_login_and_browse() {
        let service = ScriptedService::demo(3, 5, "test123");
        let token = login(&service, "bot_2").await;

        let candidates = service.list_candidates(&token, 20).await.unwrap();
        assert_eq!(candidates.len(), 8);
        assert_eq!(candidates.iter().filter(|c| c.bot).count(), 3);

        let err = service.authenticate("bot_2", "wrong").await.unwrap_err();
        assert!(matches!(err, SimError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_like_reciprocating_human_connects() {
        let service = ScriptedService::demo(2, 3, "test123");
        let token = login(&service, "bot_1").await;

        // First human (id 3) reciprocates
        service.create_like(&token, 3).await.unwrap();
        assert_eq!(service.list_connections(&token).await.unwrap(), vec![3]);

        service.remove_like(&token, 3).await.unwrap();
        assert!(service.list_connections(&token).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_message_requires_connection() {
        let service = ScriptedService::demo(2, 3, "test123");
        let token = login(&service, "bot_1").await;

        assert!(service.send_message(&token, 4, "hi").await.is_err());
        service.connect(1, 4);
        service.send_message(&token, 4, "hi").await.unwrap();
        assert_eq!(service.messages(), vec![(1, 4, "hi".to_string())]);
    }

    #[tokio::test]
    async fn test_failure_injection_and_call_log() {
        let service = ScriptedService::demo(1, 2, "test123");
        let token = login(&service, "bot_1").await;

        service.fail_on("visit");
        let err = service.get_profile(&token, 2).await.unwrap_err();
        assert!(matches!(err, SimError::UnexpectedStatus { status: 503, .. }));

        service.recover("visit");
        service.get_profile(&token, 2).await.unwrap();

        let calls: Vec<_> = service.calls().iter().map(|c| c.call).collect();
        assert_eq!(calls, vec!["login", "visit", "visit"]);
    }

    #[tokio::test]
    async fn test_populated_humans_follow_highest_account() {
        let accounts = vec![
            (40, "alice_bot".to_string(), "pw".to_string()),
            (12, "bob_bot".to_string(), "pw".to_string()),
        ];
        let service = ScriptedService::populated(accounts, 2);
        let token = service.authenticate("bob_bot", "pw").await.unwrap();

        let ids: Vec<i64> = service
            .list_candidates(&token, 20)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![40, 12, 41, 42]);
    }

    #[tokio::test]
    async fn test_history_stays_bounded() {
        let service = ScriptedService::demo(1, 5, "test123").with_history(100);
        let token = login(&service, "bot_1").await;
        service.connect(1, 2);

        for n in 0..10_000 {
            service.list_candidates(&token, 20).await.unwrap();
            service.send_message(&token, 2, &format!("msg {n}")).await.unwrap();
        }

        assert_eq!(service.calls_seen(), 20_001);
        assert_eq!(service.calls().len(), 100);
        assert_eq!(service.calls().last().map(|c| c.call), Some("message"));
        let messages = service.messages();
        assert_eq!(messages.len(), 100);
        assert_eq!(messages[99].2, "msg 9999");
    }

    #[tokio::test]
    async fn test_zero_history_keeps_nothing() {
        let service = ScriptedService::demo(1, 2, "test123").with_history(0);
        let token = login(&service, "bot_1").await;
        service.list_candidates(&token, 20).await.unwrap();
        assert!(service.calls().is_empty());
        assert_eq!(service.calls_seen(), 2);
    }

    #[tokio::test]
    async fn test_bad_token_rejected() {
        let service = ScriptedService::demo(1, 1, "test123");
        let err = service
            .list_connections(&BearerToken::new("forged"))
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::UnexpectedStatus { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_presence_round_trip() {
        let service = ScriptedService::demo(1, 0, "test123");
        let token = login(&service, "bot_1").await;
        service.touch_presence(&token).await.unwrap();
        assert!(service.is_online(1));
        service.sign_out(&token).await.unwrap();
        assert!(!service.is_online(1));
    }
}
