//! Action Library: one function per user-facing action.
//!
//! Each action performs its service calls, interprets the result and, where
//! relevant, updates the agent's view cache and emits an activity record.
//! Failures are logged and swallowed by [`ActionContext::perform`]; nothing
//! here retries or propagates past the session loop.

use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::activity::{ActivityKind, ActivityRecord, ActivitySink};
use crate::agent::Agent;
use crate::behavior::{Action, SelectorConfig, WeightedSelector};
use crate::error::{Result, SimError};
use crate::service::{BearerToken, Candidate, ServiceApi};

/// Phrases agents pick from when messaging a connection.
pub const DEFAULT_PHRASES: [&str; 7] = [
    "Hey! How are you?",
    "Hi there!",
    "What's up?",
    "Hello!",
    "Nice to meet you!",
    "Hope you're having a great day!",
    "How's it going?",
];

/// Action tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSettings {
    /// Candidates requested per browse
    pub browse_limit: usize,
    /// Candidate selection policy
    pub selector: SelectorConfig,
    /// Chance that a messaging agent stays silent
    pub non_response_probability: f64,
    /// Chance that a tag action actually adds a tag
    pub tag_add_probability: f64,
    /// Pause between the fallback visit and the second like attempt
    pub like_retry_pause: Duration,
    /// Message texts
    pub phrases: Vec<String>,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            browse_limit: 20,
            selector: SelectorConfig::default(),
            non_response_probability: 0.25,
            tag_add_probability: 0.5,
            like_retry_pause: Duration::from_secs(2),
            phrases: DEFAULT_PHRASES.iter().map(ToString::to_string).collect(),
        }
    }
}

/// How an action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The intended call succeeded
    Completed,
    /// Precondition not met or the agent chose not to act
    Skipped,
    /// A service call failed
    Failed,
}

/// Everything one agent's actions need for one session.
#[derive(Clone, Copy)]
pub struct ActionContext<'a> {
    /// Acting agent
    pub agent: &'a Agent,
    /// Service client
    pub service: &'a dyn ServiceApi,
    /// Session token
    pub token: &'a BearerToken,
    /// Activity destination
    pub sink: &'a dyn ActivitySink,
    /// Tuning
    pub settings: &'a ActionSettings,
    /// Run id stamped on activity records
    pub run_id: Uuid,
}

impl<'a> ActionContext<'a> {
    /// Run one action, logging and swallowing any failure
    pub async fn perform<R: Rng + Send>(&self, action: Action, rng: &mut R) -> Outcome {
        let result = match action {
            Action::Browse => self.browse().await.map(|_| Outcome::Completed),
            Action::Visit => self.visit(rng).await,
            Action::Like => self.like(rng).await,
            Action::Disconnect => self.disconnect(rng).await,
            Action::SendMessage => self.send_message(rng).await,
            Action::ChangeTags => self.change_tags(rng).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(agent = %self.agent.username, action = %action, "Action failed: {}", e);
                Outcome::Failed
            },
        }
    }

    /// Fetch a page of candidates
    pub async fn browse(&self) -> Result<Vec<Candidate>> {
        let profiles = self
            .service
            .list_candidates(self.token, self.settings.browse_limit)
            .await?;

        self.record(
            ActivityKind::BrowseProfiles,
            None,
            Some(format!("Found {} profiles", profiles.len())),
        );
        tracing::debug!(agent = %self.agent.username, found = profiles.len(), "Browsed profiles");
        Ok(profiles)
    }

    /// Browse, then narrow the page with the weighted selector
    pub async fn browse_biased<R: Rng + Send>(&self, rng: &mut R) -> Result<Vec<Candidate>> {
        let profiles = self.browse().await?;
        let selector = WeightedSelector::new(self.settings.selector);
        Ok(selector.select(profiles, self.agent.id, rng))
    }

    /// Open one selected profile and remember the view
    pub async fn visit<R: Rng + Send>(&self, rng: &mut R) -> Result<Outcome> {
        let pool = self.browse_biased(rng).await?;
        let Some(target) = pool.choose(rng).map(|c| c.id) else {
            return Ok(Outcome::Skipped);
        };
        if target == self.agent.id.0 {
            return Ok(Outcome::Skipped);
        }

        self.service.get_profile(self.token, target).await?;
        self.agent.views.record(target);
        self.record(ActivityKind::VisitProfile, Some(target), None);
        tracing::info!(agent = %self.agent.username, target, "Visited profile");
        Ok(Outcome::Completed)
    }

    /// Like a recently viewed profile, visiting one first if needed
    pub async fn like<R: Rng + Send>(&self, rng: &mut R) -> Result<Outcome> {
        let pool = self.browse_biased(rng).await?;
        if pool.is_empty() {
            return Ok(Outcome::Skipped);
        }

        let mut fresh = self.fresh_targets(&pool);
        if fresh.is_empty() {
            if let Err(e) = self.visit(rng).await {
                tracing::debug!(agent = %self.agent.username, "Visit before like failed: {}", e);
            }
            tokio::time::sleep(self.settings.like_retry_pause).await;
            fresh = self.fresh_targets(&pool);
        }

        let Some(&target) = fresh.choose(rng) else {
            tracing::warn!(agent = %self.agent.username, "Cannot like - no recently viewed profiles");
            return Ok(Outcome::Skipped);
        };

        match self.service.create_like(self.token, target).await {
            Ok(()) => {
                self.record(ActivityKind::LikeProfile, Some(target), None);
                tracing::info!(agent = %self.agent.username, target, "Liked profile");
                Ok(Outcome::Completed)
            },
            Err(e) => {
                self.record(ActivityKind::LikeProfileFailed, Some(target), Some(failure_detail(&e)));
                Err(e)
            },
        }
    }

    /// Unlike a random connection
    pub async fn disconnect<R: Rng + Send>(&self, rng: &mut R) -> Result<Outcome> {
        let connections = self.service.list_connections(self.token).await?;
        let Some(&target) = connections.choose(rng) else {
            return Ok(Outcome::Skipped);
        };

        match self.service.remove_like(self.token, target).await {
            Ok(()) => {
                self.record(ActivityKind::UnlikeProfile, Some(target), None);
                tracing::info!(agent = %self.agent.username, target, "Disconnected from profile");
                Ok(Outcome::Completed)
            },
            Err(e) => {
                self.record(ActivityKind::UnlikeFailed, Some(target), Some(failure_detail(&e)));
                Err(e)
            },
        }
    }

    /// Message a random connection, unless the agent stays silent
    pub async fn send_message<R: Rng + Send>(&self, rng: &mut R) -> Result<Outcome> {
        let connections = self.service.list_connections(self.token).await?;
        if connections.is_empty() {
            return Ok(Outcome::Skipped);
        }
        if rng.gen::<f64>() < self.settings.non_response_probability {
            tracing::debug!(agent = %self.agent.username, "Leaving connections unanswered");
            return Ok(Outcome::Skipped);
        }

        let (Some(&target), Some(text)) = (
            connections.choose(rng),
            self.settings.phrases.choose(rng),
        ) else {
            return Ok(Outcome::Skipped);
        };

        match self.service.send_message(self.token, target, text).await {
            Ok(()) => {
                self.record(ActivityKind::SendMessage, Some(target), Some(text.clone()));
                tracing::info!(agent = %self.agent.username, target, text = %text, "Sent message");
                Ok(Outcome::Completed)
            },
            Err(e) => {
                self.record(ActivityKind::SendMessageFailed, Some(target), Some(failure_detail(&e)));
                Err(e)
            },
        }
    }

    /// Maybe add one popular tag to the agent's profile
    pub async fn change_tags<R: Rng + Send>(&self, rng: &mut R) -> Result<Outcome> {
        let tags = self.service.list_popular_tags(self.token).await?;
        if tags.is_empty() || rng.gen::<f64>() >= self.settings.tag_add_probability {
            return Ok(Outcome::Skipped);
        }
        let Some(tag) = tags.choose(rng) else {
            return Ok(Outcome::Skipped);
        };

        self.service.add_tag(self.token, tag).await?;
        self.record(ActivityKind::AddTag, None, Some(tag.clone()));
        tracing::info!(agent = %self.agent.username, tag = %tag, "Added tag");
        Ok(Outcome::Completed)
    }

    fn fresh_targets(&self, pool: &[Candidate]) -> Vec<i64> {
        pool.iter()
            .map(|c| c.id)
            .filter(|id| *id != self.agent.id.0 && self.agent.views.is_fresh(*id))
            .collect()
    }

    fn record(&self, kind: ActivityKind, target: Option<i64>, detail: Option<String>) {
        let mut record = ActivityRecord::new(self.run_id, self.agent, kind);
        if let Some(target) = target {
            record = record.with_target(target);
        }
        if let Some(detail) = detail {
            record = record.with_detail(detail);
        }
        self.sink.emit(record);
    }
}

fn failure_detail(err: &SimError) -> String {
    match err {
        SimError::UnexpectedStatus { status, .. } => format!("Status: {status}"),
        other => format!("Error: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::activity::MemorySink;
    use crate::agent::{AgentId, BehaviorPattern};
    use crate::service::ScriptedService;

    struct Fixture {
        service: ScriptedService,
        agent: Agent,
        token: BearerToken,
        sink: MemorySink,
        settings: ActionSettings,
    }

    impl Fixture {
        async fn new() -> Self {
            Self::with_humans(4).await
        }

        async fn with_humans(humans: usize) -> Self {
            let service = ScriptedService::demo(1, humans, "test123");
            let token = service.authenticate("bot_1", "test123").await.unwrap();
            Self {
                service,
                agent: Agent::new(AgentId(1), "bot_1", "test123", 0, BehaviorPattern::Liker, false),
                token,
                sink: MemorySink::new(),
                settings: ActionSettings::default(),
            }
        }

        fn ctx(&self) -> ActionContext<'_> {
            ActionContext {
                agent: &self.agent,
                service: &self.service,
                token: &self.token,
                sink: &self.sink,
                settings: &self.settings,
                run_id: Uuid::nil(),
            }
        }

        fn call_names(&self) -> Vec<&'static str> {
            self.service.calls().iter().map(|c| c.call).collect()
        }
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[tokio::test]
    async fn test_browse_records_activity() {
        let f = Fixture::new().await;
        let profiles = f.ctx().browse().await.unwrap();
        assert_eq!(profiles.len(), 5);

        let records = f.sink.of_kind(ActivityKind::BrowseProfiles);
        assert_eq!(records[0].detail.as_deref(), Some("Found 5 profiles"));
    }

    #[tokio::test]
    async fn test_visit_records_view() {
        let f = Fixture::new().await;
        let outcome = f.ctx().visit(&mut rng()).await.unwrap();
        assert_eq!(outcome, Outcome::Completed);

        let visit = f.sink.of_kind(ActivityKind::VisitProfile);
        let target = visit[0].target_id.unwrap();
        assert!(f.agent.views.is_fresh(target));
        assert_ne!(target, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_like_visits_first_when_nothing_fresh() {
        // One human besides self, so the visit and the like share a target
        let f = Fixture::with_humans(1).await;
        let outcome = f.ctx().like(&mut rng()).await.unwrap();
        assert_eq!(outcome, Outcome::Completed);

        assert_eq!(f.call_names(), vec!["login", "browse", "browse", "visit", "like"]);
        let targets: Vec<Option<i64>> = f.service.calls().iter().map(|c| c.target).collect();
        assert_eq!(targets[3], Some(2));
        assert_eq!(targets[4], Some(2));
        assert_eq!(f.sink.of_kind(ActivityKind::LikeProfile)[0].target_id, Some(2));
    }

    #[tokio::test]
    async fn test_like_uses_fresh_view_without_visit() {
        let f = Fixture::new().await;
        for id in 2..=5 {
            f.agent.views.record(id);
        }

        let outcome = f.ctx().like(&mut rng()).await.unwrap();
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(f.service.count("visit"), 0);
        assert_eq!(f.service.count("like"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_like_gives_up_when_visit_fails() {
        let f = Fixture::new().await;
        f.service.fail_on("visit");

        let outcome = f.ctx().perform(Action::Like, &mut rng()).await;
        assert_eq!(outcome, Outcome::Skipped);
        assert_eq!(f.service.count("visit"), 1);
        assert_eq!(f.service.count("like"), 0);
        assert!(f.sink.of_kind(ActivityKind::LikeProfile).is_empty());
    }

    #[tokio::test]
    async fn test_like_failure_recorded() {
        let f = Fixture::new().await;
        for id in 2..=5 {
            f.agent.views.record(id);
        }
        f.service.fail_on("like");

        let outcome = f.ctx().perform(Action::Like, &mut rng()).await;
        assert_eq!(outcome, Outcome::Failed);
        let failed = f.sink.of_kind(ActivityKind::LikeProfileFailed);
        assert_eq!(failed[0].detail.as_deref(), Some("Status: 503"));
    }

    #[tokio::test]
    async fn test_disconnect_requires_connection() {
        let f = Fixture::new().await;
        assert_eq!(f.ctx().disconnect(&mut rng()).await.unwrap(), Outcome::Skipped);
        assert_eq!(f.service.count("unlike"), 0);

        f.service.connect(1, 3);
        assert_eq!(f.ctx().disconnect(&mut rng()).await.unwrap(), Outcome::Completed);
        assert!(f.service.connections_of(1).is_empty());
        assert_eq!(f.sink.of_kind(ActivityKind::UnlikeProfile)[0].target_id, Some(3));
    }

    #[tokio::test]
    async fn test_send_message_non_response() {
        let mut f = Fixture::new().await;
        f.service.connect(1, 4);

        f.settings.non_response_probability = 1.0;
        assert_eq!(f.ctx().send_message(&mut rng()).await.unwrap(), Outcome::Skipped);
        assert_eq!(f.service.count("message"), 0);

        f.settings.non_response_probability = 0.0;
        assert_eq!(f.ctx().send_message(&mut rng()).await.unwrap(), Outcome::Completed);
        let sent = f.service.messages();
        assert_eq!(sent.len(), 1);
        assert!(DEFAULT_PHRASES.contains(&sent[0].2.as_str()));
    }

    #[tokio::test]
    async fn test_change_tags_probability() {
        let mut f = Fixture::new().await;

        f.settings.tag_add_probability = 0.0;
        assert_eq!(f.ctx().change_tags(&mut rng()).await.unwrap(), Outcome::Skipped);
        assert_eq!(f.service.count("add_tag"), 0);

        f.settings.tag_add_probability = 1.0;
        assert_eq!(f.ctx().change_tags(&mut rng()).await.unwrap(), Outcome::Completed);
        assert_eq!(f.service.tags_of(1).len(), 1);
    }

    #[tokio::test]
    async fn test_browse_failure_is_swallowed() {
        let f = Fixture::new().await;
        f.service.fail_on("browse");
        assert_eq!(f.ctx().perform(Action::Visit, &mut rng()).await, Outcome::Failed);
        assert_eq!(f.ctx().perform(Action::Browse, &mut rng()).await, Outcome::Failed);
    }
}
