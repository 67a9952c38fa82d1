//! Session-scoped goal execution.
//!
//! Epistemic foundation:
//! - K_i: Goal pipeline order: sanitize → rate limit → log → record turn → respond
//! - K_i: Each session has its own history and context memory
//! - B_i: Research and sandbox may degrade → sections still render
//! - B_i: Analytics and session persistence are best effort → warn on failure
//! - K_i: Store writes made while a goal runs go through the blocking pool

use super::analysis::analyze_goal;
use super::templates;
use crate::models::{
    CodegenieError, ContextMemory, ConversationTurn, GoalResponse, ResponseMetadata, Result,
    SecurityConfig, SessionInfo, truncate_chars,
};
use crate::research::ResearchEngine;
use crate::security::{CodeSandbox, RateLimiter, Sanitizer};
use crate::store::Database;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Rate-limit action name for goals.
pub const GOAL_EXECUTION_ACTION: &str = "goal_execution";

/// Results requested from research for a goal.
const GOAL_RESEARCH_RESULTS: usize = 8;

/// Results shown per source in a response.
const SHOWN_PER_SOURCE: usize = 3;

/// Characters of the goal kept in the analytics event.
const ANALYTICS_DETAIL_CHARS: usize = 100;

/// Sessions untouched for this long are dropped.
pub const DEFAULT_SESSION_IDLE_MINUTES: i64 = 120;

/// Most recent turns written to the store per session.
pub const MAX_PERSISTED_TURNS: usize = 50;

#[derive(Debug, Clone)]
struct Session {
    id: String,
    user_id: String,
    started_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
    history: Vec<ConversationTurn>,
    context: Option<ContextMemory>,
}

/// Stored form of a session; only the newest turns are kept.
#[derive(Serialize)]
struct PersistedSession<'a> {
    id: &'a str,
    user_id: &'a str,
    started_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
    turns: usize,
    history: &'a [ConversationTurn],
    context: &'a Option<ContextMemory>,
}

impl Session {
    fn persisted(&self) -> PersistedSession<'_> {
        let skip = self.history.len().saturating_sub(MAX_PERSISTED_TURNS);
        PersistedSession {
            id: &self.id,
            user_id: &self.user_id,
            started_at: self.started_at,
            last_active: self.last_active,
            turns: self.history.len(),
            history: &self.history[skip..],
            context: &self.context,
        }
    }

    /// Encoded store record, or `None` (logged) when encoding fails.
    fn record(&self) -> Option<serde_json::Value> {
        match serde_json::to_value(self.persisted()) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Could not encode session");
                None
            }
        }
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            user_id: self.user_id.clone(),
            started_at: self.started_at,
            turns: self.history.len(),
        }
    }
}

/// The assistant: sessions plus the services a goal may use.
pub struct Assistant {
    db: Arc<Database>,
    rate_limiter: Arc<RateLimiter>,
    sanitizer: Sanitizer,
    sandbox: Arc<CodeSandbox>,
    research: Arc<ResearchEngine>,
    security: SecurityConfig,
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    idle_timeout: TimeDelta,
}

impl Assistant {
    pub fn new(
        security: &SecurityConfig,
        db: Arc<Database>,
        rate_limiter: Arc<RateLimiter>,
        sandbox: Arc<CodeSandbox>,
        research: Arc<ResearchEngine>,
    ) -> Result<Self> {
        Ok(Self {
            db,
            rate_limiter,
            sanitizer: Sanitizer::new(&security.blocked_patterns)?,
            sandbox,
            research,
            security: security.clone(),
            sessions: DashMap::new(),
            idle_timeout: TimeDelta::minutes(DEFAULT_SESSION_IDLE_MINUTES),
        })
    }

    /// Drop sessions idle for longer than `minutes`.
    pub fn with_idle_timeout(mut self, minutes: i64) -> Self {
        self.idle_timeout = TimeDelta::minutes(minutes);
        self
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn session(&self, session_id: &str) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .get(session_id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| CodegenieError::NotFound(format!("session {session_id}")))
    }

    fn lock(session: &Mutex<Session>) -> Result<std::sync::MutexGuard<'_, Session>> {
        session
            .lock()
            .map_err(|_| CodegenieError::Internal("session lock poisoned".to_string()))
    }

    fn persist(&self, session: &Session) {
        let Some(data) = session.record() else {
            return;
        };
        if let Err(e) = self.db.save_session(&session.id, &session.user_id, data) {
            warn!(session_id = %session.id, error = %e, "Session persistence failed");
        }
    }

    fn log_event(&self, user_id: &str, action: &str, details: &str) {
        if let Err(e) = self.db.log_analytics(user_id, action, details) {
            warn!(user_id, action, error = %e, "Analytics logging failed");
        }
    }

    /// Run a best-effort store write on the blocking pool.
    async fn store_off_thread<F>(&self, what: &'static str, write: F)
    where
        F: FnOnce(&Database) -> Result<()> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        match tokio::task::spawn_blocking(move || write(&db)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "{what} failed"),
            Err(e) => warn!(error = %e, "{what} task failed"),
        }
    }

    /// Open a new session for `user_id`.
    pub fn start_session(&self, user_id: &str) -> Result<SessionInfo> {
        let user_id = match user_id.trim() {
            "" => "default",
            id => id,
        };
        self.db.upsert_user(user_id, None)?;

        let now = Utc::now();
        let evicted = self.evict_idle_at(now);
        if evicted > 0 {
            debug!(evicted, "Evicted idle sessions");
        }

        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            started_at: now,
            last_active: now,
            history: Vec::new(),
            context: None,
        };
        let info = session.info();

        self.log_event(user_id, "session_start", &session.id);
        self.persist(&session);
        self.sessions
            .insert(session.id.clone(), Arc::new(Mutex::new(session)));

        info!(session_id = %info.session_id, user_id, "Session started");
        Ok(info)
    }

    pub fn session_info(&self, session_id: &str) -> Result<SessionInfo> {
        let session = self.session(session_id)?;
        let info = Self::lock(&session)?.info();
        Ok(info)
    }

    /// Conversation turns of a session, oldest first.
    pub fn history(&self, session_id: &str) -> Result<Vec<ConversationTurn>> {
        let session = self.session(session_id)?;
        let history = Self::lock(&session)?.history.clone();
        Ok(history)
    }

    pub fn context(&self, session_id: &str) -> Result<Option<ContextMemory>> {
        let session = self.session(session_id)?;
        let context = Self::lock(&session)?.context.clone();
        Ok(context)
    }

    /// Forget a session's history and context memory.
    pub fn clear_session(&self, session_id: &str) -> Result<()> {
        let session = self.session(session_id)?;
        let mut guard = Self::lock(&session)?;
        guard.history.clear();
        guard.context = None;
        self.persist(&guard);
        debug!(session_id, "Session cleared");
        Ok(())
    }

    /// Remove a session. Later lookups are `NotFound`.
    pub fn end_session(&self, session_id: &str) -> Result<()> {
        self.sessions
            .remove(session_id)
            .ok_or_else(|| CodegenieError::NotFound(format!("session {session_id}")))?;
        info!(session_id, "Session ended");
        Ok(())
    }

    /// Drop sessions whose last activity is older than the idle timeout.
    ///
    /// Sessions locked by a running goal are in use and kept.
    pub fn evict_idle_at(&self, now: DateTime<Utc>) -> usize {
        let idle_timeout = self.idle_timeout;
        let mut evicted = 0;
        self.sessions.retain(|_, session| {
            let keep = match session.try_lock() {
                Ok(guard) => now - guard.last_active < idle_timeout,
                Err(TryLockError::WouldBlock) => true,
                Err(TryLockError::Poisoned(_)) => false,
            };
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Execute a free-text goal within a session.
    pub async fn execute_goal(&self, session_id: &str, goal: &str) -> Result<GoalResponse> {
        let start = Instant::now();
        let session = self.session(session_id)?;
        let user_id = {
            let mut guard = Self::lock(&session)?;
            guard.last_active = Utc::now();
            guard.user_id.clone()
        };

        let goal = self.sanitizer.sanitize(goal, self.security.max_goal_length);
        if goal.is_empty() {
            return Err(CodegenieError::InvalidInput(
                "Please provide a valid goal".to_string(),
            ));
        }

        self.rate_limiter
            .enforce(&user_id, GOAL_EXECUTION_ACTION, self.security.goal_limit)?;

        let details = truncate_chars(&goal, ANALYTICS_DETAIL_CHARS);
        let event_user = user_id.clone();
        self.store_off_thread("Analytics logging", move |db| {
            db.log_analytics(&event_user, GOAL_EXECUTION_ACTION, &details)
                .map(|_| ())
        })
        .await;

        Self::lock(&session)?.history.push(ConversationTurn {
            timestamp: Utc::now(),
            user_input: goal.clone(),
            session_id: session_id.to_string(),
            system_response: None,
            metadata: None,
        });

        let analysis = analyze_goal(&goal);
        let mut parts: Vec<String> = Vec::new();
        let mut research_sources = None;

        if analysis.needs_research {
            let results = self.research.search(&goal, GOAL_RESEARCH_RESULTS).await;
            research_sources = Some(results.non_empty_sources());

            if results.has_any() {
                parts.push("## 🔍 Research Results\n".to_string());
                for entry in results.sources.iter().filter(|s| !s.results.is_empty()) {
                    parts.push(format!(
                        "### {} ({} results)",
                        entry.source.title(),
                        entry.results.len()
                    ));
                    for (i, hit) in entry.results.iter().take(SHOWN_PER_SOURCE).enumerate() {
                        parts.push(format!("{}. **{}**", i + 1, hit.title));
                        parts.push(format!("   {}", hit.snippet));
                        if !hit.url.is_empty() {
                            parts.push(format!("   🔗 [Read more]({})", hit.url));
                        }
                        parts.push(String::new());
                    }
                }
            }
        }

        if analysis.needs_code {
            let code = templates::code_solution(&goal);
            parts.push("## 💻 Code Solution\n".to_string());
            parts.push(format!("```python\n{code}\n```\n"));

            let outcome = self.sandbox.execute(code, &user_id).await;
            parts.push("## 📊 Execution Result\n".to_string());
            parts.push(format!("```\n{outcome}\n```\n"));
        }

        if analysis.is_educational {
            parts.extend(templates::educational_section(&goal));
        }

        if analysis.is_problem_solving {
            parts.extend(templates::problem_solving_section());
        }

        let suggestions = templates::suggestions(&analysis);
        if !suggestions.is_empty() {
            parts.push("## 💡 Next Steps\n".to_string());
            for (i, suggestion) in suggestions.iter().enumerate() {
                parts.push(format!("{}. {suggestion}", i + 1));
            }
            parts.push(String::new());
        }

        if parts.is_empty() {
            parts.push(templates::fallback_response(&goal));
        }

        let content = parts.join("\n");
        let response_length = content.chars().count();

        let (metadata, record) = {
            let mut guard = Self::lock(&session)?;
            let metadata = ResponseMetadata {
                session_id: session_id.to_string(),
                goal_type: analysis.kind,
                research_sources,
                response_length,
                suggestions_count: suggestions.len(),
                conversation_turn: guard.history.len(),
                processing_time_ms: start.elapsed().as_millis() as u64,
            };

            if let Some(turn) = guard.history.last_mut() {
                turn.system_response = Some(content.clone());
                turn.metadata = Some(metadata.clone());
            }
            guard.context = Some(ContextMemory {
                last_goal: goal.clone(),
                last_response_length: response_length,
                goal_type: analysis.kind,
                timestamp: Utc::now(),
            });
            (metadata, guard.record())
        };

        if let Some(data) = record {
            let (id, owner) = (session_id.to_string(), user_id.clone());
            self.store_off_thread("Session persistence", move |db| {
                db.save_session(&id, &owner, data)
            })
            .await;
        }

        info!(
            session_id,
            goal_type = analysis.kind.as_str(),
            response_length,
            elapsed_ms = metadata.processing_time_ms,
            "Goal executed"
        );

        Ok(GoalResponse { content, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RateLimitRule, ResearchConfig, SearchResult, Source};
    use crate::research::SearchSource;
    use async_trait::async_trait;

    struct StaticSource;

    #[async_trait]
    impl SearchSource for StaticSource {
        fn source(&self) -> Source {
            Source::Wikipedia
        }

        async fn search(&self, query: &str, max: usize) -> Result<Vec<SearchResult>> {
            Ok((0..max.min(5))
                .map(|i| {
                    SearchResult::new(
                        format!("{query} {i}"),
                        format!("https://example.org/{i}"),
                        "a snippet",
                        300,
                        "Wikipedia",
                    )
                })
                .collect())
        }
    }

    fn assistant_with(security: SecurityConfig) -> (Assistant, Arc<Database>) {
        let db = Arc::new(Database::in_memory());
        let limiter = Arc::new(RateLimiter::new());
        let sandbox = Arc::new(CodeSandbox::new(&security, Arc::clone(&limiter)).unwrap());
        let research = Arc::new(ResearchEngine::with_sources(
            vec![Arc::new(StaticSource)],
            Arc::clone(&db),
            &ResearchConfig::default(),
        ));
        let assistant =
            Assistant::new(&security, Arc::clone(&db), limiter, sandbox, research).unwrap();
        (assistant, db)
    }

    fn assistant() -> (Assistant, Arc<Database>) {
        assistant_with(SecurityConfig {
            interpreter: "definitely-not-an-interpreter".to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_start_session_logs_and_persists() {
        let (assistant, db) = assistant();
        let info = assistant.start_session("alice").unwrap();
        assert_eq!(info.user_id, "alice");
        assert_eq!(info.turns, 0);

        let events = db.events_for("alice").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "session_start");
        assert_eq!(events[0].details, info.session_id);
        assert!(db.session(&info.session_id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let (assistant, _) = assistant();
        assert!(matches!(
            assistant.execute_goal("missing", "hello").await,
            Err(CodegenieError::NotFound(_))
        ));
        assert!(matches!(
            assistant.history("missing"),
            Err(CodegenieError::NotFound(_))
        ));
        assert!(assistant.clear_session("missing").is_err());
    }

    #[tokio::test]
    async fn test_empty_goal_is_rejected() {
        let (assistant, _) = assistant();
        let id = assistant.start_session("u").unwrap().session_id;
        match assistant.execute_goal(&id, "").await {
            Err(CodegenieError::InvalidInput(msg)) => {
                assert_eq!(msg, "Please provide a valid goal")
            }
            other => panic!("unexpected: {other:?}"),
        }
        // longer than the goal limit sanitizes to nothing
        let long = "x".repeat(3001);
        assert!(assistant.execute_goal(&id, &long).await.is_err());
        assert!(assistant.history(&id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_research_goal_renders_first_three_results() {
        let (assistant, db) = assistant();
        let id = assistant.start_session("u").unwrap().session_id;
        let response = assistant
            .execute_goal(&id, "tell me about quantum computing")
            .await
            .unwrap();

        assert!(response.content.starts_with("## 🔍 Research Results\n"));
        assert!(response.content.contains("### Wikipedia (5 results)"));
        assert!(response.content.contains("3. **tell me about quantum computing 2**"));
        assert!(!response.content.contains("4. **"));
        assert!(response.content.contains("   🔗 [Read more](https://example.org/0)"));
        assert!(response.content.contains("## 💡 Next Steps"));

        let meta = &response.metadata;
        assert_eq!(meta.goal_type, crate::models::GoalKind::Research);
        assert_eq!(meta.research_sources, Some(1));
        assert_eq!(meta.suggestions_count, 2);
        assert_eq!(meta.conversation_turn, 1);
        assert_eq!(meta.response_length, response.content.chars().count());

        let events = db.events_for("u").unwrap();
        assert_eq!(events.last().unwrap().action, "goal_execution");
        assert_eq!(events.last().unwrap().details, "tell me about quantum computing");
    }

    #[tokio::test]
    async fn test_code_goal_includes_execution_result() {
        let (assistant, _) = assistant();
        let id = assistant.start_session("u").unwrap().session_id;
        let response = assistant
            .execute_goal(&id, "write a calculator program")
            .await
            .unwrap();

        assert!(response.content.contains("## 💻 Code Solution\n"));
        assert!(response.content.contains("```python\nimport math"));
        // the calculator template uses eval and is refused by the sandbox
        assert!(response
            .content
            .contains("```\nSecurity: Restricted operation detected\n```"));
        assert_eq!(response.metadata.research_sources, None);
    }

    #[tokio::test]
    async fn test_goal_is_sanitized_and_history_recorded() {
        let (assistant, _) = assistant();
        let id = assistant.start_session("u").unwrap().session_id;
        let response = assistant
            .execute_goal(&id, "explain <b>pointers</b>")
            .await
            .unwrap();
        assert!(response.content.contains("Let me help you learn about: explain bpointersb"));

        let history = assistant.history(&id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_input, "explain bpointersb");
        assert_eq!(history[0].system_response.as_deref(), Some(response.content.as_str()));
        assert_eq!(history[0].metadata.as_ref(), Some(&response.metadata));

        let context = assistant.context(&id).unwrap().unwrap();
        assert_eq!(context.last_goal, "explain bpointersb");
        assert_eq!(context.goal_type, crate::models::GoalKind::Educational);

        assistant.clear_session(&id).unwrap();
        assert!(assistant.history(&id).unwrap().is_empty());
        assert!(assistant.context(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_end_session_removes_it() {
        let (assistant, _) = assistant();
        let id = assistant.start_session("u").unwrap().session_id;
        assert_eq!(assistant.session_count(), 1);

        assistant.end_session(&id).unwrap();
        assert_eq!(assistant.session_count(), 0);
        assert!(matches!(
            assistant.history(&id),
            Err(CodegenieError::NotFound(_))
        ));
        assert!(assistant.end_session(&id).is_err());
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let (assistant, _) = assistant();
        let assistant = assistant.with_idle_timeout(30);
        let stale = assistant.start_session("u").unwrap().session_id;
        let fresh = assistant.start_session("u").unwrap().session_id;
        assistant.execute_goal(&fresh, "hello there").await.unwrap();

        // nothing is idle yet
        assert_eq!(assistant.evict_idle_at(Utc::now()), 0);

        // touch `fresh` well after `stale` started
        let later = Utc::now() + TimeDelta::minutes(31);
        {
            let session = assistant.session(&fresh).unwrap();
            Assistant::lock(&session).unwrap().last_active = later;
        }
        assert_eq!(assistant.evict_idle_at(later), 1);
        assert!(assistant.session_info(&stale).is_err());
        assert_eq!(assistant.session_info(&fresh).unwrap().turns, 1);
    }

    #[tokio::test]
    async fn test_many_sessions_stay_bounded() {
        let (assistant, _) = assistant();
        let assistant = assistant.with_idle_timeout(0);
        for i in 0..500 {
            let id = assistant.start_session(&format!("user-{i}")).unwrap().session_id;
            assistant.clear_session(&id).unwrap();
        }
        // each start evicts every session idle for at least zero minutes
        assert_eq!(assistant.session_count(), 1);
    }

    #[tokio::test]
    async fn test_stored_history_keeps_newest_turns() {
        let (assistant, db) = assistant_with(SecurityConfig {
            interpreter: "definitely-not-an-interpreter".to_string(),
            goal_limit: RateLimitRule::new(100, 300),
            ..Default::default()
        });
        let id = assistant.start_session("u").unwrap().session_id;
        let total = MAX_PERSISTED_TURNS + 5;
        for i in 0..total {
            assistant
                .execute_goal(&id, &format!("hello {i}"))
                .await
                .unwrap();
        }
        assert_eq!(assistant.history(&id).unwrap().len(), total);

        let record = db.session(&id).unwrap().unwrap();
        let stored = record.data["history"].as_array().unwrap();
        assert_eq!(stored.len(), MAX_PERSISTED_TURNS);
        assert_eq!(stored[0]["user_input"], "hello 5");
        assert_eq!(record.data["turns"], total);
        assert_eq!(db.events_for("u").unwrap().len(), total + 1);
    }

    #[tokio::test]
    async fn test_goal_rate_limit() {
        let (assistant, _) = assistant_with(SecurityConfig {
            interpreter: "definitely-not-an-interpreter".to_string(),
            goal_limit: RateLimitRule::new(1, 300),
            ..Default::default()
        });
        let id = assistant.start_session("u").unwrap().session_id;
        assistant.execute_goal(&id, "hello there").await.unwrap();
        assert!(matches!(
            assistant.execute_goal(&id, "hello again").await,
            Err(CodegenieError::RateLimited { .. })
        ));
    }
}
