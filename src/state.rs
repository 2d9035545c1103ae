//! Application state: conversation sessions, prompts/catalog, and the model client slot.
//!
//! This module owns:
//!   - sessions by id, each holding at most one current `AnswerRecord`
//!   - the solve generation counter and in-flight markers per session
//!   - idle expiry for sessions opened over HTTP (socket sessions end with their socket)
//!   - the language catalog and prompts (from TOML or defaults)
//!   - the optional model client; it can be installed later with an API key
//!
//! Locks are never held across a model call: logic reads what it needs, drops the
//! guard, awaits the collaborator, then re-enters the session to apply the result.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{load_agent_config_from_env, AgentConfig};
use crate::domain::AnswerRecord;
use crate::error::AppError;
use crate::openai::{Collaborator, OpenAI};

/// One conversation view: a single "current answer" slot plus request bookkeeping.
#[derive(Debug)]
pub struct Session {
    /// Generation of the most recently dispatched solve.
    pub generation: u64,
    pub extracting: bool,
    pub answer: Option<AnswerRecord>,
    last_used: Instant,
    /// False for sessions owned by a WebSocket; those are closed on disconnect.
    expires: bool,
}

impl Session {
    fn new(expires: bool) -> Self {
        Self {
            generation: 0,
            extracting: false,
            answer: None,
            last_used: Instant::now(),
            expires,
        }
    }

    /// A transcription or corrective analysis is still running.
    pub fn is_busy(&self) -> bool {
        self.extracting || self.answer.as_ref().is_some_and(|a| a.feedback.is_learning())
    }

    /// The current answer, if `answer_id` still names it.
    pub fn answer_mut(&mut self, answer_id: &str) -> Result<&mut AnswerRecord, AppError> {
        self.answer
            .as_mut()
            .filter(|a| a.id == answer_id)
            .ok_or_else(|| AppError::AnswerNotFound(answer_id.to_string()))
    }
}

pub struct AppState {
    pub sessions: RwLock<HashMap<String, Session>>,
    collaborator: RwLock<Option<Arc<dyn Collaborator>>>,
    pub config: AgentConfig,
}

impl AppState {
    /// Build state from env: load config, then the model client if a key is present.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_agent_config_from_env().unwrap_or_default();

        let openai = OpenAI::from_env(config.prompts.clone());
        let collaborator: Option<Arc<dyn Collaborator>> = match openai {
            Some(oa) => {
                info!(target: "grandmaster_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
                Some(Arc::new(oa))
            }
            None => {
                warn!(target: "grandmaster_backend", "No OPENAI_API_KEY; waiting for a key via /api/v1/credential.");
                None
            }
        };

        Self::with_collaborator(config, collaborator)
    }

    pub fn with_collaborator(config: AgentConfig, collaborator: Option<Arc<dyn Collaborator>>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            collaborator: RwLock::new(collaborator),
            config,
        }
    }

    /// The configured model client, or `CredentialMissing`.
    pub async fn collaborator(&self) -> Result<Arc<dyn Collaborator>, AppError> {
        self.collaborator
            .read()
            .await
            .clone()
            .ok_or(AppError::CredentialMissing)
    }

    pub async fn has_collaborator(&self) -> bool {
        self.collaborator.read().await.is_some()
    }

    /// Replace the model client with one using `api_key`.
    #[instrument(level = "info", skip_all)]
    pub async fn install_api_key(&self, api_key: &str) -> Result<(), AppError> {
        let oa = OpenAI::with_api_key(api_key, self.config.prompts.clone())?;
        info!(target: "grandmaster_backend", strong_model = %oa.strong_model, "API key installed.");
        *self.collaborator.write().await = Some(Arc::new(oa));
        Ok(())
    }

    /// Open a session that is dropped after sitting idle (see `expire_idle_sessions`).
    pub async fn open_session(&self) -> String {
        self.insert_session(true).await
    }

    /// Open a session whose lifetime is tied to a WebSocket connection.
    pub async fn open_socket_session(&self) -> String {
        self.insert_session(false).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn insert_session(&self, expires: bool) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions.write().await.insert(id.clone(), Session::new(expires));
        info!(target: "grandmaster_backend", session = %id, expires, "Session opened");
        id
    }

    /// Remove a session; false when it did not exist.
    #[instrument(level = "debug", skip(self))]
    pub async fn close_session(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(target: "grandmaster_backend", session = %id, "Session closed");
        }
        removed
    }

    /// Drop expiring sessions unused for at least `ttl`. Busy sessions are kept.
    pub async fn expire_idle_sessions(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.expires || s.is_busy() || s.last_used.elapsed() < ttl);
        let expired = before - sessions.len();
        if expired > 0 {
            info!(target: "grandmaster_backend", expired, remaining = sessions.len(), "Idle sessions expired");
        }
        expired
    }

    /// Run `f` against the session under the write lock.
    pub async fn with_session<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Session) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))?;
        session.last_used = Instant::now();
        f(session)
    }
}

/// Periodically expire idle HTTP sessions. Runs until the runtime shuts down.
pub fn spawn_session_sweeper(state: Arc<AppState>, ttl: Duration) {
    let period = ttl.min(Duration::from_secs(60)).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let expired = state.expire_idle_sessions(ttl).await;
            debug!(target: "grandmaster_backend", expired, "Session sweep");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_credential_is_reported() {
        let state = AppState::with_collaborator(AgentConfig::default(), None);
        assert!(matches!(state.collaborator().await, Err(AppError::CredentialMissing)));
        assert!(!state.has_collaborator().await);
    }

    #[tokio::test]
    async fn api_key_can_be_installed_later() {
        let state = AppState::with_collaborator(AgentConfig::default(), None);
        assert!(state.install_api_key("  ").await.is_err());
        state.install_api_key("sk-test").await.unwrap();
        assert!(state.collaborator().await.is_ok());
    }

    #[tokio::test]
    async fn sessions_open_and_close() {
        let state = AppState::with_collaborator(AgentConfig::default(), None);
        let id = state.open_session().await;
        let generation = state.with_session(&id, |s| Ok(s.generation)).await.unwrap();
        assert_eq!(generation, 0);
        assert!(state.close_session(&id).await);
        assert!(!state.close_session(&id).await);
        assert!(matches!(
            state.with_session(&id, |_| Ok(())).await,
            Err(AppError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn idle_http_sessions_expire() {
        let state = AppState::with_collaborator(AgentConfig::default(), None);
        let http = state.open_session().await;
        let socket = state.open_socket_session().await;

        assert_eq!(state.expire_idle_sessions(Duration::from_secs(3600)).await, 0);
        assert_eq!(state.expire_idle_sessions(Duration::ZERO).await, 1);

        let sessions = state.sessions.read().await;
        assert!(!sessions.contains_key(&http));
        assert!(sessions.contains_key(&socket));
    }

    #[tokio::test]
    async fn busy_sessions_survive_expiry() {
        let state = AppState::with_collaborator(AgentConfig::default(), None);
        let id = state.open_session().await;
        state.with_session(&id, |s| {
            s.extracting = true;
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(state.expire_idle_sessions(Duration::ZERO).await, 0);
    }
}
