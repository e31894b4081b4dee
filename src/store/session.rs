//! Session list and the active session

use crate::api::{Backend, SessionDeleteResponse};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventSink, NotificationLevel, StoreEvent};
use crate::models::Session;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub name_max_chars: usize,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            name_max_chars: config.sessions.name_max_chars,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

#[derive(Debug, Default)]
struct SessionState {
    sessions: Vec<Session>,
    active: Option<Session>,
    is_loading: bool,
    error: Option<String>,
}

pub struct SessionStore {
    backend: Arc<dyn Backend>,
    events: Arc<dyn EventSink>,
    settings: SessionSettings,
    state: RwLock<SessionState>,
}

impl SessionStore {
    pub fn new(
        backend: Arc<dyn Backend>,
        events: Arc<dyn EventSink>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            backend,
            events,
            settings,
            state: RwLock::new(SessionState::default()),
        }
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.state.read().await.sessions.clone()
    }

    pub async fn active_session(&self) -> Option<Session> {
        self.state.read().await.active.clone()
    }

    pub async fn find(&self, session_id: &str) -> Option<Session> {
        self.state
            .read()
            .await
            .sessions
            .iter()
            .find(|s| s.session_id == session_id)
            .cloned()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.is_loading
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    /// Replace the active session, returning the one it replaced
    pub async fn set_active_session(&self, session: Option<Session>) -> Option<Session> {
        let session_id = session.as_ref().map(|s| s.session_id.clone());
        let previous = std::mem::replace(&mut self.state.write().await.active, session);
        self.events
            .emit(StoreEvent::ActiveSessionChanged { session_id });
        previous
    }

    async fn record_error(&self, err: &Error) {
        self.state.write().await.error = Some(err.to_string());
        self.events
            .emit(StoreEvent::notify(NotificationLevel::Error, err.user_message()));
    }

    fn validate_name<'a>(&self, name: &'a str) -> Result<&'a str> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Session name cannot be empty.".to_string()));
        }
        if name.chars().count() > self.settings.name_max_chars {
            return Err(Error::Validation(format!(
                "Session name must be at most {} characters.",
                self.settings.name_max_chars
            )));
        }
        Ok(name)
    }

    pub async fn fetch_sessions(&self) -> bool {
        {
            let mut state = self.state.write().await;
            state.is_loading = true;
            state.error = None;
        }

        let result = self.backend.list_sessions().await;
        self.state.write().await.is_loading = false;

        match result {
            Ok(sessions) => {
                let count = sessions.len();
                {
                    let mut state = self.state.write().await;
                    // Keep the active entry in step with the fresh list
                    if let Some(active) = state.active.as_ref() {
                        let refreshed = sessions
                            .iter()
                            .find(|s| s.session_id == active.session_id)
                            .cloned();
                        if let Some(refreshed) = refreshed {
                            state.active = Some(refreshed);
                        }
                    }
                    state.sessions = sessions;
                }
                debug!(count, "Fetched sessions");
                self.events.emit(StoreEvent::SessionsLoaded { count });
                true
            }
            Err(e) => {
                warn!("Failed to fetch sessions: {}", e);
                self.record_error(&e).await;
                false
            }
        }
    }

    /// Create a session; it goes to the front of the list and becomes active
    pub async fn create_session(&self, name: &str) -> Option<Session> {
        let name = match self.validate_name(name) {
            Ok(name) => name,
            Err(e) => {
                self.record_error(&e).await;
                return None;
            }
        };

        self.state.write().await.error = None;
        match self.backend.create_session(name).await {
            Ok(session) => {
                {
                    let mut state = self.state.write().await;
                    state.sessions.insert(0, session.clone());
                    state.active = Some(session.clone());
                }
                self.events.emit(StoreEvent::ActiveSessionChanged {
                    session_id: Some(session.session_id.clone()),
                });
                self.events.emit(StoreEvent::notify(
                    NotificationLevel::Success,
                    "New session created!",
                ));
                Some(session)
            }
            Err(e) => {
                self.record_error(&e).await;
                None
            }
        }
    }

    pub async fn rename_session(&self, session_id: &str, name: &str) -> Option<Session> {
        let name = match self.validate_name(name) {
            Ok(name) => name,
            Err(e) => {
                self.record_error(&e).await;
                return None;
            }
        };

        self.state.write().await.error = None;
        match self.backend.rename_session(session_id, name).await {
            Ok(renamed) => {
                let mut state = self.state.write().await;
                for session in state.sessions.iter_mut() {
                    if session.session_id == session_id {
                        *session = renamed.clone();
                    }
                }
                if state
                    .active
                    .as_ref()
                    .is_some_and(|active| active.session_id == session_id)
                {
                    state.active = Some(renamed.clone());
                }
                drop(state);

                self.events.emit(StoreEvent::notify(
                    NotificationLevel::Success,
                    "Session renamed successfully",
                ));
                Some(renamed)
            }
            Err(e) => {
                self.record_error(&e).await;
                None
            }
        }
    }

    /// Delete a session. When it was active, the first remaining session (or
    /// none) takes its place.
    pub async fn delete_session(&self, session_id: &str) -> Option<SessionDeleteResponse> {
        self.state.write().await.error = None;
        match self.backend.delete_session(session_id).await {
            Ok(deleted) => {
                let active_changed = {
                    let mut state = self.state.write().await;
                    state.sessions.retain(|s| s.session_id != session_id);
                    let was_active = state
                        .active
                        .as_ref()
                        .is_some_and(|active| active.session_id == session_id);
                    if was_active {
                        state.active = state.sessions.first().cloned();
                        Some(state.active.as_ref().map(|s| s.session_id.clone()))
                    } else {
                        None
                    }
                };

                if let Some(session_id) = active_changed {
                    self.events
                        .emit(StoreEvent::ActiveSessionChanged { session_id });
                }
                self.events.emit(StoreEvent::notify(
                    NotificationLevel::Success,
                    "Session deleted successfully",
                ));
                Some(deleted)
            }
            Err(e) => {
                self.record_error(&e).await;
                None
            }
        }
    }
}
