//! Per-session message lists with optimistic sends

use crate::api::{Backend, ChatRequest};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventSink, NotificationLevel, StoreEvent};
use crate::models::{Message, MessageStatus};
use crate::store::reconcile::{message_from_history, reconcile};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Local ids are millisecond based; suffix them when two land in the same tick
fn make_id_unique(messages: &[Message], message: &mut Message) {
    let base = message.id.clone();
    let mut n = 1;
    while messages.iter().any(|m| m.id == message.id) {
        message.id = format!("{base}-{n}");
        n += 1;
    }
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub max_message_chars: usize,
}

impl From<&Config> for ChatSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_message_chars: config.chat.max_message_chars,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

#[derive(Debug, Default)]
struct ChatState {
    messages: HashMap<String, Vec<Message>>,
    is_loading: bool,
    sends_in_flight: usize,
    error: Option<String>,
}

pub struct ChatStore {
    backend: Arc<dyn Backend>,
    events: Arc<dyn EventSink>,
    settings: ChatSettings,
    state: RwLock<ChatState>,
    /// One async lock per session; sends within a session never overlap
    send_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChatStore {
    pub fn new(backend: Arc<dyn Backend>, events: Arc<dyn EventSink>, settings: ChatSettings) -> Self {
        Self {
            backend,
            events,
            settings,
            state: RwLock::new(ChatState::default()),
            send_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn messages(&self, session_id: &str) -> Vec<Message> {
        self.state
            .read()
            .await
            .messages
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.is_loading
    }

    /// True while any send is waiting for its answer
    pub async fn is_typing(&self) -> bool {
        self.state.read().await.sends_in_flight > 0
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    pub async fn push_message(&self, session_id: &str, message: Message) {
        let count = {
            let mut state = self.state.write().await;
            let messages = state.messages.entry(session_id.to_string()).or_default();
            messages.push(message);
            messages.len()
        };
        self.emit_updated(session_id, count);
    }

    pub async fn forget_session(&self, session_id: &str) {
        self.state.write().await.messages.remove(session_id);
        // A send still holding the lock keeps it, so later sends queue behind it
        let mut locks = self.send_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(session_id);
        }
    }

    fn emit_updated(&self, session_id: &str, count: usize) {
        self.events.emit(StoreEvent::MessagesUpdated {
            session_id: session_id.to_string(),
            count,
        });
    }

    async fn record_error(&self, err: &Error) {
        self.state.write().await.error = Some(err.to_string());
        self.events
            .emit(StoreEvent::notify(NotificationLevel::Error, err.user_message()));
    }

    fn validate(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(Error::Validation("Message cannot be empty.".to_string()));
        }
        let max = self.settings.max_message_chars;
        if content.chars().count() > max {
            return Err(Error::Validation(format!(
                "Message must be at most {} characters.",
                max
            )));
        }
        Ok(())
    }

    fn send_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.send_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Ask a question in the session.
    ///
    /// The question shows up in the list right away. On failure it is removed
    /// again, so a failed send leaves the list as it was.
    pub async fn send_message(&self, session_id: &str, content: &str) -> bool {
        if let Err(e) = self.validate(content) {
            self.record_error(&e).await;
            return false;
        }

        let lock = self.send_lock(session_id);
        let _serialized = lock.lock().await;

        let mut question = Message::local_user(session_id, content, Utc::now());
        let (question_id, count) = {
            let mut state = self.state.write().await;
            state.sends_in_flight += 1;
            state.error = None;
            let messages = state.messages.entry(session_id.to_string()).or_default();
            make_id_unique(messages, &mut question);
            let question_id = question.id.clone();
            messages.push(question);
            (question_id, messages.len())
        };
        self.emit_updated(session_id, count);

        let request = ChatRequest {
            session_id: session_id.to_string(),
            message: content.to_string(),
        };
        let result = self.backend.query(&request).await;

        let mut state = self.state.write().await;
        state.sends_in_flight = state.sends_in_flight.saturating_sub(1);
        let messages = state.messages.entry(session_id.to_string()).or_default();

        match result {
            Ok(response) => {
                debug!(session_id, sources = response.sources.len(), "Received answer");
                if let Some(message) = messages.iter_mut().find(|m| m.id == question_id) {
                    message.status = MessageStatus::Sent;
                }
                let mut answer = Message::local_assistant(
                    session_id,
                    response.answer,
                    response.sources,
                    Utc::now(),
                );
                make_id_unique(messages, &mut answer);
                messages.push(answer);
                let count = messages.len();
                drop(state);
                self.emit_updated(session_id, count);
                true
            }
            Err(e) => {
                warn!(session_id, "Send failed: {}", e);
                messages.retain(|m| m.id != question_id);
                let count = messages.len();
                state.error = Some(e.to_string());
                drop(state);
                self.events
                    .emit(StoreEvent::notify(NotificationLevel::Error, e.user_message()));
                self.emit_updated(session_id, count);
                false
            }
        }
    }

    /// Fetch the session's history and merge it into the held list
    pub async fn fetch_session_messages(&self, session_id: &str) -> bool {
        {
            let mut state = self.state.write().await;
            state.is_loading = true;
            state.error = None;
        }

        let result = self.backend.session_messages(session_id).await;

        match result {
            Ok(response) => {
                let server: Vec<Message> = response
                    .messages
                    .iter()
                    .map(|record| message_from_history(session_id, record))
                    .collect();

                let count = {
                    let mut state = self.state.write().await;
                    state.is_loading = false;
                    let held = state.messages.get(session_id).cloned().unwrap_or_default();
                    let merged = reconcile(&held, server);
                    let count = merged.len();
                    state.messages.insert(session_id.to_string(), merged);
                    count
                };
                debug!(session_id, count, "Reconciled message history");
                self.emit_updated(session_id, count);
                true
            }
            Err(e) => {
                warn!(session_id, "Failed to fetch messages: {}", e);
                self.state.write().await.is_loading = false;
                self.record_error(&e).await;
                false
            }
        }
    }
}
