//! The stores of one signed-in client, wired to a single backend
//!
//! Rules that span stores live here: leaving a session stops its poll, an
//! upload starts one, and deleting a session drops everything held for it.

use crate::api::{ApiClient, Backend, FileTokenStorage, SessionDeleteResponse, UploadFile};
use crate::config::Config;
use crate::error::Result;
use crate::events::{EventSink, NotificationLevel, StoreEvent, TracingSink};
use crate::models::{Document, Session};
use crate::store::{
    AuthStore, ChatSettings, ChatStore, DocumentSettings, DocumentStore, SessionSettings,
    SessionStore,
};
use std::sync::Arc;
use tracing::{debug, info};

pub struct Workspace {
    backend: Arc<dyn Backend>,
    events: Arc<dyn EventSink>,
    auth: AuthStore,
    sessions: SessionStore,
    documents: DocumentStore,
    chat: ChatStore,
    default_session_name: String,
}

impl Workspace {
    pub fn new(config: &Config, backend: Arc<dyn Backend>, events: Arc<dyn EventSink>) -> Self {
        Self {
            auth: AuthStore::new(backend.clone(), events.clone()),
            sessions: SessionStore::new(
                backend.clone(),
                events.clone(),
                SessionSettings::from(config),
            ),
            documents: DocumentStore::new(
                backend.clone(),
                events.clone(),
                DocumentSettings::from(config),
            ),
            chat: ChatStore::new(backend.clone(), events.clone(), ChatSettings::from(config)),
            default_session_name: config.sessions.default_name.clone(),
            backend,
            events,
        }
    }

    /// Workspace talking HTTP to the configured backend, with the token kept
    /// in the config directory
    pub fn connect(config: &Config) -> Result<Self> {
        let storage = Arc::new(FileTokenStorage::new(&config.paths.token_file));
        let backend = Arc::new(ApiClient::new(config, storage)?);
        Ok(Self::new(config, backend, Arc::new(TracingSink)))
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn chat(&self) -> &ChatStore {
        &self.chat
    }

    fn warn_no_session(&self) {
        self.events.emit(StoreEvent::notify(
            NotificationLevel::Warning,
            "Please select a session first",
        ));
    }

    /// Make `session` active and load its documents and history. The poll of
    /// the session being left is stopped; no poll is started.
    async fn activate(&self, session: Session) -> Session {
        let previous = self.sessions.set_active_session(Some(session.clone())).await;
        if let Some(previous) = previous.filter(|p| p.session_id != session.session_id) {
            self.documents.stop_polling(&previous.session_id);
        }

        debug!(session_id = %session.session_id, "Loading session");
        tokio::join!(
            self.documents.fetch_session_documents(&session.session_id),
            self.chat.fetch_session_messages(&session.session_id),
        );
        session
    }

    pub async fn select_session(&self, session_id: &str) -> Option<Session> {
        let mut session = self.sessions.find(session_id).await;
        if session.is_none() && self.sessions.fetch_sessions().await {
            session = self.sessions.find(session_id).await;
        }

        match session {
            Some(session) => Some(self.activate(session).await),
            None => {
                self.events.emit(StoreEvent::notify(
                    NotificationLevel::Error,
                    format!("Session not found: {}", session_id),
                ));
                None
            }
        }
    }

    /// Guarantee an active session, creating the first one if the account has none
    pub async fn ensure_session(&self) -> Option<Session> {
        if !self.sessions.fetch_sessions().await {
            return None;
        }
        if let Some(active) = self.sessions.active_session().await {
            return Some(active);
        }

        let first = self.sessions.sessions().await.into_iter().next();
        let session = match first {
            Some(session) => session,
            None => {
                info!(name = %self.default_session_name, "Creating first session");
                self.sessions.create_session(&self.default_session_name).await?
            }
        };
        Some(self.activate(session).await)
    }

    pub async fn create_session(&self, name: &str) -> Option<Session> {
        let previous = self.sessions.active_session().await;
        let created = self.sessions.create_session(name).await?;
        if let Some(previous) = previous {
            self.documents.stop_polling(&previous.session_id);
        }
        Some(created)
    }

    pub async fn rename_session(&self, session_id: &str, name: &str) -> Option<Session> {
        self.sessions.rename_session(session_id, name).await
    }

    /// Delete a session and forget its documents, messages and poll. If it was
    /// active, the session that takes over is loaded.
    pub async fn delete_session(&self, session_id: &str) -> Option<SessionDeleteResponse> {
        let was_active = self
            .sessions
            .active_session()
            .await
            .is_some_and(|active| active.session_id == session_id);

        let deleted = self.sessions.delete_session(session_id).await?;
        self.documents.stop_polling(session_id);
        self.documents.forget_session(session_id).await;
        self.chat.forget_session(session_id).await;

        if was_active {
            if let Some(next) = self.sessions.active_session().await {
                self.activate(next).await;
            }
        }
        Some(deleted)
    }

    /// Upload into the active session and watch ingestion until it settles
    pub async fn upload_document(&self, file: &UploadFile) -> Option<Document> {
        let Some(session) = self.sessions.active_session().await else {
            self.warn_no_session();
            return None;
        };

        let document = self
            .documents
            .upload_document(&session.session_id, file)
            .await?;
        self.documents.start_polling(&session.session_id);
        Some(document)
    }

    pub async fn send_message(&self, content: &str) -> bool {
        match self.sessions.active_session().await {
            Some(session) => self.chat.send_message(&session.session_id, content).await,
            None => {
                self.warn_no_session();
                false
            }
        }
    }

    pub async fn refresh_messages(&self) -> bool {
        match self.sessions.active_session().await {
            Some(session) => self.chat.fetch_session_messages(&session.session_id).await,
            None => false,
        }
    }

    pub async fn refresh_documents(&self) -> bool {
        match self.sessions.active_session().await {
            Some(session) => {
                self.documents
                    .fetch_session_documents(&session.session_id)
                    .await
            }
            None => false,
        }
    }

    pub async fn logout(&self) {
        self.documents.stop_all_polling();
        self.auth.logout().await;
        self.sessions.set_active_session(None).await;
    }

    /// Stop every background poll
    pub fn shutdown(&self) {
        self.documents.stop_all_polling();
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::UploadDocumentResponse;
    use crate::events::ChannelSink;
    use crate::models::{Role, UploadStatus};
    use crate::testing::{history, pdf, record, reply, FakeBackend};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.polling.interval_ms = 20;
        config.upload.refetch_delay_ms = 10;
        config.upload.progress_tick_ms = 5;
        config.upload.progress_reset_ms = 10;
        config
    }

    fn workspace(backend: &Arc<FakeBackend>) -> (Workspace, UnboundedReceiver<StoreEvent>) {
        let (sink, rx) = ChannelSink::new();
        (Workspace::new(&fast_config(), backend.clone(), Arc::new(sink)), rx)
    }

    #[tokio::test]
    async fn test_ensure_session_creates_default() {
        let backend = FakeBackend::new();
        let (ws, _rx) = workspace(&backend);

        let session = ws.ensure_session().await.unwrap();
        assert_eq!(session.name, "Mi primera sesión");
        assert_eq!(ws.sessions().active_session().await, Some(session.clone()));

        // A second call reuses it
        let again = ws.ensure_session().await.unwrap();
        assert_eq!(again.session_id, session.session_id);
        assert_eq!(backend.sessions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_session_picks_first_existing() {
        let backend = FakeBackend::with_sessions(&[("a", "Contracts"), ("b", "Papers")]);
        let (ws, _rx) = workspace(&backend);

        assert_eq!(ws.ensure_session().await.unwrap().session_id, "a");
        assert_eq!(backend.history_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_select_loads_documents_and_messages() {
        let backend = FakeBackend::with_sessions(&[("a", "Contracts")]);
        backend.script_documents(vec![Some(vec![record("d1", Some("completed"), 4)])]);
        *backend.history.lock().unwrap() = Some(vec![history("m1", Role::User, "hi", 0)]);
        let (ws, _rx) = workspace(&backend);

        ws.select_session("a").await.unwrap();
        assert_eq!(ws.documents().documents("a").await.len(), 1);
        assert_eq!(ws.chat().messages("a").await.len(), 1);
        assert!(!ws.documents().is_polling("a"));

        assert!(ws.select_session("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_upload_converges_to_completed() {
        let backend = FakeBackend::with_sessions(&[("s1", "Reports")]);
        *backend.upload_response.lock().unwrap() = Some(UploadDocumentResponse {
            document_id: "d1".to_string(),
            file_name: "report.pdf".to_string(),
            ..Default::default()
        });
        backend.script_documents(vec![
            Some(vec![]),
            Some(vec![record("d1", Some("processing"), 0)]),
            Some(vec![record("d1", Some("processing"), 0)]),
            Some(vec![record("d1", Some("completed"), 12)]),
        ]);
        let (ws, _rx) = workspace(&backend);
        ws.select_session("s1").await.unwrap();

        let doc = ws.upload_document(&pdf("report.pdf", 64)).await.unwrap();
        assert_eq!(doc.upload_status, UploadStatus::Processing);
        assert!(ws.documents().is_polling("s1"));

        tokio::time::timeout(Duration::from_secs(2), ws.documents().wait_for_polling("s1"))
            .await
            .unwrap();
        let docs = ws.documents().documents("s1").await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].upload_status, UploadStatus::Completed);
        assert_eq!(docs[0].chunks_indexed, 12);
    }

    #[tokio::test]
    async fn test_upload_without_session() {
        let backend = FakeBackend::new();
        let (ws, mut rx) = workspace(&backend);

        assert!(ws.upload_document(&pdf("report.pdf", 64)).await.is_none());
        assert_eq!(backend.upload_calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            rx.try_recv(),
            Ok(StoreEvent::Notification { level: NotificationLevel::Warning, .. })
        ));
    }

    #[tokio::test]
    async fn test_switching_session_stops_poll() {
        let backend = FakeBackend::with_sessions(&[("a", "A"), ("b", "B")]);
        backend.script_documents(vec![Some(vec![record("d1", Some("processing"), 0)])]);
        let (ws, _rx) = workspace(&backend);

        ws.select_session("a").await.unwrap();
        ws.documents().start_polling("a");
        ws.select_session("b").await.unwrap();

        assert!(!ws.documents().is_polling("a"));
        assert!(!ws.documents().is_polling("b"));
    }

    #[tokio::test]
    async fn test_delete_active_session_moves_on() {
        let backend = FakeBackend::with_sessions(&[("a", "A"), ("b", "B")]);
        backend.script_documents(vec![Some(vec![record("d1", Some("processing"), 0)])]);
        *backend.history.lock().unwrap() = Some(vec![]);
        let (ws, _rx) = workspace(&backend);

        ws.select_session("a").await.unwrap();
        ws.documents().start_polling("a");

        let deleted = ws.delete_session("a").await.unwrap();
        assert_eq!(deleted.session_id, "a");
        assert!(!ws.documents().is_polling("a"));
        assert!(ws.documents().documents("a").await.is_empty());
        assert_eq!(ws.sessions().active_session().await.unwrap().session_id, "b");
        assert_eq!(ws.documents().documents("b").await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_polling() {
        let backend = FakeBackend::with_sessions(&[("a", "A"), ("b", "B")]);
        backend.script_documents(vec![Some(vec![record("d1", Some("processing"), 0)])]);
        *backend.history.lock().unwrap() = Some(vec![]);
        let (ws, _rx) = workspace(&backend);

        ws.select_session("a").await.unwrap();
        ws.documents().start_polling("a");
        backend.set_offline(true);

        assert!(ws.delete_session("a").await.is_none());
        assert!(ws.documents().is_polling("a"));
        assert_eq!(ws.sessions().active_session().await.unwrap().session_id, "a");
        assert_eq!(ws.documents().documents("a").await.len(), 1);
        ws.shutdown();
    }

    #[tokio::test]
    async fn test_offline_send_in_active_session() {
        let backend = FakeBackend::with_sessions(&[("a", "A")]);
        *backend.history.lock().unwrap() = Some(vec![]);
        let (ws, _rx) = workspace(&backend);
        ws.select_session("a").await.unwrap();

        assert!(!ws.send_message("Anyone there?").await);
        assert!(ws.chat().messages("a").await.is_empty());

        backend.chat_replies.lock().unwrap().push_back(Some(reply("Yes.")));
        assert!(ws.send_message("Anyone there?").await);
        assert_eq!(ws.chat().messages("a").await.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_polls() {
        let backend = FakeBackend::new();
        backend.script_documents(vec![Some(vec![record("d1", Some("processing"), 0)])]);
        let (ws, _rx) = workspace(&backend);

        ws.documents().start_polling("a");
        ws.documents().start_polling("b");
        ws.shutdown();
        assert!(ws.documents().polling_sessions().is_empty());
    }
}
