//! Scripted in-memory backend for store and workspace tests

use crate::api::{
    AuthResponse, Backend, ChatRequest, ChatResponse, DocumentRecord, HealthResponse,
    LoginRequest, MessageRecord, RegisterRequest, RegisterResponse, SessionDeleteResponse,
    SessionDocumentsResponse, SessionMessagesResponse, UploadDocumentResponse, UploadFile,
};
use crate::error::{Error, ErrorCode, ErrorDetail, Result};
use crate::models::{Role, Session, User};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn offline(code: ErrorCode) -> Error {
    Error::network(code, "Network Error")
}

pub(crate) fn unauthorized() -> Error {
    Error::Api {
        status: 401,
        code: None,
        detail: ErrorDetail::Message("Unauthorized".to_string()),
    }
}

pub(crate) fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_714_557_600 + secs, 0)
        .single()
        .unwrap()
}

pub(crate) fn record(document_id: &str, status: Option<&str>, chunks: u32) -> DocumentRecord {
    DocumentRecord {
        document_id: document_id.to_string(),
        file_name: format!("{document_id}.pdf"),
        chunks_indexed: chunks,
        processing_status: status.map(str::to_string),
        ..Default::default()
    }
}

pub(crate) fn history(message_id: &str, role: Role, content: &str, secs: i64) -> MessageRecord {
    MessageRecord {
        message_id: message_id.to_string(),
        role,
        content: content.to_string(),
        created_at: at(secs),
    }
}

pub(crate) fn reply(answer: &str) -> ChatResponse {
    ChatResponse {
        answer: answer.to_string(),
        sources: Vec::new(),
    }
}

pub(crate) fn pdf(name: &str, size: usize) -> UploadFile {
    UploadFile::new(name, vec![b'%'; size])
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

/// Every field is a knob a test can turn before driving a store.
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub token: Mutex<Option<String>>,
    pub offline: AtomicBool,

    pub user: Mutex<Option<User>>,
    pub reject_token: AtomicBool,
    pub logout_calls: AtomicUsize,

    pub sessions: Mutex<Vec<Session>>,
    next_session: AtomicUsize,

    /// Response for the n-th documents call; the last entry repeats and `None`
    /// is a network failure
    pub document_script: Mutex<Vec<Option<Vec<DocumentRecord>>>>,
    pub document_calls: AtomicUsize,
    pub document_delay: Mutex<Duration>,
    documents_in_flight: AtomicUsize,
    pub max_documents_in_flight: AtomicUsize,

    /// `None` is an upload failure
    pub upload_response: Mutex<Option<UploadDocumentResponse>>,
    pub upload_calls: AtomicUsize,
    pub upload_delay: Mutex<Duration>,

    /// `None` is a network failure
    pub history: Mutex<Option<Vec<MessageRecord>>>,
    pub history_calls: AtomicUsize,

    /// Replies in order; `None` or an exhausted queue is a network failure
    pub chat_replies: Mutex<VecDeque<Option<ChatResponse>>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    pub chat_delay: Mutex<Duration>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_sessions(names: &[(&str, &str)]) -> Arc<Self> {
        let backend = Self::default();
        *lock(&backend.sessions) = names
            .iter()
            .enumerate()
            .map(|(i, (id, name))| Session {
                session_id: id.to_string(),
                name: name.to_string(),
                created_at: at(i as i64),
            })
            .collect();
        Arc::new(backend)
    }

    pub fn script_documents(&self, script: Vec<Option<Vec<DocumentRecord>>>) {
        *lock(&self.document_script) = script;
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(offline(ErrorCode::NetworkError))
        } else {
            Ok(())
        }
    }

    fn find_session(&self, session_id: &str) -> Result<Session> {
        lock(&self.sessions)
            .iter()
            .find(|s| s.session_id == session_id)
            .cloned()
            .ok_or_else(|| Error::Api {
                status: 404,
                code: None,
                detail: ErrorDetail::Message("Session not found".to_string()),
            })
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn token(&self) -> Option<String> {
        lock(&self.token).clone()
    }

    fn set_token(&self, token: Option<String>) -> Result<()> {
        *lock(&self.token) = token;
        Ok(())
    }

    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        self.check_online()?;
        if request.password != "secret123" {
            return Err(Error::Api {
                status: 401,
                code: None,
                detail: ErrorDetail::Message("Invalid credentials".to_string()),
            });
        }
        Ok(AuthResponse {
            access_token: format!("token-{}", request.email),
            token_type: Some("bearer".to_string()),
            expires_in: Some(3600),
        })
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        self.check_online()?;
        Ok(RegisterResponse {
            user_id: "u-new".to_string(),
            email: request.email.clone(),
        })
    }

    async fn logout(&self) -> Result<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()
    }

    async fn current_user(&self) -> Result<User> {
        self.check_online()?;
        lock(&self.user).clone().ok_or_else(unauthorized)
    }

    async fn health(&self) -> Result<HealthResponse> {
        self.check_online()?;
        if self.reject_token.load(Ordering::SeqCst) {
            return Err(unauthorized());
        }
        Ok(HealthResponse {
            status: "healthy".to_string(),
            service: Some("rag-backend".to_string()),
            version: None,
        })
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.check_online()?;
        Ok(lock(&self.sessions).clone())
    }

    async fn create_session(&self, name: &str) -> Result<Session> {
        self.check_online()?;
        let n = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Session {
            session_id: format!("new-{n}"),
            name: name.to_string(),
            created_at: at(1000 + n as i64),
        };
        lock(&self.sessions).insert(0, session.clone());
        Ok(session)
    }

    async fn rename_session(&self, session_id: &str, name: &str) -> Result<Session> {
        self.check_online()?;
        let mut session = self.find_session(session_id)?;
        session.name = name.to_string();
        for existing in lock(&self.sessions).iter_mut() {
            if existing.session_id == session_id {
                *existing = session.clone();
            }
        }
        Ok(session)
    }

    async fn delete_session(&self, session_id: &str) -> Result<SessionDeleteResponse> {
        self.check_online()?;
        self.find_session(session_id)?;
        lock(&self.sessions).retain(|s| s.session_id != session_id);
        Ok(SessionDeleteResponse {
            message: "Session deleted".to_string(),
            session_id: session_id.to_string(),
            documents_deleted: 2,
            embeddings_deleted: 40,
            messages_deleted: 6,
        })
    }

    async fn session_documents(&self, session_id: &str) -> Result<SessionDocumentsResponse> {
        let call = self.document_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.documents_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_documents_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        let delay = *lock(&self.document_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.documents_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.check_online()?;

        let entry = {
            let script = lock(&self.document_script);
            match script.len() {
                0 => Some(Vec::new()),
                len => script[call.min(len - 1)].clone(),
            }
        };
        let documents = entry.ok_or_else(|| offline(ErrorCode::NetworkError))?;
        Ok(SessionDocumentsResponse {
            session_id: session_id.to_string(),
            documents,
        })
    }

    async fn session_messages(&self, session_id: &str) -> Result<SessionMessagesResponse> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let messages = lock(&self.history)
            .clone()
            .ok_or_else(|| offline(ErrorCode::NetworkError))?;
        Ok(SessionMessagesResponse {
            session_id: session_id.to_string(),
            total_messages: messages.len(),
            messages,
        })
    }

    async fn upload_document(
        &self,
        _session_id: &str,
        file: &UploadFile,
    ) -> Result<UploadDocumentResponse> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.upload_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let response = lock(&self.upload_response).clone();
        let mut uploaded = response.ok_or_else(|| offline(ErrorCode::UploadError))?;
        if uploaded.file_name.is_empty() {
            uploaded.file_name = file.file_name.clone();
        }
        Ok(uploaded)
    }

    async fn query(&self, request: &ChatRequest) -> Result<ChatResponse> {
        lock(&self.chat_requests).push(request.clone());
        let delay = *lock(&self.chat_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        lock(&self.chat_replies)
            .pop_front()
            .flatten()
            .ok_or_else(|| offline(ErrorCode::NetworkError))
    }
}
