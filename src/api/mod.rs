//! Transport client for the document question-answering backend
//!
//! Every backend call goes through [`ApiClient`]. It attaches the bearer token
//! when one is set and turns every outcome into a [`Result`]: transport
//! failures become [`Error::Network`], non-success statuses become
//! [`Error::Api`]. Nothing escapes this boundary as a panic.

pub mod token;
pub mod types;

pub use token::*;
pub use types::*;

use crate::config::Config;
use crate::error::{Error, ErrorBody, ErrorCode, ErrorDetail, Result};
use crate::models::{Session, User};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Operations the stores need from the backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Bearer token currently attached to requests
    fn token(&self) -> Option<String>;

    /// Replace the token in memory and mirror it to persistent storage
    fn set_token(&self, token: Option<String>) -> Result<()>;

    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse>;
    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse>;
    async fn logout(&self) -> Result<()>;
    async fn current_user(&self) -> Result<User>;
    async fn health(&self) -> Result<HealthResponse>;

    async fn list_sessions(&self) -> Result<Vec<Session>>;
    async fn create_session(&self, name: &str) -> Result<Session>;
    async fn rename_session(&self, session_id: &str, name: &str) -> Result<Session>;
    async fn delete_session(&self, session_id: &str) -> Result<SessionDeleteResponse>;

    async fn session_documents(&self, session_id: &str) -> Result<SessionDocumentsResponse>;
    async fn session_messages(&self, session_id: &str) -> Result<SessionMessagesResponse>;

    async fn upload_document(
        &self,
        session_id: &str,
        file: &UploadFile,
    ) -> Result<UploadDocumentResponse>;

    async fn query(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// reqwest-backed [`Backend`]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: RwLock<Option<String>>,
    storage: Arc<dyn TokenStorage>,
}

impl ApiClient {
    /// Build a client for the configured backend, restoring any stored token
    pub fn new(config: &Config, storage: Arc<dyn TokenStorage>) -> Result<Self> {
        let base_url = config.base_url()?;

        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let token = match storage.load() {
            Ok(token) => token,
            Err(e) => {
                warn!("Ignoring unreadable stored token: {}", e);
                None
            }
        };

        Ok(Self {
            client,
            base_url,
            token: RwLock::new(token),
            storage,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base URL. An empty last segment keeps a
    /// trailing slash, which the session collection endpoint requires.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Invalid backend URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and return the raw body of a successful response
    async fn send_raw(&self, request: RequestBuilder, code: ErrorCode) -> Result<Vec<u8>> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| Error::network(code, e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::network(code, e.to_string()))?;

        if !status.is_success() {
            let err = api_error(status, &body);
            debug!("Backend returned {}: {}", status, err);
            return Err(err);
        }

        Ok(body.to_vec())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, code: ErrorCode) -> Result<T> {
        let body = self.send_raw(request, code).await?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::network(code, format!("Invalid response from backend: {}", e)))
    }
}

/// Build an API error from a non-success response
fn api_error(status: StatusCode, body: &[u8]) -> Error {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => Error::Api {
            status: status.as_u16(),
            code: parsed.code,
            detail: parsed.detail,
        },
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let text = text.trim();
            let message = if text.is_empty() {
                status.to_string()
            } else {
                format!("{}: {}", status, text)
            };
            Error::Api {
                status: status.as_u16(),
                code: None,
                detail: ErrorDetail::Message(message),
            }
        }
    }
}

#[async_trait]
impl Backend for ApiClient {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_token(&self, token: Option<String>) -> Result<()> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token.clone();
        match token {
            Some(token) => self.storage.save(&token),
            None => self.storage.clear(),
        }
    }

    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        let url = self.endpoint(&["auth", "login"])?;
        self.send(self.client.post(url).json(request), ErrorCode::NetworkError)
            .await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        let url = self.endpoint(&["auth", "register"])?;
        self.send(self.client.post(url).json(request), ErrorCode::NetworkError)
            .await
    }

    async fn logout(&self) -> Result<()> {
        let url = self.endpoint(&["auth", "logout"])?;
        self.send_raw(self.client.post(url), ErrorCode::NetworkError)
            .await
            .map(|_| ())
    }

    async fn current_user(&self) -> Result<User> {
        let url = self.endpoint(&["auth", "user"])?;
        self.send(self.client.get(url), ErrorCode::NetworkError).await
    }

    async fn health(&self) -> Result<HealthResponse> {
        let url = self.endpoint(&["health"])?;
        self.send(self.client.get(url), ErrorCode::NetworkError).await
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let url = self.endpoint(&["sessions", ""])?;
        self.send(self.client.get(url), ErrorCode::NetworkError).await
    }

    async fn create_session(&self, name: &str) -> Result<Session> {
        let url = self.endpoint(&["sessions", ""])?;
        let body = SessionNameRequest {
            name: name.to_string(),
        };
        self.send(self.client.post(url).json(&body), ErrorCode::NetworkError)
            .await
    }

    async fn rename_session(&self, session_id: &str, name: &str) -> Result<Session> {
        let url = self.endpoint(&["sessions", session_id])?;
        let body = SessionNameRequest {
            name: name.to_string(),
        };
        self.send(self.client.put(url).json(&body), ErrorCode::NetworkError)
            .await
    }

    async fn delete_session(&self, session_id: &str) -> Result<SessionDeleteResponse> {
        let url = self.endpoint(&["sessions", session_id])?;
        self.send(self.client.delete(url), ErrorCode::NetworkError)
            .await
    }

    async fn session_documents(&self, session_id: &str) -> Result<SessionDocumentsResponse> {
        let url = self.endpoint(&["sessions", session_id, "documents"])?;
        self.send(self.client.get(url), ErrorCode::NetworkError).await
    }

    async fn session_messages(&self, session_id: &str) -> Result<SessionMessagesResponse> {
        let url = self.endpoint(&["sessions", session_id, "messages"])?;
        self.send(self.client.get(url), ErrorCode::NetworkError).await
    }

    async fn upload_document(
        &self,
        session_id: &str,
        file: &UploadFile,
    ) -> Result<UploadDocumentResponse> {
        let url = self.endpoint(&["documents", "upload"])?;
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| Error::network(ErrorCode::UploadError, e.to_string()))?;
        let form = Form::new()
            .text("sessionId", session_id.to_string())
            .part("file", part);

        self.send(self.client.post(url).multipart(form), ErrorCode::UploadError)
            .await
    }

    async fn query(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = self.endpoint(&["chat", "query"])?;
        self.send(self.client.post(url).json(request), ErrorCode::NetworkError)
            .await
    }
}
