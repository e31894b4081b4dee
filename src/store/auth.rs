//! Login state and the bearer token

use crate::api::{Backend, LoginRequest, RegisterRequest};
use crate::error::{Error, Result};
use crate::events::{EventSink, NotificationLevel, StoreEvent};
use crate::models::User;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Debug, Default)]
struct AuthState {
    user: Option<User>,
    token: Option<String>,
    is_authenticated: bool,
    is_loading: bool,
    error: Option<String>,
}

pub struct AuthStore {
    backend: Arc<dyn Backend>,
    events: Arc<dyn EventSink>,
    state: RwLock<AuthState>,
}

fn validate_credentials(email: &str, password: &str) -> Result<()> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(Error::Validation(
            "Please enter a valid email address.".to_string(),
        ));
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(Error::Validation(format!(
            "Password must be at least {} characters long.",
            MIN_PASSWORD_CHARS
        )));
    }
    Ok(())
}

impl AuthStore {
    pub fn new(backend: Arc<dyn Backend>, events: Arc<dyn EventSink>) -> Self {
        Self {
            backend,
            events,
            state: RwLock::new(AuthState::default()),
        }
    }

    pub async fn user(&self) -> Option<User> {
        self.state.read().await.user.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.state.read().await.token.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated
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

    async fn record_error(&self, err: &Error) {
        let mut state = self.state.write().await;
        state.is_loading = false;
        state.error = Some(err.to_string());
        drop(state);
        self.events
            .emit(StoreEvent::notify(NotificationLevel::Error, err.user_message()));
    }

    /// Restore a previously stored token. Returns true when one was found.
    pub async fn initialize(&self) -> bool {
        match self.backend.token() {
            Some(token) => {
                let mut state = self.state.write().await;
                state.token = Some(token);
                state.is_authenticated = true;
                debug!("Restored stored access token");
                true
            }
            None => false,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> bool {
        if let Err(e) = validate_credentials(email, password) {
            self.record_error(&e).await;
            return false;
        }
        let email = email.trim();

        {
            let mut state = self.state.write().await;
            state.is_loading = true;
            state.error = None;
        }

        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let auth = match self.backend.login(&request).await {
            Ok(auth) => auth,
            Err(e) => {
                self.record_error(&e).await;
                return false;
            }
        };

        if let Err(e) = self.backend.set_token(Some(auth.access_token.clone())) {
            // The token still works for this process
            warn!("Could not persist access token: {}", e);
        }

        let user = match self.backend.current_user().await {
            Ok(user) => user,
            Err(e) => {
                debug!("Profile lookup failed after login: {}", e);
                User {
                    user_id: "unknown".to_string(),
                    email: email.to_string(),
                }
            }
        };

        {
            let mut state = self.state.write().await;
            state.user = Some(user);
            state.token = Some(auth.access_token);
            state.is_authenticated = true;
            state.is_loading = false;
        }

        info!(email, "Logged in");
        self.events.emit(StoreEvent::Authenticated {
            email: email.to_string(),
        });
        self.events
            .emit(StoreEvent::notify(NotificationLevel::Success, "Login successful!"));
        true
    }

    /// Create an account. No token is issued; log in afterwards.
    pub async fn register(&self, email: &str, password: &str) -> bool {
        if let Err(e) = validate_credentials(email, password) {
            self.record_error(&e).await;
            return false;
        }

        {
            let mut state = self.state.write().await;
            state.is_loading = true;
            state.error = None;
        }

        let request = RegisterRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        match self.backend.register(&request).await {
            Ok(registered) => {
                {
                    let mut state = self.state.write().await;
                    state.user = Some(User {
                        user_id: registered.user_id,
                        email: registered.email,
                    });
                    state.is_loading = false;
                }
                self.events.emit(StoreEvent::notify(
                    NotificationLevel::Success,
                    "Registration successful! Please log in.",
                ));
                true
            }
            Err(e) => {
                self.record_error(&e).await;
                false
            }
        }
    }

    fn forget_token(&self) {
        if let Err(e) = self.backend.set_token(None) {
            warn!("Could not remove stored access token: {}", e);
        }
    }

    async fn reset(&self) {
        *self.state.write().await = AuthState::default();
        self.events.emit(StoreEvent::LoggedOut);
    }

    /// Ask the backend to invalidate the token, then drop it locally whatever
    /// the answer.
    pub async fn logout(&self) {
        if self.backend.token().is_some() {
            if let Err(e) = self.backend.logout().await {
                debug!("Server logout failed: {}", e);
            }
        }
        self.forget_token();
        self.reset().await;
        self.events
            .emit(StoreEvent::notify(NotificationLevel::Info, "Logged out successfully"));
    }

    pub async fn fetch_user_info(&self) -> bool {
        match self.backend.current_user().await {
            Ok(user) => {
                self.state.write().await.user = Some(user);
                true
            }
            Err(e) => {
                self.record_error(&e).await;
                false
            }
        }
    }

    /// Check the stored token against the backend. A rejected token is dropped.
    pub async fn validate_token(&self) -> bool {
        if self.backend.token().is_none() {
            return false;
        }

        self.state.write().await.is_loading = true;
        match self.backend.health().await {
            Ok(_) => {
                let mut state = self.state.write().await;
                state.is_loading = false;
                state.is_authenticated = true;
                true
            }
            Err(e) => {
                warn!("Stored token rejected: {}", e);
                self.forget_token();
                self.reset().await;
                false
            }
        }
    }
}
