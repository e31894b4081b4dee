//! Account commands: login, register, logout, whoami, health

use super::{require_login, store_failure};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::User;
use crate::workspace::Workspace;
use serde::Serialize;
use tracing::info;

pub async fn cmd_login(workspace: &Workspace, email: &str, password: &str) -> Result<User> {
    info!(email, "Logging in");
    let auth = workspace.auth();
    if !auth.login(email, password).await {
        return Err(store_failure(
            auth.error().await,
            Error::Other("Login failed".to_string()),
        ));
    }
    auth.user()
        .await
        .ok_or_else(|| Error::Other("Login succeeded without a profile".to_string()))
}

/// Create an account. The caller still has to log in.
pub async fn cmd_register(workspace: &Workspace, email: &str, password: &str) -> Result<User> {
    let auth = workspace.auth();
    if !auth.register(email, password).await {
        return Err(store_failure(
            auth.error().await,
            Error::Other("Registration failed".to_string()),
        ));
    }
    auth.user()
        .await
        .ok_or_else(|| Error::Other("Registration returned no account".to_string()))
}

pub async fn cmd_logout(workspace: &Workspace) -> Result<()> {
    workspace.auth().initialize().await;
    workspace.logout().await;
    Ok(())
}

pub async fn cmd_whoami(workspace: &Workspace) -> Result<User> {
    require_login(workspace).await?;
    let auth = workspace.auth();
    if !auth.fetch_user_info().await {
        return Err(store_failure(auth.error().await, Error::NotAuthenticated));
    }
    auth.user().await.ok_or(Error::NotAuthenticated)
}

/// Backend reachability and whether the stored token is still accepted
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub api_base_url: String,
    pub status: String,
    pub service: Option<String>,
    pub version: Option<String>,
    pub token_stored: bool,
    pub token_valid: bool,
}

pub async fn cmd_health(config: &Config, workspace: &Workspace) -> Result<HealthReport> {
    let health = workspace.backend().health().await?;
    let token_stored = workspace.auth().initialize().await;
    let token_valid = token_stored && workspace.auth().validate_token().await;

    Ok(HealthReport {
        api_base_url: config.api_base_url.clone(),
        status: health.status,
        service: health.service,
        version: health.version,
        token_stored,
        token_valid,
    })
}

pub fn print_user(user: &User) {
    println!("👤 {} ({})", user.email, user.user_id);
}

pub fn print_health(report: &HealthReport) {
    println!("Backend: {}", report.api_base_url);
    println!("  Status:  {}", report.status);
    if let Some(service) = &report.service {
        println!("  Service: {}", service);
    }
    if let Some(version) = &report.version {
        println!("  Version: {}", version);
    }
    let login = match (report.token_stored, report.token_valid) {
        (false, _) => "not logged in",
        (true, true) => "logged in",
        (true, false) => "stored token rejected (logged out)",
    };
    println!("  Session: {}", login);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Backend;
    use crate::events::TracingSink;
    use crate::testing::FakeBackend;
    use std::sync::Arc;

    fn workspace(backend: &Arc<FakeBackend>) -> Workspace {
        Workspace::new(&Config::default(), backend.clone(), Arc::new(TracingSink))
    }

    #[tokio::test]
    async fn test_login_error_uses_backend_message() {
        let backend = FakeBackend::new();
        let ws = workspace(&backend);

        let err = cmd_login(&ws, "ana@example.com", "bad-password").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials");

        let user = cmd_login(&ws, "ana@example.com", "secret123").await.unwrap();
        assert_eq!(user.email, "ana@example.com");
    }

    #[tokio::test]
    async fn test_whoami_requires_token() {
        let backend = FakeBackend::new();
        let ws = workspace(&backend);
        assert!(matches!(cmd_whoami(&ws).await, Err(Error::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_health_reports_token_state() {
        let backend = FakeBackend::new();
        backend.set_token(Some("stored".to_string())).unwrap();
        let ws = workspace(&backend);

        let report = cmd_health(&Config::default(), &ws).await.unwrap();
        assert_eq!(report.status, "healthy");
        assert!(report.token_stored && report.token_valid);
    }
}
