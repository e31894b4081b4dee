//! CLI commands implementation

pub mod auth;
pub mod chat;
pub mod documents;
pub mod init;
pub mod sessions;

pub use auth::*;
pub use chat::*;
pub use documents::*;
pub use init::*;
pub use sessions::*;

use crate::error::{Error, Result};
use crate::models::Session;
use crate::workspace::Workspace;

/// Error for a store action that reported failure, preferring the message
/// the store kept
fn store_failure(kept: Option<String>, fallback: Error) -> Error {
    match kept {
        Some(message) => Error::Other(message),
        None => fallback,
    }
}

/// Fail early when no token is stored
pub async fn require_login(workspace: &Workspace) -> Result<()> {
    if workspace.auth().initialize().await {
        Ok(())
    } else {
        Err(Error::NotAuthenticated)
    }
}

/// Session a command acts on: the one given, otherwise the first session of
/// the account (created when there is none)
pub async fn resolve_session(workspace: &Workspace, session_id: Option<&str>) -> Result<Session> {
    match session_id {
        Some(id) => match workspace.select_session(id).await {
            Some(session) => Ok(session),
            None => Err(store_failure(
                workspace.sessions().error().await,
                Error::Other(format!("Session not found: {}", id)),
            )),
        },
        None => match workspace.ensure_session().await {
            Some(session) => Ok(session),
            None => Err(store_failure(
                workspace.sessions().error().await,
                Error::NoActiveSession,
            )),
        },
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
