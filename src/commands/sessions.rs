//! Session commands: list, create, rename, delete

use super::{require_login, store_failure};
use crate::api::SessionDeleteResponse;
use crate::error::{Error, Result};
use crate::models::Session;
use crate::workspace::Workspace;

pub async fn cmd_list_sessions(workspace: &Workspace) -> Result<Vec<Session>> {
    require_login(workspace).await?;
    let sessions = workspace.sessions();
    if !sessions.fetch_sessions().await {
        return Err(store_failure(
            sessions.error().await,
            Error::Other("Could not list sessions".to_string()),
        ));
    }
    Ok(sessions.sessions().await)
}

pub async fn cmd_create_session(workspace: &Workspace, name: &str) -> Result<Session> {
    require_login(workspace).await?;
    match workspace.create_session(name).await {
        Some(session) => Ok(session),
        None => Err(store_failure(
            workspace.sessions().error().await,
            Error::Other("Could not create session".to_string()),
        )),
    }
}

pub async fn cmd_rename_session(workspace: &Workspace, session_id: &str, name: &str) -> Result<Session> {
    require_login(workspace).await?;
    match workspace.rename_session(session_id, name).await {
        Some(session) => Ok(session),
        None => Err(store_failure(
            workspace.sessions().error().await,
            Error::Other(format!("Could not rename session {}", session_id)),
        )),
    }
}

pub async fn cmd_delete_session(workspace: &Workspace, session_id: &str) -> Result<SessionDeleteResponse> {
    require_login(workspace).await?;
    match workspace.delete_session(session_id).await {
        Some(deleted) => Ok(deleted),
        None => Err(store_failure(
            workspace.sessions().error().await,
            Error::Other(format!("Could not delete session {}", session_id)),
        )),
    }
}

pub fn print_sessions(sessions: &[Session]) {
    if sessions.is_empty() {
        println!("No sessions yet. Create one with 'docchat sessions create <name>'.");
        return;
    }

    println!("{} session(s):\n", sessions.len());
    for session in sessions {
        println!(
            "  {}  {}  (created {})",
            session.session_id,
            session.name,
            session.created_at.format("%Y-%m-%d %H:%M")
        );
    }
}

pub fn print_session(session: &Session) {
    println!("✓ {} ({})", session.name, session.session_id);
}

pub fn print_delete_stats(deleted: &SessionDeleteResponse) {
    println!("🗑  Deleted session {}", deleted.session_id);
    println!("  Documents:  {}", deleted.documents_deleted);
    println!("  Embeddings: {}", deleted.embeddings_deleted);
    println!("  Messages:   {}", deleted.messages_deleted);
}
