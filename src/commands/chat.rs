//! Chat commands: ask a question, show history

use super::{require_login, resolve_session, store_failure, truncate};
use crate::error::{Error, Result};
use crate::models::{group_sources, Message, Role, Session, SourceGroup};
use crate::workspace::Workspace;
use serde::Serialize;

const EXCERPT_PREVIEW_CHARS: usize = 160;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub session_id: String,
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceGroup>,
}

pub async fn cmd_send(workspace: &Workspace, session_id: Option<&str>, message: &str) -> Result<ChatReply> {
    require_login(workspace).await?;
    let session = resolve_session(workspace, session_id).await?;

    if !workspace.send_message(message).await {
        return Err(store_failure(
            workspace.chat().error().await,
            Error::Other("Message could not be sent".to_string()),
        ));
    }

    let reply = workspace
        .chat()
        .messages(&session.session_id)
        .await
        .into_iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .ok_or_else(|| Error::Other("No answer received".to_string()))?;

    Ok(ChatReply {
        session_id: session.session_id,
        question: message.to_string(),
        answer: reply.content,
        sources: group_sources(reply.sources.as_deref().unwrap_or_default()),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    pub session: Session,
    pub messages: Vec<Message>,
}

pub async fn cmd_history(workspace: &Workspace, session_id: Option<&str>) -> Result<ChatHistory> {
    require_login(workspace).await?;
    let session = resolve_session(workspace, session_id).await?;
    if let Some(error) = workspace.chat().error().await {
        return Err(Error::Other(error));
    }
    let messages = workspace.chat().messages(&session.session_id).await;
    Ok(ChatHistory { session, messages })
}

fn print_sources(groups: &[SourceGroup]) {
    if groups.is_empty() {
        return;
    }
    println!("\nSources:");
    for group in groups {
        let pages: Vec<String> = group.pages.iter().map(|s| s.page.to_string()).collect();
        println!("  📄 {} (p. {})", group.file_name, pages.join(", "));
        for source in &group.pages {
            if !source.excerpt_text.trim().is_empty() {
                println!(
                    "     p.{} [{:.2}] {}",
                    source.page,
                    source.relevance_score,
                    truncate(&source.excerpt_text, EXCERPT_PREVIEW_CHARS).replace('\n', " ")
                );
            }
        }
    }
}

pub fn print_reply(reply: &ChatReply) {
    println!("{}", reply.answer.trim());
    print_sources(&reply.sources);
}

pub fn print_history(history: &ChatHistory) {
    println!("💬 {} ({})\n", history.session.name, history.session.session_id);
    if history.messages.is_empty() {
        println!("No messages yet. Ask something with 'docchat chat send \"...\"'.");
        return;
    }

    for message in &history.messages {
        let speaker = match message.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        };
        println!(
            "[{}] {}: {}",
            message.created_at.format("%Y-%m-%d %H:%M"),
            speaker,
            message.content.trim()
        );
    }
}
