//! Merging fetched history into the locally held message list

use crate::api::MessageRecord;
use crate::models::{Message, MessageStatus, Role};
use std::collections::HashSet;

/// Local shape of a history entry
pub fn message_from_history(session_id: &str, record: &MessageRecord) -> Message {
    Message {
        id: record.message_id.clone(),
        server_message_id: Some(record.message_id.clone()),
        content: record.content.clone(),
        role: record.role,
        session_id: session_id.to_string(),
        sources: match record.role {
            Role::Assistant => Some(Vec::new()),
            Role::User => None,
        },
        created_at: record.created_at,
        status: MessageStatus::Synced,
    }
}

/// Merge `server` history with the `local` list.
///
/// Server messages come first, one per server id. Local messages follow when
/// they have no server id yet, or a server id the history did not return. The
/// result is stable-sorted by creation time, so equal timestamps keep that
/// order. No server id appears twice in the result.
pub fn reconcile(local: &[Message], server: Vec<Message>) -> Vec<Message> {
    let mut seen: HashSet<String> = HashSet::new();

    let mut merged: Vec<Message> = server
        .into_iter()
        .filter(|message| match &message.server_message_id {
            Some(id) => seen.insert(id.clone()),
            None => true,
        })
        .collect();

    merged.extend(
        local
            .iter()
            .filter(|message| match &message.server_message_id {
                Some(id) => seen.insert(id.clone()),
                None => true,
            })
            .cloned(),
    );

    merged.sort_by_key(|message| message.created_at);
    merged
}
