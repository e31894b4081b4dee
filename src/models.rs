//! Domain types shared by the stores
//!
//! Sessions, documents and messages as the client holds them. Wire formats that
//! differ from these live in `api::types`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named conversation scope bundling its own documents and message history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub name: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Canonical ingestion state of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    /// Map a backend status label onto the canonical states.
    /// Unknown labels count as still processing.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "completed" | "complete" | "ready" | "done" => UploadStatus::Completed,
            "failed" | "error" => UploadStatus::Failed,
            "uploading" => UploadStatus::Uploading,
            _ => UploadStatus::Processing,
        }
    }

    /// Ingestion has not settled yet
    pub fn is_pending(&self) -> bool {
        matches!(self, UploadStatus::Uploading | UploadStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Uploading => "uploading",
            UploadStatus::Processing => "processing",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A PDF uploaded into one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub document_id: String,
    pub file_name: String,
    pub storage_key: String,
    pub page_count: u32,
    pub chunks_indexed: u32,
    pub session_id: String,
    pub upload_status: UploadStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// Delivery state of a message held locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Optimistic, request still in flight
    Pending,
    /// Accepted by the backend, not yet seen in history
    Sent,
    /// Fetched from history
    Synced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Client-side key, unique within a session's list
    pub id: String,
    /// Durable identity assigned by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_message_id: Option<String>,
    pub content: String,
    pub role: Role,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
}

impl Message {
    /// Optimistic user message, created before the request is sent
    pub fn local_user(session_id: &str, content: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("user-{}", now.timestamp_millis()),
            server_message_id: None,
            content: content.to_string(),
            role: Role::User,
            session_id: session_id.to_string(),
            sources: None,
            created_at: now,
            status: MessageStatus::Pending,
        }
    }

    /// Assistant reply received from the chat endpoint
    pub fn local_assistant(
        session_id: &str,
        answer: String,
        sources: Vec<Source>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("assistant-{}", now.timestamp_millis()),
            server_message_id: None,
            content: answer,
            role: Role::Assistant,
            session_id: session_id.to_string(),
            sources: Some(sources),
            created_at: now,
            status: MessageStatus::Sent,
        }
    }
}

/// Document excerpt supporting an assistant answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub document_id: String,
    pub file_name: String,
    pub page: u32,
    /// Origin of the excerpt, e.g. `pdf_text`
    #[serde(default, rename = "source", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, rename = "excerpt")]
    pub excerpt_text: String,
    #[serde(default, rename = "relevance_score", alias = "relevanceScore")]
    pub relevance_score: f32,
}

/// Sources of one document, pages ascending
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceGroup {
    pub document_id: String,
    pub file_name: String,
    pub pages: Vec<Source>,
}

/// Group sources by document (first-appearance order) and sort each group by page
pub fn group_sources(sources: &[Source]) -> Vec<SourceGroup> {
    let mut groups: Vec<SourceGroup> = Vec::new();
    for source in sources {
        match groups
            .iter_mut()
            .find(|group| group.document_id == source.document_id)
        {
            Some(group) => group.pages.push(source.clone()),
            None => groups.push(SourceGroup {
                document_id: source.document_id.clone(),
                file_name: source.file_name.clone(),
                pages: vec![source.clone()],
            }),
        }
    }
    for group in &mut groups {
        group.pages.sort_by_key(|source| source.page);
    }
    groups
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub email: String,
}

/// Backend timestamps arrive either as RFC 3339 or as naive ISO-8601 in UTC
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn source(document_id: &str, page: u32) -> Source {
        Source {
            document_id: document_id.to_string(),
            file_name: format!("{}.pdf", document_id),
            page,
            kind: Some("pdf_text".to_string()),
            excerpt_text: format!("excerpt from page {}", page),
            relevance_score: 0.5,
        }
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(UploadStatus::from_label("READY"), UploadStatus::Completed);
        assert_eq!(UploadStatus::from_label("done"), UploadStatus::Completed);
        assert_eq!(UploadStatus::from_label("Error"), UploadStatus::Failed);
        assert_eq!(UploadStatus::from_label("uploading"), UploadStatus::Uploading);
        assert_eq!(UploadStatus::from_label("indexing"), UploadStatus::Processing);
        assert!(UploadStatus::Processing.is_pending());
        assert!(!UploadStatus::Failed.is_pending());
    }

    #[test]
    fn test_group_sources_by_document_and_page() {
        let sources = vec![source("b", 7), source("a", 3), source("b", 2), source("a", 1)];
        let groups = group_sources(&sources);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].document_id, "b");
        assert_eq!(
            groups[0].pages.iter().map(|s| s.page).collect::<Vec<_>>(),
            vec![2, 7]
        );
        assert_eq!(
            groups[1].pages.iter().map(|s| s.page).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[test]
    fn test_source_wire_names() {
        let parsed: Source = serde_json::from_str(
            r#"{"documentId": "d1", "fileName": "report.pdf", "page": 3,
                "source": "pdf_text", "excerpt": "Revenue grew", "relevance_score": 0.82}"#,
        )
        .unwrap();
        assert_eq!(parsed.excerpt_text, "Revenue grew");
        assert_eq!(parsed.kind.as_deref(), Some("pdf_text"));
        assert!((parsed.relevance_score - 0.82).abs() < f32::EPSILON);
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(timestamp::parse("2024-05-01T12:30:00Z"), Some(expected));
        assert_eq!(timestamp::parse("2024-05-01T14:30:00+02:00"), Some(expected));
        assert_eq!(timestamp::parse("2024-05-01T12:30:00"), Some(expected));
        assert!(timestamp::parse("2024-05-01T12:30:00.250000").is_some());
        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn test_local_message_ids() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let user = Message::local_user("s1", "hello", now);
        assert_eq!(user.id, format!("user-{}", now.timestamp_millis()));
        assert_eq!(user.status, MessageStatus::Pending);
        assert!(user.server_message_id.is_none());

        let reply = Message::local_assistant("s1", "hi".to_string(), vec![], now);
        assert!(reply.id.starts_with("assistant-"));
        assert_eq!(reply.sources, Some(vec![]));
    }
}
