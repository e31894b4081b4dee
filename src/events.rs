//! Structured events emitted by the stores
//!
//! Stores never print. They report what happened through an [`EventSink`]
//! handed to them at construction; the CLI logs events, embedders can
//! subscribe through a channel.

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Why a document poll ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStopReason {
    /// Every document reached a settled state
    Converged,
    /// Stopped by a caller
    Cancelled,
    /// Replaced by a newer poll for the same session
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    /// Transient user-facing message
    Notification {
        level: NotificationLevel,
        message: String,
    },
    SessionsLoaded {
        count: usize,
    },
    ActiveSessionChanged {
        session_id: Option<String>,
    },
    DocumentsUpdated {
        session_id: String,
        total: usize,
        pending: usize,
    },
    UploadProgress {
        session_id: String,
        percent: u8,
    },
    PollingStarted {
        session_id: String,
    },
    PollingStopped {
        session_id: String,
        reason: PollStopReason,
    },
    PollTickFailed {
        session_id: String,
        error: String,
    },
    MessagesUpdated {
        session_id: String,
        count: usize,
    },
    Authenticated {
        email: String,
    },
    LoggedOut,
}

impl StoreEvent {
    pub fn notify(level: NotificationLevel, message: impl Into<String>) -> Self {
        StoreEvent::Notification {
            level,
            message: message.into(),
        }
    }
}

/// Receiver of store events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StoreEvent);
}

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: StoreEvent) {
        match event {
            StoreEvent::Notification { level, message } => match level {
                NotificationLevel::Error => error!("{}", message),
                NotificationLevel::Warning => warn!("{}", message),
                NotificationLevel::Success | NotificationLevel::Info => info!("{}", message),
            },
            StoreEvent::PollTickFailed { session_id, error } => {
                warn!(session_id = %session_id, "Document status check failed: {}", error);
            }
            StoreEvent::PollingStopped { session_id, reason } => {
                debug!(session_id = %session_id, ?reason, "Document polling stopped");
            }
            other => debug!(event = ?other, "store event"),
        }
    }
}

/// Forwards events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<StoreEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiver<StoreEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: StoreEvent) {
        // A dropped receiver only means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(StoreEvent::PollingStarted {
            session_id: "s1".to_string(),
        });
        sink.emit(StoreEvent::notify(NotificationLevel::Error, "boom"));

        assert_eq!(
            rx.recv().await,
            Some(StoreEvent::PollingStarted {
                session_id: "s1".to_string()
            })
        );
        assert!(matches!(
            rx.recv().await,
            Some(StoreEvent::Notification {
                level: NotificationLevel::Error,
                ..
            })
        ));
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(StoreEvent::LoggedOut);
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(StoreEvent::PollingStopped {
            session_id: "s1".to_string(),
            reason: PollStopReason::Converged,
        })
        .unwrap();
        assert_eq!(json["event"], "polling_stopped");
        assert_eq!(json["reason"], "converged");
    }
}
