//! Client-side state for auth, sessions, documents and chat
//!
//! Each store owns its state behind a lock and talks to the backend through
//! the [`Backend`](crate::api::Backend) trait. Failures never escape a store
//! action: they are kept in the store's `error` field and reported as a
//! notification event, and the action returns `false` or `None`.

pub mod auth;
pub mod chat;
pub mod document;
pub mod poller;
pub mod reconcile;
pub mod session;
pub mod status;

pub use auth::AuthStore;
pub use chat::{ChatSettings, ChatStore};
pub use document::{DocumentSettings, DocumentStore};
pub use poller::PollRegistry;
pub use reconcile::{message_from_history, reconcile};
pub use session::{SessionSettings, SessionStore};
pub use status::{document_from_record, document_from_upload, normalize_status};
