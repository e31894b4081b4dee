//! docchat: client for question-answering over uploaded PDFs
//!
//! Talks to a remote RAG backend that owns accounts, sessions, document
//! ingestion and answer generation. The client keeps per-session state in
//! stores, watches ingestion until it settles and merges chat history with
//! answers it has already shown.

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod progress;
pub mod store;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{Error, Result};
pub use workspace::Workspace;
