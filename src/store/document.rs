//! Documents per session, uploads and ingestion polling
//!
//! Explicit fetches drive the loading flag and surface errors. The background
//! poll is silent: it only replaces the session's list and stops by itself once
//! nothing is left in `uploading` or `processing`.

use crate::api::{Backend, UploadFile};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventSink, NotificationLevel, PollStopReason, StoreEvent};
use crate::models::Document;
use crate::store::poller::PollRegistry;
use crate::store::status::{document_from_record, document_from_upload};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Progress never passes this value before the backend has answered
const SIMULATED_PROGRESS_CAP: u8 = 90;
const SIMULATED_PROGRESS_STEP: u8 = 10;

#[derive(Debug, Clone)]
pub struct DocumentSettings {
    pub poll_interval: Duration,
    pub refetch_delay: Duration,
    pub progress_tick: Duration,
    pub progress_reset: Duration,
    pub max_file_bytes: u64,
}

impl From<&Config> for DocumentSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.polling.interval(),
            refetch_delay: config.upload.refetch_delay(),
            progress_tick: config.upload.progress_tick(),
            progress_reset: config.upload.progress_reset(),
            max_file_bytes: config.upload.max_file_bytes,
        }
    }
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

#[derive(Debug, Default)]
struct DocumentState {
    documents: HashMap<String, Vec<Document>>,
    is_loading: bool,
    is_uploading: bool,
    error: Option<String>,
}

struct DocumentInner {
    backend: Arc<dyn Backend>,
    events: Arc<dyn EventSink>,
    settings: DocumentSettings,
    state: RwLock<DocumentState>,
    polls: PollRegistry,
    progress: watch::Sender<u8>,
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<DocumentInner>,
}

fn pending_count(documents: &[Document]) -> usize {
    documents
        .iter()
        .filter(|doc| doc.upload_status.is_pending())
        .count()
}

fn format_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    const KIB: u64 = 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= MIB {
        format!("{:.1}MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{} bytes", bytes)
    }
}

impl DocumentInner {
    async fn load(&self, session_id: &str) -> Result<Vec<Document>> {
        let response = self.backend.session_documents(session_id).await?;
        Ok(response
            .documents
            .iter()
            .map(|record| document_from_record(session_id, record))
            .collect())
    }

    /// Overwrite the session's list. Returns how many documents are still pending.
    async fn replace(&self, session_id: &str, documents: Vec<Document>) -> usize {
        let total = documents.len();
        let pending = pending_count(&documents);
        self.state
            .write()
            .await
            .documents
            .insert(session_id.to_string(), documents);

        self.events.emit(StoreEvent::DocumentsUpdated {
            session_id: session_id.to_string(),
            total,
            pending,
        });
        pending
    }

    async fn record_error(&self, err: &Error) {
        self.state.write().await.error = Some(err.to_string());
        self.events
            .emit(StoreEvent::notify(NotificationLevel::Error, err.user_message()));
    }

    async fn fetch(&self, session_id: &str) -> bool {
        {
            let mut state = self.state.write().await;
            state.is_loading = true;
            state.error = None;
        }

        let result = self.load(session_id).await;
        self.state.write().await.is_loading = false;

        match result {
            Ok(documents) => {
                debug!(session_id, count = documents.len(), "Fetched documents");
                self.replace(session_id, documents).await;
                true
            }
            Err(e) => {
                warn!(session_id, "Failed to fetch documents: {}", e);
                self.record_error(&e).await;
                false
            }
        }
    }

    fn set_progress(&self, session_id: &str, percent: u8) {
        let percent = percent.min(100);
        self.progress.send_replace(percent);
        self.events.emit(StoreEvent::UploadProgress {
            session_id: session_id.to_string(),
            percent,
        });
    }
}

/// Body of the per-session poll task. Ticks run back to back inside this one
/// task; a slow fetch pushes the next tick out instead of overlapping it.
async fn poll_documents(
    store: Weak<DocumentInner>,
    session_id: String,
    period: Duration,
    generation: u64,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = store.upgrade() else {
            return;
        };

        match inner.load(&session_id).await {
            Ok(documents) => {
                let pending = inner.replace(&session_id, documents).await;
                if pending == 0 {
                    if inner.polls.release(&session_id, generation) {
                        debug!(session_id = %session_id, "All documents settled");
                        inner.events.emit(StoreEvent::PollingStopped {
                            session_id: session_id.clone(),
                            reason: PollStopReason::Converged,
                        });
                    }
                    return;
                }
            }
            Err(e) => {
                inner.events.emit(StoreEvent::PollTickFailed {
                    session_id: session_id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
}

impl DocumentStore {
    pub fn new(
        backend: Arc<dyn Backend>,
        events: Arc<dyn EventSink>,
        settings: DocumentSettings,
    ) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            inner: Arc::new(DocumentInner {
                backend,
                events,
                settings,
                state: RwLock::new(DocumentState::default()),
                polls: PollRegistry::new(),
                progress,
            }),
        }
    }

    pub async fn documents(&self, session_id: &str) -> Vec<Document> {
        self.inner
            .state
            .read()
            .await
            .documents
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_loading(&self) -> bool {
        self.inner.state.read().await.is_loading
    }

    pub async fn is_uploading(&self) -> bool {
        self.inner.state.read().await.is_uploading
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.state.read().await.error.clone()
    }

    pub async fn clear_error(&self) {
        self.inner.state.write().await.error = None;
    }

    pub fn upload_progress(&self) -> u8 {
        *self.inner.progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.inner.progress.subscribe()
    }

    pub fn set_upload_progress(&self, session_id: &str, percent: u8) {
        self.inner.set_progress(session_id, percent);
    }

    /// Fetch the session's documents, replacing whatever was held for it
    pub async fn fetch_session_documents(&self, session_id: &str) -> bool {
        self.inner.fetch(session_id).await
    }

    fn validate_upload(&self, file: &UploadFile) -> Result<()> {
        if !file.is_pdf() {
            return Err(Error::Validation(
                "Only PDF files are supported.".to_string(),
            ));
        }
        if file.size() == 0 {
            return Err(Error::Validation(format!("{} is empty.", file.file_name)));
        }
        if file.size() > self.inner.settings.max_file_bytes {
            return Err(Error::Validation(format!(
                "File size must be less than {}.",
                format_size(self.inner.settings.max_file_bytes)
            )));
        }
        Ok(())
    }

    fn spawn_progress_ticker(&self, session_id: &str) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(&self.inner);
        let tick = self.inner.settings.progress_tick;
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                let Some(inner) = store.upgrade() else {
                    return;
                };
                // Only ever moves up, and never touches a value past the cap
                let advanced = inner.progress.send_if_modified(|percent| {
                    if *percent < SIMULATED_PROGRESS_CAP {
                        *percent = (*percent + SIMULATED_PROGRESS_STEP).min(SIMULATED_PROGRESS_CAP);
                        true
                    } else {
                        false
                    }
                });
                if advanced {
                    inner.events.emit(StoreEvent::UploadProgress {
                        session_id: session_id.clone(),
                        percent: *inner.progress.borrow(),
                    });
                }
            }
        })
    }

    fn schedule_follow_up(&self, session_id: &str) {
        let store = Arc::downgrade(&self.inner);
        let refetch_delay = self.inner.settings.refetch_delay;
        let session = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(refetch_delay).await;
            if let Some(inner) = store.upgrade() {
                inner.fetch(&session).await;
            }
        });

        let store = Arc::downgrade(&self.inner);
        let reset_delay = self.inner.settings.progress_reset;
        let session = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(reset_delay).await;
            if let Some(inner) = store.upgrade() {
                // A newer upload may already own the bar
                let reset = inner.progress.send_if_modified(|percent| {
                    if *percent == 100 {
                        *percent = 0;
                        true
                    } else {
                        false
                    }
                });
                if reset {
                    inner.events.emit(StoreEvent::UploadProgress {
                        session_id: session,
                        percent: 0,
                    });
                }
            }
        });
    }

    /// Upload a PDF into the session.
    ///
    /// Returns the provisional document on success. The session's list is
    /// refetched shortly after; polling is left to the caller.
    pub async fn upload_document(&self, session_id: &str, file: &UploadFile) -> Option<Document> {
        if let Err(e) = self.validate_upload(file) {
            self.inner.record_error(&e).await;
            return None;
        }

        {
            let mut state = self.inner.state.write().await;
            state.is_uploading = true;
            state.error = None;
        }
        self.inner.set_progress(session_id, 0);

        info!(session_id, file = %file.file_name, bytes = file.size(), "Uploading document");
        let ticker = self.spawn_progress_ticker(session_id);
        let result = self.inner.backend.upload_document(session_id, file).await;
        ticker.abort();

        match result {
            Ok(uploaded) => {
                let document = document_from_upload(session_id, &uploaded);
                let (total, pending) = {
                    let mut state = self.inner.state.write().await;
                    state.is_uploading = false;
                    let documents = state.documents.entry(session_id.to_string()).or_default();
                    documents.push(document.clone());
                    (documents.len(), pending_count(documents))
                };

                self.inner.set_progress(session_id, 100);
                self.inner.events.emit(StoreEvent::DocumentsUpdated {
                    session_id: session_id.to_string(),
                    total,
                    pending,
                });
                self.inner.events.emit(StoreEvent::notify(
                    NotificationLevel::Success,
                    format!("{} uploaded successfully!", document.file_name),
                ));

                self.schedule_follow_up(session_id);
                Some(document)
            }
            Err(e) => {
                warn!(session_id, file = %file.file_name, "Upload failed: {}", e);
                self.inner.state.write().await.is_uploading = false;
                self.inner.set_progress(session_id, 0);
                self.inner.record_error(&e).await;
                None
            }
        }
    }

    /// Poll the session's documents until every one has settled. Replaces a
    /// poll already running for the session.
    pub fn start_polling(&self, session_id: &str) {
        let store = Arc::downgrade(&self.inner);
        let period = self.inner.settings.poll_interval;
        let session = session_id.to_string();

        let superseded = self.inner.polls.start(session_id, move |generation| {
            poll_documents(store, session, period, generation)
        });

        if superseded {
            self.inner.events.emit(StoreEvent::PollingStopped {
                session_id: session_id.to_string(),
                reason: PollStopReason::Superseded,
            });
        }
        debug!(session_id, interval_ms = period.as_millis() as u64, "Polling documents");
        self.inner.events.emit(StoreEvent::PollingStarted {
            session_id: session_id.to_string(),
        });
    }

    pub fn stop_polling(&self, session_id: &str) {
        if self.inner.polls.stop(session_id) {
            self.inner.events.emit(StoreEvent::PollingStopped {
                session_id: session_id.to_string(),
                reason: PollStopReason::Cancelled,
            });
        }
    }

    pub fn stop_all_polling(&self) {
        for session_id in self.inner.polls.stop_all() {
            self.inner.events.emit(StoreEvent::PollingStopped {
                session_id,
                reason: PollStopReason::Cancelled,
            });
        }
    }

    pub fn is_polling(&self, session_id: &str) -> bool {
        self.inner.polls.is_active(session_id)
    }

    pub fn polling_sessions(&self) -> Vec<String> {
        self.inner.polls.active_sessions()
    }

    /// Resolve once the session has no live poll
    pub async fn wait_for_polling(&self, session_id: &str) {
        let step = (self.inner.settings.poll_interval / 10).clamp(
            Duration::from_millis(10),
            Duration::from_millis(250),
        );
        while self.is_polling(session_id) {
            tokio::time::sleep(step).await;
        }
    }

    /// Drop everything held for a session, including its poll
    pub async fn forget_session(&self, session_id: &str) {
        self.stop_polling(session_id);
        self.inner.state.write().await.documents.remove(session_id);
    }
}
