//! Per-session registry of background poll tasks
//!
//! At most one task is live per session id. Every installed task gets a fresh
//! generation number so a task finishing on its own can release its slot
//! without touching a successor that replaced it in the meantime.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::trace;

struct PollHandle {
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
pub struct PollRegistry {
    handles: Mutex<HashMap<String, PollHandle>>,
    next_generation: AtomicU64,
}

impl PollRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<String, PollHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the task built by `make_task` for `session_id`, aborting any task
    /// already registered for it. Returns true when a live task was replaced.
    ///
    /// The registry lock is held across the spawn, so a task that finishes
    /// immediately still finds its own handle when it calls [`release`].
    ///
    /// [`release`]: PollRegistry::release
    pub fn start<F, Fut>(&self, session_id: &str, make_task: F) -> bool
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let mut handles = self.handles();

        let superseded = match handles.remove(session_id) {
            Some(previous) => {
                previous.task.abort();
                !previous.task.is_finished()
            }
            None => false,
        };

        let task = tokio::spawn(make_task(generation));
        handles.insert(session_id.to_string(), PollHandle { generation, task });
        trace!(session_id, generation, "poll task installed");
        superseded
    }

    /// Abort and forget the task for `session_id`. Returns true if one existed.
    pub fn stop(&self, session_id: &str) -> bool {
        match self.handles().remove(session_id) {
            Some(handle) => {
                handle.task.abort();
                true
            }
            None => false,
        }
    }

    /// Forget the handle of a task that is finishing by itself. Does nothing if
    /// the slot now belongs to a newer generation.
    pub fn release(&self, session_id: &str, generation: u64) -> bool {
        let mut handles = self.handles();
        match handles.get(session_id) {
            Some(handle) if handle.generation == generation => {
                handles.remove(session_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.handles()
            .get(session_id)
            .is_some_and(|handle| !handle.task.is_finished())
    }

    pub fn active_sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = self
            .handles()
            .iter()
            .filter(|(_, handle)| !handle.task.is_finished())
            .map(|(session_id, _)| session_id.clone())
            .collect();
        sessions.sort();
        sessions
    }

    /// Abort every task. Returns the session ids that had one.
    pub fn stop_all(&self) -> Vec<String> {
        let mut sessions = Vec::new();
        for (session_id, handle) in self.handles().drain() {
            handle.task.abort();
            sessions.push(session_id);
        }
        sessions.sort();
        sessions
    }
}

impl Drop for PollRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    fn counting_task(counter: Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        async move {
            loop {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    #[tokio::test]
    async fn test_second_start_supersedes_first() {
        let registry = PollRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        assert!(!registry.start("s1", |_| counting_task(first.clone())));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(registry.start("s1", |_| counting_task(second.clone())));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let first_after_restart = first.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(first.load(Ordering::SeqCst), first_after_restart);
        assert!(second.load(Ordering::SeqCst) > 0);
        assert_eq!(registry.active_sessions(), vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn test_stop_aborts_task() {
        let registry = PollRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.start("s1", |_| counting_task(counter.clone()));
        tokio::time::sleep(Duration::from_millis(15)).await;

        assert!(registry.stop("s1"));
        assert!(!registry.stop("s1"));
        assert!(!registry.is_active("s1"));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let stopped_at = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), stopped_at);
    }

    #[tokio::test]
    async fn test_stale_release_keeps_successor() {
        let registry = PollRegistry::new();
        let mut first_generation = 0;
        registry.start("s1", |generation| {
            first_generation = generation;
            std::future::pending::<()>()
        });
        registry.start("s1", |_| std::future::pending::<()>());

        assert!(!registry.release("s1", first_generation));
        assert!(registry.is_active("s1"));
    }

    #[tokio::test]
    async fn test_task_can_release_itself() {
        let registry = Arc::new(PollRegistry::new());
        let inner = registry.clone();
        registry.start("s1", move |generation| async move {
            inner.release("s1", generation);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!registry.is_active("s1"));
        assert!(registry.active_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_stop_all() {
        let registry = PollRegistry::new();
        registry.start("b", |_| std::future::pending::<()>());
        registry.start("a", |_| std::future::pending::<()>());

        assert_eq!(registry.stop_all(), vec!["a".to_string(), "b".to_string()]);
        assert!(!registry.is_active("a"));
    }
}
