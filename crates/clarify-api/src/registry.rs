//! Registry of live conversation sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info};
use uuid::Uuid;

use clarify_dialog::{ClientEvent, SessionOutcome};

/// Handle on one running conversation worker.
#[derive(Debug)]
pub struct SessionHandle {
    inbound: mpsc::Sender<ClientEvent>,
    task: JoinHandle<SessionOutcome>,
    started_at: DateTime<Utc>,
}

impl SessionHandle {
    pub fn new(inbound: mpsc::Sender<ClientEvent>, task: JoinHandle<SessionOutcome>) -> Self {
        Self {
            inbound,
            task,
            started_at: Utc::now(),
        }
    }
}

/// Where a session worker stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    /// The worker returned, but its socket is still open.
    Finished,
    /// The worker panicked.
    Failed,
}

/// Summary of a live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub status: SessionStatus,
}

#[derive(Debug)]
struct Entry {
    inbound: mpsc::Sender<ClientEvent>,
    abort: AbortHandle,
    started_at: DateTime<Utc>,
    status: SessionStatus,
}

/// Session id to worker handle.
///
/// Every registered worker is watched until it returns; a panic is logged
/// and the session marked [`SessionStatus::Failed`]. Removing a session
/// aborts its worker and drops its inbound sender, so a worker blocked on
/// input is cancelled and its transcript closed.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Entry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Workers never run while holding the lock, so a poisoned map is still
    // consistent.
    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a worker and start watching it.
    pub fn insert(self: &Arc<Self>, id: Uuid, handle: SessionHandle) {
        let SessionHandle {
            inbound,
            task,
            started_at,
        } = handle;
        let entry = Entry {
            inbound,
            abort: task.abort_handle(),
            started_at,
            status: SessionStatus::Running,
        };
        {
            let mut sessions = self.sessions();
            sessions.insert(id, entry);
            info!(session = %id, active = sessions.len(), "Session registered");
        }
        tokio::spawn(watch(Arc::downgrade(self), id, task));
    }

    /// Remove a session and cancel its worker. Returns false for unknown ids.
    pub fn remove(&self, id: Uuid) -> bool {
        let Some(entry) = self.sessions().remove(&id) else {
            return false;
        };
        if entry.status == SessionStatus::Running {
            entry.abort.abort();
            debug!(session = %id, "Session worker aborted");
        }
        info!(session = %id, status = ?entry.status, "Session removed");
        true
    }

    /// Inbound sender of a live session.
    pub fn lookup(&self, id: Uuid) -> Option<mpsc::Sender<ClientEvent>> {
        self.sessions().get(&id).map(|e| e.inbound.clone())
    }

    pub fn status(&self, id: Uuid) -> Option<SessionStatus> {
        self.sessions().get(&id).map(|e| e.status)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.sessions().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    /// Live sessions, oldest first.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions()
            .iter()
            .map(|(id, entry)| SessionSummary {
                id: *id,
                started_at: entry.started_at,
                status: entry.status,
            })
            .collect();
        summaries.sort_by_key(|s| s.started_at);
        summaries
    }

    fn set_status(&self, id: Uuid, status: SessionStatus) {
        if let Some(entry) = self.sessions().get_mut(&id) {
            entry.status = status;
        }
    }
}

/// Wait for a worker and record how it ended.
async fn watch(registry: Weak<SessionRegistry>, id: Uuid, task: JoinHandle<SessionOutcome>) {
    let status = match task.await {
        Ok(outcome) => {
            debug!(session = %id, outcome = ?outcome, "Session worker returned");
            SessionStatus::Finished
        }
        Err(e) if e.is_panic() => {
            error!(session = %id, error = %e, "Session worker panicked");
            SessionStatus::Failed
        }
        // Aborted by `remove`.
        Err(_) => return,
    };
    if let Some(registry) = registry.upgrade() {
        registry.set_status(id, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn idle_session() -> (SessionHandle, mpsc::Receiver<ClientEvent>) {
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(async {
            std::future::pending::<()>().await;
            SessionOutcome::Disconnected
        });
        (SessionHandle::new(tx, task), rx)
    }

    fn broken_worker() -> SessionOutcome {
        panic!("orchestration invariant violated: ConfirmKeyword chosen without a keyword")
    }

    async fn wait_for_status(registry: &SessionRegistry, id: Uuid, expected: SessionStatus) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.status(id) != Some(expected) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("status never reached");
    }

    #[tokio::test]
    async fn test_insert_lookup_remove() {
        let registry = Arc::new(SessionRegistry::new());
        assert!(registry.is_empty());

        let id = Uuid::new_v4();
        let (handle, mut rx) = idle_session();
        registry.insert(id, handle);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(id));
        assert_eq!(registry.status(id), Some(SessionStatus::Running));

        let sender = registry.lookup(id).unwrap();
        sender
            .send(ClientEvent::Utterance("hi".to_string()))
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(ClientEvent::Utterance("hi".to_string()))
        );

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.lookup(id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_remove_aborts_worker() {
        let registry = Arc::new(SessionRegistry::new());
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(4);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _guard = done_tx;
            std::future::pending::<()>().await;
            SessionOutcome::Disconnected
        });
        registry.insert(id, SessionHandle::new(tx, task));

        registry.remove(id);
        // The aborted task drops its sender half.
        assert!(done_rx.await.is_err());
    }

    #[tokio::test]
    async fn test_returned_worker_marked_finished() {
        let registry = Arc::new(SessionRegistry::new());
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(4);
        let task = tokio::spawn(async { SessionOutcome::Finished });
        registry.insert(id, SessionHandle::new(tx, task));

        wait_for_status(&registry, id, SessionStatus::Finished).await;
        assert_eq!(registry.summaries()[0].status, SessionStatus::Finished);
    }

    #[tokio::test]
    async fn test_panicked_worker_marked_failed() {
        let registry = Arc::new(SessionRegistry::new());
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(4);
        let task = tokio::spawn(async { broken_worker() });
        registry.insert(id, SessionHandle::new(tx, task));

        wait_for_status(&registry, id, SessionStatus::Failed).await;
        let summary = &registry.summaries()[0];
        assert_eq!(summary.id, id);
        assert_eq!(summary.status, SessionStatus::Failed);

        // Removing a failed session neither panics nor keeps it around.
        assert!(registry.remove(id));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_summaries_sorted() {
        let registry = Arc::new(SessionRegistry::new());
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            let (handle, _rx) = idle_session();
            registry.insert(*id, handle);
        }
        let summaries = registry.summaries();
        assert_eq!(summaries.len(), 3);
        assert!(summaries
            .windows(2)
            .all(|w| w[0].started_at <= w[1].started_at));
        assert!(summaries.iter().all(|s| s.status == SessionStatus::Running));
    }

    #[test]
    fn test_status_serialises_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Failed).unwrap(),
            "\"failed\""
        );
    }
}
