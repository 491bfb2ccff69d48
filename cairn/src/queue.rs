//! Bounded, persisted offline queue
//!
//! Events that fail immediate delivery land here and are retried on the
//! pipeline's drain cycle. The queue is FIFO with drop-oldest overflow and
//! is rewritten in full to durable storage on every mutation: a single
//! JSON array of wire-format events under one fixed key. Storage failures
//! degrade the queue to in-memory-only for that operation: logged, never
//! propagated.

use std::collections::VecDeque;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::types::Event;

/// Durable storage for the serialized queue
///
/// One fixed storage key per store; `save` replaces the whole payload.
/// The trait is synchronous: implementations are expected to be a local
/// file or an in-process buffer, not a network hop.
pub trait QueueStore: Send + Sync {
    /// Read the persisted payload, `None` when nothing has been written.
    fn load(&self) -> Result<Option<String>>;

    /// Replace the persisted payload.
    fn save(&self, payload: &str) -> Result<()>;
}

/// File-backed store: one JSON file, rewritten in full on every save
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl QueueStore for FileStore {
    fn load(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!(
                "failed to read queue file {:?}: {}",
                self.path, e
            ))),
        }
    }

    fn save(&self, payload: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("failed to create {:?}: {}", parent, e)))?;
        }
        std::fs::write(&self.path, payload).map_err(|e| {
            Error::Storage(format!("failed to write queue file {:?}: {}", self.path, e))
        })
    }
}

/// In-memory store, used in tests and when durable storage is unwanted
#[derive(Default)]
pub struct MemoryStore {
    payload: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for MemoryStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.payload.lock().clone())
    }

    fn save(&self, payload: &str) -> Result<()> {
        *self.payload.lock() = Some(payload.to_string());
        Ok(())
    }
}

/// Bounded FIFO of events awaiting redelivery
pub struct OfflineQueue {
    entries: VecDeque<Event>,
    max_size: usize,
    store: Box<dyn QueueStore>,
}

impl OfflineQueue {
    /// Load the queue from durable storage.
    ///
    /// Absent or malformed storage is an empty queue, never an error;
    /// timestamps come back from their wire string form as instants. If the
    /// persisted queue exceeds `max_size` (the limit was lowered between
    /// runs), the oldest entries are dropped to fit.
    pub fn load(max_size: usize, store: Box<dyn QueueStore>) -> Self {
        let mut entries: VecDeque<Event> = match store.load() {
            Ok(Some(payload)) => match serde_json::from_str::<Vec<Event>>(&payload) {
                Ok(events) => events.into(),
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed offline queue payload, starting empty");
                    VecDeque::new()
                }
            },
            Ok(None) => VecDeque::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read offline queue, starting empty");
                VecDeque::new()
            }
        };

        while entries.len() > max_size {
            entries.pop_front();
        }

        Self {
            entries,
            max_size,
            store,
        }
    }

    /// Append an event, dropping the oldest entry on overflow.
    ///
    /// Never fails: the in-memory queue is updated first, then persisted
    /// best-effort. A zero-capacity queue retains nothing.
    pub fn enqueue(&mut self, event: Event) {
        if self.max_size == 0 {
            tracing::debug!(
                event_id = %event.event_id,
                "Offline queue capacity is zero, discarding event"
            );
            return;
        }
        if self.entries.len() >= self.max_size {
            if let Some(dropped) = self.entries.pop_front() {
                tracing::debug!(
                    event_id = %dropped.event_id,
                    "Offline queue full, dropping oldest event"
                );
            }
        }
        self.entries.push_back(event);
        self.persist();
    }

    /// Defensive copy of the queue in FIFO order.
    pub fn all(&self) -> Vec<Event> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Delete an event by identity and re-persist. Returns whether anything
    /// was removed.
    pub fn remove(&mut self, event_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.event_id != event_id);
        let removed = self.entries.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    /// Retry every queued event in enqueue order, removing each on
    /// individual success. Returns the number delivered.
    ///
    /// No-op when empty or when the reachability probe says offline. A
    /// failed attempt neither blocks removal of earlier successes nor
    /// aborts the remaining attempts; partial drains are expected. The
    /// queue is re-persisted after each successful removal so a crash
    /// mid-drain cannot resurrect delivered events.
    pub async fn drain(&mut self, transport: &dyn Transport) -> usize {
        if self.entries.is_empty() {
            return 0;
        }

        if !transport.is_online().await {
            tracing::debug!("Collector unreachable, skipping offline queue drain");
            return 0;
        }

        let pending = self.all();
        let mut delivered = 0;

        for event in &pending {
            let outcome = transport.send(event).await;
            if outcome.is_success() {
                self.remove(&event.event_id);
                delivered += 1;
            } else if let crate::transport::SendOutcome::Failure { error } = outcome {
                tracing::debug!(
                    event_id = %event.event_id,
                    error = %error,
                    "Redelivery attempt failed, keeping event queued"
                );
            }
        }

        if delivered > 0 {
            tracing::debug!(delivered, remaining = self.len(), "Drained offline queue");
        }
        delivered
    }

    /// Rewrite the full queue to the store; failures degrade to
    /// in-memory-only.
    fn persist(&self) {
        let payload = match serde_json::to_string(&self.all()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize offline queue");
                return;
            }
        };
        if let Err(e) = self.store.save(&payload) {
            tracing::warn!(error = %e, "Failed to persist offline queue");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::transport::SendOutcome;
    use crate::types::{Level, PlatformInfo};

    use super::*;

    fn make_event(id: &str) -> Event {
        Event {
            event_id: id.to_string(),
            timestamp: Utc::now(),
            level: Level::Error,
            message: Some(format!("event {}", id)),
            exception: None,
            user: None,
            tags: Default::default(),
            extra: Default::default(),
            breadcrumbs: Vec::new(),
            journey: None,
            environment: "test".to_string(),
            app_version: None,
            platform: PlatformInfo::detect(),
        }
    }

    /// Transport that succeeds only for a scripted set of event ids.
    struct ScriptedTransport {
        online: bool,
        succeed: HashSet<String>,
        attempts: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(online: bool, succeed: &[&str]) -> Self {
            Self {
                online,
                succeed: succeed.iter().map(|s| s.to_string()).collect(),
                attempts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, event: &Event) -> SendOutcome {
            self.attempts.lock().push(event.event_id.clone());
            if self.succeed.contains(&event.event_id) {
                SendOutcome::Success { event_id: None }
            } else {
                SendOutcome::Failure {
                    error: "scripted failure".to_string(),
                }
            }
        }

        async fn is_online(&self) -> bool {
            self.online
        }
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = OfflineQueue::load(2, Box::new(MemoryStore::new()));
        queue.enqueue(make_event("e1"));
        queue.enqueue(make_event("e2"));
        queue.enqueue(make_event("e3"));

        let ids: Vec<_> = queue.all().iter().map(|e| e.event_id.clone()).collect();
        assert_eq!(ids, vec!["e2", "e3"]);
    }

    #[test]
    fn test_zero_capacity_queue_stays_empty() {
        let mut queue = OfflineQueue::load(0, Box::new(MemoryStore::new()));
        for id in ["e1", "e2", "e3"] {
            queue.enqueue(make_event(id));
        }

        assert!(queue.is_empty());
        assert!(queue.all().is_empty());
    }

    #[test]
    fn test_capacity_one_keeps_only_newest() {
        let mut queue = OfflineQueue::load(1, Box::new(MemoryStore::new()));
        queue.enqueue(make_event("e1"));
        queue.enqueue(make_event("e2"));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.all()[0].event_id, "e2");
    }

    #[test]
    fn test_persists_and_reloads_round_trip() {
        let store = std::sync::Arc::new(MemoryStore::new());

        struct SharedStore(std::sync::Arc<MemoryStore>);
        impl QueueStore for SharedStore {
            fn load(&self) -> Result<Option<String>> {
                self.0.load()
            }
            fn save(&self, payload: &str) -> Result<()> {
                self.0.save(payload)
            }
        }

        let original = make_event("e1");
        let original_ts = original.timestamp;
        {
            let mut queue =
                OfflineQueue::load(10, Box::new(SharedStore(std::sync::Arc::clone(&store))));
            queue.enqueue(original);
        }

        let queue = OfflineQueue::load(10, Box::new(SharedStore(store)));
        assert_eq!(queue.len(), 1);
        let reloaded = &queue.all()[0];
        assert_eq!(reloaded.event_id, "e1");
        // Wire format is RFC 3339; instants survive the string round trip.
        assert_eq!(reloaded.timestamp, original_ts);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("offline-queue.json");

        {
            let mut queue = OfflineQueue::load(10, Box::new(FileStore::new(path.clone())));
            queue.enqueue(make_event("e1"));
            queue.enqueue(make_event("e2"));
        }

        let queue = OfflineQueue::load(10, Box::new(FileStore::new(path)));
        let ids: Vec<_> = queue.all().iter().map(|e| e.event_id.clone()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
    }

    #[test]
    fn test_malformed_storage_is_empty_queue() {
        let store = MemoryStore::new();
        store.save("not json at all").unwrap();
        let queue = OfflineQueue::load(10, Box::new(store));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_reload_truncates_to_lowered_limit() {
        let store = std::sync::Arc::new(MemoryStore::new());

        struct SharedStore(std::sync::Arc<MemoryStore>);
        impl QueueStore for SharedStore {
            fn load(&self) -> Result<Option<String>> {
                self.0.load()
            }
            fn save(&self, payload: &str) -> Result<()> {
                self.0.save(payload)
            }
        }

        {
            let mut queue =
                OfflineQueue::load(10, Box::new(SharedStore(std::sync::Arc::clone(&store))));
            for id in ["e1", "e2", "e3"] {
                queue.enqueue(make_event(id));
            }
        }

        let queue = OfflineQueue::load(2, Box::new(SharedStore(store)));
        let ids: Vec<_> = queue.all().iter().map(|e| e.event_id.clone()).collect();
        assert_eq!(ids, vec!["e2", "e3"]);
    }

    #[test]
    fn test_remove_by_identity() {
        let mut queue = OfflineQueue::load(10, Box::new(MemoryStore::new()));
        queue.enqueue(make_event("e1"));
        queue.enqueue(make_event("e2"));

        assert!(queue.remove("e1"));
        assert!(!queue.remove("missing"));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.all()[0].event_id, "e2");
    }

    #[tokio::test]
    async fn test_drain_skips_when_offline() {
        let mut queue = OfflineQueue::load(10, Box::new(MemoryStore::new()));
        queue.enqueue(make_event("e1"));

        let transport = ScriptedTransport::new(false, &["e1"]);
        assert_eq!(queue.drain(&transport).await, 0);
        assert_eq!(queue.len(), 1);
        assert!(transport.attempts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_drain_removes_only_successes_in_order() {
        let mut queue = OfflineQueue::load(10, Box::new(MemoryStore::new()));
        for id in ["e1", "e2", "e3", "e4"] {
            queue.enqueue(make_event(id));
        }

        // e2 fails; later events are still attempted and removed.
        let transport = ScriptedTransport::new(true, &["e1", "e3", "e4"]);
        assert_eq!(queue.drain(&transport).await, 3);

        assert_eq!(*transport.attempts.lock(), vec!["e1", "e2", "e3", "e4"]);
        let ids: Vec<_> = queue.all().iter().map(|e| e.event_id.clone()).collect();
        assert_eq!(ids, vec!["e2"]);
    }

    #[tokio::test]
    async fn test_drain_empty_never_probes() {
        struct PanicTransport;

        #[async_trait]
        impl Transport for PanicTransport {
            async fn send(&self, _event: &Event) -> SendOutcome {
                panic!("send must not be called");
            }
            async fn is_online(&self) -> bool {
                panic!("probe must not be called");
            }
        }

        let mut queue = OfflineQueue::load(10, Box::new(MemoryStore::new()));
        assert_eq!(queue.drain(&PanicTransport).await, 0);
    }
}
