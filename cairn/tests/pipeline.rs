//! End-to-end pipeline tests
//!
//! These drive the full capture → sample → hook → deliver → queue → drain
//! path through a scripted transport, including offline-queue persistence
//! across client restarts via a real on-disk store.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use cairn::{
    Breadcrumb, BreadcrumbCategory, CaptureOutcome, Client, Event, FileStore, Level, SendOutcome,
    StepStatus, TelemetryConfig, Transport,
};

/// Transport scripted per event id: everything fails unless its id has been
/// allowed, and reachability can be flipped mid-test.
struct ScriptedTransport {
    online: Mutex<bool>,
    allow: Mutex<Option<HashSet<String>>>,
    sent: Mutex<Vec<Event>>,
}

impl ScriptedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            online: Mutex::new(false),
            allow: Mutex::new(Some(HashSet::new())),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn set_online(&self, online: bool) {
        *self.online.lock() = online;
    }

    /// Allow delivery for these ids only.
    fn allow_only(&self, ids: &[&str]) {
        *self.allow.lock() = Some(ids.iter().map(|s| s.to_string()).collect());
    }

    /// Allow delivery for everything.
    fn allow_all(&self) {
        *self.allow.lock() = None;
    }

    fn delivered_ids(&self) -> Vec<String> {
        self.sent.lock().iter().map(|e| e.event_id.clone()).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, event: &Event) -> SendOutcome {
        let allowed = match &*self.allow.lock() {
            None => true,
            Some(ids) => ids.contains(&event.event_id),
        };
        if allowed {
            self.sent.lock().push(event.clone());
            SendOutcome::Success { event_id: None }
        } else {
            SendOutcome::Failure {
                error: "scripted failure".to_string(),
            }
        }
    }

    async fn is_online(&self) -> bool {
        *self.online.lock()
    }
}

fn config(max_queue: usize) -> TelemetryConfig {
    TelemetryConfig {
        server_url: Some("https://collector.example.com".to_string()),
        public_key: Some("pk_test".to_string()),
        environment: "test".to_string(),
        max_offline_queue_size: max_queue,
        flush_interval_secs: 0,
        ..Default::default()
    }
}

fn queued_id(outcome: CaptureOutcome) -> String {
    match outcome {
        CaptureOutcome::Queued { event_id } => event_id,
        other => panic!("expected Queued, got {:?}", other),
    }
}

#[tokio::test]
async fn bounded_queue_retries_in_fifo_order() {
    // Capacity 2, rate 1.0, queueing enabled. Three failed captures E1..E3:
    // the queue keeps [E2, E3]. Reconnect with only E3 deliverable: the
    // drain removes exactly E3, leaving [E2].
    let transport = ScriptedTransport::new();
    let client = Client::builder(config(2))
        .transport(transport.clone())
        .queue_store(Box::new(cairn::MemoryStore::new()))
        .build()
        .unwrap();

    let _e1 = queued_id(client.capture_message("E1", Level::Error).await);
    let e2 = queued_id(client.capture_message("E2", Level::Error).await);
    let e3 = queued_id(client.capture_message("E3", Level::Error).await);
    assert_eq!(client.pending_count().await, 2);

    transport.set_online(true);
    transport.allow_only(&[&e3]);
    assert_eq!(client.flush().await, 1);

    assert_eq!(client.pending_count().await, 1);
    assert_eq!(transport.delivered_ids(), vec![e3]);

    // The survivor drains once it becomes deliverable.
    transport.allow_all();
    assert_eq!(client.flush().await, 1);
    assert_eq!(client.pending_count().await, 0);
    assert_eq!(transport.delivered_ids().last().unwrap(), &e2);
}

#[tokio::test]
async fn queued_events_survive_a_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("offline-queue.json");

    let transport = ScriptedTransport::new();
    {
        let client = Client::builder(config(10))
            .transport(transport.clone())
            .queue_store(Box::new(FileStore::new(path.clone())))
            .build()
            .unwrap();

        client.add_breadcrumb(Breadcrumb::new(BreadcrumbCategory::Http, "GET /cart"));
        queued_id(client.capture_message("lost in transit", Level::Error).await);
        client.close();
    }

    // Fresh client, same store: the event is reloaded with its breadcrumb
    // snapshot and timestamps intact, and drains on reconnect.
    let client = Client::builder(config(10))
        .transport(transport.clone())
        .queue_store(Box::new(FileStore::new(path)))
        .build()
        .unwrap();
    assert_eq!(client.pending_count().await, 1);

    transport.set_online(true);
    transport.allow_all();
    assert_eq!(client.flush().await, 1);

    let sent = transport.sent.lock();
    assert_eq!(sent[0].message.as_deref(), Some("lost in transit"));
    assert_eq!(sent[0].breadcrumbs.len(), 1);
    assert_eq!(sent[0].breadcrumbs[0].message, "GET /cart");
}

#[tokio::test]
async fn checkout_journey_enriches_events() {
    let transport = ScriptedTransport::new();
    transport.set_online(true);
    transport.allow_all();

    let client = Client::builder(config(10))
        .transport(transport.clone())
        .queue_store(Box::new(cairn::MemoryStore::new()))
        .build()
        .unwrap();

    let journey = client.start_journey("checkout");
    journey.start_step("validate", None);
    journey.start_step("pay", Some("billing"));
    client.capture_message("payment retried", Level::Warning).await;

    // "validate" was force-completed by the second start; "pay" is current.
    let ctx = journey.snapshot();
    assert_eq!(ctx.current_step.as_deref(), Some("pay"));

    journey.complete();
    drop(journey);
    client.capture_message("after checkout", Level::Info).await;

    let sent = transport.sent.lock();
    let during = sent[0].journey.as_ref().unwrap();
    assert_eq!(during.name, "checkout");
    assert_eq!(during.current_step.as_deref(), Some("pay"));
    assert!(sent[1].journey.is_none());
}

#[tokio::test]
async fn step_scope_completes_on_every_exit_path() {
    let transport = ScriptedTransport::new();
    let client = Client::builder(config(10))
        .transport(transport.clone())
        .queue_store(Box::new(cairn::MemoryStore::new()))
        .build()
        .unwrap();

    let journey = client.start_journey("signup");

    // Early-return style exit: the guard still completes the step.
    fn validate(journey: &cairn::JourneyGuard, valid: bool) -> Result<(), String> {
        let step = journey.step_scope("validate", None);
        if !valid {
            step.fail();
            return Err("invalid form".to_string());
        }
        Ok(())
    }

    assert!(validate(&journey, true).is_ok());
    assert!(validate(&journey, false).is_err());

    // Both scoped steps are terminal: the first completed by its guard on
    // the normal exit, the second failed explicitly before the early return.
    let steps = journey.steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].status, StepStatus::Completed);
    assert!(steps[0].ended_at.is_some());
    assert_eq!(steps[1].status, StepStatus::Failed);
}

#[tokio::test]
async fn hook_drop_has_no_side_effects() {
    let transport = ScriptedTransport::new();
    transport.set_online(true);
    transport.allow_all();

    let client = Client::builder(config(10))
        .transport(transport.clone())
        .queue_store(Box::new(cairn::MemoryStore::new()))
        .before_send(|event| {
            if event.level == Level::Debug {
                None
            } else {
                Some(event)
            }
        })
        .build()
        .unwrap();

    let outcome = client.capture_message("chatter", Level::Debug).await;
    assert!(matches!(outcome, CaptureOutcome::Dropped { .. }));
    assert!(transport.sent.lock().is_empty());
    assert_eq!(client.pending_count().await, 0);

    let outcome = client.capture_message("real problem", Level::Error).await;
    assert!(matches!(outcome, CaptureOutcome::Sent { .. }));
    assert_eq!(transport.sent.lock().len(), 1);
}
