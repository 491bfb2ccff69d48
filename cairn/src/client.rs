//! Telemetry client: the capture/delivery pipeline orchestrator
//!
//! One send path for everything: build an event snapshot from ambient state
//! (breadcrumbs, journey, user/tags/extras), apply sampling, apply the
//! before-send hook, deliver via the transport, and fall back to the
//! offline queue on failure. A periodic task drains the queue; `flush()`
//! triggers the same drain manually.
//!
//! There is no global client. Construct one with [`Client::builder`] and
//! pass the handle explicitly; `Client` is `Send + Sync` and cheap to share
//! behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;

use crate::breadcrumb::{Breadcrumb, BreadcrumbBuffer};
use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::journey::{Journey, JourneyGuard, SharedJourney};
use crate::queue::{FileStore, OfflineQueue, QueueStore};
use crate::transport::{HttpTransport, SendOutcome, Transport};
use crate::types::{Event, ExceptionInfo, Level, PlatformInfo, UserInfo};

/// User-supplied filter/transform applied after sampling, before delivery.
///
/// Return `None` to drop the event (reported like a sampled-out drop) or
/// `Some` to send it, possibly rewritten. A panicking hook is not caught;
/// it propagates to the `capture*` caller.
pub type BeforeSend = Box<dyn Fn(Event) -> Option<Event> + Send + Sync>;

/// Why a captured event was dropped without delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Lost the sampling draw
    Sampled,
    /// Rejected by the before-send hook
    BeforeSend,
}

/// Outcome of a `capture*` call
///
/// The caller is never left uncertain: an event was sent, dropped on
/// purpose, queued for redelivery, or failed with queueing disabled.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// Delivered; id is the server-assigned one when the collector
    /// overrides the client-generated id.
    Sent { event_id: String },
    /// Intentionally not delivered and not queued.
    Dropped { reason: DropReason },
    /// Delivery failed; event persisted to the offline queue.
    Queued { event_id: String },
    /// Delivery failed and the offline queue is disabled.
    Failed { error: String },
}

/// Ambient state snapshotted into every captured event.
struct ScopeState {
    breadcrumbs: BreadcrumbBuffer,
    user: Option<UserInfo>,
    tags: HashMap<String, String>,
    extra: HashMap<String, serde_json::Value>,
    journey: Option<SharedJourney>,
}

struct ClientInner {
    config: TelemetryConfig,
    transport: Arc<dyn Transport>,
    /// Short critical sections only; never held across an await.
    scope: Mutex<ScopeState>,
    /// Drain suspends at transport calls, so the queue lock is async.
    queue: tokio::sync::Mutex<OfflineQueue>,
    before_send: Option<BeforeSend>,
    platform: PlatformInfo,
}

/// Builder for [`Client`]
///
/// The transport and queue store default to the HTTP transport and the
/// XDG-data-dir file store; tests inject scripted replacements here.
pub struct ClientBuilder {
    config: TelemetryConfig,
    transport: Option<Arc<dyn Transport>>,
    queue_store: Option<Box<dyn QueueStore>>,
    before_send: Option<BeforeSend>,
}

impl ClientBuilder {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            transport: None,
            queue_store: None,
            before_send: None,
        }
    }

    /// Replace the HTTP transport (scripted delivery in tests).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the file-backed queue store.
    pub fn queue_store(mut self, store: Box<dyn QueueStore>) -> Self {
        self.queue_store = Some(store);
        self
    }

    /// Install the before-send hook.
    pub fn before_send<F>(mut self, hook: F) -> Self
    where
        F: Fn(Event) -> Option<Event> + Send + Sync + 'static,
    {
        self.before_send = Some(Box::new(hook));
        self
    }

    /// Validate configuration and assemble the client.
    ///
    /// Configuration errors are fatal here and nowhere else; every later
    /// failure mode becomes a [`CaptureOutcome`] or a logged no-op.
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config)?),
        };

        let store = self
            .queue_store
            .unwrap_or_else(|| Box::new(FileStore::new(self.config.queue_file())));
        let queue = OfflineQueue::load(self.config.max_offline_queue_size, store);

        let inner = Arc::new(ClientInner {
            scope: Mutex::new(ScopeState {
                breadcrumbs: BreadcrumbBuffer::new(self.config.max_breadcrumbs),
                user: None,
                tags: HashMap::new(),
                extra: HashMap::new(),
                journey: None,
            }),
            queue: tokio::sync::Mutex::new(queue),
            transport,
            before_send: self.before_send,
            platform: PlatformInfo::detect(),
            config: self.config,
        });

        let drain_task = Mutex::new(spawn_drain_task(&inner));

        Ok(Client { inner, drain_task })
    }
}

/// Spawn the periodic drain cycle, when there is something to drive.
///
/// Skipped when the offline queue is disabled, the interval is zero, or no
/// tokio runtime is running (a runtime-less client still works; drains are
/// manual via `flush`).
///
/// The task holds only a weak handle to the client state: dropping the
/// last `Client` lets the state free immediately and the task exits on its
/// next tick.
fn spawn_drain_task(inner: &Arc<ClientInner>) -> Option<tokio::task::JoinHandle<()>> {
    if !inner.config.offline_queue_enabled || inner.config.flush_interval_secs == 0 {
        return None;
    }

    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            tracing::debug!("No tokio runtime at construction, periodic drain disabled");
            return None;
        }
    };

    let interval_secs = inner.config.flush_interval_secs;
    let inner = Arc::downgrade(inner);
    Some(handle.spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; the cycle starts one interval in.
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let mut queue = inner.queue.lock().await;
            queue.drain(inner.transport.as_ref()).await;
        }
    }))
}

/// Telemetry client handle
pub struct Client {
    inner: Arc<ClientInner>,
    drain_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Client {
    /// Start building a client from pipeline configuration.
    pub fn builder(config: TelemetryConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Construct a client with the default transport and queue store.
    pub fn new(config: TelemetryConfig) -> Result<Self> {
        ClientBuilder::new(config).build()
    }

    // ---- capture ----

    /// Capture a message event.
    pub async fn capture_message(&self, message: &str, level: Level) -> CaptureOutcome {
        let event = self.build_event(Some(message.to_string()), None, level, None);
        self.process(event).await
    }

    /// Capture an exception descriptor, optionally with extra data.
    pub async fn capture_exception(
        &self,
        exception: ExceptionInfo,
        level: Level,
        extra: Option<HashMap<String, serde_json::Value>>,
    ) -> CaptureOutcome {
        let message = Some(exception.message.clone());
        let event = self.build_event(message, Some(exception), level, extra);
        self.process(event).await
    }

    /// Capture any [`std::error::Error`] at the call site.
    ///
    /// The caller keeps the error; nothing is consumed, so the usual shape
    /// is capture-then-return-the-error in an error arm.
    pub async fn capture_error<E>(&self, error: &E, level: Level) -> CaptureOutcome
    where
        E: std::error::Error + ?Sized,
    {
        self.capture_exception(ExceptionInfo::from_error(error), level, None)
            .await
    }

    /// Snapshot → sample → hook → deliver, with queue fallback.
    async fn process(&self, event: Event) -> CaptureOutcome {
        // Sampling short-circuits before the hook and before any side
        // effect; a sampled-out event is neither sent nor queued.
        let rate = self.inner.config.sample_rate;
        if rand::thread_rng().gen::<f64>() >= rate {
            tracing::debug!(event_id = %event.event_id, "Event sampled out");
            return CaptureOutcome::Dropped {
                reason: DropReason::Sampled,
            };
        }

        let event = match &self.inner.before_send {
            Some(hook) => match hook(event) {
                Some(event) => event,
                None => {
                    tracing::debug!("Event dropped by before-send hook");
                    return CaptureOutcome::Dropped {
                        reason: DropReason::BeforeSend,
                    };
                }
            },
            None => event,
        };

        match self.inner.transport.send(&event).await {
            SendOutcome::Success { event_id } => CaptureOutcome::Sent {
                event_id: event_id.unwrap_or_else(|| event.event_id.clone()),
            },
            SendOutcome::Failure { error } => {
                if self.inner.config.offline_queue_enabled {
                    tracing::warn!(
                        event_id = %event.event_id,
                        error = %error,
                        "Delivery failed, queueing event for redelivery"
                    );
                    let event_id = event.event_id.clone();
                    self.inner.queue.lock().await.enqueue(event);
                    CaptureOutcome::Queued { event_id }
                } else {
                    tracing::warn!(
                        event_id = %event.event_id,
                        error = %error,
                        "Delivery failed, offline queue disabled"
                    );
                    CaptureOutcome::Failed { error }
                }
            }
        }
    }

    /// Build an immutable event snapshot from current ambient state.
    ///
    /// Everything is copied out under the scope lock: later mutation of the
    /// live buffer, tracker, or tag/extra maps never touches this event.
    /// A journey-scoped user takes precedence over the client-level user.
    fn build_event(
        &self,
        message: Option<String>,
        exception: Option<ExceptionInfo>,
        level: Level,
        extra: Option<HashMap<String, serde_json::Value>>,
    ) -> Event {
        let scope = self.inner.scope.lock();

        let (journey, journey_user) = match &scope.journey {
            Some(shared) => {
                let journey = shared.lock();
                if journey.is_active() {
                    (Some(journey.snapshot()), journey.user().cloned())
                } else {
                    (None, None)
                }
            }
            None => (None, None),
        };

        let mut merged_extra = scope.extra.clone();
        if let Some(extra) = extra {
            merged_extra.extend(extra);
        }

        Event {
            event_id: Event::new_id(),
            timestamp: chrono::Utc::now(),
            level,
            message,
            exception,
            user: journey_user.or_else(|| scope.user.clone()),
            tags: scope.tags.clone(),
            extra: merged_extra,
            breadcrumbs: scope.breadcrumbs.snapshot(),
            journey,
            environment: self.inner.config.environment.clone(),
            app_version: self.inner.config.app_version.clone(),
            platform: self.inner.platform.clone(),
        }
    }

    // ---- ambient state ----

    /// Record a breadcrumb; affects only events captured afterwards.
    pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        self.inner.scope.lock().breadcrumbs.add(breadcrumb);
    }

    pub fn clear_breadcrumbs(&self) {
        self.inner.scope.lock().breadcrumbs.clear();
    }

    /// Set the client-level user for future events.
    pub fn set_user(&self, user: UserInfo) {
        self.inner.scope.lock().user = Some(user);
    }

    pub fn clear_user(&self) {
        self.inner.scope.lock().user = None;
    }

    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.scope.lock().tags.insert(key.into(), value.into());
    }

    pub fn set_extra(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.scope.lock().extra.insert(key.into(), value);
    }

    // ---- journeys ----

    /// Start a journey and make it the client's current journey.
    ///
    /// Events captured while it is active carry its snapshot. The returned
    /// guard completes the journey on every exit path (including unwind)
    /// and detaches it from this client; a journey started later simply
    /// replaces this one as current.
    pub fn start_journey(&self, name: impl Into<String>) -> JourneyGuard {
        let journey: SharedJourney = Arc::new(Mutex::new(Journey::new(name)));
        self.inner.scope.lock().journey = Some(Arc::clone(&journey));

        let inner = Arc::downgrade(&self.inner);
        let started = Arc::clone(&journey);
        JourneyGuard::new(
            journey,
            Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    let mut scope = inner.scope.lock();
                    // Only clear the slot if this journey is still current.
                    if scope
                        .journey
                        .as_ref()
                        .is_some_and(|current| Arc::ptr_eq(current, &started))
                    {
                        scope.journey = None;
                    }
                }
            }),
        )
    }

    // ---- queue control ----

    /// Manually drain the offline queue; returns the number delivered.
    pub async fn flush(&self) -> usize {
        let mut queue = self.inner.queue.lock().await;
        queue.drain(self.inner.transport.as_ref()).await
    }

    /// Number of events currently awaiting redelivery.
    pub async fn pending_count(&self) -> usize {
        self.inner.queue.lock().await.len()
    }

    /// Cancel the periodic drain timer.
    ///
    /// In-flight sends are not cancelled and the queue is not flushed;
    /// pending events stay persisted for the next client to pick up.
    pub fn close(&self) {
        if let Some(task) = self.drain_task.lock().take() {
            task.abort();
        }
    }
}
