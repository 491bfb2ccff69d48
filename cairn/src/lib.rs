//! # cairn
//!
//! Client-side telemetry capture and delivery pipeline: applications report
//! errors and messages, enriched with breadcrumbs and journey state, to a
//! remote collector over HTTP, with best-effort delivery when connectivity
//! is intermittent.
//!
//! ## Architecture
//!
//! One send path: `capture*` builds an immutable event snapshot from
//! ambient state, applies sampling and the before-send hook, delivers via
//! the transport, and falls back to a bounded persisted offline queue.
//! A periodic task (and manual `flush`) drains the queue in FIFO order
//! whenever the collector is reachable again.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cairn::{Breadcrumb, BreadcrumbCategory, Client, Level, TelemetryConfig};
//!
//! # async fn run() -> cairn::Result<()> {
//! let config = TelemetryConfig {
//!     server_url: Some("https://collector.example.com".to_string()),
//!     public_key: Some("pk_live_xxxx".to_string()),
//!     ..Default::default()
//! };
//! let client = Client::new(config)?;
//!
//! client.add_breadcrumb(Breadcrumb::new(BreadcrumbCategory::Ui, "clicked checkout"));
//! let journey = client.start_journey("checkout");
//! journey.start_step("validate", None);
//!
//! client.capture_message("validation slow", Level::Warning).await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use breadcrumb::{Breadcrumb, BreadcrumbBuffer, BreadcrumbCategory};
pub use client::{BeforeSend, CaptureOutcome, Client, ClientBuilder, DropReason};
pub use config::{Config, LoggingConfig, TelemetryConfig};
pub use error::{Error, Result};
pub use journey::{Journey, JourneyContext, JourneyGuard, JourneyStatus, Step, StepGuard, StepStatus};
pub use queue::{FileStore, MemoryStore, OfflineQueue, QueueStore};
pub use transport::{HttpTransport, SendOutcome, Transport};
pub use types::{Event, ExceptionInfo, Level, PlatformInfo, StackFrame, UserInfo};

// Public modules
pub mod breadcrumb;
pub mod client;
pub mod config;
pub mod error;
pub mod journey;
pub mod logging;
pub mod queue;
pub mod transport;
pub mod types;
