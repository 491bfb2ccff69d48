//! Event delivery to the collector
//!
//! [`Transport`] performs exactly one network exchange per call and never
//! returns an error: every failure mode (connect error, timeout, non-2xx
//! response) is folded into [`SendOutcome::Failure`]. Retry policy lives
//! upstream in the offline queue's drain cycle, not here.

use async_trait::async_trait;

use crate::types::Event;

mod http;

pub use http::HttpTransport;

/// Result of a single delivery attempt
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// Collector accepted the event. The server may assign its own id,
    /// overriding the client-generated one.
    Success { event_id: Option<String> },
    /// Delivery failed; human-readable detail for logging.
    Failure { error: String },
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Success { .. })
    }
}

/// One-shot event delivery and reachability probing
#[async_trait]
pub trait Transport: Send + Sync {
    /// Serialize `event` to the wire format and perform one POST exchange.
    async fn send(&self, event: &Event) -> SendOutcome;

    /// Lightweight reachability probe; false on any error, never an `Err`.
    async fn is_online(&self) -> bool;
}
