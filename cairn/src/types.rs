//! Core wire types for cairn
//!
//! These types form the event envelope sent to the collector. Field names
//! follow the collector's JSON schema (camelCase, ISO-8601 timestamps), so
//! the structs double as both the in-memory model and the wire format,
//! including the persisted offline queue, which stores the same shape.
//!
//! An [`Event`] is immutable after construction: its breadcrumb and journey
//! snapshots are owned copies taken at capture time, immune to later
//! mutation of the live buffer or tracker.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::breadcrumb::Breadcrumb;
use crate::journey::JourneyContext;

/// Event severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

/// One frame of a captured stack trace
///
/// Frames are supplied by the caller in order (outermost first); cairn does
/// not parse stack-trace text itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackFrame {
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colno: Option<u32>,
}

/// Exception descriptor attached to an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Exception type name
    #[serde(rename = "type")]
    pub exception_type: String,
    pub message: String,
    /// Ordered stack frames, outermost first
    #[serde(default)]
    pub stacktrace: Vec<StackFrame>,
}

impl ExceptionInfo {
    pub fn new(exception_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exception_type: exception_type.into(),
            message: message.into(),
            stacktrace: Vec::new(),
        }
    }

    pub fn with_stacktrace(mut self, frames: Vec<StackFrame>) -> Self {
        self.stacktrace = frames;
        self
    }

    /// Build a descriptor from any [`std::error::Error`].
    ///
    /// The concrete type name becomes the exception type; the error's
    /// `source()` chain is rendered into synthetic frames so causal context
    /// survives the wire.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut frames = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            frames.push(StackFrame {
                function: format!("caused by: {}", cause),
                filename: None,
                lineno: None,
                colno: None,
            });
            source = cause.source();
        }

        Self {
            exception_type: std::any::type_name::<E>().to_string(),
            message: error.to_string(),
            stacktrace: frames,
        }
    }
}

/// User descriptor attached to an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, serde_json::Value>>,
}

impl UserInfo {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            email: None,
            data: None,
        }
    }
}

/// Platform descriptor attached to every event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    pub name: String,
    pub version: String,
    pub os: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl PlatformInfo {
    /// Platform descriptor for this SDK on the current host.
    pub fn detect() -> Self {
        let version = env!("CARGO_PKG_VERSION").to_string();
        Self {
            name: "rust".to_string(),
            os: std::env::consts::OS.to_string(),
            user_agent: Some(format!("cairn/{}", version)),
            version,
        }
    }
}

/// A captured telemetry event in collector wire format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique identifier, generated at build time
    pub event_id: String,
    /// Capture instant (ISO-8601 on the wire)
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
    /// Breadcrumb snapshot in insertion order, owned by this event
    #[serde(default)]
    pub breadcrumbs: Vec<Breadcrumb>,
    /// Journey snapshot taken at capture time, if a journey was active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journey: Option<JourneyContext>,
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    pub platform: PlatformInfo,
}

impl Event {
    /// Generates a fresh event identifier (uuid v4, hyphen-free hex).
    pub fn new_id() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Level::Warning).unwrap(), "\"warning\"");
        assert_eq!(Level::Fatal.as_str(), "fatal");
    }

    #[test]
    fn test_event_wire_field_names() {
        let event = Event {
            event_id: Event::new_id(),
            timestamp: Utc::now(),
            level: Level::Error,
            message: Some("boom".to_string()),
            exception: Some(ExceptionInfo::new("io", "file missing").with_stacktrace(vec![
                StackFrame {
                    function: "read_config".to_string(),
                    filename: Some("config.rs".to_string()),
                    lineno: Some(42),
                    colno: None,
                },
            ])),
            user: Some(UserInfo::with_id("u-1")),
            tags: HashMap::new(),
            extra: HashMap::new(),
            breadcrumbs: Vec::new(),
            journey: None,
            environment: "production".to_string(),
            app_version: Some("1.2.3".to_string()),
            platform: PlatformInfo::detect(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("eventId").is_some());
        assert!(json.get("appVersion").is_some());
        assert_eq!(json["exception"]["type"], "io");
        assert_eq!(json["exception"]["stacktrace"][0]["lineno"], 42);
        // ISO-8601 wire timestamp
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
        // absent optionals are omitted, not null
        assert!(json.get("journey").is_none());
    }

    #[test]
    fn test_exception_from_error_chains_sources() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let info = ExceptionInfo::from_error(&inner);
        assert!(info.exception_type.contains("io"));
        assert_eq!(info.message, "no such file");
    }

    #[test]
    fn test_event_ids_are_unique() {
        assert_ne!(Event::new_id(), Event::new_id());
    }
}
