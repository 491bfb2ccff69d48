//! Breadcrumbs and the bounded breadcrumb buffer
//!
//! Breadcrumbs are timestamped contextual notes recorded ahead of a capture.
//! The buffer keeps the most recent `max` of them in insertion order;
//! insertion order is also staleness order, so overflow silently evicts the
//! single oldest entry. That eviction is expected steady-state behavior, not
//! a failure; every operation here is total.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Level;

/// Breadcrumb category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreadcrumbCategory {
    Ui,
    Http,
    Navigation,
    Console,
    Auth,
    Business,
    Notification,
    Custom,
}

impl BreadcrumbCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreadcrumbCategory::Ui => "ui",
            BreadcrumbCategory::Http => "http",
            BreadcrumbCategory::Navigation => "navigation",
            BreadcrumbCategory::Console => "console",
            BreadcrumbCategory::Auth => "auth",
            BreadcrumbCategory::Business => "business",
            BreadcrumbCategory::Notification => "notification",
            BreadcrumbCategory::Custom => "custom",
        }
    }
}

/// A timestamped contextual note describing an application event
///
/// Owned by the buffer; copied into events, never shared by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// Stamped at construction; override with `with_timestamp`
    pub timestamp: DateTime<Utc>,
    pub category: BreadcrumbCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, serde_json::Value>>,
}

impl Breadcrumb {
    pub fn new(category: BreadcrumbCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            message: message.into(),
            level: None,
            data: None,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_data(mut self, data: HashMap<String, serde_json::Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Fixed-capacity ordered log of recent breadcrumbs
#[derive(Debug)]
pub struct BreadcrumbBuffer {
    entries: VecDeque<Breadcrumb>,
    max: usize,
}

impl BreadcrumbBuffer {
    pub fn new(max: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max),
            max,
        }
    }

    /// Append a breadcrumb, evicting the oldest entry when at capacity.
    ///
    /// A zero-capacity buffer retains nothing.
    pub fn add(&mut self, breadcrumb: Breadcrumb) {
        if self.max == 0 {
            return;
        }
        if self.entries.len() >= self.max {
            self.entries.pop_front();
        }
        self.entries.push_back(breadcrumb);
    }

    /// Defensive copy of the full sequence in insertion order.
    pub fn snapshot(&self) -> Vec<Breadcrumb> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
