//! Journey and step tracking
//!
//! A journey is a named correlation scope spanning multiple steps: one
//! logical user flow such as a checkout. Events captured while a journey is
//! active carry a read-only snapshot of it. A journey holds at most one
//! in-progress step at a time: starting a new step force-completes the
//! previous one before the new one exists.
//!
//! Terminal transitions are last-write-wins: calling `complete`/`fail` on an
//! already-terminal step re-stamps its end time rather than erroring. A
//! journey's own terminal transition cascades to its in-progress step with
//! the same terminal status (`complete()` ⇒ step `Completed`, `fail()` ⇒
//! step `Failed`).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::UserInfo;

/// Journey lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStatus {
    Active,
    Completed,
    Failed,
}

/// Step lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    InProgress,
    Completed,
    Failed,
}

/// A named sub-phase of a journey
///
/// Owned exclusively by its parent journey; never shared across journeys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub status: StepStatus,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl Step {
    fn new(name: impl Into<String>, category: Option<&str>) -> Self {
        Self {
            name: name.into(),
            category: category.map(str::to_string),
            started_at: Utc::now(),
            ended_at: None,
            status: StepStatus::InProgress,
            data: HashMap::new(),
        }
    }

    fn finish(&mut self, status: StepStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}

/// Read-only journey projection attached to events (collector wire format)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyContext {
    pub journey_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A named, time-bounded correlation scope
#[derive(Debug)]
pub struct Journey {
    id: String,
    name: String,
    started_at: DateTime<Utc>,
    metadata: HashMap<String, serde_json::Value>,
    user: Option<UserInfo>,
    steps: Vec<Step>,
    /// Index of the current (most recent) step
    current: Option<usize>,
    status: JourneyStatus,
}

impl Journey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            name: name.into(),
            started_at: Utc::now(),
            metadata: HashMap::new(),
            user: None,
            steps: Vec::new(),
            current: None,
            status: JourneyStatus::Active,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> JourneyStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == JourneyStatus::Active
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The current (most recent) step, if any has been started.
    pub fn current_step(&self) -> Option<&Step> {
        self.current.map(|i| &self.steps[i])
    }

    /// Start a new step, making it the journey's current step.
    ///
    /// If a step is still in progress it is force-completed (end time
    /// stamped) before the new step is created, so at most one step is ever
    /// in progress. Returns the index of the new step.
    pub fn start_step(&mut self, name: impl Into<String>, category: Option<&str>) -> usize {
        self.finish_current(StepStatus::Completed);
        self.steps.push(Step::new(name, category));
        let index = self.steps.len() - 1;
        self.current = Some(index);
        index
    }

    /// Complete the current step. Last-write-wins: an already-terminal step
    /// is re-stamped rather than rejected.
    pub fn complete_step(&mut self) {
        if let Some(i) = self.current {
            self.steps[i].finish(StepStatus::Completed);
        }
    }

    /// Fail the current step. Last-write-wins, as with [`complete_step`].
    ///
    /// [`complete_step`]: Journey::complete_step
    pub fn fail_step(&mut self) {
        if let Some(i) = self.current {
            self.steps[i].finish(StepStatus::Failed);
        }
    }

    /// Attach a data value to the current step.
    pub fn set_step_data(&mut self, key: impl Into<String>, value: serde_json::Value) {
        if let Some(i) = self.current {
            self.steps[i].data.insert(key.into(), value);
        }
    }

    /// Terminate the journey as completed.
    ///
    /// An in-progress current step is force-completed first; the journey's
    /// terminal status always cascades to the step it interrupts.
    pub fn complete(&mut self) {
        self.finish_current(StepStatus::Completed);
        self.status = JourneyStatus::Completed;
    }

    /// Terminate the journey as failed.
    ///
    /// An in-progress current step is forced to `Failed` first, the same
    /// cascade rule as [`complete`]: the journey's terminal status carries
    /// over to the step it interrupts.
    ///
    /// [`complete`]: Journey::complete
    pub fn fail(&mut self) {
        self.finish_current(StepStatus::Failed);
        self.status = JourneyStatus::Failed;
    }

    /// Finish the current step with `status` only if it is still in progress.
    fn finish_current(&mut self, status: StepStatus) {
        if let Some(i) = self.current {
            if self.steps[i].status == StepStatus::InProgress {
                self.steps[i].finish(status);
            }
        }
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Set the journey-scoped user, which takes precedence over the
    /// client-level user on events captured within this journey.
    pub fn set_user(&mut self, user: UserInfo) {
        self.user = Some(user);
    }

    pub fn user(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    /// Read-only projection for event enrichment.
    pub fn snapshot(&self) -> JourneyContext {
        JourneyContext {
            journey_id: self.id.clone(),
            name: self.name.clone(),
            current_step: self.current_step().map(|s| s.name.clone()),
            started_at: self.started_at,
            metadata: self.metadata.clone(),
        }
    }
}

/// Shared handle to a live journey.
pub(crate) type SharedJourney = Arc<Mutex<Journey>>;

/// Scope guard for a journey
///
/// Returned by [`Client::start_journey`]. Dropping the guard, on any exit
/// path including panic unwind, completes the journey if it is still
/// active and detaches it from the client's current-journey slot. Call
/// [`fail`](JourneyGuard::fail) (or [`complete`](JourneyGuard::complete))
/// before the guard drops to pick the terminal status explicitly.
///
/// [`Client::start_journey`]: crate::client::Client::start_journey
pub struct JourneyGuard {
    journey: SharedJourney,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl JourneyGuard {
    pub(crate) fn new(journey: SharedJourney, detach: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            journey,
            detach: Some(detach),
        }
    }

    pub fn id(&self) -> String {
        self.journey.lock().id().to_string()
    }

    pub fn status(&self) -> JourneyStatus {
        self.journey.lock().status()
    }

    /// Start a step; any in-progress step is force-completed first.
    pub fn start_step(&self, name: impl Into<String>, category: Option<&str>) {
        self.journey.lock().start_step(name, category);
    }

    /// Start a step wrapped in its own scope guard: the step is completed
    /// when the [`StepGuard`] drops, if nothing terminated it earlier.
    pub fn step_scope(&self, name: impl Into<String>, category: Option<&str>) -> StepGuard {
        let index = self.journey.lock().start_step(name, category);
        StepGuard {
            journey: Arc::clone(&self.journey),
            index,
        }
    }

    pub fn complete_step(&self) {
        self.journey.lock().complete_step();
    }

    pub fn fail_step(&self) {
        self.journey.lock().fail_step();
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: serde_json::Value) {
        self.journey.lock().set_metadata(key, value);
    }

    pub fn set_user(&self, user: UserInfo) {
        self.journey.lock().set_user(user);
    }

    /// Terminate the journey as completed now, ahead of the guard dropping.
    pub fn complete(&self) {
        self.journey.lock().complete();
    }

    /// Terminate the journey as failed; the in-progress step fails with it.
    pub fn fail(&self) {
        self.journey.lock().fail();
    }

    pub fn snapshot(&self) -> JourneyContext {
        self.journey.lock().snapshot()
    }

    /// Owned copy of the journey's steps so far, in start order.
    pub fn steps(&self) -> Vec<Step> {
        self.journey.lock().steps().to_vec()
    }
}

impl Drop for JourneyGuard {
    fn drop(&mut self) {
        {
            let mut journey = self.journey.lock();
            if journey.is_active() {
                journey.complete();
            }
        }
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

/// Scope guard for a single step
///
/// Dropping the guard completes the step if it is still in progress. A step
/// already terminated (explicitly, or implicitly by a later `start_step` or
/// the journey's own terminal transition) is left untouched.
pub struct StepGuard {
    journey: SharedJourney,
    index: usize,
}

impl StepGuard {
    pub fn set_data(&self, key: impl Into<String>, value: serde_json::Value) {
        let mut journey = self.journey.lock();
        if let Some(step) = journey.steps.get_mut(self.index) {
            step.data.insert(key.into(), value);
        }
    }

    /// Fail this step now; the guard's drop then leaves it alone.
    pub fn fail(&self) {
        let mut journey = self.journey.lock();
        if let Some(step) = journey.steps.get_mut(self.index) {
            step.finish(StepStatus::Failed);
        }
    }

    /// Complete this step now. Last-write-wins on repeat calls.
    pub fn complete(&self) {
        let mut journey = self.journey.lock();
        if let Some(step) = journey.steps.get_mut(self.index) {
            step.finish(StepStatus::Completed);
        }
    }
}

impl Drop for StepGuard {
    fn drop(&mut self) {
        let mut journey = self.journey.lock();
        if let Some(step) = journey.steps.get_mut(self.index) {
            if step.status == StepStatus::InProgress {
                step.finish(StepStatus::Completed);
            }
        }
    }
}
