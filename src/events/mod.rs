//! Event types for rule execution.
//!
//! Events are emitted while a run progresses so subscribers can follow run,
//! execution (attempt) and node transitions, and collect logs written by
//! node evaluators.

mod node;
mod run;

pub use node::*;
pub use run::*;

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
}

/// Top-level event type published on the channel.
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    /// Logical run events (started, retrying, terminal).
    Run(RunEvent),
    /// Per attempt events.
    Execution(ExecutionEvent),
    /// Node level events (running, succeeded, failed, skipped).
    Node(NodeEvent),
}

/// Event message with its rule, execution and node context.
#[derive(Debug, Clone)]
pub struct Message {
    pub rule_id: String,
    /// Execution id of the attempt. Run events carry the run id (its first execution id).
    pub eid: String,
    /// Node id, empty for run and execution events.
    pub nid: String,
    pub event: TrackerEvent,
}

/// Log entry emitted during node evaluation.
#[derive(Debug, Clone)]
pub struct Log {
    pub rule_id: String,
    pub eid: String,
    pub nid: String,
    pub content: String,
    /// Timestamp in milliseconds of the log entry.
    pub timestamp: i64,
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl TrackerEvent {
    /// The run reached a terminal state.
    pub fn is_complete(&self) -> bool {
        matches!(self, TrackerEvent::Run(RunEvent::Succeeded | RunEvent::Failed(_) | RunEvent::Cancelled))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TrackerEvent::Run(RunEvent::Failed(_)) | TrackerEvent::Node(NodeEvent::Failed(_)))
    }

    /// Short name used when the event is persisted.
    pub fn name(&self) -> String {
        match self {
            TrackerEvent::Run(e) => format!("run:{}", e.str()),
            TrackerEvent::Execution(e) => format!("execution:{}", e.str()),
            TrackerEvent::Node(e) => format!("node:{}", e.str()),
        }
    }
}
