use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{model::NodeKind, utils};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerKind {
    DeviceEvent,
    Schedule,
    #[default]
    Manual,
    Webhook,
}

/// What asked for a run, and the payload it carried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerSource {
    pub kind: TriggerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl TriggerSource {
    pub fn manual(payload: Value) -> Self {
        Self {
            kind: TriggerKind::Manual,
            source_id: None,
            payload,
        }
    }

    pub fn device_event(
        device_id: &str,
        payload: Value,
    ) -> Self {
        Self {
            kind: TriggerKind::DeviceEvent,
            source_id: Some(device_id.to_string()),
            payload,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::TimedOut | ExecutionStatus::Cancelled)
    }

    /// Terminal outcomes that count as failures and may be retried.
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionStatus::Failed | ExecutionStatus::TimedOut)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub kind: NodeKind,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl NodeResult {
    pub fn running(kind: NodeKind) -> Self {
        Self {
            kind,
            status: NodeStatus::Running,
            output: None,
            error: None,
            started_at: Some(Utc::now()),
            finished_at: None,
        }
    }

    pub fn skipped(
        kind: NodeKind,
        reason: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            kind,
            status: NodeStatus::Skipped,
            output: None,
            error: reason,
            started_at: None,
            finished_at: Some(now),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub duration_ms: u64,
    /// Nodes that actually ran to an outcome (succeeded or failed).
    pub nodes_executed: usize,
}

/// One attempt at running a rule. Rows are immutable once terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub rule_id: String,
    pub trigger_source: TriggerSource,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub attempt: u32,
    #[serde(default)]
    pub node_results: BTreeMap<String, NodeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metrics: ExecutionMetrics,
}

impl Execution {
    /// A fresh `Pending` first attempt.
    pub fn new(
        rule_id: &str,
        trigger_source: TriggerSource,
    ) -> Self {
        Self {
            id: utils::longid(),
            rule_id: rule_id.to_string(),
            trigger_source,
            start_time: Utc::now(),
            end_time: None,
            status: ExecutionStatus::Pending,
            attempt: 1,
            node_results: BTreeMap::new(),
            error: None,
            metrics: ExecutionMetrics::default(),
        }
    }

    /// The next attempt: a new row in `Retrying` with the same trigger source.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            status: ExecutionStatus::Retrying,
            ..Self::new(&self.rule_id, self.trigger_source.clone())
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Stamp the end time and the derived metrics.
    pub fn finalize(
        &mut self,
        status: ExecutionStatus,
        error: Option<String>,
    ) {
        let end = Utc::now();
        self.status = status;
        self.error = error;
        self.end_time = Some(end);
        self.metrics.duration_ms = (end - self.start_time).num_milliseconds().max(0) as u64;
        self.metrics.nodes_executed = self.node_results.values().filter(|r| matches!(r.status, NodeStatus::Succeeded | NodeStatus::Failed)).count();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_execution_next_attempt() {
        let first = Execution::new("r1", TriggerSource::device_event("boiler-1", json!({ "temperature": 850 })));
        let second = first.next_attempt();

        assert_eq!(first.attempt, 1);
        assert_eq!(first.status, ExecutionStatus::Pending);
        assert_eq!(second.attempt, 2);
        assert_eq!(second.status, ExecutionStatus::Retrying);
        assert_eq!(second.trigger_source, first.trigger_source);
        assert_ne!(second.id, first.id);
    }

    #[test]
    fn test_execution_finalize() {
        let mut exec = Execution::new("r1", TriggerSource::manual(json!({})));
        exec.node_results.insert("t".to_string(), NodeResult::running(NodeKind::Trigger));
        exec.node_results.get_mut("t").unwrap().status = NodeStatus::Succeeded;
        exec.node_results.insert("c".to_string(), NodeResult::skipped(NodeKind::Condition, None));

        exec.finalize(ExecutionStatus::Succeeded, None);
        assert!(exec.is_terminal());
        assert!(exec.end_time.is_some());
        assert_eq!(exec.metrics.nodes_executed, 1);
    }

    #[test]
    fn test_status_classes() {
        assert!(ExecutionStatus::TimedOut.is_terminal());
        assert!(ExecutionStatus::TimedOut.is_failure());
        assert!(!ExecutionStatus::Retrying.is_terminal());
        assert!(!ExecutionStatus::Cancelled.is_failure());
    }
}
