use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Result, RuleflowError,
    model::{RuleEdge, RuleNode},
    utils,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleStatus {
    Active,
    #[default]
    Inactive,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Automatic,
    Manual,
}

/// Simplified trigger/condition/action entry for rules authored without a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclarativeItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Kept as written so unknown operators can be reported instead of rejected at parse time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub retry_count: u32,
    pub timeout_seconds: u64,
    /// Pause between attempts; falls back to `tracker.retry_interval_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Automatic,
            retry_count: 0,
            timeout_seconds: 60,
            retry_interval_ms: None,
            last_run: None,
            next_run: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMetadata {
    pub version: String,
    #[serde(default)]
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Default for RuleMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            version: "1.0.0".to_string(),
            author: String::new(),
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

/// Aggregate root of the rule model.
///
/// The graph (`nodes` + `edges`) and the declarative lists are two independent
/// ways to author the same rule; either may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: RuleStatus,
    #[serde(default)]
    pub nodes: Vec<RuleNode>,
    #[serde(default)]
    pub edges: Vec<RuleEdge>,
    #[serde(default)]
    pub declarative_triggers: Vec<DeclarativeItem>,
    #[serde(default)]
    pub declarative_conditions: Vec<DeclarativeItem>,
    #[serde(default)]
    pub declarative_actions: Vec<DeclarativeItem>,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub metadata: RuleMetadata,
}

impl AutomationRule {
    /// An empty inactive rule with a fresh id.
    pub fn new(name: &str) -> Self {
        Self {
            id: utils::uuid(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str::<AutomationRule>(s).map_err(|e| RuleflowError::Convert(format!("invalid rule: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn node(
        &self,
        id: &str,
    ) -> Option<&RuleNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(
        &self,
        id: &str,
    ) -> Option<&RuleEdge> {
        self.edges.iter().find(|e| e.id == id)
    }
}
