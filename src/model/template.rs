use serde::{Deserialize, Serialize};

use crate::model::{DeclarativeItem, ExecutionSettings, Priority, RuleEdge, RuleNode};

/// A reusable rule skeleton. Templates are not guaranteed to be valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
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
}
