use serde::{Deserialize, Serialize};

/// Directed connection `source_node_id:source_port_id -> target_node_id:target_port_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleEdge {
    pub id: String,
    pub source_node_id: String,
    pub source_port_id: String,
    pub target_node_id: String,
    pub target_port_id: String,
}

impl RuleEdge {
    pub fn new(
        id: &str,
        source: (&str, &str),
        target: (&str, &str),
    ) -> Self {
        Self {
            id: id.to_string(),
            source_node_id: source.0.to_string(),
            source_port_id: source.1.to_string(),
            target_node_id: target.0.to_string(),
            target_port_id: target.1.to_string(),
        }
    }
}
