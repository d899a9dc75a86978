use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role of a node inside a rule graph.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    Trigger,
    Condition,
    Action,
}

/// Value type carried by a port.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataType {
    Number,
    String,
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

impl DataType {
    /// An edge may carry `self` into a port typed `target`.
    pub fn flows_into(
        &self,
        target: DataType,
    ) -> bool {
        target == DataType::Any || *self == target
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub name: String,
    pub data_type: DataType,
}

impl Port {
    pub fn new(
        id: &str,
        data_type: DataType,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            data_type,
        }
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleNode {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Kind specific settings; the `type` key selects the evaluator.
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RuleNode {
    pub fn new(
        id: &str,
        kind: NodeKind,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind,
            label: id.to_string(),
            description: String::new(),
            config: Map::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            enabled: true,
        }
    }

    /// Replace the config map. Non-object values leave the config empty.
    pub fn with_config(
        mut self,
        config: Value,
    ) -> Self {
        self.config = match config {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self
    }

    pub fn with_input(
        mut self,
        port: Port,
    ) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn with_output(
        mut self,
        port: Port,
    ) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn with_enabled(
        mut self,
        enabled: bool,
    ) -> Self {
        self.enabled = enabled;
        self
    }

    /// The `type` entry of the config, if any.
    pub fn config_type(&self) -> Option<&str> {
        self.config.get("type").and_then(Value::as_str)
    }

    pub fn input(
        &self,
        port_id: &str,
    ) -> Option<&Port> {
        self.inputs.iter().find(|p| p.id == port_id)
    }

    pub fn output(
        &self,
        port_id: &str,
    ) -> Option<&Port> {
        self.outputs.iter().find(|p| p.id == port_id)
    }
}
