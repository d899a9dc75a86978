use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single problem found while validating a rule.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    #[error("rule name must not be empty")]
    MissingName,

    #[error("rule needs at least one trigger node or declarative trigger")]
    MissingTrigger,

    #[error("rule needs at least one action node or declarative action")]
    MissingAction,

    #[error("node '{0}' has an empty config")]
    EmptyConfig(String),

    #[error("declarative {list} #{index} has an empty type")]
    EmptyDeclarative {
        list: String,
        index: usize,
    },

    #[error("node id '{0}' is declared more than once")]
    DuplicateNode(String),

    #[error("edge '{edge_id}' references unknown node '{node_id}'")]
    UnknownNode {
        edge_id: String,
        node_id: String,
    },

    #[error("edge '{edge_id}' references unknown port '{port_id}' on node '{node_id}'")]
    UnknownPort {
        edge_id: String,
        node_id: String,
        port_id: String,
    },

    #[error("edge '{edge_id}' connects node '{node_id}' to itself")]
    SelfLoop {
        edge_id: String,
        node_id: String,
    },

    #[error("edge '{edge_id}' connects {from_type} output of '{from_node}' to {to_type} input of '{to_node}'")]
    TypeMismatch {
        edge_id: String,
        from_node: String,
        from_type: String,
        to_node: String,
        to_type: String,
    },

    #[error("cycle detected among nodes: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    #[error("declarative action targets trigger '{0}'")]
    CircularReference(String),

    #[error("condition '{subject}' has no operator")]
    MissingOperator {
        subject: String,
    },

    #[error("condition '{subject}' uses unknown operator '{operator}'")]
    UnknownOperator {
        subject: String,
        operator: String,
    },

    #[error("condition '{0}' uses 'between' without an ordered [low, high] pair")]
    InvalidBetween(String),

    #[error("execution timeout_seconds must be greater than zero")]
    InvalidTimeout,

    #[error("trigger node '{0}' should have no inputs")]
    TriggerHasInputs(String),

    #[error("action node '{0}' should have no outputs")]
    ActionHasOutputs(String),

    #[error("condition node '{0}' should have at least one input")]
    ConditionWithoutInput(String),

    #[error("condition node '{0}' should have exactly one boolean output")]
    ConditionOutputShape(String),

    #[error("trigger node '{0}' does not lead to any action")]
    TriggerWithoutAction(String),
}

impl ValidationIssue {
    /// Whether the issue belongs to the acyclicity class of problems.
    pub fn is_cycle(&self) -> bool {
        matches!(self, ValidationIssue::CycleDetected(_) | ValidationIssue::SelfLoop { .. } | ValidationIssue::CircularReference(_))
    }
}
