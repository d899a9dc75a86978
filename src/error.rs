//! Error types for Ruleflow.
//!
//! All errors in Ruleflow are represented by the `RuleflowError` enum.
//! Validation problems are not errors: they are returned as data in a
//! [`ValidationReport`](crate::ValidationReport).

use std::string::FromUtf8Error;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Ruleflow operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum RuleflowError {
    /// Tracker-level errors (startup, shutdown, not running).
    #[error("{0}")]
    Tracker(String),

    /// Configuration parsing errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// A graph mutation referenced a node that is not part of the rule.
    #[error("node '{0}' not found")]
    NodeNotFound(String),

    /// A graph mutation referenced an edge that is not part of the rule.
    #[error("edge '{0}' not found")]
    EdgeNotFound(String),

    /// An edge endpoint does not exist in the node set.
    #[error("edge '{edge_id}' references unknown node '{node_id}'")]
    EdgeEndpointInvalid {
        edge_id: String,
        node_id: String,
    },

    /// A node with the same id is already part of the rule.
    #[error("node '{0}' already exists")]
    DuplicateNode(String),

    /// An edge with the same id is already part of the rule.
    #[error("edge '{0}' already exists")]
    DuplicateEdge(String),

    /// The rule graph contains at least one cycle.
    #[error("cycle detected among nodes: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    /// The rule failed validation and cannot be run.
    #[error("rule '{rule_id}' is invalid: {}", errors.join("; "))]
    RuleInvalid {
        rule_id: String,
        errors: Vec<String>,
    },

    /// A node's config or runtime action failed.
    #[error("node '{node_id}' evaluation failed: {message}")]
    NodeEvaluation {
        node_id: String,
        message: String,
    },

    /// The execution ran longer than its timeout budget.
    #[error("execution exceeded timeout of {0}s")]
    TimeoutExceeded(u64),

    /// No rule with the given id exists in the store.
    #[error("rule '{0}' not found")]
    RuleNotFound(String),

    /// No execution with the given id exists in the ledger.
    #[error("execution '{0}' not found")]
    ExecutionNotFound(String),

    /// Storage operation errors.
    #[error("{0}")]
    Store(String),

    /// Evaluator configuration or runtime errors.
    #[error("{0}")]
    Action(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

impl From<RuleflowError> for String {
    fn from(val: RuleflowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for RuleflowError {
    fn from(error: std::io::Error) -> Self {
        RuleflowError::IoError(error.to_string())
    }
}

impl From<RuleflowError> for std::io::Error {
    fn from(val: RuleflowError) -> Self {
        std::io::Error::other(val.to_string())
    }
}

impl From<FromUtf8Error> for RuleflowError {
    fn from(_: FromUtf8Error) -> Self {
        RuleflowError::Convert("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for RuleflowError {
    fn from(error: serde_json::Error) -> Self {
        RuleflowError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for RuleflowError {
    fn from(error: toml::de::Error) -> Self {
        RuleflowError::Config(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for RuleflowError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        RuleflowError::Action(error.to_string())
    }
}
