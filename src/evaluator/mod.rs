//! Node evaluation.
//!
//! Every enabled node is evaluated by a [`NodeEvaluator`] resolved from the
//! [`EvaluatorRegistry`] by the node kind and its config `type`. Built-in
//! evaluators cover the trigger, condition and action configs the core
//! understands; embedding services register their own for anything else or
//! to replace a built-in (e.g. a real e-mail gateway for `notify`).

mod action;
mod condition;
pub mod interpolate;
mod trigger;
mod webhook;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    Result, RuleflowError,
    model::{NodeKind, RuleNode},
    runtime::Context,
};

pub use action::ActionEvaluator;
pub use condition::ConditionEvaluator;
pub use trigger::TriggerEvaluator;

/// Config type assumed for condition nodes without a `type`.
const DEFAULT_CONDITION_TYPE: &str = "compare";

#[async_trait]
pub trait NodeEvaluator: Send + Sync {
    /// Evaluates the node with the given context.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The [`Context`] of the execution attempt.
    /// * `node` - The node being evaluated.
    ///
    /// # Returns
    ///
    /// Returns the [`NodeOutput`]; an `Err` marks the node failed.
    async fn evaluate(
        &self,
        ctx: Arc<Context>,
        node: Arc<RuleNode>,
    ) -> Result<NodeOutput>;
}

/// Result of a successful evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    /// Output recorded in the node result and visible to downstream placeholders.
    pub value: Value,
    /// `false` stops the branch below a trigger or condition.
    pub passed: bool,
}

impl NodeOutput {
    pub fn passed(value: Value) -> Self {
        Self {
            value,
            passed: true,
        }
    }

    pub fn blocked(value: Value) -> Self {
        Self {
            value,
            passed: false,
        }
    }
}

#[derive(Clone)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<(NodeKind, String), Arc<dyn NodeEvaluator>>,
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();

        let trigger: Arc<dyn NodeEvaluator> = Arc::new(TriggerEvaluator);
        for name in ["threshold", "device_event", "schedule", "manual"] {
            registry.register(NodeKind::Trigger, name, trigger.clone());
        }

        let condition: Arc<dyn NodeEvaluator> = Arc::new(ConditionEvaluator);
        for name in [DEFAULT_CONDITION_TYPE, "time_window"] {
            registry.register(NodeKind::Condition, name, condition.clone());
        }

        let action: Arc<dyn NodeEvaluator> = Arc::new(ActionEvaluator::default());
        for name in ["notify", "set_parameter", "webhook"] {
            registry.register(NodeKind::Action, name, action.clone());
        }

        registry
    }
}

impl EvaluatorRegistry {
    /// A registry with the built-in evaluators.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry without any evaluator.
    pub fn empty() -> Self {
        Self {
            evaluators: HashMap::new(),
        }
    }

    /// Register `evaluator` for nodes of `kind` whose config `type` is `name`,
    /// replacing any previous registration.
    pub fn register(
        &mut self,
        kind: NodeKind,
        name: &str,
        evaluator: Arc<dyn NodeEvaluator>,
    ) {
        self.evaluators.insert((kind, name.to_string()), evaluator);
    }

    pub fn resolve(
        &self,
        node: &RuleNode,
    ) -> Result<Arc<dyn NodeEvaluator>> {
        let name = match (node.kind, node.config_type()) {
            (_, Some(name)) => name,
            (NodeKind::Condition, None) => DEFAULT_CONDITION_TYPE,
            (kind, None) => {
                return Err(RuleflowError::NodeEvaluation {
                    node_id: node.id.clone(),
                    message: format!("{} config is missing 'type'", kind.as_ref()),
                });
            }
        };

        self.evaluators.get(&(node.kind, name.to_string())).cloned().ok_or_else(|| RuleflowError::NodeEvaluation {
            node_id: node.id.clone(),
            message: format!("no evaluator registered for {} type '{}'", node.kind.as_ref(), name),
        })
    }
}
