//! Structural and semantic checks for automation rules.
//!
//! [`validate`] never fails and never stops at the first problem: every check
//! runs and all findings are collected into a [`ValidationReport`] so an
//! authoring UI can show them at once. Port-shape findings are reported as
//! warnings and do not make a rule invalid.

mod issue;

use std::{collections::HashSet, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    RuleflowError,
    graph::RuleGraph,
    model::{AutomationRule, ConditionOperator, DataType, DeclarativeItem, NodeKind, RuleNode, between_bounds},
};

pub use issue::ValidationIssue;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Error messages in check order.
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(|e| e.to_string()).collect()
    }
}

/// Validate `rule`, accumulating every error and warning.
pub fn validate(rule: &AutomationRule) -> ValidationReport {
    let mut checker = Checker {
        rule,
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    checker.presence();
    checker.completeness();
    checker.edges();
    checker.acyclicity();
    checker.declarative_references();
    checker.condition_semantics();
    checker.execution_settings();
    checker.port_shapes();

    ValidationReport {
        is_valid: checker.errors.is_empty(),
        errors: checker.errors,
        warnings: checker.warnings,
    }
}

struct Checker<'a> {
    rule: &'a AutomationRule,
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Checker<'_> {
    fn has_kind(
        &self,
        kind: NodeKind,
    ) -> bool {
        self.rule.nodes.iter().any(|n| n.kind == kind)
    }

    fn presence(&mut self) {
        if self.rule.name.trim().is_empty() {
            self.errors.push(ValidationIssue::MissingName);
        }
        if !self.has_kind(NodeKind::Trigger) && self.rule.declarative_triggers.is_empty() {
            self.errors.push(ValidationIssue::MissingTrigger);
        }
        if !self.has_kind(NodeKind::Action) && self.rule.declarative_actions.is_empty() {
            self.errors.push(ValidationIssue::MissingAction);
        }
    }

    fn completeness(&mut self) {
        let mut seen = HashSet::new();
        for node in self.rule.nodes.iter() {
            if !seen.insert(node.id.as_str()) {
                self.errors.push(ValidationIssue::DuplicateNode(node.id.clone()));
            }
            if node.config.is_empty() {
                self.errors.push(ValidationIssue::EmptyConfig(node.id.clone()));
            }
        }

        let lists = [
            ("trigger", &self.rule.declarative_triggers),
            ("condition", &self.rule.declarative_conditions),
            ("action", &self.rule.declarative_actions),
        ];
        for (list, items) in lists {
            for (index, item) in items.iter().enumerate() {
                if item.kind.trim().is_empty() {
                    self.errors.push(ValidationIssue::EmptyDeclarative {
                        list: list.to_string(),
                        index,
                    });
                }
            }
        }
    }

    fn edges(&mut self) {
        for edge in self.rule.edges.iter() {
            let source = self.rule.node(&edge.source_node_id);
            let target = self.rule.node(&edge.target_node_id);

            for (node, id) in [(source, &edge.source_node_id), (target, &edge.target_node_id)] {
                if node.is_none() {
                    self.errors.push(ValidationIssue::UnknownNode {
                        edge_id: edge.id.clone(),
                        node_id: id.clone(),
                    });
                }
            }
            let (Some(source), Some(target)) = (source, target) else {
                continue;
            };

            if source.id == target.id {
                self.errors.push(ValidationIssue::SelfLoop {
                    edge_id: edge.id.clone(),
                    node_id: source.id.clone(),
                });
            }

            let from = source.output(&edge.source_port_id);
            let to = target.input(&edge.target_port_id);
            if from.is_none() {
                self.errors.push(ValidationIssue::UnknownPort {
                    edge_id: edge.id.clone(),
                    node_id: source.id.clone(),
                    port_id: edge.source_port_id.clone(),
                });
            }
            if to.is_none() {
                self.errors.push(ValidationIssue::UnknownPort {
                    edge_id: edge.id.clone(),
                    node_id: target.id.clone(),
                    port_id: edge.target_port_id.clone(),
                });
            }

            if let (Some(from), Some(to)) = (from, to)
                && !from.data_type.flows_into(to.data_type)
            {
                self.errors.push(ValidationIssue::TypeMismatch {
                    edge_id: edge.id.clone(),
                    from_node: source.id.clone(),
                    from_type: from.data_type.as_ref().to_string(),
                    to_node: target.id.clone(),
                    to_type: to.data_type.as_ref().to_string(),
                });
            }
        }
    }

    fn acyclicity(&mut self) {
        if let Err(RuleflowError::CycleDetected(ids)) = RuleGraph::lossy(self.rule).topological_order() {
            self.errors.push(ValidationIssue::CycleDetected(ids));
        }
    }

    /// The declarative path only guards against an action re-arming the
    /// trigger that invoked it.
    fn declarative_references(&mut self) {
        let targets: HashSet<&str> = self.rule.declarative_actions.iter().filter_map(|a| a.target.as_deref()).collect();
        let mut reported = HashSet::new();

        for trigger in self.rule.declarative_triggers.iter() {
            if let Some(id) = trigger.id.as_deref()
                && targets.contains(id)
                && reported.insert(id)
            {
                self.errors.push(ValidationIssue::CircularReference(id.to_string()));
            }
        }
    }

    fn condition_semantics(&mut self) {
        for (index, item) in self.rule.declarative_conditions.iter().enumerate() {
            let subject = declarative_subject(item, index);
            self.check_operator(subject, item.operator.as_deref(), item.value.as_ref(), true);
        }

        for node in self.rule.nodes.iter() {
            let operator = node.config.get("operator").map(|op| op.as_str().unwrap_or_default());
            match node.kind {
                NodeKind::Condition if is_compare(node) => {
                    self.check_operator(node.id.clone(), operator, node.config.get("value"), true);
                }
                NodeKind::Trigger if operator.is_some() => {
                    self.check_operator(node.id.clone(), operator, node.config.get("value"), false);
                }
                _ => {}
            }
        }
    }

    fn check_operator(
        &mut self,
        subject: String,
        operator: Option<&str>,
        value: Option<&Value>,
        required: bool,
    ) {
        let Some(operator) = operator else {
            if required {
                self.errors.push(ValidationIssue::MissingOperator {
                    subject,
                });
            }
            return;
        };

        match ConditionOperator::from_str(operator) {
            Ok(ConditionOperator::Between) => {
                if value.and_then(between_bounds).is_none() {
                    self.errors.push(ValidationIssue::InvalidBetween(subject));
                }
            }
            Ok(_) => {}
            Err(_) => self.errors.push(ValidationIssue::UnknownOperator {
                subject,
                operator: operator.to_string(),
            }),
        }
    }

    fn execution_settings(&mut self) {
        if self.rule.execution.timeout_seconds == 0 {
            self.errors.push(ValidationIssue::InvalidTimeout);
        }
    }

    fn port_shapes(&mut self) {
        for node in self.rule.nodes.iter() {
            match node.kind {
                NodeKind::Trigger if !node.inputs.is_empty() => {
                    self.warnings.push(ValidationIssue::TriggerHasInputs(node.id.clone()));
                }
                NodeKind::Action if !node.outputs.is_empty() => {
                    self.warnings.push(ValidationIssue::ActionHasOutputs(node.id.clone()));
                }
                NodeKind::Condition => {
                    if node.inputs.is_empty() {
                        self.warnings.push(ValidationIssue::ConditionWithoutInput(node.id.clone()));
                    }
                    if !matches!(node.outputs.as_slice(), [port] if port.data_type == DataType::Boolean) {
                        self.warnings.push(ValidationIssue::ConditionOutputShape(node.id.clone()));
                    }
                }
                _ => {}
            }
        }

        if !self.has_kind(NodeKind::Action) {
            return;
        }
        let graph = RuleGraph::lossy(self.rule);
        for node in self.rule.nodes.iter().filter(|n| n.kind == NodeKind::Trigger) {
            if !graph.downstream(&node.id).iter().any(|n| n.kind == NodeKind::Action) {
                self.warnings.push(ValidationIssue::TriggerWithoutAction(node.id.clone()));
            }
        }
    }
}

fn is_compare(node: &RuleNode) -> bool {
    matches!(node.config_type(), None | Some("compare"))
}

fn declarative_subject(
    item: &DeclarativeItem,
    index: usize,
) -> String {
    item.id.clone().unwrap_or_else(|| format!("#{}", index))
}
