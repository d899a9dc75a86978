//! Rule templates.
//!
//! A template is an unvalidated skeleton: device specific settings may be
//! left blank for the author to fill in before the rule is activated.

use chrono::Utc;
use serde_json::json;

use crate::{
    model::{
        AutomationRule, DataType, ExecutionSettings, NodeKind, Port, Priority, RuleEdge, RuleMetadata, RuleNode, RuleStatus, RuleTemplate,
    },
    utils,
};

/// Seed a new inactive rule from `template`. The result is not validated.
pub fn instantiate(
    template: &RuleTemplate,
    author_id: &str,
) -> AutomationRule {
    let now = Utc::now();

    AutomationRule {
        id: utils::uuid(),
        name: template.name.clone(),
        description: template.description.clone(),
        category: template.category.clone(),
        priority: template.priority,
        status: RuleStatus::Inactive,
        nodes: template.nodes.clone(),
        edges: template.edges.clone(),
        declarative_triggers: template.declarative_triggers.clone(),
        declarative_conditions: template.declarative_conditions.clone(),
        declarative_actions: template.declarative_actions.clone(),
        execution: ExecutionSettings {
            last_run: None,
            next_run: None,
            ..template.execution.clone()
        },
        metadata: RuleMetadata {
            version: "1.0.0".to_string(),
            author: author_id.to_string(),
            created_at: now,
            updated_at: now,
            tags: template.tags.clone(),
            dependencies: Vec::new(),
        },
    }
}

/// The built-in template catalog.
pub fn builtin() -> Vec<RuleTemplate> {
    vec![high_temperature_alert(), pressure_shutdown()]
}

fn edge(
    src: &str,
    dst: &str,
) -> RuleEdge {
    RuleEdge::new(&format!("{}-{}", src, dst), (src, "out"), (dst, "in"))
}

fn high_temperature_alert() -> RuleTemplate {
    RuleTemplate {
        id: "high-temperature-alert".to_string(),
        name: "High temperature alert".to_string(),
        description: "Notify operators when a device reports a temperature above the threshold.".to_string(),
        category: "monitoring".to_string(),
        priority: Priority::High,
        tags: vec!["temperature".to_string(), "alert".to_string()],
        nodes: vec![
            RuleNode::new("trigger", NodeKind::Trigger)
                .with_config(json!({ "type": "threshold", "device_id": "", "parameter": "temperature", "operator": "greater", "value": 800 }))
                .with_output(Port::new("out", DataType::Boolean)),
            RuleNode::new("notify", NodeKind::Action)
                .with_config(json!({
                    "type": "notify",
                    "channel": "email",
                    "recipients": [],
                    "subject": "High temperature",
                    "message": "Temperature reached {{#trigger.value#}}"
                }))
                .with_input(Port::new("in", DataType::Any)),
        ],
        edges: vec![edge("trigger", "notify")],
        ..Default::default()
    }
}

fn pressure_shutdown() -> RuleTemplate {
    RuleTemplate {
        id: "pressure-shutdown".to_string(),
        name: "Pressure shutdown".to_string(),
        description: "Stop a pump when the line pressure leaves its safe range and page the on-call engineer.".to_string(),
        category: "safety".to_string(),
        priority: Priority::Critical,
        tags: vec!["pressure".to_string(), "safety".to_string()],
        nodes: vec![
            RuleNode::new("trigger", NodeKind::Trigger)
                .with_config(json!({ "type": "device_event", "device_id": "", "event": "pressure_reading" }))
                .with_output(Port::new("out", DataType::Boolean)),
            RuleNode::new("unsafe", NodeKind::Condition)
                .with_config(json!({ "type": "compare", "field": "pressure", "operator": "greater", "value": 6.5 }))
                .with_input(Port::new("in", DataType::Boolean))
                .with_output(Port::new("out", DataType::Boolean)),
            RuleNode::new("stop_pump", NodeKind::Action)
                .with_config(json!({ "type": "set_parameter", "device_id": "", "parameter": "running", "value": false }))
                .with_input(Port::new("in", DataType::Any)),
            RuleNode::new("page", NodeKind::Action)
                .with_config(json!({ "type": "notify", "channel": "sms", "recipients": [], "message": "Pressure at {{@pressure@}}, pump stopped" }))
                .with_input(Port::new("in", DataType::Any)),
        ],
        edges: vec![edge("trigger", "unsafe"), edge("unsafe", "stop_pump"), edge("unsafe", "page")],
        execution: ExecutionSettings {
            retry_count: 2,
            timeout_seconds: 30,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate;

    #[test]
    fn test_instantiate() {
        let template = high_temperature_alert();
        let first = instantiate(&template, "u-1");
        let second = instantiate(&template, "u-1");

        assert_ne!(first.id, second.id);
        assert_eq!(first.nodes, second.nodes);
        assert_eq!(first.edges, second.edges);
        assert_eq!(first.metadata.tags, template.tags);
        assert_eq!(first.metadata.author, "u-1");
        assert_eq!(first.metadata.version, "1.0.0");
        assert_eq!(first.metadata.created_at, first.metadata.updated_at);
        assert_eq!(first.status, RuleStatus::Inactive);
    }

    #[test]
    fn test_builtin_templates_validate() {
        for template in builtin() {
            let rule = instantiate(&template, "u-1");
            let report = validate(&rule);
            assert!(report.is_valid, "{}: {:?}", template.id, report.messages());
        }
    }

    #[test]
    fn test_instantiate_does_not_validate() {
        let template = RuleTemplate {
            id: "empty".to_string(),
            name: "Empty".to_string(),
            ..Default::default()
        };
        let rule = instantiate(&template, "u-1");
        assert!(rule.nodes.is_empty());
        assert!(!validate(&rule).is_valid);
    }
}
