use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::{
    Result,
    evaluator::{NodeEvaluator, NodeOutput},
    model::{RuleNode, TriggerConfig, TriggerKind},
    runtime::Context,
};

/// Decides whether the trigger source of a run matches a trigger node.
pub struct TriggerEvaluator;

impl TriggerEvaluator {
    fn fires(
        &self,
        ctx: &Context,
        config: &TriggerConfig,
    ) -> (bool, serde_json::Value) {
        let trigger = ctx.trigger();
        let from_device = |device_id: &str| trigger.source_id.as_deref().is_none_or(|id| id == device_id);

        match config {
            TriggerConfig::Threshold {
                device_id,
                parameter,
                operator,
                value,
            } => {
                let actual = ctx.lookup(parameter);
                let matched_device = device_id.as_deref().filter(|id| !id.is_empty()).is_none_or(from_device);
                let fired = matched_device && actual.as_ref().is_some_and(|actual| operator.apply(actual, value));
                (fired, json!({ "fired": fired, "parameter": parameter, "value": actual }))
            }
            TriggerConfig::DeviceEvent { device_id, event } => {
                let fired = trigger.kind == TriggerKind::DeviceEvent
                    && (device_id.is_empty() || trigger.source_id.as_deref() == Some(device_id.as_str()))
                    && ctx.payload().get("event").and_then(|v| v.as_str()) == Some(event.as_str());
                (fired, json!({ "fired": fired, "device_id": device_id, "event": event }))
            }
            TriggerConfig::Schedule { cron } => {
                let fired = matches!(trigger.kind, TriggerKind::Schedule | TriggerKind::Manual);
                (fired, json!({ "fired": fired, "cron": cron }))
            }
            TriggerConfig::Manual => (true, json!({ "fired": true })),
        }
    }
}

#[async_trait]
impl NodeEvaluator for TriggerEvaluator {
    async fn evaluate(
        &self,
        ctx: Arc<Context>,
        node: Arc<RuleNode>,
    ) -> Result<NodeOutput> {
        let config = TriggerConfig::parse(&node.config)?;
        let (fired, value) = self.fires(&ctx, &config);
        if !fired {
            ctx.emit_log(&node.id, format!("trigger '{}' did not fire", node.id));
            return Ok(NodeOutput::blocked(value));
        }
        Ok(NodeOutput::passed(value))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::{Value, json};

    use super::*;
    use crate::{
        model::{NodeKind, TriggerSource},
        runtime::Channel,
    };

    fn evaluate(
        trigger: TriggerSource,
        config: Value,
    ) -> NodeOutput {
        let runtime = Arc::new(tokio::runtime::Runtime::new().unwrap());
        let channel = Arc::new(Channel::new(runtime.handle().clone()));
        let ctx = Arc::new(Context::new("r1", "e1", trigger, &HashMap::new(), channel));
        let node = Arc::new(RuleNode::new("t1", NodeKind::Trigger).with_config(config));

        runtime.block_on(TriggerEvaluator.evaluate(ctx, node)).unwrap()
    }

    #[test]
    fn test_threshold_fires() {
        let config = json!({ "type": "threshold", "device_id": "boiler-1", "parameter": "temperature", "operator": "greater", "value": 800 });

        let hot = evaluate(TriggerSource::device_event("boiler-1", json!({ "temperature": 850 })), config.clone());
        assert!(hot.passed);
        assert_eq!(hot.value["value"], json!(850));

        let cold = evaluate(TriggerSource::device_event("boiler-1", json!({ "temperature": 700 })), config.clone());
        assert!(!cold.passed);

        let other = evaluate(TriggerSource::device_event("boiler-2", json!({ "temperature": 850 })), config.clone());
        assert!(!other.passed);

        let missing = evaluate(TriggerSource::device_event("boiler-1", json!({})), config);
        assert!(!missing.passed);
        assert_eq!(missing.value["value"], Value::Null);
    }

    #[test]
    fn test_threshold_without_device() {
        let config = json!({ "type": "threshold", "device_id": "", "parameter": "pressure", "operator": "between", "value": [1, 3] });
        assert!(evaluate(TriggerSource::manual(json!({ "pressure": 2 })), config).passed);
    }

    #[test]
    fn test_device_event() {
        let config = json!({ "type": "device_event", "device_id": "door-1", "event": "opened" });

        assert!(evaluate(TriggerSource::device_event("door-1", json!({ "event": "opened" })), config.clone()).passed);
        assert!(!evaluate(TriggerSource::device_event("door-1", json!({ "event": "closed" })), config.clone()).passed);
        assert!(!evaluate(TriggerSource::manual(json!({ "event": "opened" })), config).passed);
    }

    #[test]
    fn test_schedule_and_manual() {
        assert!(evaluate(TriggerSource::manual(json!({})), json!({ "type": "schedule", "cron": "0 * * * *" })).passed);
        assert!(!evaluate(TriggerSource::device_event("d", json!({})), json!({ "type": "schedule", "cron": "0 * * * *" })).passed);
        assert!(evaluate(TriggerSource::device_event("d", json!({})), json!({ "type": "manual" })).passed);
    }
}
