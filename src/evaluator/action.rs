use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::{
    Result, RuleflowError,
    evaluator::{NodeEvaluator, NodeOutput, interpolate, webhook},
    model::{ActionConfig, RuleNode},
    runtime::Context,
};

/// Built-in actions.
///
/// `notify` and `set_parameter` record what would be delivered and leave the
/// transport to the embedding service, which can register its own evaluator
/// under the same type. `webhook` performs the HTTP call.
#[derive(Default)]
pub struct ActionEvaluator {
    client: reqwest::Client,
}

#[async_trait]
impl NodeEvaluator for ActionEvaluator {
    async fn evaluate(
        &self,
        ctx: Arc<Context>,
        node: Arc<RuleNode>,
    ) -> Result<NodeOutput> {
        let output = match ActionConfig::parse(&node.config)? {
            ActionConfig::Notify(notify) => {
                let message = interpolate::resolve_template(&ctx, &notify.message)?;
                let subject = notify.subject.as_deref().map(|s| interpolate::resolve_template(&ctx, s)).transpose()?;
                ctx.emit_log(&node.id, format!("notify via {} to [{}]: {}", notify.channel.as_ref(), notify.recipients.join(", "), message));
                json!({
                    "channel": notify.channel,
                    "recipients": notify.recipients,
                    "subject": subject,
                    "message": message,
                    "status": "queued",
                })
            }
            ActionConfig::SetParameter(set) => {
                let value = interpolate::resolve_json_value(&ctx, &set.value)?;
                ctx.emit_log(&node.id, format!("set {}.{} = {}", set.device_id, set.parameter, value));
                json!({
                    "device_id": set.device_id,
                    "parameter": set.parameter,
                    "value": value,
                    "status": "queued",
                })
            }
            ActionConfig::Webhook(hook) => webhook::call(&self.client, &ctx, &hook).await?,
            ActionConfig::Custom { kind, .. } => {
                return Err(RuleflowError::NodeEvaluation {
                    node_id: node.id.clone(),
                    message: format!("no built-in action '{}'", kind),
                });
            }
        };

        Ok(NodeOutput::passed(output))
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

    fn evaluate(config: Value) -> Result<NodeOutput> {
        let runtime = Arc::new(tokio::runtime::Runtime::new().unwrap());
        let channel = Arc::new(Channel::new(runtime.handle().clone()));
        let ctx = Arc::new(Context::new(
            "r1",
            "e1",
            TriggerSource::device_event("boiler-1", json!({ "temperature": 850 })),
            &HashMap::from([("SITE".to_string(), "plant-a".to_string())]),
            channel,
        ));
        ctx.add_output("t1", json!({ "fired": true, "value": 850 }));
        let node = Arc::new(RuleNode::new("a1", NodeKind::Action).with_config(config));

        runtime.block_on(ActionEvaluator::default().evaluate(ctx, node))
    }

    #[test]
    fn test_notify() {
        let out = evaluate(json!({
            "type": "notify",
            "channel": "email",
            "recipients": ["ops@example.com"],
            "subject": "[{{$SITE$}}] alert",
            "message": "temperature is {{#t1.value#}}{{@unit@}}"
        }));
        // unit is not part of the payload
        assert!(out.is_err());

        let out = evaluate(json!({
            "type": "notify",
            "channel": "email",
            "recipients": ["ops@example.com"],
            "subject": "[{{$SITE$}}] alert",
            "message": "temperature is {{#t1.value#}}"
        }))
        .unwrap();
        assert!(out.passed);
        assert_eq!(out.value["subject"], json!("[plant-a] alert"));
        assert_eq!(out.value["message"], json!("temperature is 850"));
        assert_eq!(out.value["channel"], json!("email"));
        assert_eq!(out.value["status"], json!("queued"));
    }

    #[test]
    fn test_set_parameter() {
        let out = evaluate(json!({ "type": "set_parameter", "device_id": "boiler-1", "parameter": "target", "value": "{{@temperature@}}" })).unwrap();
        assert_eq!(out.value["value"], json!(850));
    }

    #[test]
    fn test_custom_action_fails() {
        let err = evaluate(json!({ "type": "open_valve", "valve": "v1" })).err().unwrap();
        assert!(matches!(err, RuleflowError::NodeEvaluation { .. }));
    }
}
