use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use serde_json::json;

use crate::{
    Result, RuleflowError,
    evaluator::{NodeEvaluator, NodeOutput},
    model::{ConditionConfig, RuleNode},
    runtime::Context,
};

fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|err| RuleflowError::Action(format!("invalid time '{}': {}", value, err)))
}

/// `[after, before)`; a window whose end is earlier than its start wraps past midnight.
fn in_window(
    now: NaiveTime,
    after: NaiveTime,
    before: NaiveTime,
) -> bool {
    if after <= before {
        after <= now && now < before
    } else {
        now >= after || now < before
    }
}

/// Gates the branch below a condition node.
pub struct ConditionEvaluator;

#[async_trait]
impl NodeEvaluator for ConditionEvaluator {
    async fn evaluate(
        &self,
        ctx: Arc<Context>,
        node: Arc<RuleNode>,
    ) -> Result<NodeOutput> {
        let (passed, value) = match ConditionConfig::parse(&node.config)? {
            ConditionConfig::Compare { field, operator, value } => {
                let actual = ctx.lookup(&field);
                let passed = actual.as_ref().is_some_and(|actual| operator.apply(actual, &value));
                tracing::debug!(node_id = %node.id, field = %field, operator = operator.as_ref(), passed, "compare condition");
                (passed, actual.unwrap_or_default())
            }
            ConditionConfig::TimeWindow { after, before } => {
                let now = Utc::now().time();
                let passed = in_window(now, parse_time(&after)?, parse_time(&before)?);
                (passed, json!(now.format("%H:%M").to_string()))
            }
        };

        let output = json!({ "passed": passed, "value": value });
        if passed {
            Ok(NodeOutput::passed(output))
        } else {
            Ok(NodeOutput::blocked(output))
        }
    }
}
