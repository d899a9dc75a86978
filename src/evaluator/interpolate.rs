//! Placeholder substitution for action parameters.
//!
//! - `{{#node_id.key#}}` reads an upstream node output (nested keys allowed)
//! - `{{@path@}}` reads the trigger payload
//! - `{{$NAME$}}` reads the configured environment

use regex::Regex;
use serde_json::Value;

use crate::{Result, RuleflowError, runtime::Context, utils::json};

const OUTPUT_PATTERN: &str = r"\{\{#([^.#]+)\.([^#]+)#\}\}";
const PAYLOAD_PATTERN: &str = r"\{\{@([^@]+)@\}\}";
const ENV_PATTERN: &str = r"\{\{\$([^$]+)\$\}\}";

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| RuleflowError::Action(e.to_string()))
}

/// Substitute every placeholder in `template`.
///
/// All unresolved placeholders are reported together.
pub fn resolve_template(
    ctx: &Context,
    template: &str,
) -> Result<String> {
    let mut result = template.to_string();
    let mut errors: Vec<String> = Vec::new();

    for caps in compile(ENV_PATTERN)?.captures_iter(template) {
        match ctx.env().get(&caps[1].to_string()) {
            Some(value) => result = result.replace(&caps[0], &value),
            None => errors.push(format!("env variable '{}' not found", &caps[1])),
        }
    }

    for caps in compile(PAYLOAD_PATTERN)?.captures_iter(template) {
        match json::select(ctx.payload(), &caps[1]) {
            Some(value) => result = result.replace(&caps[0], &json::to_text(&value)),
            None => errors.push(format!("payload field '{}' not found", &caps[1])),
        }
    }

    for caps in compile(OUTPUT_PATTERN)?.captures_iter(template) {
        let resolved = ctx.outputs().get(&caps[1].to_string()).and_then(|output| json::select(&output, &caps[2]));
        match resolved {
            Some(value) => result = result.replace(&caps[0], &json::to_text(&value)),
            None => errors.push(format!("variable '{}' not found", &caps[0])),
        }
    }

    if !errors.is_empty() {
        return Err(RuleflowError::Action(errors.join(", ")));
    }

    Ok(result)
}

/// Resolve placeholders in every string leaf of a JSON value.
///
/// A string that is exactly one placeholder keeps the referenced value's JSON type.
pub fn resolve_json_value(
    ctx: &Context,
    value: &Value,
) -> Result<Value> {
    match value {
        Value::String(s) => {
            if let Some(whole) = single_placeholder(ctx, s)? {
                return Ok(whole);
            }
            Ok(Value::String(resolve_template(ctx, s)?))
        }
        Value::Array(arr) => {
            let resolved: Result<Vec<Value>> = arr.iter().map(|v| resolve_json_value(ctx, v)).collect();
            Ok(Value::Array(resolved?))
        }
        Value::Object(obj) => {
            let resolved: Result<serde_json::Map<String, Value>> = obj.iter().map(|(k, v)| resolve_json_value(ctx, v).map(|rv| (k.clone(), rv))).collect();
            Ok(Value::Object(resolved?))
        }
        _ => Ok(value.clone()),
    }
}

fn single_placeholder(
    ctx: &Context,
    s: &str,
) -> Result<Option<Value>> {
    let payload = compile(&format!("^{}$", PAYLOAD_PATTERN))?;
    if let Some(caps) = payload.captures(s) {
        return json::select(ctx.payload(), &caps[1]).map(Some).ok_or_else(|| RuleflowError::Action(format!("payload field '{}' not found", &caps[1])));
    }

    let output = compile(&format!("^{}$", OUTPUT_PATTERN))?;
    if let Some(caps) = output.captures(s) {
        return ctx
            .outputs()
            .get(&caps[1].to_string())
            .and_then(|o| json::select(&o, &caps[2]))
            .map(Some)
            .ok_or_else(|| RuleflowError::Action(format!("variable '{}' not found", &caps[0])));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use serde_json::json;

    use super::*;
    use crate::{model::TriggerSource, runtime::Channel};

    fn create_test_context() -> Context {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let channel = Arc::new(Channel::new(runtime.handle().clone()));
        let env = HashMap::from([("SITE".to_string(), "plant-a".to_string())]);
        Context::new("r1", "e1", TriggerSource::device_event("boiler-1", json!({ "temperature": 850, "unit": "C" })), &env, channel)
    }

    // ==================== resolve_template tests ====================

    #[test]
    fn test_resolve_template_no_variables() {
        let ctx = create_test_context();
        assert_eq!(resolve_template(&ctx, "hello world").unwrap(), "hello world");
    }

    #[test]
    fn test_resolve_template_payload() {
        let ctx = create_test_context();
        let result = resolve_template(&ctx, "temperature {{@temperature@}}{{@unit@}}").unwrap();
        assert_eq!(result, "temperature 850C");
    }

    #[test]
    fn test_resolve_template_nested_output() {
        let ctx = create_test_context();
        ctx.add_output("t", json!({ "reading": { "value": 850 } }));

        let result = resolve_template(&ctx, "read {{#t.reading.value#}}").unwrap();
        assert_eq!(result, "read 850");
    }

    #[test]
    fn test_resolve_template_mixed() {
        let ctx = create_test_context();
        ctx.add_output("c", json!({ "passed": true }));

        let result = resolve_template(&ctx, "[{{$SITE$}}] passed={{#c.passed#}} at {{@temperature@}}").unwrap();
        assert_eq!(result, "[plant-a] passed=true at 850");
    }

    #[test]
    fn test_resolve_template_reports_all_missing() {
        let ctx = create_test_context();
        let err = resolve_template(&ctx, "{{$NOPE$}} {{@pressure@}} {{#ghost.value#}}").unwrap_err().to_string();

        assert!(err.contains("env variable 'NOPE' not found"));
        assert!(err.contains("payload field 'pressure' not found"));
        assert!(err.contains("variable '{{#ghost.value#}}' not found"));
    }

    // ==================== resolve_json_value tests ====================

    #[test]
    fn test_resolve_json_value_keeps_types() {
        let ctx = create_test_context();
        ctx.add_output("t", json!({ "fired": true }));

        let value = json!({
            "reading": "{{@temperature@}}",
            "fired": "{{#t.fired#}}",
            "label": "{{$SITE$}}-{{@unit@}}",
            "list": ["{{@unit@}}", 1]
        });
        let resolved = resolve_json_value(&ctx, &value).unwrap();

        assert_eq!(
            resolved,
            json!({
                "reading": 850,
                "fired": true,
                "label": "plant-a-C",
                "list": ["C", 1]
            })
        );
    }

    #[test]
    fn test_resolve_json_value_missing() {
        let ctx = create_test_context();
        assert!(resolve_json_value(&ctx, &json!({ "x": "{{@missing@}}" })).is_err());
    }
}
