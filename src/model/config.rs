//! Typed views over the open `config` map of a node.
//!
//! Each kind has a closed set of config shapes selected by the `type` key.
//! Raw maps are checked against a JSON schema before being decoded. Each
//! schema is compiled once, on first use.

use std::{collections::HashMap, sync::LazyLock};

use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{Result, RuleflowError, model::ConditionOperator};

type CompiledSchema = std::result::Result<Validator, String>;

static TRIGGER_SCHEMA: LazyLock<CompiledSchema> = LazyLock::new(|| compile(TriggerConfig::schema()));
static CONDITION_SCHEMA: LazyLock<CompiledSchema> = LazyLock::new(|| compile(ConditionConfig::schema()));
static NOTIFY_SCHEMA: LazyLock<CompiledSchema> = LazyLock::new(|| compile(ActionConfig::notify_schema()));
static SET_PARAMETER_SCHEMA: LazyLock<CompiledSchema> = LazyLock::new(|| compile(ActionConfig::set_parameter_schema()));
static WEBHOOK_SCHEMA: LazyLock<CompiledSchema> = LazyLock::new(|| compile(ActionConfig::webhook_schema()));

fn compile(schema: Value) -> CompiledSchema {
    jsonschema::validator_for(&schema).map_err(|err| err.to_string())
}

fn decode<T: serde::de::DeserializeOwned>(
    schema: &CompiledSchema,
    config: Value,
) -> Result<T> {
    let validator = schema.as_ref().map_err(|err| RuleflowError::Action(format!("invalid config schema: {}", err)))?;
    validator.validate(&config)?;
    Ok(serde_json::from_value::<T>(config)?)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    Threshold {
        #[serde(default)]
        device_id: Option<String>,
        parameter: String,
        operator: ConditionOperator,
        value: Value,
    },
    DeviceEvent {
        device_id: String,
        event: String,
    },
    Schedule {
        cron: String,
    },
    Manual,
}

impl TriggerConfig {
    pub fn parse(config: &Map<String, Value>) -> Result<Self> {
        decode(&TRIGGER_SCHEMA, Value::Object(config.clone()))
    }

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["type"],
            "oneOf": [
                {
                    "properties": {
                        "type": { "const": "threshold" },
                        "device_id": { "type": ["string", "null"] },
                        "parameter": { "type": "string", "minLength": 1 },
                        "operator": { "enum": ["equals", "greater", "less", "contains", "between"] },
                        "value": {}
                    },
                    "required": ["parameter", "operator", "value"]
                },
                {
                    "properties": {
                        "type": { "const": "device_event" },
                        "device_id": { "type": "string" },
                        "event": { "type": "string" }
                    },
                    "required": ["device_id", "event"]
                },
                {
                    "properties": {
                        "type": { "const": "schedule" },
                        "cron": { "type": "string" }
                    },
                    "required": ["cron"]
                },
                {
                    "properties": { "type": { "const": "manual" } }
                }
            ]
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionConfig {
    /// Compare a payload field (or `node_id.key` upstream output) with a value.
    Compare {
        field: String,
        operator: ConditionOperator,
        value: Value,
    },
    /// Passes while the evaluation time (UTC, `HH:MM`) is inside `[after, before)`.
    TimeWindow {
        after: String,
        before: String,
    },
}

impl ConditionConfig {
    /// Decode a condition config; a missing `type` means `compare`.
    pub fn parse(config: &Map<String, Value>) -> Result<Self> {
        let mut config = config.clone();
        config.entry("type").or_insert_with(|| json!("compare"));
        decode(&CONDITION_SCHEMA, Value::Object(config))
    }

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "oneOf": [
                {
                    "properties": {
                        "type": { "const": "compare" },
                        "field": { "type": "string", "minLength": 1 },
                        "operator": { "enum": ["equals", "greater", "less", "contains", "between"] },
                        "value": {}
                    },
                    "required": ["field", "operator", "value"]
                },
                {
                    "properties": {
                        "type": { "const": "time_window" },
                        "after": { "type": "string", "pattern": "^[0-2][0-9]:[0-5][0-9]$" },
                        "before": { "type": "string", "pattern": "^[0-2][0-9]:[0-5][0-9]$" }
                    },
                    "required": ["after", "before"]
                }
            ]
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotifyChannel {
    Email,
    Sms,
    Push,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NotifyConfig {
    pub channel: NotifyChannel,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SetParameterConfig {
    pub device_id: String,
    pub parameter: String,
    pub value: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationType {
    NoAuth,
    Basic,
    Bearer,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    pub auth_type: AuthorizationType,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Header carrying the credential, `Authorization` when unset.
    #[serde(default)]
    pub header: Option<String>,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            auth_type: AuthorizationType::NoAuth,
            api_key: None,
            header: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

fn default_webhook_timeout() -> u64 {
    10_000
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WebhookConfig {
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub auth: AuthorizationConfig,
    /// JSON body; string leaves support placeholders.
    #[serde(default)]
    pub body: Option<Value>,
    /// Request timeout in milliseconds.
    #[serde(default = "default_webhook_timeout")]
    pub timeout: u64,
}

/// Action settings. Unknown `type`s are kept as [`ActionConfig::Custom`] for
/// evaluators registered by the embedding service.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionConfig {
    Notify(NotifyConfig),
    SetParameter(SetParameterConfig),
    Webhook(WebhookConfig),
    Custom {
        kind: String,
        params: Map<String, Value>,
    },
}

impl ActionConfig {
    pub fn parse(config: &Map<String, Value>) -> Result<Self> {
        let kind = config.get("type").and_then(Value::as_str).ok_or_else(|| RuleflowError::Action("action config is missing 'type'".to_string()))?;
        let value = Value::Object(config.clone());

        match kind {
            "notify" => Ok(ActionConfig::Notify(decode(&NOTIFY_SCHEMA, value)?)),
            "set_parameter" => Ok(ActionConfig::SetParameter(decode(&SET_PARAMETER_SCHEMA, value)?)),
            "webhook" => Ok(ActionConfig::Webhook(decode(&WEBHOOK_SCHEMA, value)?)),
            other => {
                let mut params = config.clone();
                params.remove("type");
                Ok(ActionConfig::Custom {
                    kind: other.to_string(),
                    params,
                })
            }
        }
    }

    pub fn notify_schema() -> Value {
        json!({
            "type": "object",
            "required": ["channel", "message"],
            "properties": {
                "channel": { "enum": ["email", "sms", "push"] },
                "recipients": { "type": "array", "items": { "type": "string" } },
                "subject": { "type": ["string", "null"] },
                "message": { "type": "string", "description": "Message text, supports placeholders" }
            }
        })
    }

    pub fn set_parameter_schema() -> Value {
        json!({
            "type": "object",
            "required": ["device_id", "parameter", "value"],
            "properties": {
                "device_id": { "type": "string" },
                "parameter": { "type": "string", "minLength": 1 },
                "value": {}
            }
        })
    }

    pub fn webhook_schema() -> Value {
        json!({
            "type": "object",
            "required": ["url", "method"],
            "properties": {
                "url": { "type": "string", "description": "Request URL, supports placeholders" },
                "method": { "enum": ["GET", "POST", "PUT", "PATCH", "DELETE"] },
                "headers": { "type": "object", "additionalProperties": { "type": "string" } },
                "params": { "type": "object", "additionalProperties": { "type": "string" } },
                "auth": {
                    "type": "object",
                    "required": ["auth_type"],
                    "properties": {
                        "auth_type": { "enum": ["no_auth", "basic", "bearer", "custom"] },
                        "api_key": { "type": ["string", "null"] },
                        "header": { "type": ["string", "null"] }
                    }
                },
                "body": {},
                "timeout": { "type": "integer", "minimum": 0, "description": "Request timeout in milliseconds" }
            }
        })
    }
}
