mod config;
mod edge;
mod execution;
mod metrics;
mod node;
mod operator;
mod rule;
mod template;

pub use config::{
    ActionConfig, AuthorizationConfig, AuthorizationType, ConditionConfig, HttpMethod, NotifyChannel, NotifyConfig, SetParameterConfig, TriggerConfig, WebhookConfig,
};
pub use edge::RuleEdge;
pub use execution::{Execution, ExecutionMetrics, ExecutionStatus, NodeResult, NodeStatus, TriggerKind, TriggerSource};
pub use metrics::{AutomationMetrics, NodeTypeMetrics, RuleMetrics};
pub use node::{DataType, NodeKind, Port, RuleNode};
pub use operator::{ConditionOperator, between_bounds};
pub use rule::{AutomationRule, DeclarativeItem, ExecutionMode, ExecutionSettings, Priority, RuleMetadata, RuleStatus};
pub use template::RuleTemplate;
