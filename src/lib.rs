//! # Ruleflow
//!
//! Ruleflow is an embeddable automation-rule core for IoT services.
//! Rules are directed graphs of trigger, condition and action nodes; the
//! crate validates them, instantiates them from templates and tracks their
//! executions with retries, timeouts and cancellation.
//!
//! ## Core Features
//!
//! - **Graph Model**: rules as node/edge graphs with typed ports, pure graph mutations
//! - **Validation**: every structural and semantic problem reported at once
//! - **Execution Tracking**: an async, event-driven tracker powered by `tokio`
//! - **Pluggable Evaluation**: built-in triggers, conditions and actions, replaceable per type
//! - **Pluggable Storage**: an in-memory store behind collection traits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ruleflow::{AutomationRule, TrackerBuilder, TriggerSource};
//!
//! let tracker = TrackerBuilder::new().build()?;
//! tracker.launch();
//!
//! let rule = AutomationRule::from_json(json_str)?;
//! tracker.save_rule(&rule)?;
//! let run = tracker.start_run(&rule.id, TriggerSource::device_event("boiler-1", payload))?;
//! run.wait();
//! ```

mod builder;
mod common;
mod config;
mod dispatcher;
mod error;
mod evaluator;
pub mod events;
mod graph;
pub mod metrics;
mod model;
mod runtime;
pub mod store;
pub mod template;
mod tracker;
mod utils;
mod validator;

use std::sync::{Arc, RwLock};

pub use builder::TrackerBuilder;
pub use config::{Config, StoreConfig, StoreType, TrackerConfig};
pub use error::RuleflowError;
pub use evaluator::{ActionEvaluator, ConditionEvaluator, EvaluatorRegistry, NodeEvaluator, NodeOutput, TriggerEvaluator};
pub use graph::{RuleGraph, add_edge, add_node, remove_edge, remove_node, topological_order};
pub use model::*;
pub use runtime::{Channel, ChannelEvent, ChannelOptions, Context, Run, RunStatus};
pub use tracker::ExecutionTracker;
pub use validator::{ValidationIssue, ValidationReport, validate};

/// Result type alias for Ruleflow operations.
pub type Result<T> = std::result::Result<T, RuleflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
