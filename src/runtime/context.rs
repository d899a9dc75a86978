use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use crate::{
    common::MemCache,
    events::{Event, Log},
    model::TriggerSource,
    runtime::Channel,
    utils,
};

const OUTPUT_CACHE_SIZE: usize = 1024;

/// State shared by the nodes of one execution attempt.
///
/// Every attempt gets a fresh context, so outputs of a failed attempt never
/// leak into its retry.
#[derive(Clone)]
pub struct Context {
    rule_id: String,
    eid: String,
    trigger: TriggerSource,
    env: Arc<MemCache<String, String>>,
    outputs: Arc<MemCache<String, Value>>,
    channel: Arc<Channel>,
}

impl Context {
    pub fn new(
        rule_id: &str,
        eid: &str,
        trigger: TriggerSource,
        env: &HashMap<String, String>,
        channel: Arc<Channel>,
    ) -> Self {
        let vars = MemCache::new(env.len().max(16));
        for (k, v) in env.iter() {
            vars.set(k.clone(), v.clone());
        }

        Self {
            rule_id: rule_id.to_string(),
            eid: eid.to_string(),
            trigger,
            env: Arc::new(vars),
            outputs: Arc::new(MemCache::new(OUTPUT_CACHE_SIZE)),
            channel,
        }
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    /// Id of the execution attempt this context belongs to.
    pub fn eid(&self) -> &str {
        &self.eid
    }

    pub fn trigger(&self) -> &TriggerSource {
        &self.trigger
    }

    pub fn payload(&self) -> &Value {
        &self.trigger.payload
    }

    pub fn env(&self) -> Arc<MemCache<String, String>> {
        self.env.clone()
    }

    pub fn outputs(&self) -> Arc<MemCache<String, Value>> {
        self.outputs.clone()
    }

    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    pub fn add_output(
        &self,
        nid: &str,
        output: Value,
    ) {
        self.outputs.set(nid.to_string(), output);
    }

    /// Resolve a dotted path. A leading segment naming a node that already
    /// produced output reads that output, anything else reads the trigger payload.
    pub fn lookup(
        &self,
        path: &str,
    ) -> Option<Value> {
        let (first, rest) = path.split_once('.').unwrap_or((path, ""));

        if let Some(output) = self.outputs.get(&first.to_string()) {
            return utils::json::select(&output, rest);
        }
        utils::json::select(self.payload(), path)
    }

    pub fn emit_log(
        &self,
        nid: &str,
        content: String,
    ) {
        let log = Log {
            rule_id: self.rule_id.clone(),
            eid: self.eid.clone(),
            nid: nid.to_string(),
            content,
            timestamp: utils::time::time_millis(),
        };
        let _ = self.channel.log_queue().send(Event::new(&log));
    }
}
