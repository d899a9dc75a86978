mod collect;
mod r#impl;

use std::{collections::HashMap, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;

use crate::{
    Result,
    store::{DbCollection, DbStore, Store, data::*},
};
pub use collect::Collect;

#[derive(Debug, Clone)]
pub struct MemStore {
    rules: Arc<Collect<Rule>>,
    executions: Arc<Collect<Execution>>,
    logs: Arc<Collect<Log>>,
    events: Arc<Collect<Event>>,
}

/// A record the in-memory collections can filter and sort.
trait DbDocument: Serialize + DeserializeOwned {
    fn id(&self) -> &str;
    fn doc(&self) -> Result<HashMap<String, JsonValue>>;
}

impl DbStore for MemStore {
    fn init(
        &self,
        s: &Store,
    ) {
        s.register(self.rules());
        s.register(self.executions());
        s.register(self.logs());
        s.register(self.events());
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(Collect::new("rules")),
            executions: Arc::new(Collect::new("executions")),
            logs: Arc::new(Collect::new("logs")),
            events: Arc::new(Collect::new("events")),
        }
    }

    pub fn rules(&self) -> Arc<dyn DbCollection<Item = Rule> + Send + Sync> {
        self.rules.clone()
    }

    pub fn executions(&self) -> Arc<dyn DbCollection<Item = Execution> + Send + Sync> {
        self.executions.clone()
    }

    pub fn logs(&self) -> Arc<dyn DbCollection<Item = Log> + Send + Sync> {
        self.logs.clone()
    }

    pub fn events(&self) -> Arc<dyn DbCollection<Item = Event> + Send + Sync> {
        self.events.clone()
    }
}
