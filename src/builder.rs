use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::{
    Config, ExecutionTracker, Result, RuleflowError, StoreType,
    evaluator::{EvaluatorRegistry, NodeEvaluator},
    model::NodeKind,
    store::{DbStore, MemStore, Store},
};

pub struct TrackerBuilder {
    config: Config,
    rt: Option<Arc<Runtime>>,
    db: Option<Box<dyn DbStore>>,
    evaluators: EvaluatorRegistry,
}

impl Default for TrackerBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            rt: None,
            db: None,
            evaluators: EvaluatorRegistry::new(),
        }
    }
}

impl TrackerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.config.tracker.async_worker_thread_number = n;
        self
    }

    pub fn retry_interval_ms(
        mut self,
        ms: u64,
    ) -> Self {
        self.config.tracker.retry_interval_ms = ms;
        self
    }

    /// Adds a variable for `{{$NAME$}}` placeholders.
    pub fn env(
        mut self,
        name: &str,
        value: &str,
    ) -> Self {
        self.config.env.insert(name.to_string(), value.to_string());
        self
    }

    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    /// Uses `db` as the storage backend instead of the configured one.
    pub fn store(
        mut self,
        db: impl DbStore + 'static,
    ) -> Self {
        self.db = Some(Box::new(db));
        self
    }

    /// Registers an evaluator for nodes of `kind` with config type `name`,
    /// replacing a built-in one if any.
    pub fn evaluator(
        mut self,
        kind: NodeKind,
        name: &str,
        evaluator: Arc<dyn NodeEvaluator>,
    ) -> Self {
        self.evaluators.register(kind, name, evaluator);
        self
    }

    pub fn build(self) -> Result<ExecutionTracker> {
        let runtime = match self.rt {
            Some(rt) => rt,
            None => Arc::new(
                Builder::new_multi_thread()
                    .worker_threads(self.config.tracker.async_worker_thread_number.max(1).into())
                    .enable_all()
                    .build()
                    .map_err(|err| RuleflowError::Tracker(format!("failed to build runtime: {}", err)))?,
            ),
        };

        let store = Store::new();
        let db: Box<dyn DbStore> = match self.db {
            Some(db) => db,
            None => match self.config.store.store_type {
                StoreType::Mem => Box::new(MemStore::new()),
            },
        };
        db.init(&store);

        Ok(ExecutionTracker::new(&self.config, runtime, Arc::new(store), self.evaluators))
    }
}
