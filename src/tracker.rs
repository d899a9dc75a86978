//! Execution tracker - the main entry point for ruleflow.
//!
//! The tracker owns the async runtime, the event channel and the store. It
//! turns a run request into a sequence of execution attempts:
//! - validating the rule before anything is recorded
//! - driving each attempt through the dispatcher
//! - retrying failed or timed out attempts with a fresh timeout budget
//! - cooperative cancellation through any attempt id of a run

mod monitor;

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::{
    Config, Result, RuleflowError, ShareLock,
    common::Shutdown,
    dispatcher::Dispatcher,
    evaluator::EvaluatorRegistry,
    events::{ExecutionEvent, Message, RunEvent, TrackerEvent},
    graph::RuleGraph,
    metrics,
    model::{AutomationMetrics, AutomationRule, Execution, ExecutionStatus, TriggerSource},
    runtime::{Channel, Context, Run, RunStatus},
    store::{PageData, Pagination, RunTimestamps, Store, data},
    validator,
};

use monitor::Monitor;

/// The execution tracker.
///
/// # Example
///
/// ```rust,ignore
/// let tracker = TrackerBuilder::new().build()?;
/// tracker.launch();
///
/// tracker.save_rule(&rule)?;
/// let run = tracker.start_run(&rule.id, TriggerSource::manual(payload))?;
/// run.wait();
///
/// tracker.shutdown();
/// ```
pub struct ExecutionTracker {
    /// Event channel for broadcasting tracker events.
    channel: Arc<Channel>,
    /// Rules and the execution ledger.
    store: Arc<Store>,
    /// Background persistence of events, logs and the metrics snapshot.
    monitor: Monitor,
    evaluators: Arc<EvaluatorRegistry>,
    env: Arc<HashMap<String, String>>,
    /// Default delay before a retry, in milliseconds.
    retry_interval_ms: u64,
    /// Live runs, indexed by the id of every attempt.
    runs: ShareLock<HashMap<String, Arc<Run>>>,

    running: Arc<AtomicBool>,
    runtime: Arc<Runtime>,
    shutdown: Arc<Shutdown>,
}

impl ExecutionTracker {
    /// Creates a tracker with its own runtime and a store backend chosen by `config`.
    pub fn new_with_config(config: Config) -> Result<Self> {
        crate::TrackerBuilder::new().config(config).build()
    }

    pub(crate) fn new(
        config: &Config,
        runtime: Arc<Runtime>,
        store: Arc<Store>,
        evaluators: EvaluatorRegistry,
    ) -> Self {
        let channel = Arc::new(Channel::new(runtime.handle().clone()));
        let shutdown = Arc::new(Shutdown::new());
        let monitor = Monitor::new(store.clone(), channel.clone(), runtime.handle().clone(), shutdown.clone(), config.tracker.history_limit);

        Self {
            channel,
            store,
            monitor,
            evaluators: Arc::new(evaluators),
            env: Arc::new(config.env.clone()),
            retry_interval_ms: config.tracker.retry_interval_ms,
            runs: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            runtime,
            shutdown,
        }
    }

    /// Starts the tracker.
    ///
    /// Subscribers registered by the monitor are in place before the channel
    /// starts listening, so no event is missed.
    pub fn launch(&self) {
        if self.running.swap(true, Ordering::Relaxed) {
            return;
        }

        self.monitor.monitor();
        self.channel.listen();
    }

    /// Stops the tracker, cancelling every live run.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        if let Ok(runs) = self.runs.read() {
            for run in runs.values() {
                run.cancel();
            }
        }
        self.shutdown.shutdown();
        self.channel.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Inserts or replaces a rule. Saving never validates.
    pub fn save_rule(
        &self,
        rule: &AutomationRule,
    ) -> Result<bool> {
        self.store.save_rule(rule)
    }

    pub fn load_rule(
        &self,
        rule_id: &str,
    ) -> Result<AutomationRule> {
        self.store.load_rule(rule_id)
    }

    /// Deletes a rule with its executions, events and logs.
    ///
    /// Live runs of the rule are cancelled first; whatever they write
    /// afterwards is refused by the store.
    #[tracing::instrument(skip(self))]
    pub fn delete_rule(
        &self,
        rule_id: &str,
    ) -> Result<bool> {
        for run in self.live_runs(rule_id) {
            run.cancel();
        }

        let deleted = self.store.delete_rule(rule_id)?;
        if let Err(err) = self.monitor.refresh_rule(rule_id) {
            warn!(rule_id, "failed to refresh metrics: {}", err);
        }
        Ok(deleted)
    }

    /// Starts a run of a stored rule and returns its handle.
    ///
    /// The rule is validated first; an invalid rule fails with
    /// [`RuleflowError::RuleInvalid`] and no execution is recorded. Only the
    /// node graph is executed, so a rule authored solely through declarative
    /// lists is rejected the same way.
    #[tracing::instrument(skip(self, trigger))]
    pub fn start_run(
        &self,
        rule_id: &str,
        trigger: TriggerSource,
    ) -> Result<Arc<Run>> {
        if !self.is_running() {
            return Err(RuleflowError::Tracker("tracker is not running".to_string()));
        }

        let rule = self.store.load_rule(rule_id)?;
        let report = validator::validate(&rule);
        if !report.is_valid {
            return Err(RuleflowError::RuleInvalid {
                rule_id: rule.id.clone(),
                errors: report.messages(),
            });
        }
        if rule.nodes.is_empty() {
            return Err(RuleflowError::RuleInvalid {
                rule_id: rule.id.clone(),
                errors: vec!["rule has no nodes to execute".to_string()],
            });
        }
        let graph = RuleGraph::try_from(&rule)?;
        let order = graph.topological_order()?;

        let execution = Execution::new(&rule.id, trigger);
        self.store.append_execution(&execution)?;

        let run = Run::new(&rule.id, &execution.id);
        track(&self.runs, &execution.id, &run);
        info!(execution_id = %execution.id, "run started");

        let driver = Driver {
            retry_interval_ms: rule.execution.retry_interval_ms.unwrap_or(self.retry_interval_ms),
            rule: Arc::new(rule),
            graph: Arc::new(graph),
            order: Arc::new(order),
            evaluators: self.evaluators.clone(),
            store: self.store.clone(),
            channel: self.channel.clone(),
            env: self.env.clone(),
            runs: self.runs.clone(),
            run: run.clone(),
        };
        driver.publish(run.id(), TrackerEvent::Run(RunEvent::Started));
        driver.publish(&execution.id, TrackerEvent::Execution(ExecutionEvent::Pending));
        self.runtime.spawn(driver.drive(execution));

        Ok(run)
    }

    /// Starts a run and returns the id of its first execution.
    pub fn request_run(
        &self,
        rule_id: &str,
        trigger: TriggerSource,
    ) -> Result<String> {
        self.start_run(rule_id, trigger).map(|run| run.id().to_string())
    }

    /// Requests cancellation of the run that `execution_id` belongs to.
    ///
    /// Returns `false` when the run already finished and
    /// [`RuleflowError::ExecutionNotFound`] for an unknown id.
    #[tracing::instrument(skip(self))]
    pub fn cancel(
        &self,
        execution_id: &str,
    ) -> Result<bool> {
        if let Some(run) = self.get_run(execution_id) {
            return Ok(run.cancel());
        }
        self.store.find_execution(execution_id).map(|_| false)
    }

    /// The live run an attempt id belongs to.
    pub fn get_run(
        &self,
        execution_id: &str,
    ) -> Option<Arc<Run>> {
        self.runs.read().ok().and_then(|runs| runs.get(execution_id).cloned())
    }

    /// Live runs of a rule.
    pub fn live_runs(
        &self,
        rule_id: &str,
    ) -> Vec<Arc<Run>> {
        let Ok(runs) = self.runs.read() else {
            return Vec::new();
        };
        // a run is indexed once per attempt, keyed by its first one here
        runs.iter()
            .filter(|(id, run)| run.rule_id() == rule_id && run.id() == id.as_str())
            .map(|(_, run)| run.clone())
            .collect()
    }

    pub fn find_execution(
        &self,
        execution_id: &str,
    ) -> Result<Execution> {
        self.store.find_execution(execution_id)
    }

    /// Executions of a rule, newest first.
    pub fn load_executions(
        &self,
        rule_id: &str,
        page: Pagination,
    ) -> Result<PageData<Execution>> {
        self.store.load_executions(rule_id, page)
    }

    /// Recomputes the metrics from the ledger, for every rule or a single one.
    pub fn get_metrics(
        &self,
        rule_id: Option<&str>,
    ) -> Result<AutomationMetrics> {
        match rule_id {
            None => self.monitor.refresh(),
            Some(rule_id) => Ok(metrics::compute(&self.store.list_rules()?, &self.store.all_executions(Some(rule_id))?, Some(rule_id))),
        }
    }

    /// Events published for a rule, newest first.
    pub fn load_events(
        &self,
        rule_id: &str,
        page: Pagination,
    ) -> Result<PageData<data::Event>> {
        self.store.load_events(rule_id, page)
    }

    /// Log lines written by the evaluators of a rule, newest first.
    pub fn load_logs(
        &self,
        rule_id: &str,
        page: Pagination,
    ) -> Result<PageData<data::Log>> {
        self.store.load_logs(rule_id, page)
    }

    /// The metrics as of the last completed run.
    pub fn metrics_snapshot(&self) -> AutomationMetrics {
        self.monitor.snapshot()
    }

    /// Returns a reference to the event channel.
    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }
}

impl Drop for ExecutionTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn track(
    runs: &ShareLock<HashMap<String, Arc<Run>>>,
    execution_id: &str,
    run: &Arc<Run>,
) {
    if let Ok(mut runs) = runs.write() {
        runs.insert(execution_id.to_string(), run.clone());
    }
}

/// Drives the attempts of one run.
struct Driver {
    rule: Arc<AutomationRule>,
    graph: Arc<RuleGraph>,
    order: Arc<Vec<String>>,
    evaluators: Arc<EvaluatorRegistry>,
    store: Arc<Store>,
    channel: Arc<Channel>,
    env: Arc<HashMap<String, String>>,
    runs: ShareLock<HashMap<String, Arc<Run>>>,
    run: Arc<Run>,
    retry_interval_ms: u64,
}

impl Driver {
    async fn drive(
        self,
        mut execution: Execution,
    ) {
        let max_attempts = self.rule.execution.retry_count.saturating_add(1);

        loop {
            self.run.set_running();
            self.run.notify();

            let ctx = Arc::new(Context::new(&self.rule.id, &execution.id, execution.trigger_source.clone(), &self.env, self.channel.clone()));
            let dispatcher = Dispatcher::new(
                ctx,
                self.graph.clone(),
                self.order.clone(),
                self.evaluators.clone(),
                self.store.clone(),
                self.run.clone(),
                self.rule.execution.timeout_seconds,
            );
            let mut finished = dispatcher.execute(execution).await;

            let status = self.run.settle(finished.status, finished.attempt < max_attempts);
            if status == RunStatus::Cancelled && finished.status != ExecutionStatus::Cancelled {
                finished.finalize(ExecutionStatus::Cancelled, Some("cancelled".to_string()));
            }
            info!(
                rule_id = %self.rule.id,
                execution_id = %finished.id,
                attempt = finished.attempt,
                "attempt finished: {}",
                finished.status.as_ref()
            );
            self.finish_attempt(&finished);

            if status != RunStatus::Retrying {
                self.finish_run(status, finished.error);
                return;
            }

            let mut next = finished.next_attempt();
            self.save(&next);
            self.run.push_execution(&next.id);
            track(&self.runs, &next.id, &self.run);
            self.publish(
                self.run.id(),
                TrackerEvent::Run(RunEvent::Retrying {
                    attempt: next.attempt,
                    delay_ms: self.retry_interval_ms,
                }),
            );
            self.run.notify();

            let cancelled = tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(self.retry_interval_ms)) => false,
                _ = self.run.cancelled() => true,
            };
            if cancelled {
                let status = self.run.settle(ExecutionStatus::Cancelled, false);
                next.finalize(ExecutionStatus::Cancelled, Some("cancelled".to_string()));
                self.finish_attempt(&next);
                self.finish_run(status, next.error);
                return;
            }
            execution = next;
        }
    }

    fn finish_attempt(
        &self,
        execution: &Execution,
    ) {
        self.save(execution);
        self.publish(&execution.id, TrackerEvent::Execution(ExecutionEvent::Finished(execution.status)));

        let timestamps = RunTimestamps {
            last_run: Some(execution.start_time),
            next_run: None,
        };
        if let Err(err) = self.store.update_rule_timestamps(&self.rule.id, timestamps) {
            debug!(rule_id = %self.rule.id, "failed to update run timestamps: {}", err);
        }
    }

    fn finish_run(
        &self,
        status: RunStatus,
        error: Option<String>,
    ) {
        let event = match status {
            RunStatus::Succeeded => RunEvent::Succeeded,
            RunStatus::Cancelled => RunEvent::Cancelled,
            _ => RunEvent::Failed(error.unwrap_or_default()),
        };
        if let Ok(mut runs) = self.runs.write() {
            for id in self.run.executions() {
                runs.remove(&id);
            }
        }
        self.publish(self.run.id(), TrackerEvent::Run(event));
        self.run.notify();
    }

    fn save(
        &self,
        execution: &Execution,
    ) {
        if let Err(err) = self.store.append_execution(execution) {
            warn!(execution_id = %execution.id, "failed to write execution: {}", err);
        }
    }

    fn publish(
        &self,
        eid: &str,
        event: TrackerEvent,
    ) {
        self.channel.publish(Message {
            rule_id: self.rule.id.clone(),
            eid: eid.to_string(),
            nid: String::new(),
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, thread, time::Duration};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        ChannelEvent, ChannelOptions, TrackerBuilder,
        evaluator::{NodeEvaluator, NodeOutput},
        model::{DataType, DeclarativeItem, NodeKind, NodeStatus, Port, RuleEdge, RuleNode},
    };

    struct Failing;

    #[async_trait]
    impl NodeEvaluator for Failing {
        async fn evaluate(
            &self,
            _ctx: Arc<Context>,
            node: Arc<RuleNode>,
        ) -> Result<NodeOutput> {
            Err(RuleflowError::NodeEvaluation {
                node_id: node.id.clone(),
                message: "valve stuck".to_string(),
            })
        }
    }

    struct Sleepy;

    #[async_trait]
    impl NodeEvaluator for Sleepy {
        async fn evaluate(
            &self,
            _ctx: Arc<Context>,
            _node: Arc<RuleNode>,
        ) -> Result<NodeOutput> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(NodeOutput::passed(Value::Null))
        }
    }

    fn builder() -> TrackerBuilder {
        TrackerBuilder::new()
            .async_worker_thread_number(4)
            .env("SITE", "plant-a")
            .evaluator(NodeKind::Action, "failing", Arc::new(Failing))
            .evaluator(NodeKind::Action, "sleepy", Arc::new(Sleepy))
    }

    fn tracker() -> ExecutionTracker {
        let tracker = builder().build().unwrap();
        tracker.launch();
        tracker
    }

    fn boiler_rule(action: Value) -> AutomationRule {
        let mut rule = AutomationRule::new("boiler overheat");
        rule.nodes = vec![
            RuleNode::new("trigger", NodeKind::Trigger)
                .with_config(json!({ "type": "threshold", "device_id": "boiler-1", "parameter": "temperature", "operator": "greater", "value": 800 }))
                .with_output(Port::new("out", DataType::Boolean)),
            RuleNode::new("action", NodeKind::Action).with_config(action).with_input(Port::new("in", DataType::Any)),
        ];
        rule.edges = vec![RuleEdge::new("e1", ("trigger", "out"), ("action", "in"))];
        rule
    }

    fn email() -> Value {
        json!({
            "type": "notify",
            "channel": "email",
            "recipients": ["ops@example.com"],
            "subject": "[{{$SITE$}}] overheat",
            "message": "boiler at {{#trigger.value#}}"
        })
    }

    fn hot() -> TriggerSource {
        TriggerSource::device_event("boiler-1", json!({ "temperature": 850 }))
    }

    // ==================== run tests ====================

    #[test]
    fn test_run_temperature_alert() {
        let tracker = tracker();
        let rule = boiler_rule(email());
        tracker.save_rule(&rule).unwrap();

        let run = tracker.start_run(&rule.id, hot()).unwrap();
        assert_eq!(run.wait(), RunStatus::Succeeded);

        let execution = tracker.find_execution(run.id()).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Succeeded);
        assert_eq!(execution.attempt, 1);
        assert_eq!(execution.metrics.nodes_executed, 2);
        assert!(execution.end_time.is_some());

        let output = execution.node_results["action"].output.clone().unwrap();
        assert_eq!(output["subject"], json!("[plant-a] overheat"));
        assert_eq!(output["message"], json!("boiler at 850"));

        let rule = tracker.load_rule(&rule.id).unwrap();
        assert!(rule.execution.last_run.is_some());

        let metrics = tracker.get_metrics(None).unwrap();
        assert_eq!(metrics.total_executions, 1);
        assert_eq!(metrics.successful_executions, 1);
        tracker.shutdown();
    }

    #[test]
    fn test_run_not_fired() {
        let tracker = tracker();
        let rule = boiler_rule(email());
        tracker.save_rule(&rule).unwrap();

        let cold = TriggerSource::device_event("boiler-1", json!({ "temperature": 700 }));
        let run = tracker.start_run(&rule.id, cold).unwrap();
        assert_eq!(run.wait(), RunStatus::Succeeded);

        let execution = tracker.find_execution(run.id()).unwrap();
        assert_eq!(execution.node_results["action"].status, NodeStatus::Skipped);
        assert_eq!(execution.metrics.nodes_executed, 1);
        tracker.shutdown();
    }

    #[test]
    fn test_run_invalid_rule() {
        let tracker = tracker();
        let mut rule = boiler_rule(email());
        rule.nodes.pop();
        rule.edges.clear();
        tracker.save_rule(&rule).unwrap();

        let err = tracker.request_run(&rule.id, hot()).unwrap_err();
        assert!(matches!(err, RuleflowError::RuleInvalid { .. }));
        assert_eq!(tracker.load_executions(&rule.id, Pagination::default()).unwrap().count, 0);

        assert_eq!(tracker.request_run("missing", hot()).unwrap_err(), RuleflowError::RuleNotFound("missing".to_string()));
        tracker.shutdown();
    }

    #[test]
    fn test_run_declarative_only_rule() {
        let tracker = tracker();
        let mut rule = AutomationRule::new("declarative");
        rule.declarative_triggers.push(DeclarativeItem {
            id: Some("tr1".to_string()),
            kind: "threshold".to_string(),
            ..Default::default()
        });
        rule.declarative_actions.push(DeclarativeItem {
            kind: "notify".to_string(),
            target: Some("ops".to_string()),
            ..Default::default()
        });
        tracker.save_rule(&rule).unwrap();

        match tracker.start_run(&rule.id, hot()) {
            Err(RuleflowError::RuleInvalid { rule_id, errors }) => {
                assert_eq!(rule_id, rule.id);
                assert_eq!(errors, vec!["rule has no nodes to execute".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other.map(|run| run.id().to_string())),
        }
        assert_eq!(tracker.load_executions(&rule.id, Pagination::default()).unwrap().count, 0);
        tracker.shutdown();
    }

    #[test]
    fn test_run_requires_launch() {
        let tracker = TrackerBuilder::new().async_worker_thread_number(1).build().unwrap();
        let rule = boiler_rule(email());
        tracker.save_rule(&rule).unwrap();
        assert!(matches!(tracker.request_run(&rule.id, hot()), Err(RuleflowError::Tracker(_))));
    }

    // ==================== retry tests ====================

    #[test]
    fn test_retry_exhaustion() {
        let tracker = tracker();
        let mut rule = boiler_rule(json!({ "type": "failing" }));
        rule.execution.retry_count = 2;
        tracker.save_rule(&rule).unwrap();

        let run = tracker.start_run(&rule.id, hot()).unwrap();
        assert_eq!(run.wait(), RunStatus::Failed);
        assert_eq!(run.executions().len(), 3);

        let page = tracker.load_executions(&rule.id, Pagination::default()).unwrap();
        assert_eq!(page.count, 3);
        assert!(page.rows.iter().all(|e| e.status == ExecutionStatus::Failed));
        let mut attempts: Vec<u32> = page.rows.iter().map(|e| e.attempt).collect();
        attempts.sort();
        assert_eq!(attempts, vec![1, 2, 3]);
        assert!(page.rows.iter().all(|e| e.trigger_source == hot()));

        let mut once = boiler_rule(json!({ "type": "failing" }));
        once.execution.retry_count = 0;
        tracker.save_rule(&once).unwrap();
        let run = tracker.start_run(&once.id, hot()).unwrap();
        assert_eq!(run.wait(), RunStatus::Failed);
        assert_eq!(run.executions().len(), 1);
        tracker.shutdown();
    }

    #[test]
    fn test_retry_after_timeout() {
        let tracker = tracker();
        let mut rule = boiler_rule(json!({ "type": "sleepy" }));
        rule.execution.retry_count = 1;
        rule.execution.timeout_seconds = 1;
        tracker.save_rule(&rule).unwrap();

        let run = tracker.start_run(&rule.id, hot()).unwrap();
        assert_eq!(run.wait(), RunStatus::Failed);

        let executions: Vec<Execution> = run.executions().iter().map(|id| tracker.find_execution(id).unwrap()).collect();
        assert_eq!(executions.len(), 2);
        for execution in executions.iter() {
            assert_eq!(execution.status, ExecutionStatus::TimedOut);
            assert_eq!(execution.error, Some(RuleflowError::TimeoutExceeded(1).to_string()));
            assert!(execution.metrics.duration_ms < 5000);
        }
        tracker.shutdown();
    }

    // ==================== cancel tests ====================

    #[test]
    fn test_cancel_running() {
        let tracker = tracker();
        let rule = boiler_rule(json!({ "type": "sleepy" }));
        tracker.save_rule(&rule).unwrap();

        let run = tracker.start_run(&rule.id, hot()).unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(tracker.cancel(run.id()).unwrap());
        assert_eq!(run.wait(), RunStatus::Cancelled);

        let execution = tracker.find_execution(run.id()).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Cancelled);
        assert!(execution.metrics.duration_ms < 5000);

        assert!(!tracker.cancel(run.id()).unwrap());
        assert_eq!(tracker.cancel("unknown").unwrap_err(), RuleflowError::ExecutionNotFound("unknown".to_string()));
        tracker.shutdown();
    }

    #[test]
    fn test_cancel_many_live_runs() {
        let tracker = tracker();
        let rule = boiler_rule(json!({ "type": "sleepy" }));
        tracker.save_rule(&rule).unwrap();

        let runs: Vec<Arc<Run>> = (0..6).map(|_| tracker.start_run(&rule.id, hot()).unwrap()).collect();
        thread::sleep(Duration::from_millis(300));
        assert_eq!(tracker.live_runs(&rule.id).len(), 6);

        for run in runs.iter() {
            assert!(tracker.cancel(run.id()).unwrap());
        }
        for run in runs.iter() {
            assert_eq!(run.wait(), RunStatus::Cancelled);
            assert!(tracker.get_run(run.id()).is_none());
        }
        assert!(tracker.live_runs(&rule.id).is_empty());
        tracker.shutdown();
    }

    #[test]
    fn test_cancel_while_retrying() {
        let tracker = builder().retry_interval_ms(2000).build().unwrap();
        tracker.launch();
        let mut rule = boiler_rule(json!({ "type": "failing" }));
        rule.execution.retry_count = 1;
        tracker.save_rule(&rule).unwrap();

        let run = tracker.start_run(&rule.id, hot()).unwrap();
        thread::sleep(Duration::from_millis(300));
        assert_eq!(run.status(), RunStatus::Retrying);
        assert!(tracker.cancel(run.id()).unwrap());
        assert_eq!(run.wait(), RunStatus::Cancelled);

        let executions: Vec<Execution> = run.executions().iter().map(|id| tracker.find_execution(id).unwrap()).collect();
        assert_eq!(executions.len(), 2);
        assert_eq!(executions[0].status, ExecutionStatus::Failed);
        assert_eq!(executions[1].status, ExecutionStatus::Cancelled);
        assert_eq!(executions[1].attempt, 2);
        assert!(!tracker.cancel(&executions[1].id).unwrap());
        tracker.shutdown();
    }

    #[test]
    fn test_delete_rule_cancels_live_run() {
        let tracker = tracker();
        let rule = boiler_rule(json!({ "type": "sleepy" }));
        tracker.save_rule(&rule).unwrap();

        let run = tracker.start_run(&rule.id, hot()).unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(tracker.delete_rule(&rule.id).unwrap());
        assert_eq!(run.wait(), RunStatus::Cancelled);

        // the cancelled row written after the delete is refused
        thread::sleep(Duration::from_millis(100));
        assert_eq!(tracker.find_execution(run.id()).unwrap_err(), RuleflowError::ExecutionNotFound(run.id().to_string()));
        assert_eq!(tracker.load_executions(&rule.id, Pagination::default()).unwrap().count, 0);
        assert_eq!(tracker.load_events(&rule.id, Pagination::default()).unwrap().count, 0);
        tracker.shutdown();
    }

    #[test]
    fn test_drop_releases_runtime() {
        let runtime = Arc::new(tokio::runtime::Runtime::new().unwrap());
        let tracker = builder().runtime(runtime.clone()).build().unwrap();
        tracker.launch();
        let rule = boiler_rule(json!({ "type": "sleepy" }));
        tracker.save_rule(&rule).unwrap();

        let run = tracker.start_run(&rule.id, hot()).unwrap();
        thread::sleep(Duration::from_millis(200));
        drop(tracker);

        assert_eq!(run.wait(), RunStatus::Cancelled);
        assert_eq!(Arc::strong_count(&runtime), 1);
        drop(runtime);
    }

    #[test]
    fn test_cancel_finished() {
        let tracker = tracker();
        let rule = boiler_rule(email());
        tracker.save_rule(&rule).unwrap();

        let run = tracker.start_run(&rule.id, hot()).unwrap();
        assert_eq!(run.wait(), RunStatus::Succeeded);
        assert!(!tracker.cancel(run.id()).unwrap());
        assert_eq!(tracker.find_execution(run.id()).unwrap().status, ExecutionStatus::Succeeded);
        tracker.shutdown();
    }

    // ==================== channel tests ====================

    #[test]
    fn test_on_complete_and_snapshot() {
        let tracker = tracker();
        let rule = boiler_rule(email());
        tracker.save_rule(&rule).unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        ChannelEvent::channel(tracker.channel(), ChannelOptions::with_rule_id(&rule.id)).unwrap().on_complete(move |run_id| {
            let _ = tx.lock().unwrap().send(run_id);
        });

        let run = tracker.start_run(&rule.id, hot()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), run.id());

        let mut snapshot = tracker.metrics_snapshot();
        for _ in 0..100 {
            if snapshot.total_executions == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
            snapshot = tracker.metrics_snapshot();
        }
        assert_eq!(snapshot.successful_executions, 1);
        assert_eq!(snapshot.total_rules, 1);

        let events = tracker.load_events(&rule.id, Pagination::default()).unwrap();
        assert!(events.count > 0);
        assert!(events.rows.iter().all(|e| e.rule_id == rule.id));

        assert!(tracker.delete_rule(&rule.id).unwrap());
        assert!(tracker.find_execution(run.id()).is_err());
        let snapshot = tracker.metrics_snapshot();
        assert_eq!(snapshot.total_rules, 0);
        assert_eq!(snapshot.total_executions, 0);
        tracker.shutdown();
    }
}
