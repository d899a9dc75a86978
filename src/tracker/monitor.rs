use std::{collections::BTreeMap, sync::Arc};

use tokio::{runtime::Handle, sync::broadcast::error::RecvError};
use tracing::{debug, warn};

use crate::{
    Result, RuleflowError, ShareLock,
    common::Shutdown,
    metrics::{self, RuleSummary},
    model::AutomationMetrics,
    runtime::Channel,
    store::{Store, data},
    utils,
};

#[derive(Default)]
struct Aggregates {
    summaries: BTreeMap<String, RuleSummary>,
    snapshot: AutomationMetrics,
}

/// Persists published events and logs, and keeps an eventually consistent
/// metrics snapshot that is refreshed for a rule whenever one of its runs
/// completes. Event and log history is capped per rule.
pub struct Monitor {
    store: Arc<Store>,
    channel: Arc<Channel>,
    aggregates: ShareLock<Aggregates>,
    history_limit: usize,

    runtime: Handle,
    shutdown: Arc<Shutdown>,
}

impl Monitor {
    pub fn new(
        store: Arc<Store>,
        channel: Arc<Channel>,
        runtime: Handle,
        shutdown: Arc<Shutdown>,
        history_limit: usize,
    ) -> Self {
        Self {
            store,
            channel,
            aggregates: Default::default(),
            history_limit,
            runtime,
            shutdown,
        }
    }

    pub fn snapshot(&self) -> AutomationMetrics {
        self.aggregates.read().map(|a| a.snapshot.clone()).unwrap_or_default()
    }

    /// Rebuild every rule summary from the ledger.
    pub fn refresh(&self) -> Result<AutomationMetrics> {
        rebuild(&self.store, &self.aggregates)
    }

    /// Recompute the summary of one rule, dropping it when the rule is gone.
    pub fn refresh_rule(
        &self,
        rule_id: &str,
    ) -> Result<()> {
        update(&self.store, &self.aggregates, rule_id)
    }

    pub fn monitor(&self) {
        if let Err(err) = self.refresh() {
            warn!("failed to build initial metrics: {}", err);
        }

        let store = self.store.clone();
        let aggregates = self.aggregates.clone();
        let history_limit = self.history_limit;
        let shutdown = self.shutdown.clone();
        let mut event_queue = self.channel.event_queue().subscribe();

        self.runtime.spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = shutdown.wait() => break,
                    msg = event_queue.recv() => msg,
                };
                let event = match msg {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        warn!("monitor lagged behind, {} events dropped", n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let row = data::Event {
                    id: utils::longid(),
                    rule_id: event.rule_id.clone(),
                    eid: event.eid.clone(),
                    nid: event.nid.clone(),
                    name: event.event.name(),
                    message: format!("{:?}", event.event),
                    timestamp: utils::time::time_millis(),
                };
                if let Err(err) = store.append_event(&row) {
                    warn!(rule_id = %event.rule_id, "failed to persist event: {}", err);
                }

                if event.event.is_complete() {
                    if let Err(err) = update(&store, &aggregates, &event.rule_id) {
                        warn!(rule_id = %event.rule_id, "failed to refresh metrics: {}", err);
                    }
                    if let Err(err) = store.prune_history(&event.rule_id, history_limit) {
                        warn!(rule_id = %event.rule_id, "failed to prune history: {}", err);
                    }
                }
            }
        });

        let store = self.store.clone();
        let shutdown = self.shutdown.clone();
        let mut log_queue = self.channel.log_queue().subscribe();

        self.runtime.spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = shutdown.wait() => break,
                    msg = log_queue.recv() => msg,
                };
                let log = match msg {
                    Ok(log) => log,
                    Err(RecvError::Lagged(n)) => {
                        warn!("monitor lagged behind, {} logs dropped", n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let row = data::Log {
                    id: utils::longid(),
                    rule_id: log.rule_id.clone(),
                    eid: log.eid.clone(),
                    nid: log.nid.clone(),
                    content: log.content.clone(),
                    timestamp: log.timestamp,
                };
                if let Err(err) = store.append_log(&row) {
                    warn!(rule_id = %log.rule_id, "failed to persist log: {}", err);
                }
            }
        });
    }
}

fn rebuild(
    store: &Store,
    aggregates: &ShareLock<Aggregates>,
) -> Result<AutomationMetrics> {
    let rules = store.list_rules()?;
    let executions = store.all_executions(None)?;

    let mut summaries = BTreeMap::new();
    for rule in rules.iter() {
        let summary = metrics::summarize(rule.execution.last_run, executions.iter().filter(|e| e.rule_id == rule.id));
        summaries.insert(rule.id.clone(), summary);
    }
    let (total, active) = store.rule_counts()?;
    let snapshot = metrics::combine(total, active, &summaries);
    debug!(total_executions = snapshot.total_executions, "metrics rebuilt");

    if let Ok(mut current) = aggregates.write() {
        current.summaries = summaries;
        current.snapshot = snapshot.clone();
    }
    Ok(snapshot)
}

fn update(
    store: &Store,
    aggregates: &ShareLock<Aggregates>,
    rule_id: &str,
) -> Result<()> {
    // held across the reads so a refresh racing a delete cannot resurrect the rule
    let mut current = aggregates.write().map_err(|_| RuleflowError::Tracker("metrics lock poisoned".to_string()))?;

    let summary = match store.load_rule(rule_id) {
        Ok(rule) => Some(metrics::summarize(rule.execution.last_run, store.all_executions(Some(rule_id))?.iter())),
        Err(RuleflowError::RuleNotFound(_)) => None,
        Err(err) => return Err(err),
    };
    let (total, active) = store.rule_counts()?;

    match summary {
        Some(summary) => current.summaries.insert(rule_id.to_string(), summary),
        None => current.summaries.remove(rule_id),
    };
    let snapshot = metrics::combine(total, active, &current.summaries);
    current.snapshot = snapshot;
    debug!(rule_id, total_executions = current.snapshot.total_executions, "metrics refreshed");
    Ok(())
}
