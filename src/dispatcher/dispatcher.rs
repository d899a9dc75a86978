use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    RuleflowError,
    evaluator::{EvaluatorRegistry, NodeOutput},
    events::{ExecutionEvent, Message, NodeEvent, TrackerEvent},
    graph::RuleGraph,
    model::{Execution, ExecutionStatus, NodeResult, NodeStatus, RuleNode},
    runtime::{Context, Run},
    store::Store,
    utils,
};

const REASON_TIMEOUT: &str = "timeout exceeded";
const REASON_CANCELLED: &str = "cancelled";
const REASON_UPSTREAM_FAILED: &str = "upstream failed";
const REASON_UPSTREAM_DISABLED: &str = "upstream disabled";
const REASON_INACTIVE: &str = "no active input";

/// How the evaluation of one node ended.
enum Settled {
    Done(NodeOutput),
    Failed(String),
    TimedOut,
    Cancelled,
}

/// Where the walk over the graph stands.
#[derive(Default)]
struct Walk {
    /// Nodes that succeeded and let their branch pass.
    active: HashSet<String>,
    /// Failed nodes and everything skipped below them.
    poisoned: HashSet<String>,
    first_error: Option<String>,
    timed_out: bool,
    cancelled: bool,
}

pub struct Dispatcher {
    /// Context of the attempt being dispatched.
    ctx: Arc<Context>,
    graph: Arc<RuleGraph>,
    /// Precomputed topological order of the rule.
    order: Arc<Vec<String>>,
    evaluators: Arc<EvaluatorRegistry>,
    store: Arc<Store>,
    run: Arc<Run>,
    timeout_seconds: u64,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<Context>,
        graph: Arc<RuleGraph>,
        order: Arc<Vec<String>>,
        evaluators: Arc<EvaluatorRegistry>,
        store: Arc<Store>,
        run: Arc<Run>,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            ctx,
            graph,
            order,
            evaluators,
            store,
            run,
            timeout_seconds,
        }
    }

    /// Run the attempt to its end and return the finalized row.
    ///
    /// The row is written to the ledger when it starts running and after
    /// every node; the final write is left to the caller.
    pub async fn execute(
        &self,
        mut execution: Execution,
    ) -> Execution {
        execution.status = ExecutionStatus::Running;
        execution.start_time = Utc::now();
        self.save(&execution);
        self.publish("", TrackerEvent::Execution(ExecutionEvent::Running(execution.attempt)));

        let deadline = Instant::now() + Duration::from_secs(self.timeout_seconds);
        let mut walk = Walk::default();

        for nid in self.order.iter() {
            let Some(node) = self.graph.node(nid) else {
                continue;
            };
            if !node.enabled {
                continue;
            }

            if !walk.timed_out && !walk.cancelled {
                if Instant::now() >= deadline {
                    walk.timed_out = true;
                } else if self.run.is_cancel_requested() {
                    walk.cancelled = true;
                }
            }
            if walk.timed_out {
                self.skip(&mut execution, node, REASON_TIMEOUT);
                continue;
            }
            if walk.cancelled {
                self.skip(&mut execution, node, REASON_CANCELLED);
                continue;
            }

            let incoming = self.graph.incoming(nid);
            if !incoming.is_empty() {
                let live: Vec<_> = incoming.iter().filter(|e| self.graph.node(&e.source_node_id).is_some_and(|n| n.enabled)).collect();
                if live.is_empty() {
                    self.skip(&mut execution, node, REASON_UPSTREAM_DISABLED);
                    continue;
                }
                if live.iter().any(|e| walk.poisoned.contains(&e.source_node_id)) {
                    walk.poisoned.insert(nid.clone());
                    self.skip(&mut execution, node, REASON_UPSTREAM_FAILED);
                    continue;
                }
                if !live.iter().any(|e| walk.active.contains(&e.source_node_id)) {
                    self.skip(&mut execution, node, REASON_INACTIVE);
                    continue;
                }
            }

            execution.node_results.insert(nid.clone(), NodeResult::running(node.kind));
            self.publish(nid, TrackerEvent::Node(NodeEvent::Running(utils::time::time_millis())));

            let settled = self.evaluate(node, deadline).await;
            let Some(result) = execution.node_results.get_mut(nid) else {
                continue;
            };
            result.finished_at = Some(Utc::now());

            match settled {
                Settled::Done(output) => {
                    debug!(execution_id = %execution.id, node_id = %nid, passed = output.passed, "node succeeded");
                    result.status = NodeStatus::Succeeded;
                    result.output = Some(output.value.clone());
                    self.ctx.add_output(nid, output.value);
                    if output.passed {
                        walk.active.insert(nid.clone());
                    }
                    self.publish(nid, TrackerEvent::Node(NodeEvent::Succeeded(utils::time::time_millis())));
                }
                Settled::Failed(err) => {
                    warn!(execution_id = %execution.id, node_id = %nid, attempt = execution.attempt, "node failed: {}", err);
                    result.status = NodeStatus::Failed;
                    result.error = Some(err.clone());
                    walk.poisoned.insert(nid.clone());
                    walk.first_error.get_or_insert_with(|| format!("node '{}' failed: {}", nid, err));
                    self.publish(nid, TrackerEvent::Node(NodeEvent::Failed(err)));
                }
                Settled::TimedOut => {
                    walk.timed_out = true;
                    result.status = NodeStatus::Skipped;
                    result.error = Some(REASON_TIMEOUT.to_string());
                    self.publish(nid, TrackerEvent::Node(NodeEvent::Skipped(Some(REASON_TIMEOUT.to_string()))));
                }
                Settled::Cancelled => {
                    walk.cancelled = true;
                    result.status = NodeStatus::Skipped;
                    result.error = Some(REASON_CANCELLED.to_string());
                    self.publish(nid, TrackerEvent::Node(NodeEvent::Skipped(Some(REASON_CANCELLED.to_string()))));
                }
            }
            self.save(&execution);
        }

        let (status, error) = if walk.cancelled {
            (ExecutionStatus::Cancelled, Some(REASON_CANCELLED.to_string()))
        } else if walk.timed_out {
            (ExecutionStatus::TimedOut, Some(RuleflowError::TimeoutExceeded(self.timeout_seconds).to_string()))
        } else if let Some(err) = walk.first_error {
            (ExecutionStatus::Failed, Some(err))
        } else {
            (ExecutionStatus::Succeeded, None)
        };
        execution.finalize(status, error);
        execution
    }

    /// Evaluate a node on its own task, racing it against the deadline and
    /// the run cancellation. A losing evaluation is detached, not aborted.
    async fn evaluate(
        &self,
        node: &RuleNode,
        deadline: Instant,
    ) -> Settled {
        let evaluator = match self.evaluators.resolve(node) {
            Ok(evaluator) => evaluator,
            Err(err) => return Settled::Failed(err.to_string()),
        };

        let ctx = self.ctx.clone();
        let node = Arc::new(node.clone());
        let handle = tokio::spawn(async move { evaluator.evaluate(ctx, node).await });

        tokio::select! {
            biased;
            ret = handle => match ret {
                Ok(Ok(output)) => Settled::Done(output),
                Ok(Err(err)) => Settled::Failed(err.to_string()),
                Err(err) => Settled::Failed(format!("evaluation aborted: {}", err)),
            },
            _ = tokio::time::sleep_until(deadline) => Settled::TimedOut,
            _ = self.run.cancelled() => Settled::Cancelled,
        }
    }

    fn skip(
        &self,
        execution: &mut Execution,
        node: &RuleNode,
        reason: &str,
    ) {
        debug!(execution_id = %execution.id, node_id = %node.id, "node skipped: {}", reason);
        execution.node_results.insert(node.id.clone(), NodeResult::skipped(node.kind, Some(reason.to_string())));
        self.publish(&node.id, TrackerEvent::Node(NodeEvent::Skipped(Some(reason.to_string()))));
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
        nid: &str,
        event: TrackerEvent,
    ) {
        self.ctx.channel().publish(Message {
            rule_id: self.ctx.rule_id().to_string(),
            eid: self.ctx.eid().to_string(),
            nid: nid.to_string(),
            event,
        });
    }
}
