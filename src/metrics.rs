//! Aggregates over the execution ledger.
//!
//! Metrics are built from one [`RuleSummary`] per rule, so a single rule can
//! be recomputed without rescanning the whole ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::{AutomationMetrics, AutomationRule, Execution, ExecutionStatus, NodeKind, NodeStatus, NodeTypeMetrics, RuleMetrics, RuleStatus};

#[derive(Debug, Clone, Default)]
struct Durations {
    total_ms: u64,
    count: usize,
}

impl Durations {
    fn add(
        &mut self,
        execution: &Execution,
    ) {
        if execution.is_terminal() {
            self.total_ms += execution.metrics.duration_ms;
            self.count += 1;
        }
    }

    fn merge(
        &mut self,
        other: &Durations,
    ) {
        self.total_ms += other.total_ms;
        self.count += other.count;
    }

    fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.count as f64
        }
    }
}

/// Execution figures of a single rule.
#[derive(Debug, Clone, Default)]
pub struct RuleSummary {
    rule: RuleMetrics,
    durations: Durations,
    by_node_type: BTreeMap<NodeKind, NodeTypeMetrics>,
}

impl RuleSummary {
    pub fn metrics(&self) -> RuleMetrics {
        let mut rule = self.rule.clone();
        rule.average_execution_time_ms = self.durations.average();
        rule
    }
}

/// Summarize the executions of one rule whose stored `last_run` is `last_run`.
pub fn summarize<'a>(
    last_run: Option<DateTime<Utc>>,
    executions: impl IntoIterator<Item = &'a Execution>,
) -> RuleSummary {
    let mut summary = RuleSummary::default();
    summary.rule.last_run = last_run;

    for execution in executions {
        summary.rule.executions += 1;
        summary.durations.add(execution);
        if execution.is_terminal() {
            summary.rule.last_run = summary.rule.last_run.max(Some(execution.start_time));
        }

        match execution.status {
            ExecutionStatus::Succeeded => summary.rule.successful += 1,
            status if status.is_failure() => summary.rule.failed += 1,
            _ => {}
        }

        for result in execution.node_results.values() {
            let node = summary.by_node_type.entry(result.kind).or_default();
            match result.status {
                NodeStatus::Succeeded => {
                    node.executed += 1;
                    node.succeeded += 1;
                }
                NodeStatus::Failed => {
                    node.executed += 1;
                    node.failed += 1;
                }
                NodeStatus::Skipped => node.skipped += 1,
                NodeStatus::Pending | NodeStatus::Running => {}
            }
        }
    }

    summary
}

/// Fold per-rule summaries into the crate wide aggregate.
pub fn combine(
    total_rules: usize,
    active_rules: usize,
    summaries: &BTreeMap<String, RuleSummary>,
) -> AutomationMetrics {
    let mut metrics = AutomationMetrics {
        total_rules,
        active_rules,
        ..Default::default()
    };
    let mut overall = Durations::default();

    for (rule_id, summary) in summaries.iter() {
        metrics.total_executions += summary.rule.executions;
        metrics.successful_executions += summary.rule.successful;
        metrics.failed_executions += summary.rule.failed;
        overall.merge(&summary.durations);

        for (kind, node) in summary.by_node_type.iter() {
            let total = metrics.by_node_type.entry(*kind).or_default();
            total.executed += node.executed;
            total.succeeded += node.succeeded;
            total.failed += node.failed;
            total.skipped += node.skipped;
        }
        metrics.by_rule.insert(rule_id.clone(), summary.metrics());
    }

    metrics.average_execution_time_ms = overall.average();
    metrics
}

/// Recompute [`AutomationMetrics`] from rules and their executions.
///
/// With `rule_id` set, only that rule and its executions are counted.
/// `failed` counts timed out executions too, averages only cover terminal rows.
pub fn compute(
    rules: &[AutomationRule],
    executions: &[Execution],
    rule_id: Option<&str>,
) -> AutomationMetrics {
    let selected = |id: &str| rule_id.is_none_or(|r| r == id);

    let mut grouped: BTreeMap<String, (Option<DateTime<Utc>>, Vec<&Execution>)> = BTreeMap::new();
    let (mut total_rules, mut active_rules) = (0, 0);

    for rule in rules.iter().filter(|r| selected(r.id.as_str())) {
        total_rules += 1;
        if rule.status == RuleStatus::Active {
            active_rules += 1;
        }
        grouped.entry(rule.id.clone()).or_default().0 = rule.execution.last_run;
    }
    for execution in executions.iter().filter(|e| selected(e.rule_id.as_str())) {
        grouped.entry(execution.rule_id.clone()).or_default().1.push(execution);
    }

    let summaries: BTreeMap<String, RuleSummary> = grouped.into_iter().map(|(id, (last_run, executions))| (id, summarize(last_run, executions))).collect();
    combine(total_rules, active_rules, &summaries)
}
