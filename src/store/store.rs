use std::{
    any::Any,
    collections::HashMap,
    convert::AsRef,
    str::FromStr,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    Result, RuleflowError, ShareLock,
    model::{AutomationRule, Execution, ExecutionStatus, RuleStatus},
    utils,
};

use super::{
    DbCollection, DbCollectionIden, PageData, StoreIden, data,
    query::{Expr, Query},
};

/// 1-based page selection for ledger reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page_num: usize,
    pub page_size: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_num: 1,
            page_size: 20,
        }
    }
}

/// Run timestamps to record on a rule; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTimestamps {
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct DynDbSetRef<T>(Arc<dyn DbCollection<Item = T>>);

pub struct Store {
    collections: ShareLock<HashMap<StoreIden, Arc<dyn Any + Send + Sync + 'static>>>,
    // held shared by ledger writes and exclusively by rule deletion
    ledger: RwLock<()>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            ledger: RwLock::new(()),
        }
    }

    pub fn collection<DATA>(&self) -> Result<Arc<dyn DbCollection<Item = DATA>>>
    where
        DATA: DbCollectionIden + Send + Sync + 'static,
    {
        let missing = || RuleflowError::Store(format!("fail to get collection: {}", DATA::iden().as_ref()));
        let collections = self.collections.read().map_err(|_| missing())?;
        let collection = collections.get(&DATA::iden()).ok_or_else(missing)?;

        collection.downcast_ref::<DynDbSetRef<DATA>>().map(|v| v.0.clone()).ok_or_else(missing)
    }

    pub fn register<DATA>(
        &self,
        collection: Arc<dyn DbCollection<Item = DATA> + Send + Sync + 'static>,
    ) where
        DATA: DbCollectionIden + 'static,
    {
        if let Ok(mut collections) = self.collections.write() {
            collections.insert(DATA::iden(), Arc::new(DynDbSetRef::<DATA>(collection)));
        }
    }

    pub fn rules(&self) -> Result<Arc<dyn DbCollection<Item = data::Rule>>> {
        self.collection()
    }

    pub fn executions(&self) -> Result<Arc<dyn DbCollection<Item = data::Execution>>> {
        self.collection()
    }

    pub fn logs(&self) -> Result<Arc<dyn DbCollection<Item = data::Log>>> {
        self.collection()
    }

    pub fn events(&self) -> Result<Arc<dyn DbCollection<Item = data::Event>>> {
        self.collection()
    }

    /// Insert or replace a rule definition.
    ///
    /// The stored `last_run` never moves backwards and the creation time is kept.
    pub fn save_rule(
        &self,
        rule: &AutomationRule,
    ) -> Result<bool> {
        trace!("store::save_rule({})", rule.id);
        if rule.id.is_empty() {
            return Err(RuleflowError::Store("missing id in rule".into()));
        }

        let rules = self.rules()?;
        let now = utils::time::time_millis();
        let row = data::Rule {
            id: rule.id.clone(),
            name: rule.name.clone(),
            status: rule.status.as_ref().to_string(),
            data: serde_json::to_string(rule)?,
            last_run: utils::time::to_millis(rule.execution.last_run),
            next_run: utils::time::to_millis(rule.execution.next_run),
            create_time: now,
            update_time: now,
        };

        if rules.create(&row)? {
            return Ok(true);
        }

        rules.transact(&rule.id, &mut |prev: &mut data::Rule| -> Result<()> {
            let last_run = prev.last_run.max(row.last_run);
            let next_run = if row.next_run == 0 { prev.next_run } else { row.next_run };
            *prev = data::Rule {
                create_time: prev.create_time,
                last_run,
                next_run,
                ..row.clone()
            };
            Ok(())
        })?;
        Ok(true)
    }

    pub fn load_rule(
        &self,
        rule_id: &str,
    ) -> Result<AutomationRule> {
        let row = self.rules()?.find(rule_id).map_err(|_| RuleflowError::RuleNotFound(rule_id.to_string()))?;
        Self::rule_from_row(&row)
    }

    /// All rules, oldest first.
    pub fn list_rules(&self) -> Result<Vec<AutomationRule>> {
        let q = Query::new().with_order("create_time", false).with_limit(usize::MAX);
        self.rules()?.query(&q)?.rows.iter().map(Self::rule_from_row).collect()
    }

    /// Number of stored rules and of active ones.
    pub fn rule_counts(&self) -> Result<(usize, usize)> {
        let rules = self.rules()?;
        let total = rules.query(&Query::new().with_limit(1))?.count;
        let active = rules.query(&Query::new().with_filter(Expr::eq("status", RuleStatus::Active.as_ref())).with_limit(1))?.count;
        Ok((total, active))
    }

    /// Delete a rule together with its executions, events and logs.
    ///
    /// Ledger writes for the rule that arrive afterwards are refused.
    pub fn delete_rule(
        &self,
        rule_id: &str,
    ) -> Result<bool> {
        debug!(rule_id, "delete rule");
        let _ledger = self.ledger.write().map_err(|_| ledger_err())?;

        let deleted = self.rules()?.delete(rule_id)?;
        let q = Query::new().with_filter(Expr::eq("rule_id", rule_id)).with_limit(usize::MAX);

        let executions = self.executions()?;
        for row in executions.query(&q)?.rows {
            executions.delete(&row.id)?;
        }
        let events = self.events()?;
        for row in events.query(&q)?.rows {
            events.delete(&row.id)?;
        }
        let logs = self.logs()?;
        for row in logs.query(&q)?.rows {
            logs.delete(&row.id)?;
        }
        Ok(deleted)
    }

    /// Write an execution row, keyed by its id.
    ///
    /// Repeating a write is harmless. A row that already reached a terminal
    /// status is never overwritten; `Ok(false)` reports the refused write.
    /// Rows of a rule that is not stored fail with [`RuleflowError::RuleNotFound`].
    pub fn append_execution(
        &self,
        execution: &Execution,
    ) -> Result<bool> {
        trace!("store::append_execution({}, {})", execution.id, execution.status.as_ref());
        let _ledger = self.ledger.read().map_err(|_| ledger_err())?;
        if !self.rules()?.exists(&execution.rule_id)? {
            return Err(RuleflowError::RuleNotFound(execution.rule_id.clone()));
        }

        let executions = self.executions()?;
        let row = data::Execution {
            id: execution.id.clone(),
            rule_id: execution.rule_id.clone(),
            attempt: execution.attempt,
            status: execution.status.as_ref().to_string(),
            start_time: execution.start_time.timestamp_millis(),
            end_time: utils::time::to_millis(execution.end_time),
            data: serde_json::to_string(execution)?,
            timestamp: utils::time::time_millis(),
        };

        if executions.create(&row)? {
            return Ok(true);
        }

        let mut written = false;
        executions.transact(&execution.id, &mut |prev: &mut data::Execution| -> Result<()> {
            let terminal = ExecutionStatus::from_str(&prev.status).is_ok_and(|s| s.is_terminal());
            if !terminal {
                *prev = row.clone();
                written = true;
            }
            Ok(())
        })?;

        if !written {
            debug!(execution_id = %execution.id, "execution is terminal, write refused");
        }
        Ok(written)
    }

    pub fn find_execution(
        &self,
        execution_id: &str,
    ) -> Result<Execution> {
        let row = self.executions()?.find(execution_id).map_err(|_| RuleflowError::ExecutionNotFound(execution_id.to_string()))?;
        Ok(serde_json::from_str(&row.data)?)
    }

    /// Executions of a rule, newest first.
    pub fn load_executions(
        &self,
        rule_id: &str,
        page: Pagination,
    ) -> Result<PageData<Execution>> {
        let q = Self::page_query(rule_id, page).with_order("start_time", true).with_order("attempt", true);

        let data = self.executions()?.query(&q)?;
        Ok(PageData {
            count: data.count,
            page_num: data.page_num,
            page_count: data.page_count,
            page_size: data.page_size,
            rows: data.rows.iter().map(|row| serde_json::from_str(&row.data)).collect::<std::result::Result<Vec<_>, _>>()?,
        })
    }

    /// Every execution in the ledger, optionally for a single rule.
    pub fn all_executions(
        &self,
        rule_id: Option<&str>,
    ) -> Result<Vec<Execution>> {
        let mut q = Query::new().with_order("start_time", false).with_limit(usize::MAX);
        if let Some(rule_id) = rule_id {
            q = q.with_filter(Expr::eq("rule_id", rule_id));
        }
        let rows = self.executions()?.query(&q)?.rows;
        Ok(rows.iter().map(|row| serde_json::from_str(&row.data)).collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Persist a published event. Events of a deleted rule are dropped.
    pub fn append_event(
        &self,
        event: &data::Event,
    ) -> Result<bool> {
        let _ledger = self.ledger.read().map_err(|_| ledger_err())?;
        if !self.rules()?.exists(&event.rule_id)? {
            return Ok(false);
        }
        self.events()?.create(event)
    }

    /// Persist an evaluator log line. Logs of a deleted rule are dropped.
    pub fn append_log(
        &self,
        log: &data::Log,
    ) -> Result<bool> {
        let _ledger = self.ledger.read().map_err(|_| ledger_err())?;
        if !self.rules()?.exists(&log.rule_id)? {
            return Ok(false);
        }
        self.logs()?.create(log)
    }

    /// Events of a rule, newest first.
    pub fn load_events(
        &self,
        rule_id: &str,
        page: Pagination,
    ) -> Result<PageData<data::Event>> {
        self.events()?.query(&Self::page_query(rule_id, page).with_order("timestamp", true))
    }

    /// Logs of a rule, newest first.
    pub fn load_logs(
        &self,
        rule_id: &str,
        page: Pagination,
    ) -> Result<PageData<data::Log>> {
        self.logs()?.query(&Self::page_query(rule_id, page).with_order("timestamp", true))
    }

    /// Keep only the newest `keep` events and the newest `keep` logs of a rule.
    /// Returns the number of deleted records.
    pub fn prune_history(
        &self,
        rule_id: &str,
        keep: usize,
    ) -> Result<usize> {
        let q = Query::new().with_filter(Expr::eq("rule_id", rule_id)).with_order("timestamp", true).with_offset(keep).with_limit(usize::MAX);
        let mut deleted = 0;

        let events = self.events()?;
        for row in events.query(&q)?.rows {
            if events.delete(&row.id)? {
                deleted += 1;
            }
        }
        let logs = self.logs()?;
        for row in logs.query(&q)?.rows {
            if logs.delete(&row.id)? {
                deleted += 1;
            }
        }

        if deleted > 0 {
            trace!("store::prune_history({}) removed {}", rule_id, deleted);
        }
        Ok(deleted)
    }

    /// Record run timestamps; `last_run` only moves forward.
    pub fn update_rule_timestamps(
        &self,
        rule_id: &str,
        timestamps: RunTimestamps,
    ) -> Result<()> {
        let rules = self.rules()?;
        if !rules.exists(rule_id)? {
            return Err(RuleflowError::RuleNotFound(rule_id.to_string()));
        }

        rules.transact(rule_id, &mut |row: &mut data::Rule| -> Result<()> {
            if let Some(last_run) = timestamps.last_run {
                row.last_run = row.last_run.max(last_run.timestamp_millis());
            }
            if let Some(next_run) = timestamps.next_run {
                row.next_run = next_run.timestamp_millis();
            }
            row.update_time = utils::time::time_millis();
            Ok(())
        })?;
        Ok(())
    }

    fn page_query(
        rule_id: &str,
        page: Pagination,
    ) -> Query {
        let size = page.page_size.max(1);
        Query::new().with_filter(Expr::eq("rule_id", rule_id)).with_limit(size).with_offset(page.page_num.saturating_sub(1) * size)
    }

    fn rule_from_row(row: &data::Rule) -> Result<AutomationRule> {
        let mut rule: AutomationRule = serde_json::from_str(&row.data)?;
        rule.execution.last_run = utils::time::from_millis(row.last_run);
        rule.execution.next_run = utils::time::from_millis(row.next_run);
        Ok(rule)
    }
}

fn ledger_err() -> RuleflowError {
    RuleflowError::Store("ledger lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::{
        model::{ExecutionStatus, TriggerSource},
        store::{DbStore, MemStore},
    };

    fn store() -> Store {
        let store = Store::new();
        MemStore::new().init(&store);
        store
    }

    fn saved(
        store: &Store,
        id: &str,
    ) -> AutomationRule {
        let mut rule = AutomationRule::new(id);
        rule.id = id.to_string();
        store.save_rule(&rule).unwrap();
        rule
    }

    fn event(
        rule_id: &str,
        timestamp: i64,
    ) -> data::Event {
        data::Event {
            id: utils::longid(),
            rule_id: rule_id.to_string(),
            name: "run:succeeded".to_string(),
            timestamp,
            ..Default::default()
        }
    }

    // ==================== rule tests ====================

    #[test]
    fn test_save_and_load_rule() {
        let store = store();
        let rule = AutomationRule::new("boiler alert");
        assert!(store.save_rule(&rule).unwrap());

        let loaded = store.load_rule(&rule.id).unwrap();
        assert_eq!(loaded.name, "boiler alert");
        assert_eq!(store.list_rules().unwrap().len(), 1);

        assert_eq!(store.load_rule("missing").err(), Some(RuleflowError::RuleNotFound("missing".to_string())));
    }

    #[test]
    fn test_rule_timestamps_monotonic() {
        let store = store();
        let rule = AutomationRule::new("r");
        store.save_rule(&rule).unwrap();

        let later = Utc::now();
        let earlier = later - Duration::minutes(5);
        store
            .update_rule_timestamps(
                &rule.id,
                RunTimestamps {
                    last_run: Some(later),
                    next_run: None,
                },
            )
            .unwrap();
        store
            .update_rule_timestamps(
                &rule.id,
                RunTimestamps {
                    last_run: Some(earlier),
                    next_run: None,
                },
            )
            .unwrap();

        let loaded = store.load_rule(&rule.id).unwrap();
        assert_eq!(loaded.execution.last_run.map(|t| t.timestamp_millis()), Some(later.timestamp_millis()));
        assert!(store.update_rule_timestamps("missing", RunTimestamps::default()).is_err());
    }

    #[test]
    fn test_delete_rule_cascades() {
        let store = store();
        let rule = AutomationRule::new("r");
        store.save_rule(&rule).unwrap();
        let exec = Execution::new(&rule.id, TriggerSource::manual(json!({})));
        store.append_execution(&exec).unwrap();

        store.append_event(&event(&rule.id, 1)).unwrap();

        assert!(store.delete_rule(&rule.id).unwrap());
        assert!(store.load_rule(&rule.id).is_err());
        assert!(store.find_execution(&exec.id).is_err());
        assert_eq!(store.load_executions(&rule.id, Pagination::default()).unwrap().count, 0);
        assert_eq!(store.load_events(&rule.id, Pagination::default()).unwrap().count, 0);

        let mut late = exec.next_attempt();
        late.status = ExecutionStatus::Running;
        assert_eq!(store.append_execution(&late).unwrap_err(), RuleflowError::RuleNotFound(rule.id.clone()));
        assert!(!store.append_event(&event(&rule.id, 2)).unwrap());
        assert!(store.find_execution(&late.id).is_err());
    }

    #[test]
    fn test_save_rule_keeps_concurrent_last_run() {
        let store = Arc::new(store());
        let rule = AutomationRule::new("r");
        store.save_rule(&rule).unwrap();

        let saver = {
            let store = store.clone();
            let rule = rule.clone();
            std::thread::spawn(move || {
                for _ in 0..2000 {
                    store.save_rule(&rule).unwrap();
                }
            })
        };

        let start = Utc::now();
        for i in 0..2000 {
            let last_run = start + Duration::milliseconds(i);
            store
                .update_rule_timestamps(
                    &rule.id,
                    RunTimestamps {
                        last_run: Some(last_run),
                        next_run: None,
                    },
                )
                .unwrap();
            let loaded = store.load_rule(&rule.id).unwrap();
            assert!(loaded.execution.last_run.is_some_and(|t| t.timestamp_millis() >= last_run.timestamp_millis()));
        }
        saver.join().unwrap();
    }

    #[test]
    fn test_rule_counts() {
        let store = store();
        let mut active = AutomationRule::new("a");
        active.status = crate::model::RuleStatus::Active;
        store.save_rule(&active).unwrap();
        store.save_rule(&AutomationRule::new("b")).unwrap();
        assert_eq!(store.rule_counts().unwrap(), (2, 1));
    }

    // ==================== history tests ====================

    #[test]
    fn test_history_paged_and_pruned() {
        let store = store();
        saved(&store, "r1");
        for ts in 1..=5 {
            assert!(store.append_event(&event("r1", ts)).unwrap());
        }
        let log = data::Log {
            id: utils::longid(),
            rule_id: "r1".to_string(),
            content: "notify queued".to_string(),
            timestamp: 3,
            ..Default::default()
        };
        assert!(store.append_log(&log).unwrap());
        assert!(!store.append_event(&event("missing", 1)).unwrap());

        let page = store.load_events("r1", Pagination::default()).unwrap();
        assert_eq!(page.count, 5);
        assert_eq!(page.rows[0].timestamp, 5);

        assert_eq!(store.prune_history("r1", 2).unwrap(), 3);
        let page = store.load_events("r1", Pagination::default()).unwrap();
        assert_eq!(page.rows.iter().map(|e| e.timestamp).collect::<Vec<_>>(), vec![5, 4]);
        assert_eq!(store.load_logs("r1", Pagination::default()).unwrap().count, 1);
    }

    // ==================== execution tests ====================

    #[test]
    fn test_append_execution_idempotent() {
        let store = store();
        saved(&store, "r1");
        let mut exec = Execution::new("r1", TriggerSource::manual(json!({})));
        assert!(store.append_execution(&exec).unwrap());
        assert!(store.append_execution(&exec).unwrap());

        exec.finalize(ExecutionStatus::Succeeded, None);
        assert!(store.append_execution(&exec).unwrap());

        let mut late = exec.clone();
        late.status = ExecutionStatus::Running;
        assert!(!store.append_execution(&late).unwrap());
        assert_eq!(store.find_execution(&exec.id).unwrap().status, ExecutionStatus::Succeeded);
        assert_eq!(store.load_executions("r1", Pagination::default()).unwrap().count, 1);
    }

    #[test]
    fn test_load_executions_paged() {
        let store = store();
        saved(&store, "r1");
        saved(&store, "r2");
        let first = Execution::new("r1", TriggerSource::manual(json!({})));
        let mut second = first.next_attempt();
        second.start_time = first.start_time + Duration::seconds(1);
        let mut third = second.next_attempt();
        third.start_time = second.start_time + Duration::seconds(1);
        for exec in [&first, &second, &third] {
            store.append_execution(exec).unwrap();
        }
        store.append_execution(&Execution::new("r2", TriggerSource::manual(json!({})))).unwrap();

        let page = store
            .load_executions(
                "r1",
                Pagination {
                    page_num: 1,
                    page_size: 2,
                },
            )
            .unwrap();
        assert_eq!(page.count, 3);
        assert_eq!(page.page_count, 2);
        assert_eq!(page.rows.iter().map(|e| e.attempt).collect::<Vec<_>>(), vec![3, 2]);

        let page = store
            .load_executions(
                "r1",
                Pagination {
                    page_num: 2,
                    page_size: 2,
                },
            )
            .unwrap();
        assert_eq!(page.page_num, 2);
        assert_eq!(page.rows[0].attempt, 1);

        assert_eq!(store.all_executions(None).unwrap().len(), 4);
        assert_eq!(store.all_executions(Some("r2")).unwrap().len(), 1);
    }
}
