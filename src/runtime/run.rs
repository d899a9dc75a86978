use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{common::Shutdown, model::ExecutionStatus};

/// Status of a logical run, i.e. the sequence of attempts started by one request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled)
    }
}

#[derive(Debug, Default)]
struct RunState {
    status: RunStatus,
    executions: Vec<String>,
    cancel_requested: bool,
}

/// Handle on a run driven by the tracker.
///
/// The run id is the id of its first execution. Status changes and the
/// cancellation flag are decided under one lock, so a successful
/// [`Run::cancel`] always ends the run `Cancelled`.
#[derive(Debug)]
pub struct Run {
    id: String,
    rule_id: String,
    state: Mutex<RunState>,
    cancel: Shutdown,
    watch: watch::Sender<RunStatus>,
}

impl Run {
    pub(crate) fn new(
        rule_id: &str,
        first_execution_id: &str,
    ) -> Arc<Self> {
        let (watch, _) = watch::channel(RunStatus::Pending);

        Arc::new(Self {
            id: first_execution_id.to_string(),
            rule_id: rule_id.to_string(),
            state: Mutex::new(RunState {
                executions: vec![first_execution_id.to_string()],
                ..Default::default()
            }),
            cancel: Shutdown::new(),
            watch,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn status(&self) -> RunStatus {
        self.state.lock().map(|s| s.status).unwrap_or(RunStatus::Failed)
    }

    pub fn is_complete(&self) -> bool {
        self.status().is_terminal()
    }

    /// Execution ids of every attempt so far, oldest first.
    pub fn executions(&self) -> Vec<String> {
        self.state.lock().map(|s| s.executions.clone()).unwrap_or_default()
    }

    /// Request cooperative cancellation. Returns `false` when the run already finished.
    pub fn cancel(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.status.is_terminal() {
            return false;
        }
        state.cancel_requested = true;
        drop(state);

        self.cancel.shutdown();
        true
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_terminated()
    }

    /// Resolves once cancellation has been requested.
    pub(crate) fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        self.cancel.wait()
    }

    /// Wait until the run reaches a terminal state.
    pub async fn wait_async(&self) -> RunStatus {
        let mut rx = self.watch.subscribe();
        match rx.wait_for(|s| s.is_terminal()).await {
            Ok(status) => *status,
            Err(_) => self.status(),
        }
    }

    /// Blocking variant of [`Run::wait_async`]; must not be called from a tokio worker.
    pub fn wait(&self) -> RunStatus {
        futures::executor::block_on(self.wait_async())
    }

    pub(crate) fn push_execution(
        &self,
        eid: &str,
    ) {
        if let Ok(mut state) = self.state.lock() {
            state.executions.push(eid.to_string());
        }
    }

    pub(crate) fn set_running(&self) {
        if let Ok(mut state) = self.state.lock()
            && !state.status.is_terminal()
        {
            state.status = RunStatus::Running;
        }
    }

    /// Decide what follows an attempt that ended with `outcome`.
    ///
    /// A pending cancellation wins over every outcome. The decision is
    /// recorded immediately; waiters are only woken by [`Run::notify`].
    pub(crate) fn settle(
        &self,
        outcome: ExecutionStatus,
        can_retry: bool,
    ) -> RunStatus {
        let Ok(mut state) = self.state.lock() else {
            return RunStatus::Failed;
        };
        if state.status.is_terminal() {
            return state.status;
        }

        state.status = if state.cancel_requested {
            RunStatus::Cancelled
        } else if outcome.is_failure() && can_retry {
            RunStatus::Retrying
        } else if outcome == ExecutionStatus::Succeeded {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        state.status
    }

    /// Publish the current status to waiters.
    pub(crate) fn notify(&self) {
        let status = self.status();
        self.watch.send_replace(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_settle() {
        let run = Run::new("r1", "e1");
        assert_eq!(run.status(), RunStatus::Pending);

        run.set_running();
        assert_eq!(run.settle(ExecutionStatus::TimedOut, true), RunStatus::Retrying);
        run.push_execution("e2");
        run.set_running();
        assert_eq!(run.settle(ExecutionStatus::Failed, false), RunStatus::Failed);
        assert_eq!(run.executions(), vec!["e1".to_string(), "e2".to_string()]);
        assert!(run.is_complete());
    }

    #[test]
    fn test_run_cancel() {
        let run = Run::new("r1", "e1");
        assert!(run.cancel());
        assert!(run.is_cancel_requested());
        assert_eq!(run.settle(ExecutionStatus::Succeeded, false), RunStatus::Cancelled);
        assert!(!run.cancel());
    }

    #[test]
    fn test_run_wait() {
        let run = Run::new("r1", "e1");
        let waiter = {
            let run = run.clone();
            std::thread::spawn(move || run.wait())
        };

        run.settle(ExecutionStatus::Succeeded, false);
        run.notify();
        assert_eq!(waiter.join().unwrap(), RunStatus::Succeeded);
        assert_eq!(run.wait(), RunStatus::Succeeded);
    }
}
