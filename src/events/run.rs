use crate::model::ExecutionStatus;

#[derive(Debug, Clone)]
pub enum RunEvent {
    Started,
    /// A failed attempt is followed by attempt `attempt` after `delay_ms`.
    Retrying {
        attempt: u32,
        delay_ms: u64,
    },
    Succeeded,
    Failed(String),
    Cancelled,
}

impl RunEvent {
    pub fn str(&self) -> &str {
        match self {
            RunEvent::Started => "started",
            RunEvent::Retrying {
                ..
            } => "retrying",
            RunEvent::Succeeded => "succeeded",
            RunEvent::Failed(_) => "failed",
            RunEvent::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    Pending,
    Running(u32),
    Finished(ExecutionStatus),
}

impl ExecutionEvent {
    pub fn str(&self) -> &str {
        match self {
            ExecutionEvent::Pending => "pending",
            ExecutionEvent::Running(_) => "running",
            ExecutionEvent::Finished(status) => status.as_ref(),
        }
    }
}
