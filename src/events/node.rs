#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// Evaluation started, timestamp in milliseconds.
    Running(i64),
    /// Evaluation finished, timestamp in milliseconds.
    Succeeded(i64),
    Failed(String),
    /// Not evaluated, with the reason when there is one.
    Skipped(Option<String>),
}

impl NodeEvent {
    pub fn str(&self) -> &str {
        match self {
            NodeEvent::Running(_) => "running",
            NodeEvent::Succeeded(_) => "succeeded",
            NodeEvent::Failed(_) => "failed",
            NodeEvent::Skipped(_) => "skipped",
        }
    }
}
