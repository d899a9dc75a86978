mod event;
mod execution;
mod log;
mod rule;

pub use event::Event;
pub use execution::Execution;
pub use log::Log;
pub use rule::Rule;
