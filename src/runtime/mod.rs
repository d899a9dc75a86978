mod channel;
mod context;
mod run;

pub use channel::{Channel, ChannelEvent, ChannelOptions};
pub use context::Context;
pub use run::{Run, RunStatus};
