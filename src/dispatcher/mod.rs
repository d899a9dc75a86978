//! Runs one execution attempt over a rule graph.
//!
//! Nodes are visited sequentially in topological order. A node runs when at
//! least one incoming edge is active, i.e. its source succeeded and let the
//! branch pass. Failures poison everything downstream while independent
//! branches keep going. The attempt deadline and the run cancellation are
//! checked at every node boundary and raced against the node in flight.

mod dispatcher;

pub use dispatcher::Dispatcher;
