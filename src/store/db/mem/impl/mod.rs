mod event;
mod execution;
mod log;
mod rule;
