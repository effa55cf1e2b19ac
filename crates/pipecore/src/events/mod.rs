// crates/pipecore/src/events/mod.rs

mod base;
mod bus;

pub use base::{EventCallback, ProgressEvent, WorkflowEvent};
pub use bus::EventBus;
