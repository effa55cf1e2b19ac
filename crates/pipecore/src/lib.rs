//! Core abstractions for the pipeline engine
//!
//! This crate provides the stage contract, the run state every stage
//! execution mutates, notification types and the error taxonomy. It holds
//! no orchestration logic.

mod error;
pub mod events;
mod stage;
mod state;
mod summary;
mod value;

pub use error::{
    panic_message, GraphError, NotificationError, OrchestratorFault, PipelineError, StageError,
};
pub use events::*;
pub use stage::{Stage, StageInput, StageOutput, DEFAULT_MAX_RETRIES};
pub use state::{
    ErrorRecord, Payload, RunId, RunRequest, RunState, RunStatus, StageId, StageState,
    StageStatus, ORCHESTRATOR_ID, ORCHESTRATOR_NAME,
};
pub use summary::{RunSummary, SummaryStatus};
pub use value::Value;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
