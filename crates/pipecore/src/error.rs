use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a single stage invocation.
///
/// Always contained by the node handler: it becomes a `failed` stage state,
/// an entry in the run's error list and a `stage_failed` event.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Stage panicked: {0}")]
    Panicked(String),
}

impl StageError {
    pub fn failed(message: impl Into<String>) -> Self {
        StageError::ExecutionFailed(message.into())
    }
}

/// Topology problems found while compiling the pipeline graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Pipeline has no stages")]
    Empty,

    #[error("Duplicate stage id: {0}")]
    DuplicateStage(String),

    #[error("Unknown stage type: {0}")]
    UnknownStageType(String),

    #[error("Stage '{stage_id}' requests {requested} upstream results but only {available} stages precede it")]
    InvalidUpstream {
        stage_id: String,
        requested: usize,
        available: usize,
    },
}

/// An error during a run that no single stage is responsible for.
#[derive(Error, Debug)]
pub enum OrchestratorFault {
    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Graph walk reached unknown node index {0}")]
    UnknownNode(usize),

    #[error("Graph walk exceeded {limit} steps")]
    StepLimit { limit: usize },

    #[error("Orchestrator panicked: {0}")]
    Panicked(String),
}

/// Raised by an event callback. Logged and discarded at the dispatch boundary.
#[derive(Error, Debug, Clone)]
pub enum NotificationError {
    #[error("Callback failed: {0}")]
    Callback(String),

    #[error("Callback panicked: {0}")]
    Panicked(String),
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
