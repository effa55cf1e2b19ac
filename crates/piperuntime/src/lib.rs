//! Pipeline execution runtime
//!
//! This crate compiles an ordered list of stages into a graph with one
//! quality-gated feedback loop, and drives runs through it: per-stage
//! bookkeeping, routing after the gate, finalization, and non-blocking
//! progress notifications.

mod config;
mod dispatch;
mod graph;
mod handler;
mod orchestrator;
mod pipeline;
mod registry;
mod router;
mod terminal;

pub use config::{ExhaustionPolicy, OrchestratorConfig, OverflowPolicy, PropagationConfig};
pub use dispatch::{DispatchStats, EventDispatcher, Notification};
pub use graph::{Edge, FeedbackLoop, GraphNode, NodeRef, PipelineGraph, StageBinding};
pub use handler::StageOutcome;
pub use orchestrator::Orchestrator;
pub use pipeline::{PipelineDefinition, StageSpec};
pub use registry::{FieldDefinition, StageConfig, StageFactory, StageMetadata, StageRegistry};
pub use router::{route_after_gate, LoopBudget, Route};
