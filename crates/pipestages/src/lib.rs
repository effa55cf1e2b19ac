//! Standard stage library
//!
//! Domain-neutral stages for assembling and exercising pipelines: they move
//! data along, wait, fail on purpose, or score an artifact.

mod delay;
mod flaky;
mod gate;
mod passthrough;

pub use delay::{DelayStage, DelayStageFactory};
pub use flaky::{FlakyStage, FlakyStageFactory};
pub use gate::{QualityGateStage, QualityGateStageFactory};
pub use passthrough::{PassthroughStage, PassthroughStageFactory};
use piperuntime::{PipelineDefinition, StageRegistry, StageSpec};

use std::sync::Arc;

/// Register all standard stages with a registry
pub fn register_all(registry: &mut StageRegistry) {
    registry.register(Arc::new(PassthroughStageFactory));
    registry.register(Arc::new(DelayStageFactory));
    registry.register(Arc::new(FlakyStageFactory));
    registry.register(Arc::new(QualityGateStageFactory));
}

/// Registry preloaded with the standard stages
pub fn standard_registry() -> StageRegistry {
    let mut registry = StageRegistry::new();
    register_all(&mut registry);
    registry
}

/// Six-stage example pipeline whose gate fails once, then passes
pub fn demo_pipeline() -> PipelineDefinition {
    let mut pipeline = PipelineDefinition::new("Demo pipeline");
    pipeline.description =
        Some("Six stages with one remediation pass before the quality gate is met".to_string());

    pipeline
        .add_stage(StageSpec::new("passthrough").with_name("Fetch"))
        .add_stage(StageSpec::new("delay").with_name("Analyze").with_config("delay_ms", 50))
        .add_stage(StageSpec::new("passthrough").with_name("Extract Tokens").with_upstream(2))
        .add_stage(StageSpec::new("passthrough").with_name("Layout").with_upstream(2))
        .add_stage(StageSpec::new("delay").with_name("Synthesize").with_upstream(4).with_max_retries(3))
        .add_stage(
            StageSpec::new("quality_gate")
                .with_name("Validate")
                .with_max_retries(3)
                .with_config("scores", serde_json::json!([72.5, 93.0]))
                .with_config("threshold", 90),
        );

    pipeline
}
