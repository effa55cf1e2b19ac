use async_trait::async_trait;
use pipecore::{Stage, StageError, StageInput, StageOutput, Value};
use piperuntime::{FieldDefinition, StageConfig, StageFactory, StageMetadata};
use std::sync::Arc;

/// Forwards everything it receives, plus any fields configured under `emit`
pub struct PassthroughStage {
    config: StageConfig,
}

impl PassthroughStage {
    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Stage for PassthroughStage {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    async fn process(&self, input: StageInput) -> Result<StageOutput, StageError> {
        let mut fields = input.merged();
        fields.insert("target".to_string(), input.request.target.clone().into());

        if let Some(Value::Object(extra)) = self.config.setting("emit") {
            fields.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        tracing::debug!(
            "{}: forwarding {} field(s) from {} upstream stage(s)",
            self.config.id,
            fields.len(),
            input.upstream.len()
        );

        Ok(StageOutput::from(fields))
    }
}

pub struct PassthroughStageFactory;

impl StageFactory for PassthroughStageFactory {
    fn create(&self, config: StageConfig) -> Result<Arc<dyn Stage>, StageError> {
        match config.setting("emit") {
            None | Some(Value::Object(_)) => Ok(Arc::new(PassthroughStage::new(config))),
            Some(other) => Err(StageError::Configuration(format!(
                "'emit' must be an object, got {}",
                other.kind()
            ))),
        }
    }

    fn stage_type(&self) -> &str {
        "passthrough"
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            description: "Forwards upstream fields, optionally adding fixed ones".to_string(),
            category: "general".to_string(),
            inputs: vec![],
            outputs: vec![FieldDefinition::new(
                "target",
                "The run's target, plus every upstream field",
                true,
            )],
        }
    }
}
