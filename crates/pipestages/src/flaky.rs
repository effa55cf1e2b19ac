use async_trait::async_trait;
use pipecore::{Stage, StageError, StageInput, StageOutput};
use piperuntime::{StageConfig, StageFactory, StageMetadata};
use std::sync::Arc;

/// Fails its first `fail_attempts` attempts, then behaves like a passthrough.
///
/// Useful for exercising retry budgets from a pipeline file.
pub struct FlakyStage {
    config: StageConfig,
    fail_attempts: u32,
    message: String,
}

#[async_trait]
impl Stage for FlakyStage {
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
        if input.attempt <= self.fail_attempts {
            return Err(StageError::failed(format!(
                "{} (attempt {} of {} scripted failures)",
                self.message, input.attempt, self.fail_attempts
            )));
        }

        Ok(StageOutput::from(input.merged()))
    }
}

pub struct FlakyStageFactory;

impl StageFactory for FlakyStageFactory {
    fn create(&self, config: StageConfig) -> Result<Arc<dyn Stage>, StageError> {
        let fail_attempts = config.f64_or("fail_attempts", 1.0).max(0.0) as u32;
        let message = config
            .setting("message")
            .and_then(|v| v.as_str())
            .unwrap_or("scripted failure")
            .to_string();

        Ok(Arc::new(FlakyStage {
            config,
            fail_attempts,
            message,
        }))
    }

    fn stage_type(&self) -> &str {
        "flaky"
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            description: "Fails the first fail_attempts attempts, then passes inputs through"
                .to_string(),
            category: "testing".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
