use async_trait::async_trait;
use pipecore::{Stage, StageError, StageInput, StageOutput};
use piperuntime::{StageConfig, StageFactory, StageMetadata};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Waits for a configured duration, then passes its inputs through
pub struct DelayStage {
    config: StageConfig,
    delay: Duration,
}

#[async_trait]
impl Stage for DelayStage {
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
        tracing::debug!("{}: delaying for {:?}", self.config.id, self.delay);
        sleep(self.delay).await;

        Ok(StageOutput::from(input.merged()))
    }
}

pub struct DelayStageFactory;

impl StageFactory for DelayStageFactory {
    fn create(&self, config: StageConfig) -> Result<Arc<dyn Stage>, StageError> {
        // Default to 100ms if not specified
        let delay_ms = config.f64_or("delay_ms", 100.0);
        if !delay_ms.is_finite() || delay_ms < 0.0 {
            return Err(StageError::Configuration(format!(
                "delay_ms must be a non-negative number, got {}",
                delay_ms
            )));
        }

        Ok(Arc::new(DelayStage {
            delay: Duration::from_millis(delay_ms as u64),
            config,
        }))
    }

    fn stage_type(&self) -> &str {
        "delay"
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            description: "Delay for the configured delay_ms, then pass inputs through".to_string(),
            category: "time".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
