use async_trait::async_trait;
use pipecore::{Stage, StageError, StageInput, StageOutput, Value};
use piperuntime::{FieldDefinition, StageConfig, StageFactory, StageMetadata};
use std::sync::Arc;

/// Where a quality gate gets its score from
#[derive(Debug, Clone, PartialEq)]
enum ScoreSource {
    /// One score per attempt; the last one repeats
    Scripted(Vec<f64>),
    /// A numeric field produced upstream
    Field(String),
}

/// Scores the upstream artifact and reports `quality_score` and `passed`
pub struct QualityGateStage {
    config: StageConfig,
    source: ScoreSource,
    threshold: f64,
}

impl QualityGateStage {
    fn score(&self, input: &StageInput) -> Result<f64, StageError> {
        match &self.source {
            ScoreSource::Scripted(scores) => {
                let idx = (input.attempt.max(1) as usize - 1).min(scores.len() - 1);
                Ok(scores[idx])
            }
            ScoreSource::Field(field) => input.require_f64(field),
        }
    }
}

#[async_trait]
impl Stage for QualityGateStage {
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
        let score = self.score(&input)?;
        let passed = score >= self.threshold;

        tracing::info!(
            "{}: quality score {} (threshold {}) -> {}",
            self.config.id,
            score,
            self.threshold,
            if passed { "PASS" } else { "FAIL" }
        );

        Ok(StageOutput::new()
            .with_output("quality_score", score)
            .with_output("passed", passed)
            .with_output("threshold", self.threshold)
            .with_output("attempt", input.attempt))
    }
}

pub struct QualityGateStageFactory;

impl StageFactory for QualityGateStageFactory {
    fn create(&self, config: StageConfig) -> Result<Arc<dyn Stage>, StageError> {
        let source = match (config.setting("scores"), config.setting("score_field")) {
            (Some(Value::Array(items)), None) => {
                let scores = items
                    .iter()
                    .map(|v| {
                        v.as_f64().ok_or_else(|| {
                            StageError::Configuration(format!(
                                "scores must be numbers, got {}",
                                v.kind()
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if scores.is_empty() {
                    return Err(StageError::Configuration("scores is empty".to_string()));
                }
                ScoreSource::Scripted(scores)
            }
            (None, Some(field)) => ScoreSource::Field(
                field
                    .as_str()
                    .ok_or_else(|| StageError::Configuration("score_field must be a string".to_string()))?
                    .to_string(),
            ),
            _ => {
                return Err(StageError::Configuration(
                    "quality_gate needs exactly one of 'scores' or 'score_field'".to_string(),
                ))
            }
        };

        Ok(Arc::new(QualityGateStage {
            threshold: config.f64_or("threshold", 90.0),
            source,
            config,
        }))
    }

    fn stage_type(&self) -> &str {
        "quality_gate"
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            description: "Scores the artifact from scripted scores or an upstream field".to_string(),
            category: "quality".to_string(),
            inputs: vec![],
            outputs: vec![
                FieldDefinition::new("quality_score", "Score on the configured scale", true),
                FieldDefinition::new("passed", "Whether the score met the threshold", true),
            ],
        }
    }
}
