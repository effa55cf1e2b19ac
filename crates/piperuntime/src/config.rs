use pipecore::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What a run becomes when the feedback loop runs out of budget while the
/// quality gate is still unsatisfied
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Finish as `completed` with the last (sub-threshold) artifact
    #[default]
    Degraded,
    /// Finish as `failed`
    FailRun,
}

/// Which notification to discard when the event queue is full
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    #[default]
    DropNewest,
    DropOldest,
}

/// Payload field names copied into the top-level run state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PropagationConfig {
    /// Gate field copied to `RunState::quality_score`
    pub score_field: String,
    /// Gate field copied to `RunState::passed`
    pub passed_field: String,
    /// Remediation field copied to `RunState::output_path`
    pub output_path_field: String,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            score_field: "quality_score".to_string(),
            passed_field: "passed".to_string(),
            output_path_field: "output_path".to_string(),
        }
    }
}

/// Configuration for one orchestrator instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Parent directory of the per-run output directories
    pub output_root: PathBuf,
    /// Gate scores below this value send the run back to remediation
    pub quality_threshold: f64,
    pub exhaustion_policy: ExhaustionPolicy,
    pub event_queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub propagation: PropagationConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("generated"),
            quality_threshold: 90.0,
            exhaustion_policy: ExhaustionPolicy::Degraded,
            event_queue_capacity: 1024,
            overflow_policy: OverflowPolicy::DropNewest,
            propagation: PropagationConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_exhaustion_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.exhaustion_policy = policy;
        self
    }

    pub fn with_event_queue(mut self, capacity: usize, policy: OverflowPolicy) -> Self {
        self.event_queue_capacity = capacity;
        self.overflow_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.event_queue_capacity == 0 {
            return Err(PipelineError::Config(
                "event_queue_capacity must be greater than zero".to_string(),
            ));
        }
        if !self.quality_threshold.is_finite() {
            return Err(PipelineError::Config(format!(
                "quality_threshold must be finite, got {}",
                self.quality_threshold
            )));
        }
        if self.output_root.as_os_str().is_empty() {
            return Err(PipelineError::Config("output_root is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{"quality_threshold": 75.0, "exhaustion_policy": "fail_run"}"#)
                .unwrap();
        assert_eq!(config.quality_threshold, 75.0);
        assert_eq!(config.exhaustion_policy, ExhaustionPolicy::FailRun);
        assert_eq!(config.event_queue_capacity, 1024);
        assert_eq!(config.propagation.score_field, "quality_score");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = OrchestratorConfig::default().with_event_queue(0, OverflowPolicy::DropOldest);
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }
}
