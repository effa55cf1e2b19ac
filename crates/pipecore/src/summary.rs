use crate::{RunId, RunState, RunStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    Success,
    Error,
}

/// Caller-facing digest of a finished run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: RunId,
    pub status: SummaryStatus,
    pub quality_score: Option<f64>,
    pub output_path: PathBuf,
    pub message: String,
    pub error: Option<String>,
    pub stages_entered: usize,
    pub attempts: u32,
}

impl From<&RunState> for RunSummary {
    fn from(state: &RunState) -> Self {
        let status = if state.overall_status == RunStatus::Completed {
            SummaryStatus::Success
        } else {
            SummaryStatus::Error
        };
        let error = state
            .errors
            .first()
            .map(|e| format!("Error in {}: {}", e.stage_name, e.message));
        let message = match (status, state.passed) {
            (SummaryStatus::Success, Some(false)) => {
                "Pipeline completed without meeting the quality threshold".to_string()
            }
            (SummaryStatus::Success, _) => "Pipeline completed successfully".to_string(),
            (SummaryStatus::Error, _) => {
                format!("Pipeline failed with {} error(s)", state.errors.len())
            }
        };

        Self {
            run_id: state.run_id,
            status,
            quality_score: state.quality_score,
            output_path: state.output_path.clone(),
            message,
            error,
            stages_entered: state.stage_states.len(),
            attempts: state.stage_states.values().map(|s| s.retry_count).sum(),
        }
    }
}
