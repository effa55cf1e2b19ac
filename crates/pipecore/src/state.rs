use crate::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

pub type RunId = Uuid;
pub type StageId = String;

/// Output (and input) payload of a stage, keyed by field name
pub type Payload = HashMap<String, Value>;

/// Stage id used for errors not attributable to any stage
pub const ORCHESTRATOR_ID: &str = "orchestrator";
pub const ORCHESTRATOR_NAME: &str = "Orchestrator";

/// Immutable input to a whole run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRequest {
    /// What the pipeline operates on, e.g. a target URL
    pub target: String,
    /// Extra parameters made visible to every stage
    #[serde(default)]
    pub params: HashMap<String, Value>,
    /// Overrides the orchestrator's configured output root
    #[serde(default)]
    pub output_root: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            params: HashMap::new(),
            output_root: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(root.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Waiting,
    Running,
    Completed,
    Failed,
}

/// Per-stage bookkeeping, created on first entry and updated on every attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageState {
    pub stage_id: StageId,
    pub name: String,
    pub status: StageStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    /// Number of attempts so far, the first one included
    pub retry_count: u32,
    pub error: Option<String>,
}

impl StageState {
    pub fn new(stage_id: impl Into<StageId>, name: impl Into<String>) -> Self {
        Self {
            stage_id: stage_id.into(),
            name: name.into(),
            status: StageStatus::Waiting,
            start_time: None,
            end_time: None,
            duration_ms: None,
            retry_count: 0,
            error: None,
        }
    }
}

/// One entry of the append-only error log of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorRecord {
    pub stage_id: StageId,
    pub stage_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// The mutable record threaded through one pipeline execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    pub run_id: RunId,
    pub request: RunRequest,
    pub overall_status: RunStatus,
    pub current_stage_id: Option<StageId>,
    pub stage_states: HashMap<StageId, StageState>,
    pub results: HashMap<StageId, Payload>,
    pub errors: Vec<ErrorRecord>,
    /// Per-run output directory; may be replaced by the remediation stage's output
    pub output_path: PathBuf,
    pub quality_score: Option<f64>,
    pub passed: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(run_id: RunId, request: RunRequest, output_path: impl Into<PathBuf>) -> Self {
        Self {
            run_id,
            request,
            overall_status: RunStatus::Pending,
            current_stage_id: None,
            stage_states: HashMap::new(),
            results: HashMap::new(),
            errors: Vec::new(),
            output_path: output_path.into(),
            quality_score: None,
            passed: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn stage(&self, stage_id: &str) -> Option<&StageState> {
        self.stage_states.get(stage_id)
    }

    pub fn retry_count(&self, stage_id: &str) -> u32 {
        self.stage(stage_id).map_or(0, |s| s.retry_count)
    }

    pub fn has_failed_stage(&self) -> bool {
        self.stage_states
            .values()
            .any(|s| s.status == StageStatus::Failed)
    }

    pub fn record_error(
        &mut self,
        stage_id: impl Into<StageId>,
        stage_name: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.errors.push(ErrorRecord {
            stage_id: stage_id.into(),
            stage_name: stage_name.into(),
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn errors_for<'a>(&'a self, stage_id: &'a str) -> impl Iterator<Item = &'a ErrorRecord> {
        self.errors.iter().filter(move |e| e.stage_id == stage_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_no_stage_entries() {
        let state = RunState::new(Uuid::new_v4(), RunRequest::new("https://example.com"), "out");
        assert_eq!(state.overall_status, RunStatus::Pending);
        assert!(state.stage_states.is_empty());
        assert_eq!(state.retry_count("scraper_1"), 0);
        assert!(!state.has_failed_stage());
    }

    #[test]
    fn errors_accumulate_per_stage() {
        let mut state = RunState::new(Uuid::new_v4(), RunRequest::new("t"), "out");
        state.record_error("a", "A", "first");
        state.record_error("b", "B", "other");
        state.record_error("a", "A", "second");

        let messages: Vec<_> = state.errors_for("a").map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(state.errors.len(), 3);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&RunStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }
}
