use crate::{NotificationError, RunId, RunState, RunStatus, StageId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The five notifications a run produces
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEvent {
    StageStarted,
    StageCompleted,
    StageFailed,
    WorkflowCompleted,
    WorkflowFailed,
}

impl WorkflowEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowEvent::StageStarted => "stage_started",
            WorkflowEvent::StageCompleted => "stage_completed",
            WorkflowEvent::StageFailed => "stage_failed",
            WorkflowEvent::WorkflowCompleted => "workflow_completed",
            WorkflowEvent::WorkflowFailed => "workflow_failed",
        }
    }

    pub fn is_workflow_terminal(self) -> bool {
        matches!(
            self,
            WorkflowEvent::WorkflowCompleted | WorkflowEvent::WorkflowFailed
        )
    }
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of run progress notifications
///
/// One callback may be shared by many concurrent runs, so implementations
/// must tolerate concurrent invocation. Errors are logged by the dispatcher
/// and otherwise ignored.
#[async_trait]
pub trait EventCallback: Send + Sync {
    async fn on_event(
        &self,
        snapshot: Arc<RunState>,
        event: WorkflowEvent,
        stage_id: Option<StageId>,
    ) -> Result<(), NotificationError>;
}

/// Serializable view of one notification, for streaming to progress consumers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub run_id: RunId,
    pub event: WorkflowEvent,
    pub stage_id: Option<StageId>,
    pub stage_name: Option<String>,
    pub overall_status: RunStatus,
    pub retry_count: Option<u32>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub quality_score: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn from_snapshot(snapshot: &RunState, event: WorkflowEvent, stage_id: Option<&str>) -> Self {
        let stage = stage_id.and_then(|id| snapshot.stage(id));
        Self {
            run_id: snapshot.run_id,
            event,
            stage_id: stage_id.map(str::to_string),
            stage_name: stage.map(|s| s.name.clone()),
            overall_status: snapshot.overall_status,
            retry_count: stage.map(|s| s.retry_count),
            duration_ms: stage.and_then(|s| s.duration_ms),
            error: match event {
                WorkflowEvent::StageFailed => stage.and_then(|s| s.error.clone()),
                WorkflowEvent::WorkflowFailed => snapshot.errors.last().map(|e| e.message.clone()),
                _ => None,
            },
            quality_score: snapshot.quality_score,
            timestamp: Utc::now(),
        }
    }
}
