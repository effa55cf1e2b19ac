use crate::dispatch::Notifier;
use pipecore::{RunState, RunStatus, WorkflowEvent};

/// Settle the overall status and announce the end of the run.
pub(crate) fn finalize(state: &mut RunState, notifier: Notifier<'_>) {
    if state.overall_status != RunStatus::Failed {
        state.overall_status = if state.has_failed_stage() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
    }
    state.finished_at = Some(chrono::Utc::now());

    let event = match state.overall_status {
        RunStatus::Completed => WorkflowEvent::WorkflowCompleted,
        _ => WorkflowEvent::WorkflowFailed,
    };

    tracing::info!(
        "Run {} finished: {:?} ({} stage(s) entered, {} error(s))",
        state.run_id,
        state.overall_status,
        state.stage_states.len(),
        state.errors.len()
    );
    notifier.send(state, event, None);
}
