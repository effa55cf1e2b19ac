use crate::config::OrchestratorConfig;
use crate::dispatch::Notifier;
use crate::graph::{GraphNode, PipelineGraph};
use futures::FutureExt;
use pipecore::{
    panic_message, OrchestratorFault, RunState, RunStatus, StageError, StageInput, StageOutput,
    StageState, StageStatus, WorkflowEvent,
};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Instant;

/// How a single stage attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    Failed {
        /// Attempts now exceed the stage's retry budget
        budget_exhausted: bool,
    },
}

/// Run one attempt of the stage at `idx` with full bookkeeping.
///
/// Stage failures (errors and panics) are recorded in `state` and reported
/// through the returned outcome; only a malformed graph produces `Err`.
pub(crate) async fn run_stage(
    graph: &PipelineGraph,
    idx: usize,
    state: &mut RunState,
    config: &OrchestratorConfig,
    notifier: Notifier<'_>,
) -> Result<StageOutcome, OrchestratorFault> {
    let node = graph.node(idx).ok_or(OrchestratorFault::UnknownNode(idx))?;
    let stage = node.stage();
    let stage_id = stage.id().to_string();

    state.current_stage_id = Some(stage_id.clone());
    let attempt = {
        let entry = state
            .stage_states
            .entry(stage_id.clone())
            .or_insert_with(|| StageState::new(stage_id.clone(), stage.name()));
        entry.retry_count += 1;
        entry.status = StageStatus::Running;
        entry.start_time = Some(chrono::Utc::now());
        entry.end_time = None;
        entry.duration_ms = None;
        entry.retry_count
    };

    tracing::info!(
        "Stage {} ({}) started, attempt {}/{}",
        stage_id,
        stage.name(),
        attempt,
        stage.max_retries().saturating_add(1)
    );
    notifier.send(state, WorkflowEvent::StageStarted, Some(&stage_id));

    let input = assemble_input(graph, node, state, attempt);
    let started = Instant::now();
    let result = match AssertUnwindSafe(stage.process(input)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(StageError::Panicked(panic_message(payload.as_ref()))),
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    let outcome = match result {
        Ok(output) => {
            if let Some(entry) = state.stage_states.get_mut(&stage_id) {
                entry.status = StageStatus::Completed;
                entry.end_time = Some(chrono::Utc::now());
                entry.duration_ms = Some(duration_ms);
            }
            propagate_fields(graph, idx, &output, state, config);
            state.results.insert(stage_id.clone(), output.fields);

            tracing::info!("Stage {} completed in {}ms", stage_id, duration_ms);
            notifier.send(state, WorkflowEvent::StageCompleted, Some(&stage_id));
            StageOutcome::Completed
        }
        Err(e) => {
            let message = e.to_string();
            if let Some(entry) = state.stage_states.get_mut(&stage_id) {
                entry.status = StageStatus::Failed;
                entry.end_time = Some(chrono::Utc::now());
                entry.duration_ms = Some(duration_ms);
                entry.error = Some(message.clone());
            }
            state.record_error(stage_id.clone(), stage.name(), message.clone());
            tracing::warn!("Stage {} failed on attempt {}: {}", stage_id, attempt, message);

            let budget_exhausted = attempt > stage.max_retries();
            if budget_exhausted {
                tracing::warn!(
                    "Stage {} exceeded its retry budget of {}, failing run {}",
                    stage_id,
                    stage.max_retries(),
                    state.run_id
                );
                state.overall_status = RunStatus::Failed;
            }

            notifier.send(state, WorkflowEvent::StageFailed, Some(&stage_id));
            StageOutcome::Failed { budget_exhausted }
        }
    };

    Ok(outcome)
}

/// Request plus the results of the node's declared upstream stages.
fn assemble_input(graph: &PipelineGraph, node: &GraphNode, state: &RunState, attempt: u32) -> StageInput {
    let mut input = StageInput::new(state.run_id, state.request.clone(), state.output_path.clone());
    input.attempt = attempt;

    for upstream in node.inputs.iter().filter_map(|&i| graph.node(i)) {
        let upstream_id = upstream.stage().id();
        if let Some(payload) = state.results.get(upstream_id) {
            input = input.with_upstream(upstream_id, payload.clone());
        }
    }

    input
}

/// Copy the configured gate and remediation fields into the top-level state.
fn propagate_fields(
    graph: &PipelineGraph,
    idx: usize,
    output: &StageOutput,
    state: &mut RunState,
    config: &OrchestratorConfig,
) {
    let Some(feedback) = graph.feedback() else {
        return;
    };
    let fields = &config.propagation;

    if idx == feedback.gate {
        if let Some(score) = output.get(&fields.score_field).and_then(|v| v.as_f64()) {
            state.quality_score = Some(score);
        }
        if let Some(passed) = output.get(&fields.passed_field).and_then(|v| v.as_bool()) {
            state.passed = Some(passed);
        }
    }

    if idx == feedback.remediation {
        if let Some(path) = output.get(&fields.output_path_field).and_then(|v| v.as_str()) {
            state.output_path = PathBuf::from(path);
        }
    }
}
