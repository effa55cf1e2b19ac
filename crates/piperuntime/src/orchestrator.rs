use crate::config::{ExhaustionPolicy, OrchestratorConfig};
use crate::dispatch::{DispatchStats, EventDispatcher, Notifier};
use crate::graph::{Edge, GraphNode, NodeRef, PipelineGraph, StageBinding};
use crate::handler::{self, StageOutcome};
use crate::router::{self, LoopBudget, Route};
use crate::terminal;
use futures::FutureExt;
use pipecore::{
    panic_message, EventCallback, OrchestratorFault, PipelineError, RunId, RunRequest, RunState,
    RunStatus, WorkflowEvent, ORCHESTRATOR_ID, ORCHESTRATOR_NAME,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Drives the stage pipeline for any number of runs
///
/// The graph is compiled once at construction; every call to
/// [`Orchestrator::run_workflow`] gets its own run state and output
/// directory, so runs may execute concurrently on one instance.
pub struct Orchestrator {
    graph: Arc<PipelineGraph>,
    config: OrchestratorConfig,
    dispatcher: Option<EventDispatcher>,
}

impl Orchestrator {
    /// Create an orchestrator without progress notifications
    pub fn new(stages: Vec<StageBinding>, config: OrchestratorConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let graph = PipelineGraph::compile(stages)?;
        Ok(Self {
            graph: Arc::new(graph),
            config,
            dispatcher: None,
        })
    }

    /// Create an orchestrator that reports progress to `callback`.
    ///
    /// Spawns the notification drain task, so it must be called from within
    /// a Tokio runtime.
    pub fn with_callback(
        stages: Vec<StageBinding>,
        config: OrchestratorConfig,
        callback: Arc<dyn EventCallback>,
    ) -> Result<Self, PipelineError> {
        let mut orchestrator = Self::new(stages, config)?;
        orchestrator.dispatcher = Some(EventDispatcher::spawn(
            callback,
            orchestrator.config.event_queue_capacity,
            orchestrator.config.overflow_policy,
        ));
        Ok(orchestrator)
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher
            .as_ref()
            .map(EventDispatcher::stats)
            .unwrap_or_default()
    }

    /// Execute the pipeline once.
    ///
    /// The run writes into `<root>/<run id>`, where `root` is
    /// `request.output_root` when set and the configured
    /// [`OrchestratorConfig::output_root`] otherwise.
    ///
    /// Never fails: stage failures and orchestrator faults are recorded in
    /// the returned state, whose `overall_status` is always terminal.
    pub async fn run_workflow(&self, request: RunRequest) -> RunState {
        let run_id = RunId::new_v4();
        let root = request
            .output_root
            .clone()
            .unwrap_or_else(|| self.config.output_root.clone());
        let output_path = root.join(run_id.simple().to_string());

        let mut state = RunState::new(run_id, request, output_path);
        state.overall_status = RunStatus::Running;
        let notifier = Notifier::new(self.dispatcher.as_ref());

        tracing::info!(
            "Starting run {} for {} ({} stages)",
            run_id,
            state.request.target,
            self.graph.len()
        );

        let outcome = AssertUnwindSafe(self.execute(&mut state, notifier))
            .catch_unwind()
            .await;
        let fault = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(fault)) => Some(fault),
            Err(payload) => Some(OrchestratorFault::Panicked(panic_message(payload.as_ref()))),
        };

        if let Some(fault) = fault {
            tracing::error!("Run {} aborted by orchestrator fault: {}", run_id, fault);
            let announced = state.finished_at.is_some();
            state.overall_status = RunStatus::Failed;
            state.record_error(ORCHESTRATOR_ID, ORCHESTRATOR_NAME, fault.to_string());
            state.finished_at = Some(chrono::Utc::now());
            if !announced {
                notifier.send(&state, WorkflowEvent::WorkflowFailed, None);
            }
        }

        state
    }

    /// Stop the notification task after delivering everything already queued,
    /// returning the final delivery counters.
    pub async fn shutdown(self) -> DispatchStats {
        match &self.dispatcher {
            Some(dispatcher) => {
                dispatcher.close().await;
                dispatcher.stats()
            }
            None => DispatchStats::default(),
        }
    }

    async fn execute(&self, state: &mut RunState, notifier: Notifier<'_>) -> Result<(), OrchestratorFault> {
        tokio::fs::create_dir_all(&state.output_path)
            .await
            .map_err(|source| OrchestratorFault::OutputDir {
                path: state.output_path.clone(),
                source,
            })?;

        let limit = self.graph.step_limit();
        let mut steps = 0;
        let mut current = self.graph.entry();

        loop {
            steps += 1;
            if steps > limit {
                return Err(OrchestratorFault::StepLimit { limit });
            }

            let idx = match current {
                NodeRef::Terminal => {
                    terminal::finalize(state, notifier);
                    return Ok(());
                }
                NodeRef::Stage(idx) => idx,
            };

            let outcome = handler::run_stage(&self.graph, idx, state, &self.config, notifier).await?;
            let node = self.graph.node(idx).ok_or(OrchestratorFault::UnknownNode(idx))?;
            current = self.next_node(node, outcome, state)?;
        }
    }

    fn next_node(
        &self,
        node: &GraphNode,
        outcome: StageOutcome,
        state: &mut RunState,
    ) -> Result<NodeRef, OrchestratorFault> {
        if state.overall_status == RunStatus::Failed {
            return Ok(NodeRef::Terminal);
        }

        match node.edge {
            Edge::Linear(next) => Ok(match outcome {
                StageOutcome::Completed => next,
                // Only the router re-enters stages
                StageOutcome::Failed { .. } => NodeRef::Terminal,
            }),
            Edge::Conditional { proceed, feedback } => {
                let remediation = self
                    .graph
                    .node(feedback)
                    .ok_or(OrchestratorFault::UnknownNode(feedback))?;
                let budget = LoopBudget {
                    gate_id: node.stage().id(),
                    gate_max_retries: node.stage().max_retries(),
                    remediation_id: remediation.stage().id(),
                    remediation_max_retries: remediation.stage().max_retries(),
                };

                match router::route_after_gate(state, &budget, &self.config) {
                    Route::Retry => Ok(NodeRef::Stage(feedback)),
                    Route::Terminal => Ok(proceed),
                    Route::Exhausted => {
                        self.apply_exhaustion(state, node);
                        Ok(proceed)
                    }
                }
            }
        }
    }

    fn apply_exhaustion(&self, state: &mut RunState, gate: &GraphNode) {
        let attempts = state.retry_count(gate.stage().id());
        let score = state
            .quality_score
            .map_or_else(|| "no score".to_string(), |s| format!("score {}", s));

        match self.config.exhaustion_policy {
            ExhaustionPolicy::Degraded => {
                tracing::warn!(
                    "Quality gate {} unsatisfied after {} attempts ({}), finishing degraded",
                    gate.stage().id(),
                    attempts,
                    score
                );
            }
            ExhaustionPolicy::FailRun => {
                let message = format!(
                    "quality threshold {} not met after {} attempts ({})",
                    self.config.quality_threshold, attempts, score
                );
                tracing::warn!("Quality gate {}: {}", gate.stage().id(), message);
                state.record_error(gate.stage().id(), gate.stage().name(), message);
                state.overall_status = RunStatus::Failed;
            }
        }
    }
}
