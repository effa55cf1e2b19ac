use crate::config::OrchestratorConfig;
use pipecore::{RunState, RunStatus, StageStatus};

/// Decision taken after the quality gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Re-enter the remediation stage
    Retry,
    /// Proceed to the terminal node
    Terminal,
    /// Proceed to the terminal node with the gate still unsatisfied and no
    /// budget left
    Exhausted,
}

/// Ids and retry budgets of the feedback loop members
#[derive(Debug, Clone, Copy)]
pub struct LoopBudget<'a> {
    pub gate_id: &'a str,
    pub gate_max_retries: u32,
    pub remediation_id: &'a str,
    pub remediation_max_retries: u32,
}

impl LoopBudget<'_> {
    fn gate_has_budget(&self, state: &RunState) -> bool {
        state.retry_count(self.gate_id) <= self.gate_max_retries
    }

    fn remediation_has_budget(&self, state: &RunState) -> bool {
        state.retry_count(self.remediation_id) <= self.remediation_max_retries
    }
}

/// Decide between another remediation pass and finishing the run.
///
/// A retry is only chosen while both loop members still have attempts left,
/// so the loop always terminates.
pub fn route_after_gate(state: &RunState, budget: &LoopBudget<'_>, config: &OrchestratorConfig) -> Route {
    if state.overall_status == RunStatus::Failed {
        tracing::debug!("Run {} already failed, routing to terminal", state.run_id);
        return Route::Terminal;
    }

    let Some(gate) = state.stage(budget.gate_id) else {
        return Route::Terminal;
    };
    let can_retry = budget.gate_has_budget(state) && budget.remediation_has_budget(state);

    if gate.status == StageStatus::Failed {
        let route = if can_retry { Route::Retry } else { Route::Terminal };
        tracing::debug!("Gate {} failed, routing {:?}", budget.gate_id, route);
        return route;
    }

    let result = state.results.get(budget.gate_id);
    let fields = &config.propagation;
    let passed = result
        .and_then(|r| r.get(&fields.passed_field))
        .and_then(|v| v.as_bool());
    let score = result
        .and_then(|r| r.get(&fields.score_field))
        .and_then(|v| v.as_f64());

    if passed == Some(true) {
        tracing::debug!("Gate {} passed", budget.gate_id);
        return Route::Terminal;
    }

    // An explicit fail from the gate outranks its score
    let deficit =
        passed == Some(false) || score.map_or(false, |s| s < config.quality_threshold);
    if !deficit {
        return Route::Terminal;
    }

    if can_retry {
        tracing::debug!(
            "Gate {} below threshold ({:?} < {}), retrying {}",
            budget.gate_id,
            score,
            config.quality_threshold,
            budget.remediation_id
        );
        Route::Retry
    } else {
        Route::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipecore::{Payload, RunRequest, StageState, Value};
    use uuid::Uuid;

    const BUDGET: LoopBudget<'static> = LoopBudget {
        gate_id: "gate",
        gate_max_retries: 2,
        remediation_id: "fix",
        remediation_max_retries: 2,
    };

    fn state_with(gate_status: StageStatus, attempts: u32, result: &[(&str, Value)]) -> RunState {
        let mut state = RunState::new(Uuid::new_v4(), RunRequest::new("t"), "out");
        state.overall_status = RunStatus::Running;
        for id in ["fix", "gate"] {
            let mut stage = StageState::new(id, id);
            stage.status = StageStatus::Completed;
            stage.retry_count = attempts;
            state.stage_states.insert(id.to_string(), stage);
        }
        state.stage_states.get_mut("gate").unwrap().status = gate_status;
        let payload: Payload = result
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        state.results.insert("gate".to_string(), payload);
        state
    }

    #[test]
    fn explicit_pass_proceeds() {
        let state = state_with(StageStatus::Completed, 1, &[("passed", true.into()), ("quality_score", 10.0.into())]);
        assert_eq!(route_after_gate(&state, &BUDGET, &OrchestratorConfig::default()), Route::Terminal);
    }

    #[test]
    fn low_score_retries_until_budget_is_spent() {
        let config = OrchestratorConfig::default();
        for attempts in 1..=2 {
            let state = state_with(StageStatus::Completed, attempts, &[("quality_score", 40.0.into())]);
            assert_eq!(route_after_gate(&state, &BUDGET, &config), Route::Retry);
        }
        let state = state_with(StageStatus::Completed, 3, &[("quality_score", 40.0.into())]);
        assert_eq!(route_after_gate(&state, &BUDGET, &config), Route::Exhausted);
    }

    #[test]
    fn score_at_threshold_is_a_pass() {
        let state = state_with(StageStatus::Completed, 1, &[("quality_score", 90.0.into())]);
        assert_eq!(route_after_gate(&state, &BUDGET, &OrchestratorConfig::default()), Route::Terminal);
    }

    #[test]
    fn explicit_fail_retries_even_with_a_passing_score() {
        let state = state_with(
            StageStatus::Completed,
            1,
            &[("passed", false.into()), ("quality_score", 95.0.into())],
        );
        assert_eq!(route_after_gate(&state, &BUDGET, &OrchestratorConfig::default()), Route::Retry);

        let spent = state_with(
            StageStatus::Completed,
            3,
            &[("passed", false.into()), ("quality_score", 95.0.into())],
        );
        assert_eq!(route_after_gate(&spent, &BUDGET, &OrchestratorConfig::default()), Route::Exhausted);
    }

    #[test]
    fn explicit_fail_without_score_is_a_deficit() {
        let state = state_with(StageStatus::Completed, 1, &[("passed", false.into())]);
        assert_eq!(route_after_gate(&state, &BUDGET, &OrchestratorConfig::default()), Route::Retry);

        let silent = state_with(StageStatus::Completed, 1, &[]);
        assert_eq!(route_after_gate(&silent, &BUDGET, &OrchestratorConfig::default()), Route::Terminal);
    }

    #[test]
    fn failed_gate_retries_only_with_budget() {
        let config = OrchestratorConfig::default();
        let state = state_with(StageStatus::Failed, 2, &[]);
        assert_eq!(route_after_gate(&state, &BUDGET, &config), Route::Retry);

        let state = state_with(StageStatus::Failed, 3, &[]);
        assert_eq!(route_after_gate(&state, &BUDGET, &config), Route::Terminal);
    }

    #[test]
    fn hard_stopped_run_goes_to_terminal() {
        let mut state = state_with(StageStatus::Completed, 1, &[("quality_score", 1.0.into())]);
        state.overall_status = RunStatus::Failed;
        assert_eq!(route_after_gate(&state, &BUDGET, &OrchestratorConfig::default()), Route::Terminal);
    }

    #[test]
    fn threshold_comes_from_config() {
        let state = state_with(StageStatus::Completed, 1, &[("quality_score", 0.7.into())]);
        let lenient = OrchestratorConfig::default().with_quality_threshold(0.5);
        assert_eq!(route_after_gate(&state, &BUDGET, &lenient), Route::Terminal);
    }
}
