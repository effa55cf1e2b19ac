use pipecore::{GraphError, Stage};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A stage plus its static input declaration
#[derive(Clone)]
pub struct StageBinding {
    pub stage: Arc<dyn Stage>,
    /// How many immediately preceding stages' results the stage receives.
    /// `None` means just the previous stage, when there is one.
    pub upstream: Option<usize>,
}

impl StageBinding {
    pub fn new(stage: Arc<dyn Stage>) -> Self {
        Self {
            stage,
            upstream: None,
        }
    }

    pub fn with_upstream(mut self, count: usize) -> Self {
        self.upstream = Some(count);
        self
    }
}

impl fmt::Debug for StageBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageBinding")
            .field("stage", &self.stage.id())
            .field("upstream", &self.upstream)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef {
    Stage(usize),
    Terminal,
}

/// Outgoing edge of a stage node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Unconditional hand-off to the next node
    Linear(NodeRef),
    /// Decided by the router: proceed, or go back to the remediation stage
    Conditional { proceed: NodeRef, feedback: usize },
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub binding: StageBinding,
    pub edge: Edge,
    /// Indices of the stages whose results feed this one, oldest first
    pub inputs: Vec<usize>,
}

impl GraphNode {
    pub fn stage(&self) -> &dyn Stage {
        self.binding.stage.as_ref()
    }
}

/// Remediation stage and quality gate forming the feedback loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackLoop {
    pub remediation: usize,
    pub gate: usize,
}

/// Compiled pipeline topology
///
/// Holds no run data, so one compiled graph serves every run of an
/// orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    nodes: Vec<GraphNode>,
    feedback: Option<FeedbackLoop>,
}

impl PipelineGraph {
    /// Chain the stages in order; with two or more stages the last one is the
    /// quality gate and the one before it the remediation stage.
    pub fn compile(bindings: Vec<StageBinding>) -> Result<Self, GraphError> {
        if bindings.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut seen = HashSet::new();
        for binding in &bindings {
            if !seen.insert(binding.stage.id().to_string()) {
                return Err(GraphError::DuplicateStage(binding.stage.id().to_string()));
            }
        }

        let count = bindings.len();
        let feedback = (count >= 2).then(|| FeedbackLoop {
            remediation: count - 2,
            gate: count - 1,
        });

        let mut nodes = Vec::with_capacity(count);
        for (idx, binding) in bindings.into_iter().enumerate() {
            let requested = binding.upstream.unwrap_or(idx.min(1));
            if requested > idx {
                return Err(GraphError::InvalidUpstream {
                    stage_id: binding.stage.id().to_string(),
                    requested,
                    available: idx,
                });
            }

            let edge = match feedback {
                Some(fb) if fb.gate == idx => Edge::Conditional {
                    proceed: NodeRef::Terminal,
                    feedback: fb.remediation,
                },
                _ if idx + 1 < count => Edge::Linear(NodeRef::Stage(idx + 1)),
                _ => Edge::Linear(NodeRef::Terminal),
            };

            nodes.push(GraphNode {
                binding,
                edge,
                inputs: (idx - requested..idx).collect(),
            });
        }

        tracing::debug!(
            "Compiled pipeline graph: {} stages, feedback loop: {:?}",
            nodes.len(),
            feedback
        );

        Ok(Self { nodes, feedback })
    }

    pub fn entry(&self) -> NodeRef {
        NodeRef::Stage(0)
    }

    pub fn node(&self, idx: usize) -> Option<&GraphNode> {
        self.nodes.get(idx)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn feedback(&self) -> Option<FeedbackLoop> {
        self.feedback
    }

    pub fn stage_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.binding.stage.id())
    }

    /// Upper bound on node visits in one run: every stage used up to its
    /// full budget, plus the terminal node.
    pub fn step_limit(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| (n.binding.stage.max_retries() as usize).saturating_add(1))
            .fold(1, usize::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipecore::{StageError, StageInput, StageOutput};

    struct Noop(&'static str);

    #[async_trait]
    impl Stage for Noop {
        fn id(&self) -> &str {
            self.0
        }

        fn name(&self) -> &str {
            self.0
        }

        async fn process(&self, _input: StageInput) -> Result<StageOutput, StageError> {
            Ok(StageOutput::new())
        }
    }

    fn bind(id: &'static str) -> StageBinding {
        StageBinding::new(Arc::new(Noop(id)))
    }

    #[test]
    fn six_stages_chain_into_gate_with_feedback() {
        let graph = PipelineGraph::compile(
            ["s1", "s2", "s3", "s4", "s5", "s6"].into_iter().map(bind).collect(),
        )
        .unwrap();

        assert_eq!(graph.len(), 6);
        assert_eq!(graph.entry(), NodeRef::Stage(0));
        assert_eq!(graph.node(0).unwrap().edge, Edge::Linear(NodeRef::Stage(1)));
        assert_eq!(graph.node(4).unwrap().edge, Edge::Linear(NodeRef::Stage(5)));
        assert_eq!(
            graph.node(5).unwrap().edge,
            Edge::Conditional {
                proceed: NodeRef::Terminal,
                feedback: 4
            }
        );
        assert_eq!(
            graph.feedback(),
            Some(FeedbackLoop {
                remediation: 4,
                gate: 5
            })
        );
        // default retry budget of 2 gives 3 attempts per stage
        assert_eq!(graph.step_limit(), 6 * 3 + 1);
    }

    struct Unbounded;

    #[async_trait]
    impl Stage for Unbounded {
        fn id(&self) -> &str {
            "unbounded"
        }

        fn name(&self) -> &str {
            "unbounded"
        }

        fn max_retries(&self) -> u32 {
            u32::MAX
        }

        async fn process(&self, _input: StageInput) -> Result<StageOutput, StageError> {
            Ok(StageOutput::new())
        }
    }

    #[test]
    fn step_limit_saturates_with_huge_budgets() {
        let graph = PipelineGraph::compile(vec![
            StageBinding::new(Arc::new(Unbounded)),
            bind("gate"),
        ])
        .unwrap();
        assert_eq!(graph.step_limit(), u32::MAX as usize + 1 + 3 + 1);
    }

    #[test]
    fn single_stage_goes_straight_to_terminal() {
        let graph = PipelineGraph::compile(vec![bind("only")]).unwrap();
        assert_eq!(graph.feedback(), None);
        assert_eq!(graph.node(0).unwrap().edge, Edge::Linear(NodeRef::Terminal));
        assert!(graph.node(0).unwrap().inputs.is_empty());
    }

    #[test]
    fn upstream_declaration_selects_preceding_stages() {
        let graph = PipelineGraph::compile(vec![
            bind("a"),
            bind("b"),
            bind("c").with_upstream(2),
            bind("d").with_upstream(0),
        ])
        .unwrap();

        assert_eq!(graph.node(1).unwrap().inputs, vec![0]);
        assert_eq!(graph.node(2).unwrap().inputs, vec![0, 1]);
        assert!(graph.node(3).unwrap().inputs.is_empty());
    }

    #[test]
    fn invalid_topologies_are_rejected() {
        assert_eq!(PipelineGraph::compile(vec![]).unwrap_err(), GraphError::Empty);
        assert_eq!(
            PipelineGraph::compile(vec![bind("a"), bind("a")]).unwrap_err(),
            GraphError::DuplicateStage("a".to_string())
        );
        assert_eq!(
            PipelineGraph::compile(vec![bind("a"), bind("b").with_upstream(3)]).unwrap_err(),
            GraphError::InvalidUpstream {
                stage_id: "b".to_string(),
                requested: 3,
                available: 1
            }
        );
    }
}
