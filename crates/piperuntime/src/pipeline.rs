use crate::config::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Serializable description of a pipeline: orchestrator settings plus the
/// ordered stage list. The last stage is the quality gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: OrchestratorConfig,
    pub stages: Vec<StageSpec>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            config: OrchestratorConfig::default(),
            stages: Vec::new(),
        }
    }

    pub fn add_stage(&mut self, stage: StageSpec) -> &mut Self {
        self.stages.push(stage);
        self
    }

    /// Id of the stage at `position` (0-based), generated when not given
    pub fn stage_id(&self, position: usize) -> Option<String> {
        self.stages.get(position).map(|s| s.resolved_id(position))
    }
}

/// One stage entry in a pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageSpec {
    pub stage_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub upstream: Option<usize>,
    /// Stage-specific settings, as plain JSON
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

impl StageSpec {
    pub fn new(stage_type: impl Into<String>) -> Self {
        Self {
            stage_type: stage_type.into(),
            id: None,
            name: None,
            max_retries: None,
            upstream: None,
            config: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_upstream(mut self, upstream: usize) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Explicit id, or `{stage_type}_{position + 1}`
    pub fn resolved_id(&self, position: usize) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.stage_type, position + 1))
    }
}
