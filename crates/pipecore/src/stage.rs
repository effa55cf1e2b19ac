use crate::{Payload, RunId, RunRequest, StageError, StageId, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Retry budget a stage gets unless it says otherwise
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Core trait that every pipeline step implements
///
/// The orchestrator only knows a stage's identity, its retry budget, and
/// whether `process` produced a payload or failed.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable identifier, unique within a pipeline (e.g. "validation_6")
    fn id(&self) -> &str;

    /// Display label
    fn name(&self) -> &str;

    /// How many times the stage may be re-entered after its first attempt
    fn max_retries(&self) -> u32 {
        DEFAULT_MAX_RETRIES
    }

    /// Run the stage once
    async fn process(&self, input: StageInput) -> Result<StageOutput, StageError>;
}

/// Input assembled for one stage invocation
#[derive(Debug, Clone)]
pub struct StageInput {
    pub run_id: RunId,
    pub request: RunRequest,
    /// Per-run output directory
    pub output_path: PathBuf,
    /// Results of the declared upstream stages, oldest first
    pub upstream: Vec<(StageId, Payload)>,
    /// 1-based attempt number for this stage
    pub attempt: u32,
}

impl StageInput {
    pub fn new(run_id: RunId, request: RunRequest, output_path: impl Into<PathBuf>) -> Self {
        Self {
            run_id,
            request,
            output_path: output_path.into(),
            upstream: Vec::new(),
            attempt: 1,
        }
    }

    pub fn with_upstream(mut self, stage_id: impl Into<StageId>, payload: Payload) -> Self {
        self.upstream.push((stage_id.into(), payload));
        self
    }

    /// Look a field up across upstream results, newest stage first, then in
    /// the request parameters.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.upstream
            .iter()
            .rev()
            .find_map(|(_, payload)| payload.get(name))
            .or_else(|| self.request.params.get(name))
    }

    /// Get required field or return error
    pub fn require(&self, name: &str) -> Result<&Value, StageError> {
        self.get(name)
            .ok_or_else(|| StageError::MissingInput(name.to_string()))
    }

    pub fn require_f64(&self, name: &str) -> Result<f64, StageError> {
        let value = self.require(name)?;
        value.as_f64().ok_or_else(|| StageError::InvalidInputType {
            field: name.to_string(),
            expected: "number".to_string(),
            actual: value.kind().to_string(),
        })
    }

    /// Result of one specific upstream stage
    pub fn upstream_result(&self, stage_id: &str) -> Option<&Payload> {
        self.upstream
            .iter()
            .find(|(id, _)| id == stage_id)
            .map(|(_, payload)| payload)
    }

    /// All upstream fields flattened into one map, newer stages shadowing older ones
    pub fn merged(&self) -> Payload {
        let mut merged = self.request.params.clone();
        for (_, payload) in &self.upstream {
            merged.extend(payload.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }
}

/// Output from one successful stage invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageOutput {
    pub fields: Payload,
}

impl StageOutput {
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
        }
    }

    pub fn with_output(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

impl From<Payload> for StageOutput {
    fn from(fields: Payload) -> Self {
        Self { fields }
    }
}
