use crate::graph::StageBinding;
use crate::pipeline::PipelineDefinition;
use pipecore::{GraphError, PipelineError, Stage, StageError, Value, DEFAULT_MAX_RETRIES};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a factory needs to build one stage instance
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub id: String,
    pub name: String,
    pub max_retries: u32,
    pub settings: HashMap<String, Value>,
}

impl StageConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            settings: HashMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Numeric setting with a default
    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.setting(key).and_then(Value::as_f64).unwrap_or(default)
    }
}

/// Factory trait for creating stage instances
pub trait StageFactory: Send + Sync {
    /// Create a new stage with the given identity and settings
    fn create(&self, config: StageConfig) -> Result<Arc<dyn Stage>, StageError>;

    /// Stage type identifier
    fn stage_type(&self) -> &str;

    /// Optional: description and payload schema
    fn metadata(&self) -> StageMetadata {
        StageMetadata::default()
    }
}

/// Metadata about a stage type
#[derive(Debug, Clone)]
pub struct StageMetadata {
    pub description: String,
    pub category: String,
    pub inputs: Vec<FieldDefinition>,
    pub outputs: Vec<FieldDefinition>,
}

impl Default for StageMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required,
        }
    }
}

/// Registry of available stage types
pub struct StageRegistry {
    factories: HashMap<String, Arc<dyn StageFactory>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a stage factory
    pub fn register(&mut self, factory: Arc<dyn StageFactory>) {
        let stage_type = factory.stage_type().to_string();
        tracing::debug!("Registering stage type: {}", stage_type);
        self.factories.insert(stage_type, factory);
    }

    /// Create a stage instance of the given type
    pub fn create_stage(
        &self,
        stage_type: &str,
        config: StageConfig,
    ) -> Result<Arc<dyn Stage>, PipelineError> {
        let factory = self
            .factories
            .get(stage_type)
            .ok_or_else(|| GraphError::UnknownStageType(stage_type.to_string()))?;

        Ok(factory.create(config)?)
    }

    /// Instantiate every stage of a definition, in order
    pub fn build(&self, definition: &PipelineDefinition) -> Result<Vec<StageBinding>, PipelineError> {
        definition
            .stages
            .iter()
            .enumerate()
            .map(|(position, spec)| {
                let id = spec.resolved_id(position);
                let config = StageConfig {
                    name: spec.name.clone().unwrap_or_else(|| id.clone()),
                    id,
                    max_retries: spec.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
                    settings: spec
                        .config
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::from_plain_json(v.clone())))
                        .collect(),
                };
                let stage = self.create_stage(&spec.stage_type, config)?;
                let binding = StageBinding::new(stage);
                Ok(match spec.upstream {
                    Some(count) => binding.with_upstream(count),
                    None => binding,
                })
            })
            .collect()
    }

    /// All registered stage types, sorted
    pub fn list_stage_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for a stage type
    pub fn get_metadata(&self, stage_type: &str) -> Option<StageMetadata> {
        self.factories.get(stage_type).map(|f| f.metadata())
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageSpec;
    use async_trait::async_trait;
    use pipecore::{StageInput, StageOutput};

    struct Fixed(StageConfig);

    #[async_trait]
    impl Stage for Fixed {
        fn id(&self) -> &str {
            &self.0.id
        }

        fn name(&self) -> &str {
            &self.0.name
        }

        fn max_retries(&self) -> u32 {
            self.0.max_retries
        }

        async fn process(&self, _input: StageInput) -> Result<StageOutput, StageError> {
            Ok(StageOutput::new())
        }
    }

    struct FixedFactory;

    impl StageFactory for FixedFactory {
        fn create(&self, config: StageConfig) -> Result<Arc<dyn Stage>, StageError> {
            if config.setting("reject").is_some() {
                return Err(StageError::Configuration("rejected".to_string()));
            }
            Ok(Arc::new(Fixed(config)))
        }

        fn stage_type(&self) -> &str {
            "fixed"
        }
    }

    fn registry() -> StageRegistry {
        let mut registry = StageRegistry::new();
        registry.register(Arc::new(FixedFactory));
        registry
    }

    #[test]
    fn builds_bindings_with_generated_ids() {
        let mut def = PipelineDefinition::new("demo");
        def.add_stage(StageSpec::new("fixed").with_name("First"))
            .add_stage(StageSpec::new("fixed").with_max_retries(5).with_upstream(1));

        let bindings = registry().build(&def).unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].stage.id(), "fixed_1");
        assert_eq!(bindings[0].stage.name(), "First");
        assert_eq!(bindings[0].stage.max_retries(), DEFAULT_MAX_RETRIES);
        assert_eq!(bindings[1].stage.name(), "fixed_2");
        assert_eq!(bindings[1].stage.max_retries(), 5);
        assert_eq!(bindings[1].upstream, Some(1));
    }

    #[test]
    fn unknown_type_and_factory_errors_surface() {
        let mut def = PipelineDefinition::new("demo");
        def.add_stage(StageSpec::new("missing"));
        assert!(matches!(
            registry().build(&def),
            Err(PipelineError::Graph(GraphError::UnknownStageType(_)))
        ));

        let mut def = PipelineDefinition::new("demo");
        def.add_stage(StageSpec::new("fixed").with_config("reject", true));
        assert!(matches!(
            registry().build(&def),
            Err(PipelineError::Stage(StageError::Configuration(_)))
        ));
    }

    #[test]
    fn lists_types_with_metadata() {
        let registry = registry();
        assert_eq!(registry.list_stage_types(), vec!["fixed".to_string()]);
        assert_eq!(registry.get_metadata("fixed").unwrap().category, "general");
        assert!(registry.get_metadata("nope").is_none());
    }
}
