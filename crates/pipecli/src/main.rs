// crates/pipecli/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipecore::{EventBus, ProgressEvent, RunRequest, RunStatus, RunSummary, Value, WorkflowEvent};
use piperuntime::{Orchestrator, PipelineDefinition, PipelineGraph};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pipe")]
#[command(about = "Pipeline orchestration CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline file once
    Run {
        /// Path to pipeline JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// What the pipeline operates on, e.g. a URL
        #[arg(short, long)]
        target: String,

        /// Extra request parameter as key=value (value parsed as JSON when possible)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Override the configured output root
        #[arg(short, long)]
        output_root: Option<PathBuf>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a pipeline file
    Validate {
        /// Path to pipeline JSON file
        file: PathBuf,
    },

    /// List available stage types
    Stages,

    /// Create a new example pipeline
    Init {
        /// Output file path
        #[arg(short, long, default_value = "pipeline.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            target,
            params,
            output_root,
            verbose,
        } => {
            // Initialize logging
            if verbose {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::DEBUG)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::INFO)
                    .init();
            }

            let status = run_pipeline(file, target, params, output_root).await?;
            if status == RunStatus::Failed {
                std::process::exit(1);
            }
        }

        Commands::Validate { file } => {
            validate_pipeline(file)?;
        }

        Commands::Stages => {
            list_stages();
        }

        Commands::Init { output } => {
            create_example_pipeline(output)?;
        }
    }

    Ok(())
}

fn load_definition(file: &PathBuf) -> Result<PipelineDefinition> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("reading pipeline file {}", file.display()))?;
    let definition: PipelineDefinition = serde_json::from_str(&json)
        .with_context(|| format!("parsing pipeline file {}", file.display()))?;
    Ok(definition)
}

fn parse_param(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Parameter '{}' must look like key=value", raw))?;
    let value = serde_json::from_str::<serde_json::Value>(value)
        .map(Value::from_plain_json)
        .unwrap_or_else(|_| Value::from(value));
    Ok((key.to_string(), value))
}

fn print_progress(event: &ProgressEvent) {
    let stage = event.stage_name.as_deref().or(event.stage_id.as_deref()).unwrap_or("-");
    match event.event {
        WorkflowEvent::StageStarted => {
            println!("  ⚡ {} started (attempt {})", stage, event.retry_count.unwrap_or(1));
        }
        WorkflowEvent::StageCompleted => {
            println!("  ✅ {} completed in {}ms", stage, event.duration_ms.unwrap_or(0));
        }
        WorkflowEvent::StageFailed => {
            println!(
                "  ❌ {} failed: {}",
                stage,
                event.error.as_deref().unwrap_or("unknown error")
            );
        }
        WorkflowEvent::WorkflowCompleted => match event.quality_score {
            Some(score) => println!("✨ Pipeline completed (quality score {})", score),
            None => println!("✨ Pipeline completed"),
        },
        WorkflowEvent::WorkflowFailed => {
            println!(
                "💥 Pipeline failed: {}",
                event.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

async fn run_pipeline(
    file: PathBuf,
    target: String,
    params: Vec<String>,
    output_root: Option<PathBuf>,
) -> Result<RunStatus> {
    println!("🚀 Loading pipeline from: {}", file.display());
    let definition = load_definition(&file)?;

    println!("📋 Pipeline: {}", definition.name);
    println!("   Stages: {}", definition.stages.len());
    println!();

    let mut request = RunRequest::new(target);
    for raw in &params {
        let (key, value) = parse_param(raw)?;
        request.params.insert(key, value);
    }
    request.output_root = output_root;

    let registry = pipestages::standard_registry();
    let bindings = registry.build(&definition)?;

    // Subscribe to events for real-time output
    let bus = Arc::new(EventBus::new(definition.config.event_queue_capacity));
    let mut events = bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let done = event.event.is_workflow_terminal();
            print_progress(&event);
            if done {
                break;
            }
        }
    });

    let orchestrator = Orchestrator::with_callback(bindings, definition.config.clone(), bus)?;
    let state = orchestrator.run_workflow(request).await;

    // Every queued event has reached the bus once shutdown returns
    let stats = orchestrator.shutdown().await;
    if stats.dropped > 0 {
        tracing::warn!("{} progress event(s) dropped", stats.dropped);
    }
    if let Err(e) = printer.await {
        tracing::warn!("Progress printer stopped abnormally: {}", e);
    }

    let summary = RunSummary::from(&state);
    println!();
    println!("📊 Run Summary:");
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(state.overall_status)
}

fn validate_pipeline(file: PathBuf) -> Result<()> {
    println!("🔍 Validating pipeline: {}", file.display());

    let definition = load_definition(&file)?;
    definition.config.validate()?;
    let registry = pipestages::standard_registry();
    let graph = PipelineGraph::compile(registry.build(&definition)?)?;

    println!("✅ Pipeline is valid:");
    println!("   Name: {}", definition.name);
    for (position, id) in graph.stage_ids().enumerate() {
        println!("   {}. {}", position + 1, id);
    }
    match graph.feedback() {
        Some(feedback) => {
            let name = |idx: usize| graph.node(idx).map(|n| n.stage().id().to_string());
            println!(
                "   Quality gate: {} (remediation: {})",
                name(feedback.gate).unwrap_or_default(),
                name(feedback.remediation).unwrap_or_default()
            );
        }
        None => println!("   No feedback loop (single stage)"),
    }
    println!("   Max node visits per run: {}", graph.step_limit());

    Ok(())
}

fn list_stages() {
    println!("📦 Available Stage Types:");
    println!();

    let registry = pipestages::standard_registry();

    for stage_type in registry.list_stage_types() {
        if let Some(metadata) = registry.get_metadata(&stage_type) {
            println!("  • {} ({})", stage_type, metadata.category);
            println!("    {}", metadata.description);
            for field in &metadata.outputs {
                println!("      → {}: {}", field.name, field.description);
            }
        } else {
            println!("  • {}", stage_type);
        }
    }
}

fn create_example_pipeline(output: PathBuf) -> Result<()> {
    let pipeline = pipestages::demo_pipeline();

    let json = serde_json::to_string_pretty(&pipeline)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example pipeline: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  pipe run --file {} --target https://example.com",
        output.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_parse_as_json_or_fall_back_to_strings() {
        assert_eq!(
            parse_param("depth=3").unwrap(),
            ("depth".to_string(), Value::Number(3.0))
        );
        assert_eq!(
            parse_param("mode=strict").unwrap(),
            ("mode".to_string(), Value::from("strict"))
        );
        assert!(parse_param("novalue").is_err());
    }
}
