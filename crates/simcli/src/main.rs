use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use simcore::{samples, visualizer, ExecutionEvent, FlowDefinition, Value};
use simruntime::{resolve, FlowRunner, RunnerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "flowsim")]
#[command(about = "Flow simulator CLI", long_about = None)]
struct Cli {
    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow file against configured HTTP capability endpoints
    Run {
        /// Path to flow definition JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input value for the flow's Input node
        #[arg(short, long)]
        input: String,

        /// Base URL of the model-inference and retrieval services
        #[arg(long, default_value = "http://localhost:8000")]
        service_url: String,

        /// Timeout per external call, in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Validate a flow file (structure, cycles, input bindings)
    Validate {
        /// Path to flow definition JSON file
        file: PathBuf,
    },

    /// Print a Mermaid diagram of a flow file
    Render {
        /// Path to flow definition JSON file
        file: PathBuf,
    },

    /// Write a sample flow definition
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,

        /// Which sample flow to write
        #[arg(short, long, value_enum, default_value = "identity")]
        sample: Sample,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Sample {
    Identity,
    Upcase,
    KnowledgeBase,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Run {
            file,
            input,
            service_url,
            timeout,
        } => run_flow(file, input, service_url, timeout).await?,
        Commands::Validate { file } => validate_flow(file)?,
        Commands::Render { file } => render_flow(file)?,
        Commands::Init { output, sample } => init_flow(output, sample)?,
    }

    Ok(())
}

fn load_flow(file: &PathBuf) -> Result<FlowDefinition> {
    let json = std::fs::read_to_string(file)?;
    Ok(serde_json::from_str(&json)?)
}

async fn run_flow(file: PathBuf, input: String, service_url: String, timeout: u64) -> Result<()> {
    println!("🚀 Loading flow from: {}", file.display());
    let flow = load_flow(&file)?;
    println!("   Nodes: {}", flow.nodes().len());
    println!("   Connections: {}", flow.connections().len());
    println!();

    let runner = FlowRunner::with_config(
        Arc::new(simclients::HttpComputeInvoker::new()),
        Arc::new(simclients::HttpModelInvoker::new(service_url.clone())),
        Arc::new(simclients::HttpRetriever::new(service_url)),
        Arc::new(simclients::InlineTemplateResolver),
        RunnerConfig {
            call_timeout: Duration::from_secs(timeout),
            ..Default::default()
        },
    );

    // Print progress from the event stream while the run is in flight.
    let mut events = runner.subscribe();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::RunStarted { .. } => {
                    println!("▶️  Run started");
                }
                ExecutionEvent::NodeStarted { node, node_type, .. } => {
                    println!("  ⚡ Executing node: {} ({})", node, node_type);
                }
                ExecutionEvent::NodeCompleted { node, duration_ms, .. } => {
                    println!("  ✅ Node {} completed in {}ms", node, duration_ms);
                }
                ExecutionEvent::NodeFailed { node, error, .. } => {
                    println!("  ❌ Node {} failed: {}", node, error);
                }
                ExecutionEvent::RunCompleted { success, duration_ms, .. } => {
                    if success {
                        println!("✨ Run completed in {}ms", duration_ms);
                    } else {
                        println!("💥 Run failed after {}ms", duration_ms);
                    }
                }
            }
        }
    });

    let result = runner.run(&flow, Value::String(input)).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    event_task.abort();

    let value = result?;
    println!();
    println!("📤 Result: {}", value.to_text());
    Ok(())
}

fn validate_flow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());
    let flow = load_flow(&file)?;
    flow.validate()?;
    let resolved = resolve(&flow)?;

    println!("✅ Flow is valid:");
    println!("   Nodes: {}", flow.nodes().len());
    println!("   Connections: {}", flow.connections().len());
    println!("   Execution order: {}", resolved.order.join(" -> "));
    Ok(())
}

fn render_flow(file: PathBuf) -> Result<()> {
    let flow = load_flow(&file)?;
    println!("{}", visualizer::render(&flow));
    Ok(())
}

fn init_flow(output: PathBuf, sample: Sample) -> Result<()> {
    let flow = match sample {
        Sample::Identity => samples::identity_flow()?,
        Sample::Upcase => {
            samples::upcase_flow("arn:aws:lambda:us-west-2:123456789012:function:UpcaseFunction")?
        }
        Sample::KnowledgeBase => samples::knowledge_base_flow(
            "arn:aws:bedrock:us-west-2:123456789012:knowledge-base/MyKnowledgeBase",
            "arn:aws:bedrock:us-west-2:123456789012:prompt/MyResponsePrompt",
        )?,
    };

    let json = serde_json::to_string_pretty(&flow)?;
    std::fs::write(&output, json)?;
    println!("📝 Wrote sample flow to {}", output.display());
    Ok(())
}
