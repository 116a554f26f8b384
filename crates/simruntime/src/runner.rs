use crate::executor::NodeExecutor;
use crate::resolver::resolve;
use chrono::Utc;
use simcore::{
    ComputeInvoker, EventBus, ExecutionEvent, FlowDefinition, FlowError, ModelInvoker, NodeError,
    Result, Retriever, RunId, TemplateResolver, ValidationError, Value,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Configuration for a [`FlowRunner`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Bounded wait applied to every external capability call.
    pub call_timeout: Duration,
    /// Buffer size of the execution event bus.
    pub event_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            event_capacity: 256,
        }
    }
}

/// Drives a whole flow: validates the definition, resolves order and
/// bindings, then executes node by node, threading values between steps.
///
/// A run either returns the terminal node's value or fails with exactly one
/// [`FlowError::Execution`] attributing the failing node. The definition is
/// shared read-only; each `run` call owns its private output state, so
/// concurrent runs of one definition need no locking.
pub struct FlowRunner {
    executor: NodeExecutor,
    events: EventBus,
}

impl FlowRunner {
    pub fn new(
        compute: Arc<dyn ComputeInvoker>,
        model: Arc<dyn ModelInvoker>,
        retriever: Arc<dyn Retriever>,
        templates: Arc<dyn TemplateResolver>,
    ) -> Self {
        Self::with_config(compute, model, retriever, templates, RunnerConfig::default())
    }

    pub fn with_config(
        compute: Arc<dyn ComputeInvoker>,
        model: Arc<dyn ModelInvoker>,
        retriever: Arc<dyn Retriever>,
        templates: Arc<dyn TemplateResolver>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            executor: NodeExecutor::new(compute, model, retriever, templates, config.call_timeout),
            events: EventBus::new(config.event_capacity),
        }
    }

    /// Subscribe to execution events for all runs driven by this runner.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    /// Emit the failure events for an aborted run and build the error that
    /// attributes the failing node. Every abort after `RunStarted` goes
    /// through here so subscribers always see `NodeFailed` then
    /// `RunCompleted`.
    fn fail(
        &self,
        run_id: RunId,
        started: Instant,
        node: &str,
        node_type: &'static str,
        source: NodeError,
    ) -> FlowError {
        tracing::error!(node = %node, error = %source, "node failed, aborting run");
        self.events.emit(ExecutionEvent::NodeFailed {
            run_id,
            node: node.to_string(),
            error: source.to_string(),
            timestamp: Utc::now(),
        });
        self.events.emit(ExecutionEvent::RunCompleted {
            run_id,
            success: false,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });
        FlowError::Execution {
            node: node.to_string(),
            node_type,
            source,
        }
    }

    /// Execute the flow against one input value and return the terminal
    /// node's value.
    pub async fn run(&self, flow: &FlowDefinition, input: Value) -> Result<Value> {
        flow.validate()?;
        let resolved = resolve(flow)?;

        let run_id = RunId::new_v4();
        let started = Instant::now();
        self.events.emit(ExecutionEvent::RunStarted {
            run_id,
            timestamp: Utc::now(),
        });
        tracing::info!(%run_id, nodes = flow.nodes().len(), "starting flow run");

        let entry = flow.entry().ok_or(ValidationError::MissingEntryNode)?;
        let entry_port = entry
            .outputs
            .first()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "document".to_string());

        // Run state: node name -> produced outputs, seeded with the entry
        // node's output so downstream bindings resolve uniformly.
        let mut state: HashMap<String, HashMap<String, Value>> = HashMap::new();
        state.insert(entry.name.clone(), HashMap::from([(entry_port, input)]));

        for name in &resolved.order {
            if name == &entry.name {
                continue;
            }
            // The resolver's order only names declared nodes.
            let Some(node) = flow.node(name) else { continue };

            let mut bound = HashMap::new();
            if let Some(slots) = resolved.bindings.get(name) {
                for (port, binding) in slots {
                    let value = state
                        .get(&binding.source_node)
                        .and_then(|outputs| outputs.get(&binding.source_output))
                        .cloned()
                        .ok_or_else(|| {
                            self.fail(
                                run_id,
                                started,
                                name,
                                node.kind.label(),
                                NodeError::UnboundInput { port: port.clone() },
                            )
                        })?;
                    bound.insert(port.clone(), value);
                }
            }

            self.events.emit(ExecutionEvent::NodeStarted {
                run_id,
                node: name.clone(),
                node_type: node.kind.label().to_string(),
                timestamp: Utc::now(),
            });
            tracing::debug!(node = %name, kind = node.kind.label(), "executing node");
            let node_started = Instant::now();

            match self.executor.execute(node, bound).await {
                Ok(outputs) => {
                    let duration_ms = node_started.elapsed().as_millis() as u64;
                    tracing::debug!(node = %name, duration_ms, "node completed");
                    self.events.emit(ExecutionEvent::NodeCompleted {
                        run_id,
                        node: name.clone(),
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                    state.insert(name.clone(), outputs);
                }
                Err(source) => {
                    return Err(self.fail(run_id, started, name, node.kind.label(), source));
                }
            }
        }

        let terminal = flow.terminal().ok_or(ValidationError::MissingTerminalNode)?;
        let terminal_port = terminal
            .inputs
            .first()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "document".to_string());
        let result = state
            .get(&terminal.name)
            .and_then(|outputs| outputs.get(&terminal_port))
            .cloned()
            .ok_or_else(|| {
                self.fail(
                    run_id,
                    started,
                    &terminal.name,
                    terminal.kind.label(),
                    NodeError::UnboundInput {
                        port: terminal_port.clone(),
                    },
                )
            })?;

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(%run_id, duration_ms, "flow run completed");
        self.events.emit(ExecutionEvent::RunCompleted {
            run_id,
            success: true,
            duration_ms,
            timestamp: Utc::now(),
        });
        Ok(result)
    }
}
