use async_trait::async_trait;
use simclients::{InlineTemplateResolver, StaticTemplateResolver};
use simcore::{
    samples, CapabilityError, ComputeInvoker, ExecutionEvent, FlowDefinition, FlowError,
    InferenceParams, ModelInvokeConfig, ModelInvoker, NodeDefinition, NodeError, NodeKind,
    Passage, Retriever, TemplateSource, ValidationError, Value, ValueType,
};
use simruntime::{FlowRunner, RunnerConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---- capability doubles -------------------------------------------------

/// Fails if called; stands in for capabilities a flow never touches.
struct Unused;

#[async_trait]
impl ComputeInvoker for Unused {
    async fn invoke(
        &self,
        _endpoint: &str,
        _payload: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        Err(CapabilityError::Other("unexpected compute call".to_string()))
    }
}

#[async_trait]
impl ModelInvoker for Unused {
    async fn invoke_model(
        &self,
        _model_id: &str,
        _prompt: &str,
        _params: &InferenceParams,
    ) -> Result<String, CapabilityError> {
        Err(CapabilityError::Other("unexpected model call".to_string()))
    }
}

#[async_trait]
impl Retriever for Unused {
    async fn retrieve(
        &self,
        _knowledge_base_id: &str,
        _query: &str,
        _top_k: u32,
    ) -> Result<Vec<Passage>, CapabilityError> {
        Err(CapabilityError::Other("unexpected retrieval".to_string()))
    }
}

/// Compute double that upcases the "input" field of the payload.
struct UpcaseCompute;

#[async_trait]
impl ComputeInvoker for UpcaseCompute {
    async fn invoke(
        &self,
        _endpoint: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        let text = payload.get("input").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(serde_json::json!({ "output": text.to_uppercase() }))
    }
}

/// Compute double returning a fixed response body.
struct FixedCompute(serde_json::Value);

#[async_trait]
impl ComputeInvoker for FixedCompute {
    async fn invoke(
        &self,
        _endpoint: &str,
        _payload: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        Ok(self.0.clone())
    }
}

/// Compute double that takes longer than any reasonable test timeout.
struct SlowCompute(Duration);

#[async_trait]
impl ComputeInvoker for SlowCompute {
    async fn invoke(
        &self,
        _endpoint: &str,
        _payload: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        tokio::time::sleep(self.0).await;
        Ok(serde_json::json!({ "output": "too late" }))
    }
}

/// Model double that records every prompt it receives.
struct RecordingModel {
    completion: String,
    prompts: Mutex<Vec<String>>,
}

impl RecordingModel {
    fn new(completion: &str) -> Self {
        Self {
            completion: completion.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ModelInvoker for RecordingModel {
    async fn invoke_model(
        &self,
        _model_id: &str,
        prompt: &str,
        _params: &InferenceParams,
    ) -> Result<String, CapabilityError> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push(prompt.to_string());
        Ok(self.completion.clone())
    }
}

/// Retriever double returning fixed passages.
struct FixedRetriever(Vec<Passage>);

#[async_trait]
impl Retriever for FixedRetriever {
    async fn retrieve(
        &self,
        _knowledge_base_id: &str,
        _query: &str,
        _top_k: u32,
    ) -> Result<Vec<Passage>, CapabilityError> {
        Ok(self.0.clone())
    }
}

fn passage(content: &str) -> Passage {
    Passage {
        content: content.to_string(),
        score: None,
        location: None,
    }
}

// ---- runs ---------------------------------------------------------------

#[tokio::test]
async fn identity_flow_returns_input_unchanged() {
    let flow = samples::identity_flow().unwrap();
    let runner = FlowRunner::new(
        Arc::new(Unused),
        Arc::new(Unused),
        Arc::new(Unused),
        Arc::new(InlineTemplateResolver),
    );

    let result = runner.run(&flow, Value::from("Hello, Bedrock!")).await.unwrap();
    assert_eq!(result, Value::from("Hello, Bedrock!"));
}

#[tokio::test]
async fn compute_flow_threads_the_endpoint_response() {
    let flow = samples::upcase_flow("arn:lambda:upcase").unwrap();
    let runner = FlowRunner::new(
        Arc::new(UpcaseCompute),
        Arc::new(Unused),
        Arc::new(Unused),
        Arc::new(InlineTemplateResolver),
    );

    let result = runner.run(&flow, Value::from("Test input")).await.unwrap();
    assert_eq!(result, Value::from("TEST INPUT"));
}

#[tokio::test]
async fn knowledge_base_flow_invokes_model_once_with_both_inputs() {
    let flow = samples::knowledge_base_flow("kb-123", "arn:prompt").unwrap();
    let model = Arc::new(RecordingModel::new("Mocked response"));
    let templates = StaticTemplateResolver::new()
        .with_template("arn:prompt", "Question: {{query}}\nContext: {{context}}");
    let runner = FlowRunner::new(
        Arc::new(Unused),
        model.clone(),
        Arc::new(FixedRetriever(vec![passage("Mocked KB result")])),
        Arc::new(templates),
    );

    let result = runner
        .run(&flow, Value::from("What is Amazon Bedrock?"))
        .await
        .unwrap();
    assert_eq!(result, Value::from("Mocked response"));

    // Fan-in: both bound inputs arrive in a single model invocation.
    let prompts = model.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Question: What is Amazon Bedrock?"));
    assert!(prompts[0].contains("Mocked KB result"));
}

#[tokio::test]
async fn empty_retrieval_is_success_not_failure() {
    let flow = samples::knowledge_base_flow("kb-123", "arn:prompt").unwrap();
    let templates = StaticTemplateResolver::new()
        .with_template("arn:prompt", "Question: {{query}}\nContext: {{context}}");
    let runner = FlowRunner::new(
        Arc::new(Unused),
        Arc::new(RecordingModel::new("No sources found")),
        Arc::new(FixedRetriever(Vec::new())),
        Arc::new(templates),
    );

    let result = runner.run(&flow, Value::from("anything")).await.unwrap();
    assert_eq!(result, Value::from("No sources found"));
}

#[tokio::test]
async fn timed_out_compute_aborts_the_run_before_downstream_nodes() {
    let flow = samples::upcase_flow("arn:lambda:slow").unwrap();
    let runner = FlowRunner::with_config(
        Arc::new(SlowCompute(Duration::from_secs(5))),
        Arc::new(Unused),
        Arc::new(Unused),
        Arc::new(InlineTemplateResolver),
        RunnerConfig {
            call_timeout: Duration::from_millis(50),
            ..Default::default()
        },
    );

    let mut events = runner.subscribe();
    let err = runner.run(&flow, Value::from("Test input")).await.unwrap_err();

    match err {
        FlowError::Execution { node, node_type, source } => {
            assert_eq!(node, "Upcase");
            assert_eq!(node_type, "LambdaFunction");
            assert!(matches!(source, NodeError::ExternalInvocation { .. }));
        }
        other => panic!("expected execution error, got {other:?}"),
    }

    // The terminal node was never dispatched, and subscribers saw the
    // failure followed by an unsuccessful run completion.
    let mut saw_node_failed = false;
    let mut saw_run_completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ExecutionEvent::NodeStarted { node, .. } => assert_ne!(node, "End"),
            ExecutionEvent::NodeFailed { node, .. } => {
                assert_eq!(node, "Upcase");
                saw_node_failed = true;
            }
            ExecutionEvent::RunCompleted { success, .. } => {
                assert!(!success);
                saw_run_completed = true;
            }
            _ => {}
        }
    }
    assert!(saw_node_failed);
    assert!(saw_run_completed);
}

#[tokio::test]
async fn missing_response_field_is_a_malformed_response() {
    let flow = samples::upcase_flow("arn:lambda:odd").unwrap();
    let runner = FlowRunner::new(
        Arc::new(FixedCompute(serde_json::json!({ "result": "TEST" }))),
        Arc::new(Unused),
        Arc::new(Unused),
        Arc::new(InlineTemplateResolver),
    );

    let err = runner.run(&flow, Value::from("Test input")).await.unwrap_err();
    match err {
        FlowError::Execution { node, source, .. } => {
            assert_eq!(node, "Upcase");
            assert!(
                matches!(source, NodeError::MalformedResponse { ref field } if field == "output")
            );
        }
        other => panic!("expected execution error, got {other:?}"),
    }
}

#[tokio::test]
async fn unresolvable_template_variable_fails_the_prompt_node() {
    let flow = FlowDefinition::builder()
        .node(NodeDefinition::new("Start", NodeKind::Input).with_output("document", ValueType::String))
        .node(
            NodeDefinition::new(
                "Greet",
                NodeKind::ModelInvoke(ModelInvokeConfig {
                    model_id: "anthropic.claude-v2".to_string(),
                    template: TemplateSource::Inline {
                        text: "Hello {{name}}".to_string(),
                    },
                    inference: Default::default(),
                }),
            )
            .with_input("query", ValueType::String)
            .with_output("modelCompletion", ValueType::String),
        )
        .node(NodeDefinition::new("End", NodeKind::Output).with_input("document", ValueType::String))
        .connect("StartToGreet", "Start", "document", "Greet", "query")
        .connect("GreetToEnd", "Greet", "modelCompletion", "End", "document")
        .build()
        .unwrap();

    let runner = FlowRunner::new(
        Arc::new(Unused),
        Arc::new(RecordingModel::new("never reached")),
        Arc::new(Unused),
        Arc::new(InlineTemplateResolver),
    );

    let err = runner.run(&flow, Value::from("hi")).await.unwrap_err();
    match err {
        FlowError::Execution { node, source, .. } => {
            assert_eq!(node, "Greet");
            assert!(
                matches!(source, NodeError::TemplateRender { ref variable } if variable == "name")
            );
        }
        other => panic!("expected execution error, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_definition_fails_before_any_external_call() {
    // Duplicate node names can only come in via deserialization, never the
    // builder, so feed the runner a raw document.
    let json = r#"{
        "nodes": [
            {"name": "Start", "type": "Input", "outputs": [{"name": "document", "type": "String"}]},
            {"name": "Start", "type": "Input", "outputs": [{"name": "document", "type": "String"}]},
            {"name": "End", "type": "Output", "inputs": [{"name": "document", "type": "String"}]}
        ],
        "connections": [
            {"name": "StartToEnd", "source": "Start", "target": "End",
             "configuration": {"sourceOutput": "document", "targetInput": "document"}}
        ]
    }"#;
    let flow: FlowDefinition = serde_json::from_str(json).unwrap();

    let runner = FlowRunner::new(
        Arc::new(Unused),
        Arc::new(Unused),
        Arc::new(Unused),
        Arc::new(InlineTemplateResolver),
    );

    let err = runner.run(&flow, Value::from("x")).await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::Validation(ValidationError::DuplicateNodeName(ref name)) if name == "Start"
    ));
}

#[tokio::test]
async fn flow_wired_to_a_second_output_port_is_rejected_before_any_call() {
    // The builder refuses a second output port, so feed the runner a raw
    // document with the edge wired to the extra port. The run must fail at
    // validation; the `Unused` compute double would turn any dispatched call
    // into an execution error instead.
    let json = r#"{
        "nodes": [
            {"name": "Start", "type": "Input",
             "outputs": [{"name": "document", "type": "String"}]},
            {"name": "Upcase", "type": "LambdaFunction",
             "configuration": {"lambdaArn": "arn:lambda:upcase"},
             "inputs": [{"name": "input", "type": "String"}],
             "outputs": [{"name": "functionResponse", "type": "String"},
                         {"name": "secondary", "type": "String"}]},
            {"name": "End", "type": "Output",
             "inputs": [{"name": "document", "type": "String"}]}
        ],
        "connections": [
            {"name": "StartToUpcase", "source": "Start", "target": "Upcase",
             "configuration": {"sourceOutput": "document", "targetInput": "input"}},
            {"name": "UpcaseToEnd", "source": "Upcase", "target": "End",
             "configuration": {"sourceOutput": "secondary", "targetInput": "document"}}
        ]
    }"#;
    let flow: FlowDefinition = serde_json::from_str(json).unwrap();

    let runner = FlowRunner::new(
        Arc::new(Unused),
        Arc::new(Unused),
        Arc::new(Unused),
        Arc::new(InlineTemplateResolver),
    );

    let err = runner.run(&flow, Value::from("Test input")).await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::Validation(ValidationError::MultipleOutputPorts(ref name)) if name == "Upcase"
    ));
}

#[tokio::test]
async fn concurrent_runs_share_one_definition_without_interference() {
    let flow = Arc::new(samples::identity_flow().unwrap());
    let runner = Arc::new(FlowRunner::new(
        Arc::new(Unused),
        Arc::new(Unused),
        Arc::new(Unused),
        Arc::new(InlineTemplateResolver),
    ));

    let mut handles = Vec::new();
    for i in 0..8 {
        let flow = flow.clone();
        let runner = runner.clone();
        handles.push(tokio::spawn(async move {
            runner.run(&flow, Value::from(format!("input-{i}"))).await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let value = handle.await.unwrap().unwrap();
        assert_eq!(value, Value::from(format!("input-{i}")));
    }
}
