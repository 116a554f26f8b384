//! Canonical sample flows, handy as fixtures and for `simcli init`.

use crate::{
    ComputeConfig, FlowDefinition, ModelInvokeConfig, NodeDefinition, NodeKind, RetrieveConfig,
    TemplateSource, ValidationError, ValueType,
};

/// `Start --document--> End`: the smallest valid flow.
pub fn identity_flow() -> Result<FlowDefinition, ValidationError> {
    FlowDefinition::builder()
        .node(
            NodeDefinition::new("Start", NodeKind::Input)
                .with_output("document", ValueType::String),
        )
        .node(
            NodeDefinition::new("End", NodeKind::Output)
                .with_input("document", ValueType::String),
        )
        .connect("StartToEnd", "Start", "document", "End", "document")
        .build()
}

/// Input -> Compute -> Output, where the compute endpoint upcases its input.
pub fn upcase_flow(lambda_arn: &str) -> Result<FlowDefinition, ValidationError> {
    FlowDefinition::builder()
        .node(
            NodeDefinition::new("Start", NodeKind::Input)
                .with_output("document", ValueType::String),
        )
        .node(
            NodeDefinition::new("Upcase", NodeKind::Compute(ComputeConfig::new(lambda_arn)))
                .with_input("input", ValueType::String)
                .with_output("functionResponse", ValueType::String),
        )
        .node(
            NodeDefinition::new("End", NodeKind::Output)
                .with_input("document", ValueType::String),
        )
        .connect("StartToUpcase", "Start", "document", "Upcase", "input")
        .connect("UpcaseToEnd", "Upcase", "functionResponse", "End", "document")
        .build()
}

/// Retrieval-augmented generation: the input feeds both the knowledge-base
/// query and the prompt, and the retrieved passages feed the prompt as a
/// second input.
pub fn knowledge_base_flow(
    knowledge_base_id: &str,
    prompt_arn: &str,
) -> Result<FlowDefinition, ValidationError> {
    FlowDefinition::builder()
        .node(
            NodeDefinition::new("Start", NodeKind::Input)
                .with_output("document", ValueType::String),
        )
        .node(
            NodeDefinition::new(
                "QueryKnowledgeBase",
                NodeKind::Retrieve(RetrieveConfig::new(knowledge_base_id)),
            )
            .with_input("retrievalQuery", ValueType::String)
            .with_output("retrievalResults", ValueType::Array),
        )
        .node(
            NodeDefinition::new(
                "GenerateResponse",
                NodeKind::ModelInvoke(ModelInvokeConfig {
                    model_id: "anthropic.claude-v2".to_string(),
                    template: TemplateSource::Resource {
                        arn: prompt_arn.to_string(),
                    },
                    inference: Default::default(),
                }),
            )
            .with_input("query", ValueType::String)
            .with_input("context", ValueType::Array)
            .with_output("modelCompletion", ValueType::String),
        )
        .node(
            NodeDefinition::new("End", NodeKind::Output)
                .with_input("document", ValueType::String),
        )
        .connect("StartToKB", "Start", "document", "QueryKnowledgeBase", "retrievalQuery")
        .connect("StartToPrompt", "Start", "document", "GenerateResponse", "query")
        .connect(
            "KBToPrompt",
            "QueryKnowledgeBase",
            "retrievalResults",
            "GenerateResponse",
            "context",
        )
        .connect("PromptToEnd", "GenerateResponse", "modelCompletion", "End", "document")
        .build()
}
