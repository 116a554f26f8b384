use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Declared type of a value carried by a port.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

/// Declared input slot on a node. The binding `expression` selects which part
/// of the incoming value feeds the port; `$.data` means the whole value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputPort {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default = "default_expression")]
    pub expression: String,
}

fn default_expression() -> String {
    "$.data".to_string()
}

/// Declared output slot on a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputPort {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

/// Configuration for a `Compute` node: which endpoint to invoke and which
/// field of the JSON response carries the result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComputeConfig {
    pub lambda_arn: String,
    #[serde(default = "default_output_field")]
    pub output_field: String,
}

fn default_output_field() -> String {
    "output".to_string()
}

impl ComputeConfig {
    pub fn new(lambda_arn: impl Into<String>) -> Self {
        Self {
            lambda_arn: lambda_arn.into(),
            output_field: default_output_field(),
        }
    }
}

/// Where the prompt template text comes from: inline in the definition, or a
/// previously registered template resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum TemplateSource {
    Inline { text: String },
    Resource { arn: String },
}

/// Inference parameters sent alongside the rendered prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceParams {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub stop_sequences: Vec<String>,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            temperature: 0.7,
            top_p: 1.0,
            top_k: 250,
            stop_sequences: vec!["\n\nHuman:".to_string()],
        }
    }
}

/// Configuration for a `ModelInvoke` node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelInvokeConfig {
    pub model_id: String,
    pub template: TemplateSource,
    #[serde(default)]
    pub inference: InferenceParams,
}

/// Configuration for a `Retrieve` node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveConfig {
    pub knowledge_base_id: String,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

fn default_top_k() -> u32 {
    5
}

impl RetrieveConfig {
    pub fn new(knowledge_base_id: impl Into<String>) -> Self {
        Self {
            knowledge_base_id: knowledge_base_id.into(),
            top_k: default_top_k(),
        }
    }
}

/// The closed set of node capabilities. Each variant carries its own
/// configuration shape; dispatch is by pattern match, never a string compare.
///
/// Persisted tags keep the names of the managed service API
/// (`LambdaFunction`, `Prompt`, `KnowledgeBase`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "configuration")]
pub enum NodeKind {
    Input,
    Output,
    #[serde(rename = "LambdaFunction")]
    Compute(ComputeConfig),
    #[serde(rename = "Prompt")]
    ModelInvoke(ModelInvokeConfig),
    #[serde(rename = "KnowledgeBase")]
    Retrieve(RetrieveConfig),
}

impl NodeKind {
    /// Persisted tag for this kind, used in errors and diagrams.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Input => "Input",
            NodeKind::Output => "Output",
            NodeKind::Compute(_) => "LambdaFunction",
            NodeKind::ModelInvoke(_) => "Prompt",
            NodeKind::Retrieve(_) => "KnowledgeBase",
        }
    }
}

/// One named step of a flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeDefinition {
    pub name: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default)]
    pub inputs: Vec<InputPort>,
    #[serde(default)]
    pub outputs: Vec<OutputPort>,
}

impl NodeDefinition {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.inputs.push(InputPort {
            name: name.into(),
            value_type,
            expression: default_expression(),
        });
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.outputs.push(OutputPort {
            name: name.into(),
            value_type,
        });
        self
    }
}

/// Edge category. Only data edges exist today; the tag leaves room for
/// control edges later.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionKind {
    #[default]
    Data,
}

/// Port mapping carried by a connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub source_output: String,
    pub target_input: String,
}

/// A typed data dependency from one node's output port to another node's
/// input port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    pub name: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default)]
    pub kind: ConnectionKind,
    pub configuration: ConnectionConfig,
}

impl Connection {
    pub fn data(
        name: impl Into<String>,
        source: impl Into<String>,
        source_output: impl Into<String>,
        target: impl Into<String>,
        target_input: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            kind: ConnectionKind::Data,
            configuration: ConnectionConfig {
                source_output: source_output.into(),
                target_input: target_input.into(),
            },
        }
    }
}

/// The static, immutable graph of nodes and connections describing a
/// pipeline. Built once (via [`FlowBuilder`] or deserialized) and consumed
/// read-only by the resolver and runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowDefinition {
    nodes: Vec<NodeDefinition>,
    connections: Vec<Connection>,
}

impl FlowDefinition {
    pub fn builder() -> FlowBuilder {
        FlowBuilder::new()
    }

    pub fn nodes(&self) -> &[NodeDefinition] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn node(&self, name: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// The single `Input` node. Present on every definition that passed
    /// [`validate`](Self::validate).
    pub fn entry(&self) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| matches!(n.kind, NodeKind::Input))
    }

    /// The single `Output` node.
    pub fn terminal(&self) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| matches!(n.kind, NodeKind::Output))
    }

    /// Check the structural invariants that do not require walking the
    /// dependency graph. Acyclicity and per-port satisfaction are checked by
    /// the resolver.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut names = HashSet::new();
        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(ValidationError::DuplicateNodeName(node.name.clone()));
            }
        }

        let mut conn_names = HashSet::new();
        for conn in &self.connections {
            if !conn_names.insert(conn.name.as_str()) {
                return Err(ValidationError::DuplicateConnectionName(conn.name.clone()));
            }
        }

        // A node produces exactly one value, stored under its single declared
        // output port; a second output port could never be fed. Output and
        // Retrieve nodes consume exactly one input.
        for node in &self.nodes {
            if node.outputs.len() > 1 {
                return Err(ValidationError::MultipleOutputPorts(node.name.clone()));
            }
            if node.inputs.len() > 1
                && matches!(node.kind, NodeKind::Output | NodeKind::Retrieve(_))
            {
                return Err(ValidationError::MultipleInputPorts(node.name.clone()));
            }
        }

        let entries: Vec<&NodeDefinition> = self
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Input))
            .collect();
        match entries.as_slice() {
            [] => return Err(ValidationError::MissingEntryNode),
            [entry] => {
                if !entry.inputs.is_empty() {
                    return Err(ValidationError::EntryHasInputs(entry.name.clone()));
                }
            }
            many => {
                return Err(ValidationError::MultipleEntryNodes(
                    many.iter().map(|n| n.name.clone()).collect(),
                ))
            }
        }

        let terminals: Vec<&NodeDefinition> = self
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Output))
            .collect();
        match terminals.as_slice() {
            [] => return Err(ValidationError::MissingTerminalNode),
            [terminal] => {
                if !terminal.outputs.is_empty() {
                    return Err(ValidationError::TerminalHasOutputs(terminal.name.clone()));
                }
            }
            many => {
                return Err(ValidationError::MultipleTerminalNodes(
                    many.iter().map(|n| n.name.clone()).collect(),
                ))
            }
        }

        let mut bound: HashSet<(&str, &str)> = HashSet::new();
        for conn in &self.connections {
            let source = self.node(&conn.source).ok_or_else(|| {
                ValidationError::DanglingReference {
                    connection: conn.name.clone(),
                    node: conn.source.clone(),
                }
            })?;
            let target = self.node(&conn.target).ok_or_else(|| {
                ValidationError::DanglingReference {
                    connection: conn.name.clone(),
                    node: conn.target.clone(),
                }
            })?;

            let out_port = &conn.configuration.source_output;
            if !source.outputs.iter().any(|p| &p.name == out_port) {
                return Err(ValidationError::UnknownPort {
                    connection: conn.name.clone(),
                    node: source.name.clone(),
                    port: out_port.clone(),
                });
            }
            let in_port = &conn.configuration.target_input;
            if !target.inputs.iter().any(|p| &p.name == in_port) {
                return Err(ValidationError::UnknownPort {
                    connection: conn.name.clone(),
                    node: target.name.clone(),
                    port: in_port.clone(),
                });
            }

            // At most one connection may feed a given (node, input port).
            if !bound.insert((conn.target.as_str(), in_port.as_str())) {
                return Err(ValidationError::DuplicateBinding {
                    node: conn.target.clone(),
                    port: in_port.clone(),
                });
            }
        }

        let mut incoming: HashMap<&str, usize> = HashMap::new();
        let mut outgoing: HashMap<&str, usize> = HashMap::new();
        for conn in &self.connections {
            *incoming.entry(conn.target.as_str()).or_default() += 1;
            *outgoing.entry(conn.source.as_str()).or_default() += 1;
        }
        for node in &self.nodes {
            let is_entry = matches!(node.kind, NodeKind::Input);
            let is_terminal = matches!(node.kind, NodeKind::Output);
            if !is_entry && !incoming.contains_key(node.name.as_str()) {
                return Err(ValidationError::UnreachableNode(node.name.clone()));
            }
            if !is_terminal && !outgoing.contains_key(node.name.as_str()) {
                return Err(ValidationError::DeadEndNode(node.name.clone()));
            }
        }

        Ok(())
    }
}

/// Builder for [`FlowDefinition`]. `build` validates, so a definition in
/// circulation always satisfies the structural invariants.
#[derive(Debug, Default)]
pub struct FlowBuilder {
    nodes: Vec<NodeDefinition>,
    connections: Vec<Connection>,
}

impl FlowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, node: NodeDefinition) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn connect(
        mut self,
        name: impl Into<String>,
        source: impl Into<String>,
        source_output: impl Into<String>,
        target: impl Into<String>,
        target_input: impl Into<String>,
    ) -> Self {
        self.connections
            .push(Connection::data(name, source, source_output, target, target_input));
        self
    }

    pub fn build(self) -> Result<FlowDefinition, ValidationError> {
        let flow = FlowDefinition {
            nodes: self.nodes,
            connections: self.connections,
        };
        flow.validate()?;
        Ok(flow)
    }
}
