use std::time::Duration;
use thiserror::Error;

/// Top-level error for flow operations. A failed run surfaces exactly one
/// of these, attributed to the failing node where execution was involved.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("node '{node}' ({node_type}) failed: {source}")]
    Execution {
        node: String,
        node_type: &'static str,
        #[source]
        source: NodeError,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Structural defects in a flow definition. All of these are raised before
/// any external call is made.
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("duplicate node name: {0}")]
    DuplicateNodeName(String),

    #[error("duplicate connection name: {0}")]
    DuplicateConnectionName(String),

    #[error("connection '{connection}' references unknown node '{node}'")]
    DanglingReference { connection: String, node: String },

    #[error("connection '{connection}' references undeclared port '{port}' on node '{node}'")]
    UnknownPort {
        connection: String,
        node: String,
        port: String,
    },

    #[error("flow has no Input node")]
    MissingEntryNode,

    #[error("flow has more than one Input node: {0:?}")]
    MultipleEntryNodes(Vec<String>),

    #[error("flow has no Output node")]
    MissingTerminalNode,

    #[error("flow has more than one Output node: {0:?}")]
    MultipleTerminalNodes(Vec<String>),

    #[error("Input node '{0}' must not declare input ports")]
    EntryHasInputs(String),

    #[error("Output node '{0}' must not declare output ports")]
    TerminalHasOutputs(String),

    #[error("input port '{port}' on node '{node}' is fed by more than one connection")]
    DuplicateBinding { node: String, port: String },

    #[error("node '{0}' declares more than one output port")]
    MultipleOutputPorts(String),

    #[error("node '{0}' accepts only one input port")]
    MultipleInputPorts(String),

    #[error("node '{0}' has no incoming connection")]
    UnreachableNode(String),

    #[error("node '{0}' has no outgoing connection")]
    DeadEndNode(String),

    #[error("flow contains a cycle involving nodes {nodes:?}")]
    CyclicFlow { nodes: Vec<String> },

    #[error("input port '{port}' on node '{node}' has no connection feeding it")]
    UnboundInput { node: String, port: String },
}

/// Failure of a single node during execution. Fatal to the run; the runner
/// wraps it in [`FlowError::Execution`] with the node's name and type.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("input port '{port}' has no bound value")]
    UnboundInput { port: String },

    #[error("template variable '{variable}' has no bound input")]
    TemplateRender { variable: String },

    #[error("call to {capability} failed: {source}")]
    ExternalInvocation {
        capability: String,
        #[source]
        source: CapabilityError,
    },

    #[error("response is missing expected field '{field}'")]
    MalformedResponse { field: String },
}

/// Error reported by an external capability implementation.
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("service returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("response is missing expected field '{field}'")]
    MalformedResponse { field: String },

    #[error("{0}")]
    Other(String),
}
