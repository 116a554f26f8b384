//! Core abstractions for the flow simulator
//!
//! This crate provides the flow definition model, the error taxonomy, the
//! capability interfaces the engine expects from external collaborators,
//! and the execution event types. It carries no execution logic of its own.

mod capability;
mod definition;
mod error;
mod events;
pub mod samples;
mod value;
pub mod visualizer;

pub use capability::{ComputeInvoker, ModelInvoker, Passage, PromptTemplate, Retriever, TemplateResolver};
pub use definition::{
    ComputeConfig, Connection, ConnectionConfig, ConnectionKind, FlowBuilder, FlowDefinition,
    InferenceParams, InputPort, ModelInvokeConfig, NodeDefinition, NodeKind, OutputPort,
    RetrieveConfig, TemplateSource, ValueType,
};
pub use error::{CapabilityError, FlowError, NodeError, ValidationError};
pub use events::{EventBus, ExecutionEvent, RunId};
pub use value::Value;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
