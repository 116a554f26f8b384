//! Interfaces the engine requires from its external collaborators.
//!
//! One trait per capability kind, injected into the runtime as trait
//! objects so tests can substitute doubles and no client state is
//! process-global.

use crate::{CapabilityError, InferenceParams, TemplateSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Invokes an external compute endpoint with a JSON payload and returns the
/// JSON response body.
#[async_trait]
pub trait ComputeInvoker: Send + Sync {
    async fn invoke(
        &self,
        endpoint: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError>;
}

/// Sends a rendered prompt to a model-inference service and returns the raw
/// completion text.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke_model(
        &self,
        model_id: &str,
        prompt: &str,
        params: &InferenceParams,
    ) -> Result<String, CapabilityError>;
}

/// Issues a similarity query against a named knowledge source.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        knowledge_base_id: &str,
        query: &str,
        top_k: u32,
    ) -> Result<Vec<Passage>, CapabilityError>;
}

/// Resolves a template reference to its literal text and declared input
/// variables.
#[async_trait]
pub trait TemplateResolver: Send + Sync {
    async fn resolve(&self, source: &TemplateSource) -> Result<PromptTemplate, CapabilityError>;
}

/// One retrieved passage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// A resolved template: literal text plus the input-variable names it
/// declares.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    pub text: String,
    pub variables: Vec<String>,
}
