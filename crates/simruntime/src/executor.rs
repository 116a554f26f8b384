use simcore::{
    CapabilityError, ComputeConfig, ComputeInvoker, ModelInvokeConfig, ModelInvoker,
    NodeDefinition, NodeError, NodeKind, PromptTemplate, RetrieveConfig, Retriever,
    TemplateResolver, Value,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Invokes the correct external capability for a single node.
///
/// Dispatch is a pattern match over [`NodeKind`]; side effects are confined
/// to the injected capability handles. No caching, no retry: the only policy
/// applied here is the per-call timeout.
pub struct NodeExecutor {
    compute: Arc<dyn ComputeInvoker>,
    model: Arc<dyn ModelInvoker>,
    retriever: Arc<dyn Retriever>,
    templates: Arc<dyn TemplateResolver>,
    call_timeout: Duration,
}

impl NodeExecutor {
    pub fn new(
        compute: Arc<dyn ComputeInvoker>,
        model: Arc<dyn ModelInvoker>,
        retriever: Arc<dyn Retriever>,
        templates: Arc<dyn TemplateResolver>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            compute,
            model,
            retriever,
            templates,
            call_timeout,
        }
    }

    /// Execute one node against its bound inputs and return its outputs
    /// keyed by output-port name.
    pub async fn execute(
        &self,
        node: &NodeDefinition,
        inputs: HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, NodeError> {
        match &node.kind {
            // The runner seeds the entry node; executing it is the identity.
            NodeKind::Input => Ok(inputs),
            NodeKind::Output => {
                let port = first_input_port(node, "document");
                let value = inputs
                    .get(&port)
                    .cloned()
                    .ok_or_else(|| NodeError::UnboundInput { port: port.clone() })?;
                Ok(HashMap::from([(port, value)]))
            }
            NodeKind::Compute(cfg) => self.invoke_compute(node, cfg, &inputs).await,
            NodeKind::ModelInvoke(cfg) => self.invoke_model(node, cfg, &inputs).await,
            NodeKind::Retrieve(cfg) => self.retrieve(node, cfg, &inputs).await,
        }
    }

    async fn invoke_compute(
        &self,
        node: &NodeDefinition,
        cfg: &ComputeConfig,
        inputs: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, NodeError> {
        let payload = serde_json::Value::Object(
            inputs
                .iter()
                .map(|(port, value)| (port.clone(), value.to_json()))
                .collect(),
        );
        let response = self
            .bounded(&cfg.lambda_arn, self.compute.invoke(&cfg.lambda_arn, payload))
            .await?;
        let value = response
            .get(&cfg.output_field)
            .cloned()
            .ok_or_else(|| NodeError::MalformedResponse {
                field: cfg.output_field.clone(),
            })?;
        Ok(single_output(node, "functionResponse", Value::from_json(value)))
    }

    async fn invoke_model(
        &self,
        node: &NodeDefinition,
        cfg: &ModelInvokeConfig,
        inputs: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, NodeError> {
        let template = self
            .bounded("template resolver", self.templates.resolve(&cfg.template))
            .await?;
        let prompt = render_template(&template, inputs)?;
        let completion = self
            .bounded(
                &cfg.model_id,
                self.model.invoke_model(&cfg.model_id, &prompt, &cfg.inference),
            )
            .await?;
        Ok(single_output(node, "modelCompletion", Value::String(completion)))
    }

    async fn retrieve(
        &self,
        node: &NodeDefinition,
        cfg: &RetrieveConfig,
        inputs: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, NodeError> {
        let port = first_input_port(node, "retrievalQuery");
        let query = inputs
            .get(&port)
            .ok_or_else(|| NodeError::UnboundInput { port: port.clone() })?;
        let passages = self
            .bounded(
                &cfg.knowledge_base_id,
                self.retriever
                    .retrieve(&cfg.knowledge_base_id, &query.to_text(), cfg.top_k),
            )
            .await?;
        // An empty result list is a successful retrieval.
        let items = passages
            .into_iter()
            .map(|p| {
                let mut obj = HashMap::new();
                obj.insert("content".to_string(), Value::String(p.content));
                if let Some(score) = p.score {
                    obj.insert("score".to_string(), Value::Number(score));
                }
                if let Some(location) = p.location {
                    obj.insert("location".to_string(), Value::String(location));
                }
                Value::Object(obj)
            })
            .collect();
        Ok(single_output(node, "retrievalResults", Value::Array(items)))
    }

    /// Apply the configured timeout to a capability call and lift its error
    /// into the node-level taxonomy.
    async fn bounded<T>(
        &self,
        capability: &str,
        call: impl Future<Output = Result<T, CapabilityError>>,
    ) -> Result<T, NodeError> {
        match timeout(self.call_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(CapabilityError::MalformedResponse { field })) => {
                Err(NodeError::MalformedResponse { field })
            }
            Ok(Err(source)) => Err(NodeError::ExternalInvocation {
                capability: capability.to_string(),
                source,
            }),
            Err(_) => Err(NodeError::ExternalInvocation {
                capability: capability.to_string(),
                source: CapabilityError::Timeout(self.call_timeout),
            }),
        }
    }
}

fn first_input_port(node: &NodeDefinition, fallback: &str) -> String {
    node.inputs
        .first()
        .map(|p| p.name.clone())
        .unwrap_or_else(|| fallback.to_string())
}

// Validation caps every node at one declared output port, so the produced
// value always lands on the port outgoing connections reference.
fn single_output(node: &NodeDefinition, fallback: &str, value: Value) -> HashMap<String, Value> {
    let port = node
        .outputs
        .first()
        .map(|p| p.name.clone())
        .unwrap_or_else(|| fallback.to_string());
    HashMap::from([(port, value)])
}

/// Substitute every declared template variable with its bound input,
/// rendered as text.
fn render_template(
    template: &PromptTemplate,
    inputs: &HashMap<String, Value>,
) -> Result<String, NodeError> {
    let mut text = template.text.clone();
    for variable in &template.variables {
        let value = inputs
            .get(variable)
            .ok_or_else(|| NodeError::TemplateRender {
                variable: variable.clone(),
            })?;
        text = text.replace(&format!("{{{{{variable}}}}}"), &value.to_text());
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::render_template;
    use simcore::{NodeError, PromptTemplate, Value};
    use std::collections::HashMap;

    fn template(text: &str, variables: &[&str]) -> PromptTemplate {
        PromptTemplate {
            text: text.to_string(),
            variables: variables.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn substitutes_every_variable() {
        let mut inputs = HashMap::new();
        inputs.insert("query".to_string(), Value::from("what is a flow?"));
        inputs.insert("context".to_string(), Value::Array(vec![Value::from("doc1")]));

        let rendered = render_template(
            &template("Q: {{query}}\nContext: {{context}}", &["query", "context"]),
            &inputs,
        )
        .unwrap();

        assert_eq!(rendered, "Q: what is a flow?\nContext: [\"doc1\"]");
    }

    #[test]
    fn missing_variable_is_a_render_error() {
        let result = render_template(&template("Hello {{name}}", &["name"]), &HashMap::new());
        assert!(matches!(
            result,
            Err(NodeError::TemplateRender { variable }) if variable == "name"
        ));
    }
}
