use async_trait::async_trait;
use simcore::{
    CapabilityError, ComputeInvoker, InferenceParams, ModelInvoker, Passage, Retriever,
};

async fn expect_success(
    response: reqwest::Response,
) -> Result<serde_json::Value, CapabilityError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(CapabilityError::Status {
            status: status.as_u16(),
            message,
        });
    }
    response
        .json()
        .await
        .map_err(|e| CapabilityError::Transport(format!("invalid JSON response: {e}")))
}

/// Compute invoker that POSTs the payload to the endpoint reference,
/// treated as a URL.
pub struct HttpComputeInvoker {
    client: reqwest::Client,
}

impl HttpComputeInvoker {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpComputeInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComputeInvoker for HttpComputeInvoker {
    async fn invoke(
        &self,
        endpoint: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        tracing::debug!(endpoint, "invoking compute endpoint");
        let response = self
            .client
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;
        expect_success(response).await
    }
}

/// Model invoker speaking to a model-inference service over HTTP.
///
/// `POST {base_url}/model/{model_id}/invoke` with the prompt and inference
/// parameters; the service responds with `{"completion": "..."}`.
pub struct HttpModelInvoker {
    client: reqwest::Client,
    base_url: String,
}

impl HttpModelInvoker {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ModelInvoker for HttpModelInvoker {
    async fn invoke_model(
        &self,
        model_id: &str,
        prompt: &str,
        params: &InferenceParams,
    ) -> Result<String, CapabilityError> {
        tracing::debug!(model_id, "invoking model");
        let body = serde_json::json!({
            "prompt": prompt,
            "max_tokens_to_sample": params.max_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "top_k": params.top_k,
            "stop_sequences": params.stop_sequences,
        });
        let response = self
            .client
            .post(format!("{}/model/{}/invoke", self.base_url, model_id))
            .json(&body)
            .send()
            .await
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;
        let json = expect_success(response).await?;
        json.get("completion")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(CapabilityError::MalformedResponse {
                field: "completion".to_string(),
            })
    }
}

/// Retriever speaking to a knowledge-base service over HTTP.
///
/// `POST {base_url}/knowledgebases/{id}/retrieve`; the service responds
/// with `{"retrievalResults": [{"content": ...}, ...]}`.
pub struct HttpRetriever {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRetriever {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(
        &self,
        knowledge_base_id: &str,
        query: &str,
        top_k: u32,
    ) -> Result<Vec<Passage>, CapabilityError> {
        tracing::debug!(knowledge_base_id, top_k, "querying knowledge base");
        let body = serde_json::json!({
            "retrievalQuery": query,
            "numberOfResults": top_k,
        });
        let response = self
            .client
            .post(format!(
                "{}/knowledgebases/{}/retrieve",
                self.base_url, knowledge_base_id
            ))
            .json(&body)
            .send()
            .await
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;
        let json = expect_success(response).await?;
        let results = json
            .get("retrievalResults")
            .cloned()
            .ok_or(CapabilityError::MalformedResponse {
                field: "retrievalResults".to_string(),
            })?;
        serde_json::from_value(results)
            .map_err(|e| CapabilityError::Other(format!("could not decode passages: {e}")))
    }
}
