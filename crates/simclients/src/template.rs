use async_trait::async_trait;
use simcore::{CapabilityError, PromptTemplate, TemplateResolver, TemplateSource};
use std::collections::HashMap;

/// Collect the `{{variable}}` names appearing in a template, in first-use
/// order, without duplicates.
pub fn scan_variables(text: &str) -> Vec<String> {
    let mut variables: Vec<String> = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        let name = &after[..end];
        if !name.is_empty() && !variables.iter().any(|v| v == name) {
            variables.push(name.to_string());
        }
        rest = &after[end + 2..];
    }
    variables
}

/// Resolver for inline templates only. A resource reference fails, since
/// there is no registry to consult.
pub struct InlineTemplateResolver;

#[async_trait]
impl TemplateResolver for InlineTemplateResolver {
    async fn resolve(&self, source: &TemplateSource) -> Result<PromptTemplate, CapabilityError> {
        match source {
            TemplateSource::Inline { text } => Ok(PromptTemplate {
                text: text.clone(),
                variables: scan_variables(text),
            }),
            TemplateSource::Resource { arn } => Err(CapabilityError::Other(format!(
                "no template registry configured for resource '{arn}'"
            ))),
        }
    }
}

/// In-memory registry of pre-registered template resources, keyed by ARN.
/// Inline sources resolve as with [`InlineTemplateResolver`].
#[derive(Default)]
pub struct StaticTemplateResolver {
    templates: HashMap<String, String>,
}

impl StaticTemplateResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, arn: impl Into<String>, text: impl Into<String>) -> Self {
        self.templates.insert(arn.into(), text.into());
        self
    }
}

#[async_trait]
impl TemplateResolver for StaticTemplateResolver {
    async fn resolve(&self, source: &TemplateSource) -> Result<PromptTemplate, CapabilityError> {
        let text = match source {
            TemplateSource::Inline { text } => text.clone(),
            TemplateSource::Resource { arn } => self
                .templates
                .get(arn)
                .cloned()
                .ok_or_else(|| {
                    CapabilityError::Other(format!("unknown template resource '{arn}'"))
                })?,
        };
        let variables = scan_variables(&text);
        Ok(PromptTemplate { text, variables })
    }
}
