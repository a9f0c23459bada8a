mod client;
pub(crate) mod schema;
pub(crate) mod types;

pub use schema::StructuredOutput;

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::traits::{ModerationAgent, ModerationResult};
use crate::util::strip_code_blocks;
use client::OpenAiClient;

pub const DEFAULT_MODERATION_MODEL: &str = "omni-moderation-latest";
pub const FALLBACK_MODERATION_MODEL: &str = "text-moderation-latest";

// =============================================================================
// OpenAi Agent
// =============================================================================

#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    pub(crate) model: String,
    moderation_model: String,
    fallback_moderation_model: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            moderation_model: DEFAULT_MODERATION_MODEL.to_string(),
            fallback_moderation_model: Some(FALLBACK_MODERATION_MODEL.to_string()),
            base_url: None,
            timeout: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Primary moderation model plus an optional model tried when the
    /// primary one errors.
    pub fn with_moderation_models(
        mut self,
        primary: impl Into<String>,
        fallback: Option<String>,
    ) -> Self {
        self.moderation_model = primary.into();
        self.fallback_moderation_model = fallback;
        self
    }

    /// Per-request HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn client(&self) -> OpenAiClient {
        let client = OpenAiClient::new(&self.api_key, self.timeout);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    /// Type-safe structured output extraction.
    pub async fn extract<T: StructuredOutput>(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Result<T> {
        let schema = T::openai_schema();

        let request = types::StructuredRequest {
            model: self.model.clone(),
            messages: vec![
                types::WireMessage::system(system_prompt),
                types::WireMessage::user(user_prompt),
            ],
            temperature: if self.model.starts_with("gpt-5") {
                None
            } else {
                Some(0.0)
            },
            response_format: types::ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: types::JsonSchemaFormat {
                    name: "structured_response".to_string(),
                    strict: true,
                    schema,
                },
            },
        };

        let json_str = self.client().structured_output(&request).await?;

        serde_json::from_str(strip_code_blocks(&json_str))
            .map_err(|e| anyhow!("Failed to deserialize response: {}", e))
    }

    async fn moderate_with(&self, model: &str, input: &str) -> Result<ModerationResult> {
        let response = self.client().moderation(model, input).await?;
        let entry = response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No moderation result from OpenAI"))?;

        Ok(ModerationResult {
            model: if response.model.is_empty() {
                model.to_string()
            } else {
                response.model
            },
            flagged: entry.flagged,
            categories: entry.active_categories(),
        })
    }
}

// =============================================================================
// ModerationAgent Implementation
// =============================================================================

#[async_trait]
impl ModerationAgent for OpenAi {
    async fn moderate(&self, input: &str) -> Result<ModerationResult> {
        match self.moderate_with(&self.moderation_model, input).await {
            Ok(result) => Ok(result),
            Err(e) => match &self.fallback_moderation_model {
                Some(fallback) => {
                    warn!(
                        error = %e,
                        primary = %self.moderation_model,
                        fallback = %fallback,
                        "Primary moderation model unavailable, falling back"
                    );
                    self.moderate_with(fallback, input).await
                }
                None => Err(e),
            },
        }
    }
}
