use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// --- Chat completions ---

#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl WireMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    pub json_schema: JsonSchemaFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructuredRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub content: Option<String>,
}

// --- Moderations ---

#[derive(Debug, Clone, Serialize)]
pub struct ModerationRequest {
    pub model: String,
    pub input: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationResponse {
    #[serde(default)]
    pub model: String,
    pub results: Vec<ModerationEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationEntry {
    #[serde(default)]
    pub flagged: bool,
    /// Category name to active flag. Newer models may send `null` for
    /// categories they do not score.
    #[serde(default)]
    pub categories: BTreeMap<String, Option<bool>>,
}

impl ModerationEntry {
    /// Names of categories marked active, in sorted order.
    pub fn active_categories(&self) -> Vec<String> {
        self.categories
            .iter()
            .filter(|(_, active)| active.unwrap_or(false))
            .map(|(name, _)| name.clone())
            .collect()
    }
}
