use anyhow::Result;
use async_trait::async_trait;

/// Outcome of one moderation call, flattened from the provider's wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationResult {
    /// Model that produced the result.
    pub model: String,
    pub flagged: bool,
    /// Category labels the provider marked as active, sorted.
    pub categories: Vec<String>,
}

impl ModerationResult {
    pub fn is_category_active(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c.eq_ignore_ascii_case(category))
    }
}

/// Anything that can classify free text for abusive content.
#[async_trait]
pub trait ModerationAgent: Send + Sync {
    async fn moderate(&self, input: &str) -> Result<ModerationResult>;
}
