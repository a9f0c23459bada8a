//! Thin OpenAI client used by the incident API.
//!
//! Two calls are exposed: the moderation endpoint (with a primary model and
//! a fallback model) and schema-constrained chat completions.

pub mod openai;
pub mod traits;
pub mod util;

pub use openai::{OpenAi, StructuredOutput};
pub use traits::{ModerationAgent, ModerationResult};
