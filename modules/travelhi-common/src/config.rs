use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

/// How the moderation gate behaves. Read once at startup and handed to the
/// gate explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModerationPolicy {
    /// Run the local lexical filter before the remote classifier.
    pub strict_profanity: bool,
    /// Block (true) or allow (false) when the remote classifier errors or
    /// times out.
    pub fail_closed: bool,
    /// Upper bound on one remote classification, fallback model included.
    pub timeout: Duration,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            strict_profanity: true,
            fail_closed: false,
            timeout: Duration::from_millis(5_000),
        }
    }
}

/// Who may like/confirm/deny reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterPolicy {
    /// Anyone, anonymous included.
    #[default]
    Open,
    /// Only callers presenting a valid bearer token.
    Authenticated,
}

impl FromStr for CounterPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(CounterPolicy::Open),
            "authenticated" | "auth" => Ok(CounterPolicy::Authenticated),
            other => Err(anyhow!("unknown COUNTER_POLICY '{other}' (expected open|authenticated)")),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Auth
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,

    // AI / moderation
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub moderation: ModerationPolicy,

    // Web server
    pub api_host: String,
    pub api_port: u16,
    pub public_base_url: Option<String>,
    pub allowed_origins: Vec<String>,

    // Uploads
    pub upload_dir: String,
    pub max_upload_bytes: usize,

    // Live updates
    pub ws_send_buffer: usize,

    pub counter_policy: CounterPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: required_env("DATABASE_URL")?,
            jwt_secret: required_env("JWT_SECRET")?,
            token_ttl_minutes: parsed_env("TOKEN_TTL_MINUTES", 60)?,
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            moderation: ModerationPolicy {
                strict_profanity: flag_env("STRICT_PROFANITY", true),
                fail_closed: flag_env("MODERATION_FAIL_CLOSED", false),
                timeout: Duration::from_millis(parsed_env("MODERATION_TIMEOUT_MS", 5_000)?),
            },
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: parsed_env("API_PORT", 8000)?,
            public_base_url: env::var("PUBLIC_BASE_URL").ok().filter(|u| !u.is_empty()),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
            max_upload_bytes: parsed_env("MAX_UPLOAD_BYTES", 5 * 1024 * 1024)?,
            ws_send_buffer: parsed_env("WS_SEND_BUFFER", 64)?,
            counter_policy: match env::var("COUNTER_POLICY") {
                Ok(v) => v.parse()?,
                Err(_) => CounterPolicy::default(),
            },
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.len().min(5);
            format!("{}...({} chars)", val.get(..n).unwrap_or(""), val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  JWT_SECRET: {}", preview(&self.jwt_secret));
        tracing::info!(
            "  OPENAI_API_KEY: {}",
            self.openai_api_key
                .as_deref()
                .map(preview)
                .unwrap_or_else(|| "<not set>".to_string())
        );
        tracing::info!(
            strict_profanity = self.moderation.strict_profanity,
            fail_closed = self.moderation.fail_closed,
            timeout_ms = self.moderation.timeout.as_millis() as u64,
            "  Moderation policy"
        );
        tracing::info!("  COUNTER_POLICY: {:?}", self.counter_policy);
    }
}

fn required_env(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} environment variable is required"))
}

fn parsed_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}

fn flag_env(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| parse_flag(&v))
        .unwrap_or(default)
}

/// `1`, `true` and `yes` (any case) are truthy; anything else is false.
pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
