use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use ai_client::OpenAi;

/// Free-text traffic report submitted for classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficReport {
    pub source: String,
    pub content: String,
    pub location: Option<ReportLocation>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReportLocation {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisruptionCategory {
    Accident,
    Delay,
    Blockage,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisruptionSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DisruptionPrediction {
    pub category: DisruptionCategory,
    pub severity: DisruptionSeverity,
    /// Model confidence in [0, 1].
    pub confidence: f64,
    /// One-sentence summary of the expected impact.
    pub summary: String,
}

/// Natural-language disruption classifier. Stateless request/response.
#[async_trait]
pub trait DisruptionClassifier: Send + Sync {
    async fn predict(&self, report: &TrafficReport) -> Result<DisruptionPrediction>;
}

const SYSTEM_PROMPT: &str = "You classify road-traffic reports. \
Given a report, decide the disruption category (ACCIDENT, DELAY, BLOCKAGE or OTHER), \
its severity (LOW, MEDIUM or HIGH), your confidence between 0 and 1, \
and a one-sentence summary of the likely impact on traffic. \
Reports may be written in Polish or English; answer the summary in the report's language.";

fn user_prompt(report: &TrafficReport) -> String {
    let mut prompt = format!("Source: {}\nReport: {}", report.source, report.content);
    if let Some(loc) = report.location {
        prompt.push_str(&format!("\nLocation: {:.5}, {:.5}", loc.lat, loc.lng));
    }
    if let Some(ts) = report.timestamp {
        prompt.push_str(&format!("\nReported at: {}", ts.to_rfc3339()));
    }
    prompt
}

#[async_trait]
impl DisruptionClassifier for OpenAi {
    async fn predict(&self, report: &TrafficReport) -> Result<DisruptionPrediction> {
        let mut prediction: DisruptionPrediction =
            self.extract(SYSTEM_PROMPT, user_prompt(report)).await?;
        prediction.confidence = prediction.confidence.clamp(0.0, 1.0);
        Ok(prediction)
    }
}
