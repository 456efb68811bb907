//! External assessment client
//!
//! HTTP client for an OpenAI-compatible chat-completions endpoint that
//! returns a free-form market assessment. Failures never propagate: every
//! problem becomes `ExternalAssessment::Unavailable` with a reason.

use async_trait::async_trait;
use data_retrieval::{AssetProfile, MarketSnapshot};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AssessmentConfig;
use crate::indicators::IndicatorSet;
use crate::types::{AnalyzerError, ExternalAssessment, UserContext};

const SYSTEM_PROMPT: &str = "You are a market analyst reviewing a trading alert. \
Assess the setup using the quote and indicators provided. \
Finish your reply with exactly two lines:\n\
[success_rate]=NN\n\
[action]=BUY|SELL|HOLD\n\
where NN is an integer from 0 to 100 giving the probability that the alert works out.";

/// Prompt sent to the assessment service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentPrompt {
    pub system: String,
    pub user: String,
}

impl AssessmentPrompt {
    /// Render the quote, indicator table and user notes
    pub fn build(
        symbol: &str,
        profile: &AssetProfile,
        snapshot: Option<&MarketSnapshot>,
        indicators: &IndicatorSet,
        context: &UserContext,
    ) -> Self {
        let mut user = String::new();
        let _ = writeln!(
            user,
            "Instrument: {} ({}, unit size {})",
            symbol,
            profile.category.as_str(),
            profile.unit_size
        );

        match snapshot {
            Some(s) => {
                let _ = writeln!(
                    user,
                    "Quote ({} source {}): last={} bid={} ask={} spread={} points",
                    s.source.as_str(),
                    s.provider,
                    fmt_opt(s.last),
                    fmt_opt(s.bid),
                    fmt_opt(s.ask),
                    fmt_opt(s.spread),
                );
            }
            None => {
                let _ = writeln!(user, "Quote: unavailable");
            }
        }

        let _ = writeln!(user, "Indicators ({} bars):", indicators.bars_used);
        for (name, reading) in indicators.entries() {
            let _ = writeln!(user, "- {}: {:.4} ({})", name, reading.value, reading.label);
        }

        let _ = writeln!(user, "Alert type: {:?}", context.signal_category);
        if let Some(base) = context.base_confidence {
            let _ = writeln!(user, "Alert confidence: {:.0}%", base);
        }
        if let Some(notes) = context.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            let _ = writeln!(user, "Notes: {}", notes.trim());
        }

        let mut system = SYSTEM_PROMPT.to_string();
        if let Some(lang) = context.language.as_deref() {
            let _ = write!(system, "\nWrite the assessment in language: {}.", lang);
        }

        Self { system, user }
    }
}

fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

/// Source of free-form assessments
#[async_trait]
pub trait AssessmentClient: Send + Sync {
    /// Never errors; failures come back as `Unavailable`
    async fn assess(&self, prompt: &AssessmentPrompt) -> ExternalAssessment;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client
pub struct ChatCompletionsClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    http_client: Client,
    timeout: Duration,
}

impl ChatCompletionsClient {
    pub fn new(config: &AssessmentConfig) -> Result<Self, AnalyzerError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http_client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| AnalyzerError::Http(e.to_string()))?;

        info!(
            "Assessment client initialized: url={}, model={}, timeout={}s",
            config.base_url, config.model, config.timeout_secs
        );

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            http_client,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(&self, prompt: &AssessmentPrompt) -> Result<String, String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!("Requesting assessment: model={}, prompt_len={}", self.model, prompt.user.len());

        let mut request = self.http_client.post(&url).json(&body).timeout(self.timeout);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                format!("assessment request timed out after {:?}", self.timeout)
            } else if e.is_connect() {
                format!("failed to connect to assessment service at {}: {}", url, e)
            } else {
                format!("assessment request failed: {}", e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!(
                "assessment service returned {}: {}",
                status, error_text
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("failed to parse assessment response: {}", e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| "assessment response had no content".to_string())
    }
}

#[async_trait]
impl AssessmentClient for ChatCompletionsClient {
    async fn assess(&self, prompt: &AssessmentPrompt) -> ExternalAssessment {
        match self.request(prompt).await {
            Ok(text) => {
                info!("Received assessment: {} chars", text.len());
                ExternalAssessment::Text(text)
            }
            Err(reason) => {
                warn!("Assessment unavailable: {}", reason);
                ExternalAssessment::Unavailable(reason)
            }
        }
    }
}
