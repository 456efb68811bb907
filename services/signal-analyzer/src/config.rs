//! Analyzer Configuration
//!
//! Layered as: serde defaults, then an optional YAML file
//! (`SIGNAL_ANALYZER_CONFIG`, default `signal-analyzer.yaml`), then
//! `SIGNAL_ANALYZER_*` environment variables with `__` between sections,
//! e.g. `SIGNAL_ANALYZER_PROVIDERS__BRIDGE_URL`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::AnalyzerError;

const DEFAULT_CONFIG_FILE: &str = "signal-analyzer.yaml";
const ENV_PREFIX: &str = "SIGNAL_ANALYZER";

/// Complete analyzer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub assessment: AssessmentConfig,
    #[serde(default)]
    pub indicators: IndicatorConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl AnalyzerConfig {
    /// Load `.env`, then the configured file and environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let path = std::env::var("SIGNAL_ANALYZER_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load from a specific file (missing file is fine) plus environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let cfg: AnalyzerConfig = settings
            .try_deserialize()
            .context("Invalid analyzer configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> std::result::Result<(), AnalyzerError> {
        let sum = self.scoring.weights.sum();
        if sum != 100 {
            return Err(AnalyzerError::InvalidWeights(sum));
        }

        let ind = &self.indicators;
        let periods = [
            ind.rsi_period,
            ind.sma_fast,
            ind.sma_slow,
            ind.ema_period,
            ind.stochastic_period,
            ind.stochastic_smoothing,
            ind.atr_period,
            ind.volume_window,
        ];
        if periods.contains(&0) {
            return Err(AnalyzerError::Config(
                "indicator periods must be positive".to_string(),
            ));
        }

        let sessions = std::iter::once(&self.scoring.primary_session)
            .chain(self.scoring.secondary_sessions.iter());
        for window in sessions {
            if window.start > 23 || window.end > 23 || window.start > window.end {
                return Err(AnalyzerError::Config(format!(
                    "invalid session window {}-{}",
                    window.start, window.end
                )));
            }
        }

        if !(self.scoring.jitter_amplitude.is_finite() && self.scoring.jitter_amplitude >= 0.0) {
            return Err(AnalyzerError::Config(
                "jitter_amplitude must be a non-negative number".to_string(),
            ));
        }

        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            return Err(AnalyzerError::Config(
                "rate limit window and max_requests must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Effective configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to render configuration")
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig::default(),
            assessment: AssessmentConfig::default(),
            indicators: IndicatorConfig::default(),
            scoring: ScoringConfig::default(),
            rate_limit: RateLimitConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Quote providers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    /// Secondary provider is disabled without a key
    #[serde(default)]
    pub alphavantage_api_key: Option<String>,
    #[serde(default = "default_alphavantage_url")]
    pub alphavantage_url: String,
    #[serde(default = "default_primary_timeout_ms")]
    pub primary_timeout_ms: u64,
    #[serde(default = "default_secondary_timeout_ms")]
    pub secondary_timeout_ms: u64,
}

impl ProvidersConfig {
    pub fn primary_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_timeout_ms)
    }

    pub fn secondary_timeout(&self) -> Duration {
        Duration::from_millis(self.secondary_timeout_ms)
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            alphavantage_api_key: None,
            alphavantage_url: default_alphavantage_url(),
            primary_timeout_ms: default_primary_timeout_ms(),
            secondary_timeout_ms: default_secondary_timeout_ms(),
        }
    }
}

/// External assessment service (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssessmentConfig {
    #[serde(default = "default_assessment_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_assessment_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            base_url: default_assessment_url(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_assessment_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Indicator periods, in bars
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_sma_fast")]
    pub sma_fast: usize,
    #[serde(default = "default_sma_slow")]
    pub sma_slow: usize,
    #[serde(default = "default_ema_period")]
    pub ema_period: usize,
    #[serde(default = "default_stochastic_period")]
    pub stochastic_period: usize,
    /// %D smoothing of stochastic %K
    #[serde(default = "default_stochastic_smoothing")]
    pub stochastic_smoothing: usize,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_volume_window")]
    pub volume_window: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: default_rsi_period(),
            sma_fast: default_sma_fast(),
            sma_slow: default_sma_slow(),
            ema_period: default_ema_period(),
            stochastic_period: default_stochastic_period(),
            stochastic_smoothing: default_stochastic_smoothing(),
            atr_period: default_atr_period(),
            volume_window: default_volume_window(),
        }
    }
}

/// Relative weights of the scoring factors, summing to 100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct FactorWeights {
    #[serde(default = "default_ai_text_weight")]
    pub ai_text: u32,
    #[serde(default = "default_data_quality_weight")]
    pub data_quality: u32,
    #[serde(default = "default_consistency_weight")]
    pub consistency: u32,
    #[serde(default = "default_signal_type_weight")]
    pub signal_type: u32,
    #[serde(default = "default_timing_weight")]
    pub timing: u32,
}

impl FactorWeights {
    pub fn sum(&self) -> u32 {
        self.ai_text + self.data_quality + self.consistency + self.signal_type + self.timing
    }
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            ai_text: default_ai_text_weight(),
            data_quality: default_data_quality_weight(),
            consistency: default_consistency_weight(),
            signal_type: default_signal_type_weight(),
            timing: default_timing_weight(),
        }
    }
}

/// Inclusive range of UTC hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct HourWindow {
    pub start: u32,
    pub end: u32,
}

impl HourWindow {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, hour: u32) -> bool {
        (self.start..=self.end).contains(&hour)
    }
}

/// Confidence scorer tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: FactorWeights,
    #[serde(default = "default_base_score")]
    pub base: f64,
    /// Jitter is drawn uniformly from [-amplitude, +amplitude]
    #[serde(default = "default_jitter_amplitude")]
    pub jitter_amplitude: f64,
    #[serde(default = "default_primary_session")]
    pub primary_session: HourWindow,
    #[serde(default = "default_secondary_sessions")]
    pub secondary_sessions: Vec<HourWindow>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: FactorWeights::default(),
            base: default_base_score(),
            jitter_amplitude: default_jitter_amplitude(),
            primary_session: default_primary_session(),
            secondary_sessions: default_secondary_sessions(),
        }
    }
}

/// Rolling request counter applied to each outbound call kind
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_bridge_url() -> String { "http://localhost:8765".to_string() }
fn default_alphavantage_url() -> String { "https://www.alphavantage.co".to_string() }
fn default_primary_timeout_ms() -> u64 { 5_000 }
fn default_secondary_timeout_ms() -> u64 { 10_000 }
fn default_assessment_url() -> String { "https://api.openai.com".to_string() }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_assessment_timeout_secs() -> u64 { 30 }
fn default_temperature() -> f32 { 0.3 }
fn default_max_tokens() -> u32 { 700 }
fn default_rsi_period() -> usize { 14 }
fn default_sma_fast() -> usize { 20 }
fn default_sma_slow() -> usize { 50 }
fn default_ema_period() -> usize { 12 }
fn default_stochastic_period() -> usize { 14 }
fn default_stochastic_smoothing() -> usize { 3 }
fn default_atr_period() -> usize { 14 }
fn default_volume_window() -> usize { 20 }
fn default_ai_text_weight() -> u32 { 35 }
fn default_data_quality_weight() -> u32 { 25 }
fn default_consistency_weight() -> u32 { 20 }
fn default_signal_type_weight() -> u32 { 10 }
fn default_timing_weight() -> u32 { 10 }
fn default_base_score() -> f64 { 10.0 }
fn default_jitter_amplitude() -> f64 { 2.0 }
fn default_primary_session() -> HourWindow { HourWindow::new(13, 16) }
fn default_secondary_sessions() -> Vec<HourWindow> { vec![HourWindow::new(7, 12), HourWindow::new(17, 20)] }
fn default_window_secs() -> u64 { 60 }
fn default_max_requests() -> u32 { 60 }
