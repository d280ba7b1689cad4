//! llm-bench - latency, throughput, cost and quality benchmarks for
//! OpenAI-compatible LLM APIs

pub mod client;
pub mod compare;
pub mod error;
pub mod export;
pub mod metrics;
pub mod prompts;
pub mod quality_metrics;
pub mod report;
pub mod results;
pub mod runner;

pub use client::{ChatEvent, ChatRequest, ChatTransport, EventStream, Message, OpenAiClient, TokenUsage};
pub use compare::{compare_results, Comparator, ComparisonResult, Metric, MetricComparison, Winner};
pub use error::{BenchError, ErrorKind, Result, TransportError};
pub use export::ExportRecord;
pub use metrics::{compute_latency_stats, LatencyStats, ModelPrice, PriceTable};
pub use prompts::{Category, Prompt, PromptSuite, SuiteRegistry};
pub use quality_metrics::{QualityMetric, QualityScorer};
pub use results::{AggregateStats, BenchmarkResult, PromptState, Sample, SampleError};
pub use runner::BenchmarkRunner;

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

/// Connection and scheduling parameters shared by every prompt in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Stream responses (required for time-to-first-token)
    #[serde(default = "default_stream")]
    pub stream: bool,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Completion budget for prompts without their own
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    /// Maximum requests in flight; 1 runs the suite sequentially
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Refuse to start when the model has no price entry
    #[serde(default)]
    pub require_pricing: bool,
    #[serde(default)]
    pub show_progress: bool,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_stream() -> bool {
    true
}
fn default_timeout() -> u64 {
    120
}
fn default_max_tokens() -> u32 {
    prompts::DEFAULT_PROMPT_MAX_TOKENS
}
fn default_concurrency() -> usize {
    1
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            base_url: default_base_url(),
            api_key: String::new(),
            stream: default_stream(),
            timeout_secs: default_timeout(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            concurrency: default_concurrency(),
            require_pricing: false,
            show_progress: false,
        }
    }
}

impl RunConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(BenchError::Config("concurrency must be at least 1".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(BenchError::Config("timeout must be at least 1 second".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(BenchError::Config("max_tokens must be at least 1".to_string()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(BenchError::Config(format!(
                "base URL must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Benchmark `model` on `suite` against the API described by `config`,
/// using the built-in price table.
pub async fn run(model: &str, suite: &PromptSuite, config: &RunConfig) -> Result<BenchmarkResult> {
    BenchmarkRunner::openai(config.clone())?.run(model, suite).await
}

/// Benchmark two models on the same suite and compare them.
pub async fn compare(
    model_a: &str,
    model_b: &str,
    suite: &PromptSuite,
    config: &RunConfig,
) -> Result<ComparisonResult> {
    Comparator::new(BenchmarkRunner::openai(config.clone())?)
        .compare(model_a, model_b, suite)
        .await
}
