//! Samples, aggregate statistics and benchmark results

use crate::error::{ErrorKind, TransportError};
use crate::metrics::{compute_latency_stats, mean, median, LatencyStats, PriceTable};
use crate::prompts::Category;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Lifecycle of one prompt within a run.
///
/// `Pending -> InFlight -> Completed | Failed`. Only the two terminal
/// states are ever recorded on a [`Sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptState {
    Pending,
    InFlight,
    Completed,
    Failed,
}

impl PromptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PromptState::Completed | PromptState::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: PromptState) -> bool {
        matches!(
            (self, next),
            (PromptState::Pending, PromptState::InFlight)
                | (PromptState::InFlight, PromptState::Completed)
                | (PromptState::InFlight, PromptState::Failed)
        )
    }
}

/// Why a sample failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&TransportError> for SampleError {
    fn from(e: &TransportError) -> Self {
        SampleError {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// One executed prompt against one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Position of the prompt in its suite
    pub index: usize,
    pub prompt: String,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub state: PromptState,
    /// Seconds until the first output token; streaming runs only
    pub ttft_secs: Option<f64>,
    /// Seconds until the completion finished (or failed)
    pub latency_secs: f64,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Token counts came from the server rather than an estimate
    #[serde(default)]
    pub usage_reported: bool,
    #[serde(default)]
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SampleError>,
}

impl Sample {
    pub fn success(&self) -> bool {
        self.state == PromptState::Completed
    }

    pub fn tokens_per_second(&self) -> Option<f64> {
        if !self.success() {
            return None;
        }
        crate::metrics::tokens_per_second(self.output_tokens, self.latency_secs)
    }
}

/// Statistics derived from the samples of one model/suite run.
///
/// Latency, throughput and cost figures cover successful samples only; they
/// are `None` when there is nothing to summarise instead of being reported
/// as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_samples: usize,
    pub successful: usize,
    pub failed: usize,
    pub ttft: Option<LatencyStats>,
    pub latency: Option<LatencyStats>,
    pub mean_tps: Option<f64>,
    pub median_tps: Option<f64>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// USD; `None` when the model has no price entry or nothing succeeded
    pub total_cost: Option<f64>,
    pub cost_per_request: Option<f64>,
    pub mean_quality: Option<f64>,
    /// Samples that had a reference answer and were scored
    pub quality_samples: usize,
}

impl AggregateStats {
    /// Summarise `samples` for `model`. Depends only on its arguments.
    pub fn compute(model: &str, samples: &[Sample], prices: &PriceTable) -> Self {
        let ok: Vec<&Sample> = samples.iter().filter(|s| s.success()).collect();

        let ttft_values: Vec<f64> = ok.iter().filter_map(|s| s.ttft_secs).collect();
        let latency_values: Vec<f64> = ok.iter().map(|s| s.latency_secs).collect();
        let mut tps_values: Vec<f64> = ok.iter().filter_map(|s| s.tokens_per_second()).collect();
        let mut quality_values: Vec<f64> = ok.iter().filter_map(|s| s.quality).collect();
        // Fixed summation order keeps the means independent of sample order
        tps_values.sort_by(f64::total_cmp);
        quality_values.sort_by(f64::total_cmp);

        let total_input_tokens: u64 = ok.iter().map(|s| s.input_tokens as u64).sum();
        let total_output_tokens: u64 = ok.iter().map(|s| s.output_tokens as u64).sum();

        let total_cost = if ok.is_empty() {
            None
        } else {
            match prices.estimate_cost(model, total_input_tokens, total_output_tokens) {
                Ok(cost) => Some(cost),
                Err(e) => {
                    debug!("Cost unavailable: {}", e);
                    None
                }
            }
        };

        AggregateStats {
            total_samples: samples.len(),
            successful: ok.len(),
            failed: samples.len() - ok.len(),
            ttft: compute_latency_stats(&ttft_values).ok(),
            latency: compute_latency_stats(&latency_values).ok(),
            mean_tps: mean(&tps_values).ok(),
            median_tps: median(&tps_values).ok(),
            total_input_tokens,
            total_output_tokens,
            total_cost,
            cost_per_request: total_cost.map(|c| c / ok.len() as f64),
            mean_quality: mean(&quality_values).ok(),
            quality_samples: quality_values.len(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_samples == 0 {
            return 0.0;
        }
        self.successful as f64 / self.total_samples as f64 * 100.0
    }
}

/// All samples of one model over one suite, with their statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub model: String,
    pub suite: String,
    #[serde(default)]
    pub base_url: String,
    pub timestamp: DateTime<Utc>,
    /// In suite order
    pub samples: Vec<Sample>,
    pub stats: AggregateStats,
}

impl BenchmarkResult {
    pub fn new(
        model: impl Into<String>,
        suite: impl Into<String>,
        base_url: impl Into<String>,
        mut samples: Vec<Sample>,
        prices: &PriceTable,
    ) -> Self {
        samples.sort_by_key(|s| s.index);
        let model = model.into();
        let stats = AggregateStats::compute(&model, &samples, prices);
        BenchmarkResult {
            model,
            suite: suite.into(),
            base_url: base_url.into(),
            timestamp: Utc::now(),
            samples,
            stats,
        }
    }

    /// Rebuild the statistics from the samples, e.g. with a different price table.
    pub fn recompute_stats(&mut self, prices: &PriceTable) {
        self.stats = AggregateStats::compute(&self.model, &self.samples, prices);
        if self.stats.successful > 0 && self.stats.total_cost.is_none() {
            warn!(
                "No price entry for model '{}'; cost will be reported as unavailable",
                self.model
            );
        }
    }

    pub fn failed_samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(|s| !s.success())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn completed(index: usize, latency: f64, output_tokens: u32) -> Sample {
        Sample {
            index,
            prompt: format!("prompt {}", index),
            category: Category::Reasoning,
            reference: None,
            state: PromptState::Completed,
            ttft_secs: Some(latency / 4.0),
            latency_secs: latency,
            input_tokens: 20,
            output_tokens,
            usage_reported: true,
            response: format!("response {}", index),
            quality: None,
            error: None,
        }
    }

    pub(crate) fn failed(index: usize) -> Sample {
        let err = TransportError::RateLimit;
        Sample {
            index,
            prompt: format!("prompt {}", index),
            category: Category::Reasoning,
            reference: None,
            state: PromptState::Failed,
            ttft_secs: None,
            latency_secs: 0.05,
            input_tokens: 0,
            output_tokens: 0,
            usage_reported: false,
            response: String::new(),
            quality: None,
            error: Some(SampleError::from(&err)),
        }
    }

    #[test]
    fn test_state_transitions() {
        use PromptState::*;
        assert!(Pending.can_transition_to(InFlight));
        assert!(InFlight.can_transition_to(Completed));
        assert!(InFlight.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(Failed.is_terminal() && !InFlight.is_terminal());
    }

    #[test]
    fn test_aggregate_excludes_failures() {
        let samples = vec![
            completed(0, 1.0, 50),
            failed(1),
            completed(2, 2.0, 50),
            failed(3),
        ];
        let stats = AggregateStats::compute("gpt-4o", &samples, &PriceTable::builtin());
        assert_eq!(stats.total_samples, 4);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 2);
        let latency = stats.latency.unwrap();
        assert_eq!(latency.min, 1.0);
        assert_eq!(latency.max, 2.0);
        assert_eq!(stats.mean_tps, Some(37.5));
        assert_eq!(stats.total_input_tokens, 40);
        assert_eq!(stats.total_output_tokens, 100);
        // 40 input + 100 output tokens at gpt-4o prices
        let expected = 0.04 * 0.0025 + 0.1 * 0.01;
        assert!((stats.total_cost.unwrap() - expected).abs() < 1e-12);
        assert!((stats.cost_per_request.unwrap() - expected / 2.0).abs() < 1e-12);
        assert_eq!(stats.success_rate(), 50.0);
    }

    #[test]
    fn test_aggregate_all_failed_is_unavailable() {
        let samples = vec![failed(0), failed(1)];
        let stats = AggregateStats::compute("gpt-4o", &samples, &PriceTable::builtin());
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.latency, None);
        assert_eq!(stats.ttft, None);
        assert_eq!(stats.mean_tps, None);
        assert_eq!(stats.total_cost, None);
        assert_eq!(stats.mean_quality, None);
    }

    #[test]
    fn test_aggregate_zero_token_samples_excluded_from_tps() {
        let samples = vec![completed(0, 1.0, 0), completed(1, 2.0, 100)];
        let stats = AggregateStats::compute("gpt-4o", &samples, &PriceTable::builtin());
        assert_eq!(stats.mean_tps, Some(50.0));
        assert_eq!(stats.median_tps, Some(50.0));
    }

    #[test]
    fn test_aggregate_unknown_model_has_no_cost() {
        let samples = vec![completed(0, 1.0, 10)];
        let stats = AggregateStats::compute("mystery", &samples, &PriceTable::builtin());
        assert_eq!(stats.total_cost, None);
        assert_eq!(stats.cost_per_request, None);
        assert!(stats.latency.is_some());
    }

    #[test]
    fn test_recompute_with_other_prices_drops_or_restores_cost() {
        let mut result = BenchmarkResult::new(
            "gpt-4o",
            "reasoning",
            "",
            vec![completed(0, 1.0, 1000)],
            &PriceTable::builtin(),
        );
        assert!(result.stats.total_cost.is_some());

        result.recompute_stats(&PriceTable::new());
        assert_eq!(result.stats.total_cost, None);
        assert_eq!(result.stats.cost_per_request, None);
        assert_eq!(result.stats.successful, 1);

        let mut custom = PriceTable::new();
        custom.insert("gpt-4o", crate::metrics::ModelPrice::new(0.0, 0.002));
        result.recompute_stats(&custom);
        assert!((result.stats.total_cost.unwrap() - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_quality_only_over_scored_samples() {
        let mut a = completed(0, 1.0, 10);
        a.quality = Some(1.0);
        let mut b = completed(1, 1.0, 10);
        b.quality = Some(0.5);
        let c = completed(2, 1.0, 10);
        let stats = AggregateStats::compute("gpt-4o", &[a, b, c], &PriceTable::builtin());
        assert_eq!(stats.mean_quality, Some(0.75));
        assert_eq!(stats.quality_samples, 2);
    }

    #[test]
    fn test_stats_are_recomputable_and_order_independent() {
        let samples = vec![completed(2, 0.7, 30), completed(0, 0.5, 10), failed(1)];
        let result = BenchmarkResult::new("gpt-4o", "reasoning", "", samples, &PriceTable::builtin());
        let indices: Vec<usize> = result.samples.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);

        let again = AggregateStats::compute("gpt-4o", &result.samples, &PriceTable::builtin());
        assert_eq!(again, result.stats);

        let mut reversed = result.samples.clone();
        reversed.reverse();
        assert_eq!(
            AggregateStats::compute("gpt-4o", &reversed, &PriceTable::builtin()),
            result.stats
        );
    }
}
