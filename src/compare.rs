//! Head-to-head comparison of two models on one suite

use crate::error::Result;
use crate::prompts::PromptSuite;
use crate::results::{AggregateStats, BenchmarkResult};
use crate::runner::BenchmarkRunner;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Which side of a comparison came out ahead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    ModelA,
    ModelB,
    Tie,
}

/// Metrics a comparison is decided on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TtftP50,
    TtftP95,
    LatencyP50,
    MeanTps,
    Cost,
    Quality,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::TtftP50,
        Metric::TtftP95,
        Metric::LatencyP50,
        Metric::MeanTps,
        Metric::Cost,
        Metric::Quality,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Metric::TtftP50 => "TTFT p50",
            Metric::TtftP95 => "TTFT p95",
            Metric::LatencyP50 => "Total latency p50",
            Metric::MeanTps => "Mean TPS",
            Metric::Cost => "Cost (USD)",
            Metric::Quality => "Quality score",
        }
    }

    pub fn lower_is_better(self) -> bool {
        !matches!(self, Metric::MeanTps | Metric::Quality)
    }

    pub fn value(self, stats: &AggregateStats) -> Option<f64> {
        match self {
            Metric::TtftP50 => stats.ttft.map(|s| s.p50),
            Metric::TtftP95 => stats.ttft.map(|s| s.p95),
            Metric::LatencyP50 => stats.latency.map(|s| s.p50),
            Metric::MeanTps => stats.mean_tps,
            Metric::Cost => stats.total_cost,
            Metric::Quality => stats.mean_quality,
        }
    }
}

/// Values are treated as equal within this relative tolerance.
const TIE_TOLERANCE: f64 = 1e-9;

/// Decide one metric. A value that exists beats one that does not; two
/// missing values tie.
pub fn decide(a: Option<f64>, b: Option<f64>, lower_is_better: bool) -> Winner {
    match (a, b) {
        (None, None) => Winner::Tie,
        (Some(_), None) => Winner::ModelA,
        (None, Some(_)) => Winner::ModelB,
        (Some(a), Some(b)) => {
            let scale = a.abs().max(b.abs()).max(1.0);
            if (a - b).abs() <= TIE_TOLERANCE * scale {
                Winner::Tie
            } else if (a < b) == lower_is_better {
                Winner::ModelA
            } else {
                Winner::ModelB
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric: Metric,
    pub model_a: Option<f64>,
    pub model_b: Option<f64>,
    pub winner: Winner,
}

/// Two runs of the same suite and the per-metric verdicts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub model_a: BenchmarkResult,
    pub model_b: BenchmarkResult,
    pub metrics: Vec<MetricComparison>,
    /// `Tie` means there is no overall winner
    pub overall: Winner,
}

impl ComparisonResult {
    pub fn from_results(model_a: BenchmarkResult, model_b: BenchmarkResult) -> Self {
        let metrics: Vec<MetricComparison> = Metric::ALL
            .iter()
            .map(|&metric| {
                let a = metric.value(&model_a.stats);
                let b = metric.value(&model_b.stats);
                MetricComparison {
                    metric,
                    model_a: a,
                    model_b: b,
                    winner: decide(a, b, metric.lower_is_better()),
                }
            })
            .collect();

        let (wins_a, wins_b) = count_wins(&metrics);
        let overall = match wins_a.cmp(&wins_b) {
            std::cmp::Ordering::Greater => Winner::ModelA,
            std::cmp::Ordering::Less => Winner::ModelB,
            std::cmp::Ordering::Equal => Winner::Tie,
        };

        ComparisonResult {
            model_a,
            model_b,
            metrics,
            overall,
        }
    }

    pub fn winner_for(&self, metric: Metric) -> Winner {
        self.metrics
            .iter()
            .find(|m| m.metric == metric)
            .map(|m| m.winner)
            .unwrap_or(Winner::Tie)
    }

    /// Metric wins for (model A, model B).
    pub fn wins(&self) -> (usize, usize) {
        count_wins(&self.metrics)
    }

    /// Name of the overall winner, `None` if the wins are level.
    pub fn overall_winner(&self) -> Option<&str> {
        self.model_name(self.overall)
    }

    pub fn model_name(&self, winner: Winner) -> Option<&str> {
        match winner {
            Winner::ModelA => Some(&self.model_a.model),
            Winner::ModelB => Some(&self.model_b.model),
            Winner::Tie => None,
        }
    }
}

/// Compare two already computed results, e.g. loaded from disk.
pub fn compare_results(model_a: BenchmarkResult, model_b: BenchmarkResult) -> ComparisonResult {
    ComparisonResult::from_results(model_a, model_b)
}

fn count_wins(metrics: &[MetricComparison]) -> (usize, usize) {
    metrics.iter().fold((0, 0), |(a, b), m| match m.winner {
        Winner::ModelA => (a + 1, b),
        Winner::ModelB => (a, b + 1),
        Winner::Tie => (a, b),
    })
}

/// Runs two models through the same suite and compares them
pub struct Comparator {
    runner: BenchmarkRunner,
}

impl Comparator {
    pub fn new(runner: BenchmarkRunner) -> Self {
        Comparator { runner }
    }

    pub async fn compare(
        &self,
        model_a: &str,
        model_b: &str,
        suite: &PromptSuite,
    ) -> Result<ComparisonResult> {
        // Both models must pass static checks before either is benchmarked
        self.runner.validate(model_a, suite)?;
        self.runner.validate(model_b, suite)?;

        info!("Comparing {} vs {} on suite '{}'", model_a, model_b, suite.name);
        let a = self.runner.run(model_a, suite).await?;
        let b = self.runner.run(model_b, suite).await?;

        let comparison = ComparisonResult::from_results(a, b);
        match comparison.overall_winner() {
            Some(name) => info!("Overall winner: {}", name),
            None => info!("No overall winner"),
        }
        Ok(comparison)
    }
}
