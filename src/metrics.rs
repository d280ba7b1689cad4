//! Latency, throughput and cost statistics
//!
//! Everything in here is a pure function of its inputs. Latencies are in
//! seconds; costs are in USD.

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// Percentiles
// ============================================================================

/// Percentile of an ascending-sorted slice using linear interpolation
/// between the two bracketing order statistics (rank = p/100 * (n - 1)).
///
/// This is the numpy default / Excel `PERCENTILE.INC` definition.
pub fn percentile(sorted_values: &[f64], p: f64) -> Result<f64> {
    if sorted_values.is_empty() {
        return Err(BenchError::EmptyInput);
    }
    let p = p.clamp(0.0, 100.0);
    let rank = p / 100.0 * (sorted_values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Ok(sorted_values[lo] + (sorted_values[hi] - sorted_values[lo]) * frac)
}

pub fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(BenchError::EmptyInput);
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median of unsorted values.
pub fn median(values: &[f64]) -> Result<f64> {
    percentile(&sorted(values), 50.0)
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Percentile summary of a set of latencies (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Compute p50/p95/p99, mean, min and max over `values` in any order.
pub fn compute_latency_stats(values: &[f64]) -> Result<LatencyStats> {
    if values.is_empty() {
        return Err(BenchError::EmptyInput);
    }
    let sorted = sorted(values);
    Ok(LatencyStats {
        p50: percentile(&sorted, 50.0)?,
        p95: percentile(&sorted, 95.0)?,
        p99: percentile(&sorted, 99.0)?,
        mean: mean(&sorted)?,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
    })
}

// ============================================================================
// Throughput
// ============================================================================

/// Output tokens per second of wall-clock request time.
///
/// `None` when either side is zero: such samples carry no throughput
/// information and are left out of the aggregate rather than counted as 0.
pub fn tokens_per_second(output_tokens: u32, total_latency_secs: f64) -> Option<f64> {
    if output_tokens == 0 || total_latency_secs <= 0.0 || !total_latency_secs.is_finite() {
        return None;
    }
    Some(output_tokens as f64 / total_latency_secs)
}

// ============================================================================
// Cost
// ============================================================================

/// USD price per 1K tokens for one model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelPrice {
    pub const fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        ModelPrice {
            input_per_1k,
            output_per_1k,
        }
    }

    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 / 1000.0 * self.input_per_1k
            + output_tokens as f64 / 1000.0 * self.output_per_1k
    }
}

/// Mapping from model identifier to [`ModelPrice`].
///
/// Lookup tries an exact match first, then the longest key that is a prefix
/// of the model identifier, so `gpt-4o-2024-08-06` is priced as `gpt-4o`
/// while `gpt-4o-mini` keeps its own entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable {
    prices: BTreeMap<String, ModelPrice>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// List prices for common hosted models.
    pub fn builtin() -> Self {
        let mut table = PriceTable::new();
        table
            .insert("gpt-4o", ModelPrice::new(0.0025, 0.01))
            .insert("gpt-4o-mini", ModelPrice::new(0.00015, 0.0006))
            .insert("gpt-4-turbo", ModelPrice::new(0.01, 0.03))
            .insert("gpt-4", ModelPrice::new(0.03, 0.06))
            .insert("gpt-3.5-turbo", ModelPrice::new(0.0005, 0.0015))
            .insert("claude-3-opus", ModelPrice::new(0.015, 0.075))
            .insert("claude-3-sonnet", ModelPrice::new(0.003, 0.015))
            .insert("claude-3-haiku", ModelPrice::new(0.00025, 0.00125))
            .insert("claude-sonnet", ModelPrice::new(0.003, 0.015))
            .insert("claude-opus", ModelPrice::new(0.015, 0.075));
        table
    }

    pub fn insert(&mut self, model: impl Into<String>, price: ModelPrice) -> &mut Self {
        self.prices.insert(model.into().to_lowercase(), price);
        self
    }

    /// Merge `other` into this table, overriding existing entries.
    pub fn extend(&mut self, other: PriceTable) {
        self.prices.extend(other.prices);
    }

    /// Load a YAML mapping of `model: { input_per_1k, output_per_1k }`.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, ModelPrice> = serde_yaml::from_str(content)?;
        let mut table = PriceTable::new();
        for (model, price) in raw {
            table.insert(model, price);
        }
        Ok(table)
    }

    pub fn lookup(&self, model: &str) -> Result<ModelPrice> {
        let model = model.to_lowercase();
        if let Some(price) = self.prices.get(&model) {
            return Ok(*price);
        }
        self.prices
            .iter()
            .filter(|(key, _)| model.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, price)| *price)
            .ok_or_else(|| BenchError::UnknownModel(model.clone()))
    }

    pub fn contains(&self, model: &str) -> bool {
        self.lookup(model).is_ok()
    }

    /// Estimated USD cost of `input_tokens` prompt tokens and
    /// `output_tokens` completion tokens on `model`.
    pub fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> Result<f64> {
        Ok(self.lookup(model)?.cost(input_tokens, output_tokens))
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.prices.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: [f64; 10] = [0.5, 0.8, 0.6, 1.2, 0.7, 0.9, 0.55, 0.65, 0.75, 0.85];

    #[test]
    fn test_latency_stats_example() {
        let stats = compute_latency_stats(&EXAMPLE).unwrap();
        assert!((stats.p50 - 0.725).abs() < 1e-9);
        assert!((stats.mean - 0.75).abs() < 1e-9);
        // rank 8.55 between 0.9 and 1.2
        assert!((stats.p95 - 1.065).abs() < 1e-9);
        assert!((stats.p99 - 1.173).abs() < 1e-9);
        assert_eq!(stats.min, 0.5);
        assert_eq!(stats.max, 1.2);
    }

    #[test]
    fn test_latency_stats_empty() {
        assert!(matches!(
            compute_latency_stats(&[]),
            Err(BenchError::EmptyInput)
        ));
    }

    #[test]
    fn test_latency_stats_single_value() {
        let stats = compute_latency_stats(&[0.42]).unwrap();
        assert_eq!(stats.p50, 0.42);
        assert_eq!(stats.p99, 0.42);
        assert_eq!(stats.mean, 0.42);
    }

    #[test]
    fn test_latency_stats_duplicates() {
        let stats = compute_latency_stats(&[1.0, 1.0, 1.0, 1.0]).unwrap();
        assert_eq!(stats.p50, 1.0);
        assert_eq!(stats.p95, 1.0);
        assert_eq!(stats.mean, 1.0);
    }

    #[test]
    fn test_percentiles_are_ordered() {
        let inputs: [&[f64]; 4] = [
            &EXAMPLE,
            &[3.0, 0.0, 0.0, 7.5, 2.25],
            &[0.001, 100.0],
            &[5.0, 4.0, 3.0, 2.0, 1.0, 0.5, 0.25, 9.0, 9.0, 9.0, 9.0],
        ];
        for values in inputs {
            let stats = compute_latency_stats(values).unwrap();
            assert!(stats.p50 <= stats.p95, "{:?}", values);
            assert!(stats.p95 <= stats.p99, "{:?}", values);
            assert!(stats.min <= stats.mean && stats.mean <= stats.max, "{:?}", values);
        }
    }

    #[test]
    fn test_percentile_matches_known_values() {
        let sorted = [100.0, 200.0, 300.0, 400.0, 500.0];
        assert_eq!(percentile(&sorted, 50.0).unwrap(), 300.0);
        assert_eq!(percentile(&sorted, 0.0).unwrap(), 100.0);
        assert_eq!(percentile(&sorted, 100.0).unwrap(), 500.0);
        assert!((percentile(&sorted, 90.0).unwrap() - 460.0).abs() < 1e-9);
    }

    #[test]
    fn test_median_unsorted() {
        assert_eq!(median(&[3.0, 1.0, 2.0]).unwrap(), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]).unwrap(), 2.5);
    }

    #[test]
    fn test_tokens_per_second() {
        assert_eq!(tokens_per_second(100, 2.0), Some(50.0));
        assert_eq!(tokens_per_second(0, 2.0), None);
        assert_eq!(tokens_per_second(100, 0.0), None);
    }

    #[test]
    fn test_estimate_cost_gpt4o() {
        let table = PriceTable::builtin();
        let cost = table.estimate_cost("gpt-4o", 1000, 500).unwrap();
        assert!((cost - 0.0075).abs() < 1e-12);
    }

    #[test]
    fn test_estimate_cost_is_linear() {
        let table = PriceTable::builtin();
        for model in table.models() {
            let one = table.estimate_cost(model, 1000, 0).unwrap();
            let two = table.estimate_cost(model, 2000, 0).unwrap();
            assert!((two - 2.0 * one).abs() < 1e-12, "{}", model);
        }
    }

    #[test]
    fn test_estimate_cost_unknown_model() {
        let table = PriceTable::builtin();
        match table.estimate_cost("some-random-model", 1000, 1000) {
            Err(BenchError::UnknownModel(m)) => assert_eq!(m, "some-random-model"),
            other => panic!("expected UnknownModel, got {:?}", other),
        }
    }

    #[test]
    fn test_lookup_prefers_exact_then_longest_prefix() {
        let table = PriceTable::builtin();
        assert_eq!(table.lookup("gpt-4o-mini").unwrap(), ModelPrice::new(0.00015, 0.0006));
        assert_eq!(table.lookup("gpt-4o-2024-08-06").unwrap(), ModelPrice::new(0.0025, 0.01));
        assert_eq!(table.lookup("GPT-4").unwrap(), ModelPrice::new(0.03, 0.06));
    }

    #[test]
    fn test_price_table_from_yaml() {
        let yaml = "local-llama:\n  input_per_1k: 0.0\n  output_per_1k: 0.0\nMy-Model:\n  input_per_1k: 0.001\n  output_per_1k: 0.002\n";
        let table = PriceTable::from_yaml_str(yaml).unwrap();
        assert_eq!(table.estimate_cost("local-llama", 5000, 5000).unwrap(), 0.0);
        let cost = table.estimate_cost("my-model", 1000, 1000).unwrap();
        assert!((cost - 0.003).abs() < 1e-12);
    }
}
