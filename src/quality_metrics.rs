//! Response quality scoring against reference answers
//!
//! Two token-level metrics are available:
//! - F1: multiset precision/recall over words
//! - ROUGE-L: longest common subsequence F-measure
//!
//! Both are deterministic and bounded to [0, 1]. A response identical to its
//! reference scores 1.0; a response sharing no words with it scores 0.0.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Similarity metric used by [`QualityScorer`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityMetric {
    #[default]
    TokenF1,
    RougeL,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QualityScorer {
    metric: QualityMetric,
}

impl QualityScorer {
    pub fn new(metric: QualityMetric) -> Self {
        QualityScorer { metric }
    }

    pub fn metric(&self) -> QualityMetric {
        self.metric
    }

    /// Score `response` against `reference`.
    ///
    /// Returns `None` when there is no reference: quality is not evaluated
    /// for that prompt. An empty reference only matches an empty response.
    pub fn score(&self, response: &str, reference: Option<&str>) -> Option<f64> {
        let reference = reference?;
        Some(match self.metric {
            QualityMetric::TokenF1 => calculate_f1_score(response, reference),
            QualityMetric::RougeL => calculate_rouge_l_score(response, reference),
        })
    }
}

/// Convenience wrapper using the default metric.
pub fn score(response: &str, reference: Option<&str>) -> Option<f64> {
    QualityScorer::default().score(response, reference)
}

/// Lower-case words with surrounding punctuation stripped.
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Scores decided before any overlap is computed.
///
/// Emptiness is judged on the raw text: an empty string only matches another
/// empty string. Text with no words (whitespace, punctuation) only matches
/// itself byte for byte.
fn empty_boundary(
    generated: &str,
    reference: &str,
    generated_tokens: &[String],
    reference_tokens: &[String],
) -> Option<f64> {
    match (generated.is_empty(), reference.is_empty()) {
        (true, true) => return Some(1.0),
        (true, false) | (false, true) => return Some(0.0),
        (false, false) => {}
    }
    match (generated_tokens.is_empty(), reference_tokens.is_empty()) {
        (true, true) if generated == reference => Some(1.0),
        (true, _) | (_, true) => Some(0.0),
        (false, false) => None,
    }
}

fn f_measure(overlap: f64, generated_len: usize, reference_len: usize) -> f64 {
    if overlap == 0.0 {
        return 0.0;
    }
    let precision = overlap / generated_len as f64;
    let recall = overlap / reference_len as f64;
    2.0 * precision * recall / (precision + recall)
}

/// Token F1 between generated and reference text.
///
/// Overlap counts each word as many times as it appears in both texts, so
/// repeated words do not inflate or deflate the score.
pub fn calculate_f1_score(generated: &str, reference: &str) -> f64 {
    let generated_tokens = tokenize(generated);
    let reference_tokens = tokenize(reference);
    if let Some(score) = empty_boundary(generated, reference, &generated_tokens, &reference_tokens) {
        return score;
    }

    let mut reference_counts: HashMap<&str, usize> = HashMap::new();
    for token in &reference_tokens {
        *reference_counts.entry(token.as_str()).or_default() += 1;
    }

    let mut overlap = 0usize;
    for token in &generated_tokens {
        if let Some(remaining) = reference_counts.get_mut(token.as_str()) {
            if *remaining > 0 {
                *remaining -= 1;
                overlap += 1;
            }
        }
    }

    f_measure(
        overlap as f64,
        generated_tokens.len(),
        reference_tokens.len(),
    )
}

fn lcs_length(a: &[String], b: &[String]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    // Single rolling row over `b`
    let mut row = vec![0usize; b.len() + 1];
    for x in a {
        let mut diagonal = 0;
        for (j, y) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if x == y {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// ROUGE-L F-measure between generated and reference text.
pub fn calculate_rouge_l_score(generated: &str, reference: &str) -> f64 {
    let generated_tokens = tokenize(generated);
    let reference_tokens = tokenize(reference);
    if let Some(score) = empty_boundary(generated, reference, &generated_tokens, &reference_tokens) {
        return score;
    }

    let lcs = lcs_length(&generated_tokens, &reference_tokens);
    f_measure(lcs as f64, generated_tokens.len(), reference_tokens.len())
}
