//! Pure ranking-quality metric functions and aggregation helpers.
//!
//! All functions are total: empty or degenerate input yields a well-defined
//! zero, never a panic or an error. `k` of `None` means "use the full
//! sequence length".

use serde::Serialize;

/// Discounted Cumulative Gain over the first `k` relevance scores.
///
/// `sum(score_i / log2(i + 1))` with 1-indexed positions.
pub fn dcg(scores: &[f64], k: Option<usize>) -> f64 {
    let take = k.unwrap_or(scores.len());
    scores
        .iter()
        .take(take)
        .enumerate()
        .map(|(i, score)| score / ((i + 2) as f64).log2())
        .sum()
}

/// Normalized DCG: `dcg / ideal dcg`, 0.0 when the ideal is 0 or the
/// sequence is empty.
pub fn ndcg(scores: &[f64], k: Option<usize>) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mut ideal: Vec<f64> = scores.to_vec();
    ideal.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let idcg = dcg(&ideal, k);
    if idcg == 0.0 {
        return 0.0;
    }
    dcg(scores, k) / idcg
}

/// Precision@K: fraction of the top `k` retrieved items that are relevant.
///
/// The denominator is `min(k, len)` so short result lists are not
/// penalized for positions the API never filled.
pub fn precision_at_k(relevant: &[bool], k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let hits = relevant.iter().take(k).filter(|&&r| r).count();
    hits as f64 / k.min(relevant.len()) as f64
}

/// Recall@K: fraction of all relevant items found in the top `k`.
pub fn recall_at_k(relevant: &[bool], total_relevant: usize, k: usize) -> f64 {
    if total_relevant == 0 {
        return 0.0;
    }
    let hits = relevant.iter().take(k).filter(|&&r| r).count();
    hits as f64 / total_relevant as f64
}

/// Reciprocal rank of the first positive indicator, 0.0 when none is.
pub fn mrr(indicators: &[f64]) -> f64 {
    indicators
        .iter()
        .position(|&score| score > 0.0)
        .map_or(0.0, |i| 1.0 / (i + 1) as f64)
}

/// Arithmetic mean, 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation, 0.0 for an empty slice.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mu = mean(values);
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Per-metric summary over all evaluated queries.
///
/// `values` is kept alongside the summary statistics so a run where every
/// query failed (empty `values`) is distinguishable from a run that
/// genuinely scored 0.0.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedMetric {
    /// Mean over all query samples.
    pub mean: f64,
    /// Population standard deviation over all query samples.
    pub std: f64,
    /// One sample per successfully evaluated query, in query order.
    pub values: Vec<f64>,
}

impl AggregatedMetric {
    /// Reduces raw per-query samples to a summary.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self {
            mean: mean(&values),
            std: std_dev(&values),
            values,
        }
    }
}
