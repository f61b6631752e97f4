//! Evaluation runner: grades a search API against labeled test queries.
//!
//! Each query is sent to the API once with `limit = max(k_values)`; the
//! returned ranking is graded against the query's relevance judgments and
//! fed into the pure metric functions. Queries that fail at the network
//! boundary are logged and skipped, mirroring the per-record isolation of
//! the ingestion batcher.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metrics::{mrr, ndcg, precision_at_k, recall_at_k, AggregatedMetric};
use crate::search::SearchClient;

/// One labeled evaluation query.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestQuery {
    /// Free-text query sent to the API.
    pub query: String,
    /// Ids judged relevant for this query; may be empty.
    #[serde(default)]
    pub relevant_product_ids: Vec<String>,
    /// Optional graded relevance per id, in `[0, 1]`.
    #[serde(default)]
    pub relevance_scores: HashMap<String, f64>,
}

impl TestQuery {
    /// Graded relevance for a retrieved id.
    ///
    /// An id without an explicit score defaults to 1.0 when it appears in
    /// `relevant_product_ids` and 0.0 otherwise. This conflates "unknown
    /// relevance" with the binary judgment and is a known approximation
    /// kept for compatibility with existing fixture files.
    pub fn graded_relevance(&self, id: &str, relevant: bool) -> f64 {
        self.relevance_scores
            .get(id)
            .copied()
            .unwrap_or(if relevant { 1.0 } else { 0.0 })
    }
}

/// Comparison of one metric between two model deployments.
#[derive(Debug, Clone, Serialize)]
pub struct MetricComparison {
    /// Base deployment mean.
    pub base: f64,
    /// Candidate deployment mean.
    pub candidate: f64,
    /// `candidate - base`.
    pub improvement: f64,
    /// Improvement as a percentage of the base mean; 0.0 when the base
    /// mean is 0 rather than a division error.
    pub improvement_pct: f64,
}

/// Full output of a base-vs-candidate comparison run.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    /// Aggregated metrics of the base deployment.
    pub base: BTreeMap<String, AggregatedMetric>,
    /// Aggregated metrics of the candidate deployment.
    pub candidate: BTreeMap<String, AggregatedMetric>,
    /// Per-metric deltas keyed like the evaluation output.
    pub improvements: BTreeMap<String, MetricComparison>,
}

/// Loads test queries from a JSON-array file.
///
/// An unreadable file or a body that is not a JSON array is fatal;
/// malformed entries inside the array are logged and skipped.
pub fn load_test_queries(path: &Path) -> Result<Vec<TestQuery>> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read test queries from {:?}", path))?;
    parse_test_queries(&body).with_context(|| format!("invalid test-query file {:?}", path))
}

/// Parses a JSON array of test queries, skipping malformed entries.
pub fn parse_test_queries(body: &str) -> Result<Vec<TestQuery>> {
    let entries: Vec<Value> =
        serde_json::from_str(body).context("test-query file is not a JSON array")?;
    let mut queries = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<TestQuery>(entry) {
            Ok(query) if !query.query.trim().is_empty() => queries.push(query),
            Ok(_) => eprintln!("skipping test query {}: empty query text", idx + 1),
            Err(err) => eprintln!("skipping malformed test query {}: {err}", idx + 1),
        }
    }
    Ok(queries)
}

/// Evaluates a search API over all test queries and K values.
///
/// Returns one [`AggregatedMetric`] per `precision@k`, `recall@k`,
/// `ndcg@k`, and a single `mrr`. Every key is present even when all
/// queries failed; an empty `values` list is the signal that nothing was
/// graded, distinct from a genuine zero score.
pub fn evaluate<C: SearchClient>(
    search: &C,
    queries: &[TestQuery],
    k_values: &[usize],
) -> Result<BTreeMap<String, AggregatedMetric>> {
    anyhow::ensure!(!k_values.is_empty(), "at least one K value is required");
    anyhow::ensure!(
        k_values.iter().all(|&k| k > 0),
        "K values must be positive"
    );
    let limit = k_values.iter().copied().max().unwrap_or(0);

    let mut samples: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for k in k_values {
        samples.insert(format!("precision@{k}"), Vec::new());
        samples.insert(format!("recall@{k}"), Vec::new());
        samples.insert(format!("ndcg@{k}"), Vec::new());
    }
    samples.insert("mrr".to_string(), Vec::new());

    for test in queries {
        let hits = match search.query(&test.query, limit) {
            Ok(hits) => hits,
            Err(err) => {
                eprintln!("skipping query '{}': {err}", test.query);
                continue;
            }
        };

        // The API's ordering is the ranking under test; grade it as-is.
        let relevant: HashSet<&str> = test
            .relevant_product_ids
            .iter()
            .map(String::as_str)
            .collect();
        let flags: Vec<bool> = hits
            .iter()
            .map(|hit| relevant.contains(hit.product_id.as_str()))
            .collect();
        let indicators: Vec<f64> = flags.iter().map(|&hit| if hit { 1.0 } else { 0.0 }).collect();
        let graded: Vec<f64> = hits
            .iter()
            .zip(&flags)
            .map(|(hit, &relevant)| test.graded_relevance(&hit.product_id, relevant))
            .collect();

        for &k in k_values {
            let end = k.min(flags.len());
            push(&mut samples, &format!("precision@{k}"), precision_at_k(&flags[..end], k));
            push(
                &mut samples,
                &format!("recall@{k}"),
                recall_at_k(&flags[..end], relevant.len(), k),
            );
            push(&mut samples, &format!("ndcg@{k}"), ndcg(&graded[..end], Some(k)));
        }
        push(&mut samples, "mrr", mrr(&indicators));
    }

    Ok(samples
        .into_iter()
        .map(|(name, values)| (name, AggregatedMetric::from_values(values)))
        .collect())
}

fn push(samples: &mut BTreeMap<String, Vec<f64>>, name: &str, value: f64) {
    if let Some(values) = samples.get_mut(name) {
        values.push(value);
    }
}

/// Runs two independent evaluations and diffs every base metric.
///
/// A metric present in the base run but absent from the candidate run is
/// an error for the comparison, never a silent zero.
pub fn compare_models<C: SearchClient>(
    base: &C,
    candidate: &C,
    queries: &[TestQuery],
    k_values: &[usize],
) -> Result<ComparisonReport> {
    eprintln!("evaluating base deployment...");
    let base_metrics = evaluate(base, queries, k_values)?;
    eprintln!("evaluating candidate deployment...");
    let candidate_metrics = evaluate(candidate, queries, k_values)?;

    let mut improvements = BTreeMap::new();
    for (name, base_metric) in &base_metrics {
        let candidate_metric = candidate_metrics
            .get(name)
            .with_context(|| format!("metric {name} missing from candidate run"))?;
        let improvement = candidate_metric.mean - base_metric.mean;
        let improvement_pct = if base_metric.mean > 0.0 {
            improvement / base_metric.mean * 100.0
        } else {
            0.0
        };
        improvements.insert(
            name.clone(),
            MetricComparison {
                base: base_metric.mean,
                candidate: candidate_metric.mean,
                improvement,
                improvement_pct,
            },
        );
    }

    Ok(ComparisonReport {
        base: base_metrics,
        candidate: candidate_metrics,
        improvements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ItemError;
    use crate::search::{is_ranked_descending, SearchHit};

    struct FakeSearch {
        /// Ranked ids per query text; `None` simulates a transport failure.
        responses: HashMap<String, Option<Vec<SearchHit>>>,
    }

    impl FakeSearch {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
            }
        }

        fn ranked(mut self, query: &str, ids: &[&str]) -> Self {
            let hits = ids
                .iter()
                .enumerate()
                .map(|(rank, id)| SearchHit {
                    product_id: id.to_string(),
                    similarity_score: 1.0 - rank as f64 * 0.1,
                })
                .collect();
            self.responses.insert(query.to_string(), Some(hits));
            self
        }

        fn failing(mut self, query: &str) -> Self {
            self.responses.insert(query.to_string(), None);
            self
        }
    }

    impl SearchClient for FakeSearch {
        fn query(&self, text: &str, _limit: usize) -> Result<Vec<SearchHit>, ItemError> {
            match self.responses.get(text) {
                Some(Some(hits)) => Ok(hits.clone()),
                Some(None) => Err(ItemError::Transient("connection refused".into())),
                None => Ok(Vec::new()),
            }
        }
    }

    fn query(text: &str, relevant: &[&str]) -> TestQuery {
        TestQuery {
            query: text.to_string(),
            relevant_product_ids: relevant.iter().map(|s| s.to_string()).collect(),
            relevance_scores: HashMap::new(),
        }
    }

    #[test]
    fn reports_exact_metric_key_set() {
        let search = FakeSearch::new()
            .ranked("q1", &["A", "B"])
            .ranked("q2", &["C"])
            .ranked("q3", &[])
            .ranked("q4", &["D", "E"])
            .failing("q5");
        let queries = vec![
            query("q1", &["A"]),
            query("q2", &["Z"]),
            query("q3", &["A"]),
            query("q4", &["E"]),
            query("q5", &["A"]),
        ];
        let report = evaluate(&search, &queries, &[5, 10]).unwrap();
        let keys: Vec<&str> = report.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "mrr",
                "ndcg@10",
                "ndcg@5",
                "precision@10",
                "precision@5",
                "recall@10",
                "recall@5",
            ]
        );
        // The failed query is skipped, so at most 4 of the 5 queries
        // contribute samples.
        for metric in report.values() {
            assert!(metric.values.len() <= 4);
        }
        assert_eq!(report["mrr"].values.len(), 4);
    }

    #[test]
    fn grades_a_known_ranking_exactly() {
        let search = FakeSearch::new().ranked("mug", &["A", "X", "B"]);
        let queries = vec![query("mug", &["A", "B"])];
        let report = evaluate(&search, &queries, &[2]).unwrap();
        assert!((report["precision@2"].mean - 0.5).abs() < 1e-12);
        assert!((report["recall@2"].mean - 0.5).abs() < 1e-12);
        assert!((report["ndcg@2"].mean - 1.0).abs() < 1e-12);
        assert!((report["mrr"].mean - 1.0).abs() < 1e-12);
    }

    #[test]
    fn api_order_is_graded_without_resorting() {
        // The relevant hit sits at rank 2 even though its score is higher;
        // grading must honor the API's order, so MRR is 1/2, not 1.
        let hits = vec![
            SearchHit {
                product_id: "X".into(),
                similarity_score: 0.1,
            },
            SearchHit {
                product_id: "A".into(),
                similarity_score: 0.9,
            },
        ];
        assert!(!is_ranked_descending(&hits));
        let mut search = FakeSearch::new();
        search.responses.insert("mug".to_string(), Some(hits));
        let report = evaluate(&search, &[query("mug", &["A"])], &[2]).unwrap();
        assert!((report["mrr"].mean - 0.5).abs() < 1e-12);
    }

    #[test]
    fn explicit_relevance_scores_grade_ndcg() {
        let search = FakeSearch::new().ranked("mug", &["A", "B"]);
        let mut test = query("mug", &["A", "B"]);
        test.relevance_scores.insert("A".to_string(), 0.2);
        test.relevance_scores.insert("B".to_string(), 1.0);
        let report = evaluate(&search, &[test], &[2]).unwrap();
        // Graded sequence [0.2, 1.0] is not ideally ordered.
        let value = report["ndcg@2"].mean;
        assert!(value > 0.0 && value < 1.0);
    }

    #[test]
    fn total_api_failure_reports_empty_values_not_zero_scores() {
        let search = FakeSearch::new().failing("q1").failing("q2");
        let queries = vec![query("q1", &["A"]), query("q2", &["B"])];
        let report = evaluate(&search, &queries, &[5]).unwrap();
        assert_eq!(report.len(), 4);
        for metric in report.values() {
            assert!(metric.values.is_empty());
            assert_eq!(metric.mean, 0.0);
        }
    }

    #[test]
    fn empty_k_values_fail_before_any_query() {
        let search = FakeSearch::new();
        assert!(evaluate(&search, &[query("q", &[])], &[]).is_err());
        assert!(evaluate(&search, &[query("q", &[])], &[0, 5]).is_err());
    }

    #[test]
    fn comparison_improvement_is_candidate_minus_base() {
        let base = FakeSearch::new().ranked("mug", &["X", "A"]);
        let candidate = FakeSearch::new().ranked("mug", &["A", "X"]);
        let queries = vec![query("mug", &["A"])];
        let report = compare_models(&base, &candidate, &queries, &[2]).unwrap();
        let mrr_cmp = &report.improvements["mrr"];
        assert!((mrr_cmp.base - 0.5).abs() < 1e-12);
        assert!((mrr_cmp.candidate - 1.0).abs() < 1e-12);
        assert!((mrr_cmp.improvement - 0.5).abs() < 1e-12);
        assert!((mrr_cmp.improvement_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_base_mean_yields_zero_improvement_pct() {
        let base = FakeSearch::new().ranked("mug", &["X", "Y"]);
        let candidate = FakeSearch::new().ranked("mug", &["A", "X"]);
        let queries = vec![query("mug", &["A"])];
        let report = compare_models(&base, &candidate, &queries, &[2]).unwrap();
        let cmp = &report.improvements["mrr"];
        assert_eq!(cmp.base, 0.0);
        assert!(cmp.improvement > 0.0);
        assert_eq!(cmp.improvement_pct, 0.0);
    }

    #[test]
    fn parses_fixture_files_and_skips_malformed_entries() {
        let body = r#"[
            {"query": "wireless headphones", "relevant_product_ids": ["B1", "B2"],
             "relevance_scores": {"B1": 1.0, "B2": 0.8}},
            {"query": "   "},
            {"relevant_product_ids": ["B9"]},
            {"query": "espresso grinder"}
        ]"#;
        let queries = parse_test_queries(body).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].query, "wireless headphones");
        assert_eq!(queries[0].relevance_scores["B2"], 0.8);
        assert!(queries[1].relevant_product_ids.is_empty());
    }

    #[test]
    fn non_array_fixture_is_fatal() {
        assert!(parse_test_queries("{\"query\": \"mug\"}").is_err());
        assert!(parse_test_queries("not json").is_err());
    }

    #[test]
    fn graded_relevance_defaults_follow_binary_judgment() {
        let test = query("mug", &["A"]);
        assert_eq!(test.graded_relevance("A", true), 1.0);
        assert_eq!(test.graded_relevance("Z", false), 0.0);
    }
}
