use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use shelfsearch::{
    compare_models, evaluate, load_test_queries, AggregatedMetric, ComparisonReport,
    HttpSearchClient,
};

#[derive(Parser, Debug)]
#[command(
    name = "shelfsearch-eval",
    about = "Evaluate search relevancy against labeled test queries"
)]
struct EvalCli {
    /// Search API URL under test
    #[arg(long, env = "SHELFSEARCH_API_URL")]
    api_url: String,

    /// Path to the test-query JSON file (array of query objects)
    #[arg(long, env = "SHELFSEARCH_TEST_DATA")]
    test_data: PathBuf,

    /// Optional second API URL; runs a base-vs-candidate comparison
    #[arg(long, env = "SHELFSEARCH_COMPARE_URL")]
    compare: Option<String>,

    /// Truncation depths, comma separated
    #[arg(
        long,
        env = "SHELFSEARCH_K_VALUES",
        value_delimiter = ',',
        default_value = "5,10,20"
    )]
    k_values: Vec<usize>,

    /// Max seconds to wait for each search request
    #[arg(long, env = "SHELFSEARCH_SEARCH_TIMEOUT_SECS", default_value_t = 30)]
    search_timeout_secs: u64,

    /// Optional JSON report output path
    #[arg(long, env = "SHELFSEARCH_EVAL_REPORT")]
    report_json: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = EvalCli::parse();
    let queries = load_test_queries(&cli.test_data)?;
    anyhow::ensure!(!queries.is_empty(), "test-query file contains no usable queries");
    eprintln!(
        "evaluating {} queries against {}",
        queries.len(),
        cli.api_url
    );

    let timeout = Duration::from_secs(cli.search_timeout_secs.max(1));
    let base = HttpSearchClient::new(cli.api_url, timeout)?;

    if let Some(candidate_url) = cli.compare {
        let candidate = HttpSearchClient::new(candidate_url, timeout)?;
        let report = compare_models(&base, &candidate, &queries, &cli.k_values)?;
        render_comparison(&report);
        if let Some(path) = cli.report_json {
            write_report(&report, &path)?;
            println!("wrote JSON report to {:?}", path);
        }
    } else {
        let metrics = evaluate(&base, &queries, &cli.k_values)?;
        render_metrics(&metrics);
        if let Some(path) = cli.report_json {
            write_report(&metrics, &path)?;
            println!("wrote JSON report to {:?}", path);
        }
    }
    Ok(())
}

fn render_metrics(metrics: &BTreeMap<String, AggregatedMetric>) {
    println!("--- Evaluation Results ---");
    for (name, metric) in metrics {
        if metric.values.is_empty() {
            println!("{name}: no samples (all queries skipped)");
        } else {
            println!(
                "{name}: {:.4} ± {:.4} (n={})",
                metric.mean,
                metric.std,
                metric.values.len()
            );
        }
    }
}

fn render_comparison(report: &ComparisonReport) {
    println!("--- Comparison Results ---");
    for (name, cmp) in &report.improvements {
        println!(
            "{name}: base {:.4} -> candidate {:.4} ({:+.4}, {:+.2}%)",
            cmp.base, cmp.candidate, cmp.improvement, cmp.improvement_pct
        );
    }
}

fn write_report<T: serde::Serialize>(report: &T, path: &PathBuf) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    serde_json::to_writer_pretty(file, report).context("failed to write JSON report")?;
    Ok(())
}
