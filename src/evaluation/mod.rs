//! Offline evaluation of a knowledge base against a reference dataset.

pub mod metrics;

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::chain::{ChatInput, RunConfig, Runnable};
use crate::core::errors::RagError;

pub use metrics::AnswerMetrics;

/// One line of a JSONL dataset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EvalExample {
    pub question: String,
    pub ground_truth: String,
}

#[derive(Debug, Clone)]
pub struct ExampleResult {
    pub question: String,
    pub answer: String,
    pub metrics: AnswerMetrics,
}

#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub results: Vec<ExampleResult>,
    pub failures: usize,
    pub average: AnswerMetrics,
}

impl std::fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Evaluation ({} answered, {} failed)",
            self.results.len(),
            self.failures
        )?;
        writeln!(f, "========================================")?;
        write!(f, "{}", self.average)
    }
}

/// Parses a JSONL dataset, skipping blank lines.
pub fn parse_dataset(contents: &str) -> Result<Vec<EvalExample>, RagError> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| RagError::InvalidInput(format!("dataset line {}: {}", i + 1, e)))
        })
        .collect()
}

pub fn load_dataset(path: &Path) -> Result<Vec<EvalExample>, RagError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| RagError::InvalidInput(format!("cannot read {}: {}", path.display(), e)))?;
    parse_dataset(&contents)
}

/// Runs every example through `runnable`. Failed invocations are counted
/// and excluded from the averages.
pub async fn evaluate(runnable: &dyn Runnable, examples: &[EvalExample]) -> EvaluationReport {
    let mut results = Vec::with_capacity(examples.len());
    let mut failures = 0;

    for (i, example) in examples.iter().enumerate() {
        let config = RunConfig::default().ensure_run_id();
        match runnable
            .invoke(ChatInput::new(example.question.clone()), &config)
            .await
        {
            Ok(output) => {
                let contexts: Vec<String> =
                    output.sources.into_iter().map(|s| s.content).collect();
                let metrics = AnswerMetrics::compute(&output.answer, &example.ground_truth, &contexts);
                tracing::debug!(example = i, f1 = metrics.token_f1, "Evaluated example");
                results.push(ExampleResult {
                    question: example.question.clone(),
                    answer: output.answer,
                    metrics,
                });
            }
            Err(err) => {
                tracing::warn!(example = i, "Evaluation invoke failed: {}", err);
                failures += 1;
            }
        }
    }

    let per_example: Vec<AnswerMetrics> = results.iter().map(|r| r.metrics).collect();
    EvaluationReport {
        average: AnswerMetrics::average(&per_example),
        results,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::SwappableExecutor;
    use crate::testing::StubPipeline;
    use std::sync::Arc;

    #[test]
    fn dataset_lines_are_numbered_in_errors() {
        let ok = parse_dataset("{\"question\":\"q\",\"ground_truth\":\"a\"}\n\n").unwrap();
        assert_eq!(ok.len(), 1);

        let err = parse_dataset("{\"question\":\"q\",\"ground_truth\":\"a\"}\n{\"question\":1}").unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(ref m) if m.starts_with("dataset line 2")));
    }

    #[tokio::test]
    async fn unbound_executor_counts_failures() {
        let executor = SwappableExecutor::new();
        let examples = parse_dataset("{\"question\":\"q\",\"ground_truth\":\"a\"}").unwrap();
        let report = evaluate(&executor, &examples).await;
        assert_eq!(report.failures, 1);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn averages_over_answered_examples() {
        let executor = SwappableExecutor::new();
        executor.rebind(Arc::new(StubPipeline::new("stub", "blue")));
        let examples = parse_dataset(
            "{\"question\":\"sky?\",\"ground_truth\":\"Blue\"}\n{\"question\":\"grass?\",\"ground_truth\":\"green\"}",
        )
        .unwrap();

        let report = evaluate(&executor, &examples).await;
        assert_eq!(report.results.len(), 2);
        assert!((report.average.exact_match - 0.5).abs() < 1e-6);
        assert!(report.to_string().contains("Exact Match:    50.00%"));
    }
}
