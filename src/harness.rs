//! Benchmark run orchestration: load, retrieve per query, score, report.

use crate::bench::{load_benchmark, Benchmark, BenchmarkFields};
use crate::config::Config;
use crate::error::{RagbenchError, Result};
use crate::eval::{evaluate, JudgmentCollector, Measure, MetricsReport};
use crate::report::{log_report, persist_artifact, RunArtifact};
use crate::retrieve::{RetrievalAdapter, Retriever};
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Result of a completed run
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub report: MetricsReport,
    /// Benchmark with every item's predictions attached
    pub benchmark: Benchmark,
    /// Queries whose retrieval failed and were scored as empty
    pub failed_queries: Vec<String>,
    pub artifact_path: Option<PathBuf>,
}

/// Drives one evaluation run against a retriever.
///
/// Queries run one at a time in benchmark order. A failing query is scored as
/// an empty result set; a benchmark that doesn't parse or metrics that can't be
/// computed abort the run before anything is reported.
pub struct Harness<'r> {
    config: Config,
    retriever: &'r dyn Retriever,
    measures: Vec<Measure>,
}

impl<'r> Harness<'r> {
    pub fn new(config: Config, retriever: &'r dyn Retriever) -> Result<Self> {
        let measures = config.measures()?;

        Ok(Self {
            config,
            retriever,
            measures,
        })
    }

    pub async fn run(&self) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();

        let path = self.config.benchmark_path().ok_or_else(|| {
            RagbenchError::Config("benchmark path is not set".to_string())
        })?;
        let fields = BenchmarkFields {
            question_field: self.config.benchmark.question_field.clone(),
            gold_field: self.config.benchmark.gold_field.clone(),
        };

        let mut benchmark = load_benchmark(path, &fields, self.config.benchmark.max_instances)
            .map_err(|e| {
                log::error!("Error loading benchmark {}: {}", path.display(), e);
                e
            })?;
        log::info!(
            "Run {}: {} questions from {} using the {} retriever",
            run_id,
            benchmark.len(),
            path.display(),
            self.retriever.name()
        );

        let adapter = RetrievalAdapter::new(self.retriever, self.config.retriever.doc_id_field.clone())
            .with_top_k(self.config.retriever.top_k)
            .with_timeout(self.config.retriever.timeout_secs.map(Duration::from_secs));

        let mut collector = JudgmentCollector::new();
        let mut failed_queries = Vec::new();

        for item in benchmark.items.iter_mut() {
            log::info!("Processing question {}...", item.index);
            collector.record_golden(item);

            let outcome = adapter.retrieve(item.index, &item.question).await;
            collector.record_predictions(&item.query_id, &outcome.predictions);
            // Failed queries stay unannotated; only successful retrievals are persisted
            if outcome.failed() {
                failed_queries.push(item.query_id.clone());
            } else {
                item.attach_predictions(outcome.predictions);
            }
        }

        log::info!("Calculating metrics...");
        let report = evaluate(
            &self.measures,
            collector.qrels(),
            collector.run(),
            collector.query_ids(),
        )
        .map_err(|e| {
            log::error!("Error calculating metrics: {}", e);
            e
        })?;

        log_report(&report);
        log::info!(
            "{} questions, {} judgments, {} scored results, {} failed retrievals",
            benchmark.len(),
            collector.qrels().len(),
            collector.run().len(),
            failed_queries.len()
        );

        let artifact_path = match &self.config.output.logs_dir {
            Some(logs_dir) => {
                let artifact = RunArtifact {
                    run_id: run_id.clone(),
                    started_at,
                    finished_at: Utc::now(),
                    retriever: self.retriever.name().to_string(),
                    benchmark_sha256: benchmark.sha256.clone(),
                    failed_queries: failed_queries.clone(),
                    data: benchmark.annotated_data(&self.config.retriever.doc_id_field),
                    metrics: report.aggregate.clone(),
                    per_query_metrics: report.per_query.clone(),
                    flags: serde_json::to_value(&self.config)?,
                };
                let path = persist_artifact(logs_dir, &artifact).map_err(|e| {
                    log::error!("Error writing run artifact to {}: {}", logs_dir.display(), e);
                    e
                })?;
                log::info!("Predictions and metrics saved to {}", path.display());
                Some(path)
            }
            None => None,
        };

        Ok(RunOutcome {
            run_id,
            report,
            benchmark,
            failed_queries,
            artifact_path,
        })
    }
}
