//! Evaluation: relevance judgments, scored runs, and IR metrics.

pub mod judgments;
pub mod metrics;

pub use judgments::{JudgmentCollector, Qrel, ScoredDoc, RELEVANT};
pub use metrics::{calc_aggregate, evaluate, iter_calc, Measure, MetricsReport, PerQueryMetric};
