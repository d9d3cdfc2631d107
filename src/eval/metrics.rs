//! Evaluation metrics: P@k, R@k, nDCG@k, MAP, MRR and R-precision.
//!
//! Definitions follow trec_eval (`P_k`, `recall_k`, `ndcg_cut_k`, `map`,
//! `recip_rank`, `Rprec`) with binary relevance. Rankings sort by score
//! descending and break ties by document id descending, as trec_eval does.

use crate::error::{RagbenchError, Result};
use crate::eval::judgments::{Qrel, ScoredDoc, RELEVANT};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// A retrieval metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measure {
    /// Precision at rank k
    P(usize),
    /// Recall at rank k
    R(usize),
    /// Normalized discounted cumulative gain at rank k
    NdcgCut(usize),
    /// Mean average precision
    Map,
    /// Mean reciprocal rank
    Mrr,
    /// Precision at rank R, R = number of relevant documents
    Rprec,
}

const DEFAULT_SUITE: [Measure; 6] = [
    Measure::Rprec,
    Measure::P(1),
    Measure::R(3),
    Measure::NdcgCut(3),
    Measure::Map,
    Measure::Mrr,
];

impl Measure {
    /// `Rprec, P@1, R@3, nDCG@3, MAP, MRR`
    pub fn default_suite() -> &'static [Measure] {
        &DEFAULT_SUITE
    }

    /// Undefined for queries without relevant documents; such queries are skipped.
    pub fn requires_relevant(&self) -> bool {
        matches!(
            self,
            Measure::R(_) | Measure::NdcgCut(_) | Measure::Map | Measure::Rprec
        )
    }

    /// Value for one query's ranking.
    pub fn compute(&self, ranking: &[&str], relevant: &HashSet<&str>) -> f64 {
        match *self {
            Measure::P(k) => precision_at_k(ranking, relevant, k),
            Measure::R(k) => recall_at_k(ranking, relevant, k),
            Measure::NdcgCut(k) => ndcg_at_k(ranking, relevant, k),
            Measure::Map => average_precision(ranking, relevant),
            Measure::Mrr => reciprocal_rank(ranking, relevant),
            Measure::Rprec => r_precision(ranking, relevant),
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::P(k) => write!(f, "P@{}", k),
            Measure::R(k) => write!(f, "R@{}", k),
            Measure::NdcgCut(k) => write!(f, "nDCG@{}", k),
            Measure::Map => write!(f, "MAP"),
            Measure::Mrr => write!(f, "MRR"),
            Measure::Rprec => write!(f, "Rprec"),
        }
    }
}

impl FromStr for Measure {
    type Err = RagbenchError;

    /// Accepts the display names plus the `AP` / `RR` aliases.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s {
            "MAP" | "AP" => return Ok(Measure::Map),
            "MRR" | "RR" => return Ok(Measure::Mrr),
            "Rprec" => return Ok(Measure::Rprec),
            _ => {}
        }

        let (name, cutoff) = s
            .split_once('@')
            .ok_or_else(|| RagbenchError::Config(format!("Unknown metric: {}", s)))?;
        let k: usize = cutoff
            .parse()
            .ok()
            .filter(|k| *k > 0)
            .ok_or_else(|| RagbenchError::Config(format!("Invalid cutoff in metric: {}", s)))?;

        match name {
            "P" => Ok(Measure::P(k)),
            "R" => Ok(Measure::R(k)),
            "nDCG" => Ok(Measure::NdcgCut(k)),
            _ => Err(RagbenchError::Config(format!("Unknown metric: {}", s))),
        }
    }
}

/// One (query, metric) value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerQueryMetric {
    pub query_id: String,
    pub measure: String,
    pub value: f64,
}

/// Aggregate values by metric name plus the per-query breakdown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub aggregate: BTreeMap<String, f64>,
    pub per_query: Vec<PerQueryMetric>,
}

/// Precision at K: relevant documents in the top K, divided by K.
pub fn precision_at_k(ranking: &[&str], relevant: &HashSet<&str>, k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    hits_in_top(ranking, relevant, k) as f64 / k as f64
}

/// Recall at K: relevant documents in the top K, divided by all relevant.
/// 0.0 with no relevant documents.
pub fn recall_at_k(ranking: &[&str], relevant: &HashSet<&str>, k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    hits_in_top(ranking, relevant, k) as f64 / relevant.len() as f64
}

/// nDCG at K with binary gains and a `log2(rank + 1)` discount.
pub fn ndcg_at_k(ranking: &[&str], relevant: &HashSet<&str>, k: usize) -> f64 {
    let ideal: f64 = (0..k.min(relevant.len())).map(discount).sum();
    if ideal == 0.0 {
        return 0.0;
    }
    let dcg: f64 = ranking
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, doc)| relevant.contains(*doc))
        .map(|(idx, _)| discount(idx))
        .sum();
    dcg / ideal
}

/// Average precision: mean of precision at each relevant hit, over all relevant.
pub fn average_precision(ranking: &[&str], relevant: &HashSet<&str>) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let mut hits = 0usize;
    let mut sum = 0.0;
    for (idx, doc) in ranking.iter().enumerate() {
        if relevant.contains(doc) {
            hits += 1;
            sum += hits as f64 / (idx + 1) as f64;
        }
    }
    sum / relevant.len() as f64
}

/// Reciprocal rank of the first relevant document; 0.0 if none is retrieved.
pub fn reciprocal_rank(ranking: &[&str], relevant: &HashSet<&str>) -> f64 {
    ranking
        .iter()
        .position(|doc| relevant.contains(doc))
        .map(|idx| 1.0 / (idx + 1) as f64)
        .unwrap_or(0.0)
}

/// Precision at rank R where R is the number of relevant documents.
pub fn r_precision(ranking: &[&str], relevant: &HashSet<&str>) -> f64 {
    let r = relevant.len();
    if r == 0 {
        return 0.0;
    }
    hits_in_top(ranking, relevant, r) as f64 / r as f64
}

fn hits_in_top(ranking: &[&str], relevant: &HashSet<&str>, k: usize) -> usize {
    ranking
        .iter()
        .take(k)
        .filter(|doc| relevant.contains(*doc))
        .count()
}

/// Discount for the 0-based position `idx`.
fn discount(idx: usize) -> f64 {
    1.0 / ((idx + 2) as f64).log2()
}

/// Per-query relevant set and ranking
struct QueryJudgments<'a> {
    relevant: HashSet<&'a str>,
    scores: HashMap<&'a str, f64>,
}

impl<'a> QueryJudgments<'a> {
    /// Documents by score descending, ties by id descending.
    fn ranking(&self) -> Vec<&'a str> {
        let mut docs: Vec<(&'a str, f64)> = self.scores.iter().map(|(d, s)| (*d, *s)).collect();
        docs.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(a.0)));
        docs.into_iter().map(|(doc, _)| doc).collect()
    }
}

/// Group and validate qrels and run by query.
///
/// `query_ids` is the evaluated query set; records naming any other query
/// are rejected. A document retrieved twice for one query keeps its highest score.
fn group<'a>(
    qrels: &'a [Qrel],
    run: &'a [ScoredDoc],
    query_ids: &'a [String],
) -> Result<HashMap<&'a str, QueryJudgments<'a>>> {
    let mut by_query: HashMap<&'a str, QueryJudgments<'a>> = HashMap::with_capacity(query_ids.len());
    for query_id in query_ids {
        if query_id.is_empty() {
            return Err(RagbenchError::Metric("empty query id".to_string()));
        }
        by_query.insert(
            query_id.as_str(),
            QueryJudgments {
                relevant: HashSet::new(),
                scores: HashMap::new(),
            },
        );
    }

    for qrel in qrels {
        if qrel.relevance != RELEVANT {
            return Err(RagbenchError::Metric(format!(
                "qrel ({}, {}) has relevance {}, expected {}",
                qrel.query_id, qrel.doc_id, qrel.relevance, RELEVANT
            )));
        }
        if qrel.doc_id.is_empty() {
            return Err(RagbenchError::Metric(format!(
                "qrel for query {} has an empty doc id",
                qrel.query_id
            )));
        }
        let judgments = by_query.get_mut(qrel.query_id.as_str()).ok_or_else(|| {
            RagbenchError::Metric(format!("qrel names unknown query {}", qrel.query_id))
        })?;
        judgments.relevant.insert(qrel.doc_id.as_str());
    }

    for doc in run {
        if !doc.score.is_finite() {
            return Err(RagbenchError::Metric(format!(
                "scored doc ({}, {}) has non-finite score {}",
                doc.query_id, doc.doc_id, doc.score
            )));
        }
        if doc.doc_id.is_empty() {
            return Err(RagbenchError::Metric(format!(
                "scored doc for query {} has an empty doc id",
                doc.query_id
            )));
        }
        let judgments = by_query.get_mut(doc.query_id.as_str()).ok_or_else(|| {
            RagbenchError::Metric(format!("scored doc names unknown query {}", doc.query_id))
        })?;
        judgments
            .scores
            .entry(doc.doc_id.as_str())
            .and_modify(|s| *s = s.max(doc.score))
            .or_insert(doc.score);
    }

    Ok(by_query)
}

/// Compute per-query values and their means.
///
/// Per-query records come in `query_ids` order, then `measures` order. A
/// measure's aggregate is the mean of its per-query values (0.0 when no query
/// qualifies); queries without relevant documents are left out of measures
/// that need them.
pub fn evaluate(
    measures: &[Measure],
    qrels: &[Qrel],
    run: &[ScoredDoc],
    query_ids: &[String],
) -> Result<MetricsReport> {
    let by_query = group(qrels, run, query_ids)?;

    let mut per_query = Vec::with_capacity(query_ids.len() * measures.len());
    let mut sums: Vec<(f64, usize)> = vec![(0.0, 0); measures.len()];

    for query_id in query_ids {
        let Some(judgments) = by_query.get(query_id.as_str()) else {
            continue;
        };
        let ranking = judgments.ranking();
        for (slot, measure) in measures.iter().enumerate() {
            if measure.requires_relevant() && judgments.relevant.is_empty() {
                continue;
            }
            let value = measure.compute(&ranking, &judgments.relevant);
            sums[slot].0 += value;
            sums[slot].1 += 1;
            per_query.push(PerQueryMetric {
                query_id: query_id.clone(),
                measure: measure.to_string(),
                value,
            });
        }
    }

    let aggregate = measures
        .iter()
        .zip(sums)
        .map(|(measure, (sum, count))| {
            let mean = if count == 0 { 0.0 } else { sum / count as f64 };
            (measure.to_string(), mean)
        })
        .collect();

    Ok(MetricsReport {
        aggregate,
        per_query,
    })
}

/// Aggregate value per metric name.
pub fn calc_aggregate(
    measures: &[Measure],
    qrels: &[Qrel],
    run: &[ScoredDoc],
    query_ids: &[String],
) -> Result<BTreeMap<String, f64>> {
    Ok(evaluate(measures, qrels, run, query_ids)?.aggregate)
}

/// One value per (query, metric).
pub fn iter_calc(
    measures: &[Measure],
    qrels: &[Qrel],
    run: &[ScoredDoc],
    query_ids: &[String],
) -> Result<Vec<PerQueryMetric>> {
    Ok(evaluate(measures, qrels, run, query_ids)?.per_query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set<'a>(docs: &[&'a str]) -> HashSet<&'a str> {
        docs.iter().copied().collect()
    }

    fn qrel(query_id: &str, doc_id: &str) -> Qrel {
        Qrel {
            query_id: query_id.to_string(),
            doc_id: doc_id.to_string(),
            relevance: RELEVANT,
        }
    }

    fn scored(query_id: &str, doc_id: &str, score: f64) -> ScoredDoc {
        ScoredDoc {
            query_id: query_id.to_string(),
            doc_id: doc_id.to_string(),
            score,
        }
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn measure_names_round_trip() {
        for measure in Measure::default_suite() {
            assert_eq!(measure.to_string().parse::<Measure>().unwrap(), *measure);
        }
        assert_eq!("AP".parse::<Measure>().unwrap(), Measure::Map);
        assert_eq!(" RR ".parse::<Measure>().unwrap(), Measure::Mrr);
        assert_eq!("P@10".parse::<Measure>().unwrap(), Measure::P(10));
        assert!("P@0".parse::<Measure>().is_err());
        assert!("P@x".parse::<Measure>().is_err());
        assert!("F1".parse::<Measure>().is_err());
        assert!("Q@3".parse::<Measure>().is_err());
    }

    #[test]
    fn default_suite_order() {
        let names: Vec<String> = Measure::default_suite().iter().map(|m| m.to_string()).collect();
        assert_eq!(names, ["Rprec", "P@1", "R@3", "nDCG@3", "MAP", "MRR"]);
    }

    #[test]
    fn reciprocal_rank_examples() {
        let relevant = set(&["a"]);
        assert!(close(reciprocal_rank(&["b", "a", "c"], &relevant), 0.5));
        assert!(close(reciprocal_rank(&["a", "b"], &relevant), 1.0));
        assert_eq!(reciprocal_rank(&[], &relevant), 0.0);
    }

    #[test]
    fn average_precision_examples() {
        let relevant = set(&["a", "c"]);
        let ap = average_precision(&["a", "b", "c"], &relevant);
        assert!(close(ap, (1.0 + 2.0 / 3.0) / 2.0));

        // unretrieved relevant documents still count in the denominator
        assert!(close(average_precision(&["a"], &relevant), 0.5));
        assert_eq!(average_precision(&["x", "y"], &relevant), 0.0);
        assert_eq!(average_precision(&["a"], &HashSet::new()), 0.0);
    }

    #[test]
    fn precision_divides_by_k() {
        let relevant = set(&["a"]);
        assert!(close(precision_at_k(&["a"], &relevant, 1), 1.0));
        assert!(close(precision_at_k(&["b", "a"], &relevant, 1), 0.0));
        assert!(close(precision_at_k(&["a"], &relevant, 3), 1.0 / 3.0));
        assert_eq!(precision_at_k(&[], &relevant, 1), 0.0);
        assert_eq!(precision_at_k(&["a"], &relevant, 0), 0.0);
    }

    #[test]
    fn recall_at_three() {
        let relevant = set(&["a", "b", "c", "d"]);
        assert!(close(recall_at_k(&["a", "x", "b", "c"], &relevant, 3), 0.5));
        assert_eq!(recall_at_k(&["a"], &HashSet::new(), 3), 0.0);
    }

    #[test]
    fn ndcg_at_three() {
        let relevant = set(&["a", "b"]);
        assert!(close(ndcg_at_k(&["a", "b", "x"], &relevant, 3), 1.0));

        // one relevant at rank 2: (1/log2 3) / (1 + 1/log2 3)
        let expected = (1.0 / 3f64.log2()) / (1.0 + 1.0 / 3f64.log2());
        assert!(close(ndcg_at_k(&["x", "a", "y"], &relevant, 3), expected));

        // ideal is capped at k even with more relevant documents
        let many = set(&["a", "b", "c", "d"]);
        assert!(close(ndcg_at_k(&["a", "b", "c"], &many, 3), 1.0));
        assert_eq!(ndcg_at_k(&["a"], &HashSet::new(), 3), 0.0);
    }

    #[test]
    fn r_precision_examples() {
        let relevant = set(&["a", "b"]);
        assert!(close(r_precision(&["a", "x", "b"], &relevant), 0.5));
        assert!(close(r_precision(&["b", "a"], &relevant), 1.0));
        assert!(close(r_precision(&["a"], &relevant), 0.5));
    }

    #[test]
    fn ranking_sorts_by_score_not_insertion_order() {
        let qrels = vec![qrel("0", "a")];
        let run = vec![scored("0", "b", 0.1), scored("0", "a", 0.9)];
        let report = evaluate(&[Measure::P(1)], &qrels, &run, &ids(&["0"])).unwrap();
        assert_eq!(report.aggregate["P@1"], 1.0);
    }

    #[test]
    fn ties_break_deterministically_by_doc_id() {
        let qrels = vec![qrel("0", "b")];
        let run = vec![scored("0", "a", 0.5), scored("0", "b", 0.5)];
        let reversed = vec![scored("0", "b", 0.5), scored("0", "a", 0.5)];

        let forward = evaluate(&[Measure::P(1)], &qrels, &run, &ids(&["0"])).unwrap();
        let backward = evaluate(&[Measure::P(1)], &qrels, &reversed, &ids(&["0"])).unwrap();
        assert_eq!(forward, backward);
        // "b" sorts before "a" on a tie
        assert_eq!(forward.aggregate["P@1"], 1.0);
    }

    #[test]
    fn duplicate_documents_keep_highest_score() {
        let qrels = vec![qrel("0", "a")];
        let run = vec![
            scored("0", "a", 0.9),
            scored("0", "b", 0.5),
            scored("0", "a", 0.1),
        ];
        let report = evaluate(&[Measure::Mrr, Measure::P(3)], &qrels, &run, &ids(&["0"])).unwrap();
        assert_eq!(report.aggregate["MRR"], 1.0);
        // two distinct documents retrieved, one relevant
        assert!(close(report.aggregate["P@3"], 1.0 / 3.0));
    }

    #[test]
    fn queries_without_relevant_skip_recall_style_measures() {
        let qrels = vec![qrel("0", "a")];
        let run = vec![scored("0", "a", 1.0), scored("1", "z", 1.0)];
        let report = evaluate(Measure::default_suite(), &qrels, &run, &ids(&["0", "1"])).unwrap();

        assert_eq!(report.aggregate["MAP"], 1.0);
        assert_eq!(report.aggregate["R@3"], 1.0);
        assert_eq!(report.aggregate["Rprec"], 1.0);
        assert_eq!(report.aggregate["nDCG@3"], 1.0);
        // counted (as 0) where the measure is defined without relevant documents
        assert_eq!(report.aggregate["P@1"], 0.5);
        assert_eq!(report.aggregate["MRR"], 0.5);

        let for_q1: Vec<&str> = report
            .per_query
            .iter()
            .filter(|m| m.query_id == "1")
            .map(|m| m.measure.as_str())
            .collect();
        assert_eq!(for_q1, ["P@1", "MRR"]);
    }

    #[test]
    fn empty_result_sets_score_zero() {
        let qrels = vec![qrel("0", "a"), qrel("1", "b")];
        let run = vec![scored("0", "a", 1.0)];
        let report = evaluate(Measure::default_suite(), &qrels, &run, &ids(&["0", "1"])).unwrap();
        for value in report.aggregate.values() {
            assert!(close(*value, 0.5));
        }
        assert_eq!(report.per_query.len(), 12);
    }

    #[test]
    fn aggregate_is_mean_of_per_query() {
        let qrels = vec![qrel("0", "a"), qrel("0", "c"), qrel("1", "x")];
        let run = vec![
            scored("0", "a", 0.9),
            scored("0", "b", 0.8),
            scored("0", "c", 0.7),
            scored("1", "y", 0.9),
            scored("1", "x", 0.5),
        ];
        let report = evaluate(&[Measure::Map, Measure::Mrr], &qrels, &run, &ids(&["0", "1"])).unwrap();
        let expected_map = ((1.0 + 2.0 / 3.0) / 2.0 + 0.5) / 2.0;
        assert!(close(report.aggregate["MAP"], expected_map));
        assert!(close(report.aggregate["MRR"], (1.0 + 0.5) / 2.0));
        assert_eq!(
            report.per_query[0],
            PerQueryMetric {
                query_id: "0".to_string(),
                measure: "MAP".to_string(),
                value: (1.0 + 2.0 / 3.0) / 2.0,
            }
        );
    }

    #[test]
    fn no_queries_yields_zeroes() {
        let report = evaluate(Measure::default_suite(), &[], &[], &[]).unwrap();
        assert_eq!(report.aggregate.len(), 6);
        assert!(report.aggregate.values().all(|v| *v == 0.0));
        assert!(report.per_query.is_empty());
    }

    #[test]
    fn invalid_inputs_are_metric_errors() {
        let q = ids(&["0"]);
        let bad_grade = vec![Qrel { relevance: 2, ..qrel("0", "a") }];
        assert!(matches!(evaluate(&[Measure::Map], &bad_grade, &[], &q), Err(RagbenchError::Metric(_))));

        let unknown_query = vec![qrel("9", "a")];
        assert!(evaluate(&[Measure::Map], &unknown_query, &[], &q).is_err());

        let nan = vec![scored("0", "a", f64::NAN)];
        assert!(evaluate(&[Measure::Map], &[], &nan, &q).is_err());

        let empty_doc = vec![scored("0", "", 1.0)];
        assert!(evaluate(&[Measure::Map], &[], &empty_doc, &q).is_err());

        let unknown_run = vec![scored("7", "a", 1.0)];
        assert!(evaluate(&[Measure::Map], &[], &unknown_run, &q).is_err());
    }

    #[test]
    fn calc_helpers_match_evaluate() {
        let qrels = vec![qrel("0", "docA")];
        let run = vec![scored("0", "docA", 0.9), scored("0", "docB", 0.5)];
        let q = ids(&["0"]);
        let aggregate = calc_aggregate(Measure::default_suite(), &qrels, &run, &q).unwrap();
        assert_eq!(aggregate["P@1"], 1.0);
        assert_eq!(aggregate["MRR"], 1.0);
        assert_eq!(aggregate["Rprec"], 1.0);
        assert_eq!(iter_calc(Measure::default_suite(), &qrels, &run, &q).unwrap().len(), 6);
    }
}
