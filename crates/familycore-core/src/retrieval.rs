//! Retrieval Ranker (C5, spec §4.5).
//!
//! `search()` runs BM25 lexical, sparse TF-IDF cosine, and temporal
//! candidate generation, fuses them with Reciprocal Rank Fusion, scores the
//! union with a linear ranker over explainable features, diversifies with
//! MMR, and calibrates the top results into a confidence. Every step is
//! deterministic for equal input (spec §8 property 5, §4.5 step header).

use std::collections::HashMap;

use crate::config::RetrievalConfig;
use crate::error::{Classify, ErrorKind};
use crate::ids::Timestamp;
use crate::temporal::TemporalIndex;

/// Reciprocal Rank Fusion: `score(d) = sum of 1/(k + rank(d))` across both
/// ranked lists, rewarding candidates that place well in either source
/// without needing their raw scores on a common scale.
fn reciprocal_rank_fusion(lexical: &[(String, f32)], vector: &[(String, f32)], k: f32) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    for (rank, (key, _)) in lexical.iter().enumerate() {
        *scores.entry(key.clone()).or_default() += 1.0 / (k + rank as f32);
    }
    for (rank, (key, _)) in vector.iter().enumerate() {
        *scores.entry(key.clone()).or_default() += 1.0 / (k + rank as f32);
    }
    let mut fused: Vec<(String, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("retrieval unavailable: all candidate sources failed")]
    Unavailable,
}

impl Classify for RetrievalError {
    fn kind(&self) -> ErrorKind {
        match self {
            // Deterministic for the same input: retrying the identical
            // request will not succeed, but the orchestrator may still
            // choose to re-offer on fresher input.
            RetrievalError::Unavailable => ErrorKind::PoisonedDependency,
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

/// One document (episode) registered with the ranker's in-memory indices.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub episode_id: String,
    pub content: String,
    pub ts: Timestamp,
    /// Caller-supplied priors, defaulted to 0 when absent (spec §4.5 step 4).
    pub source_prior: f64,
    pub personalization: f64,
    pub affect_compat: f64,
    pub tom_alignment: f64,
}

#[derive(Debug, Default)]
struct Postings {
    /// token -> (episode_id -> term frequency in that doc)
    postings: HashMap<String, HashMap<String, u32>>,
    doc_len: HashMap<String, usize>,
    doc_terms: HashMap<String, HashMap<String, u32>>,
    total_len: u64,
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

impl Postings {
    fn index(&mut self, episode_id: &str, content: &str) {
        let tokens = tokenize(content);
        self.total_len += tokens.len() as u64;
        self.doc_len.insert(episode_id.to_string(), tokens.len());
        let mut counts: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *counts.entry(token).or_insert(0) += 1;
        }
        for (token, tf) in &counts {
            self.postings
                .entry(token.clone())
                .or_default()
                .insert(episode_id.to_string(), *tf);
        }
        self.doc_terms.insert(episode_id.to_string(), counts);
    }

    fn doc_count(&self) -> usize {
        self.doc_len.len()
    }

    fn avg_doc_len(&self) -> f64 {
        if self.doc_len.is_empty() {
            0.0
        } else {
            self.total_len as f64 / self.doc_len.len() as f64
        }
    }

    fn df(&self, token: &str) -> usize {
        self.postings.get(token).map(|p| p.len()).unwrap_or(0)
    }

    /// Okapi BM25, `k1=1.2, b=0.75` by default (spec §4.5 step 2).
    fn bm25(&self, query_tokens: &[String], episode_id: &str, k1: f64, b: f64) -> f64 {
        let Some(&doc_len) = self.doc_len.get(episode_id) else {
            return 0.0;
        };
        let n = self.doc_count() as f64;
        let avg_len = self.avg_doc_len().max(1.0);
        let mut score = 0.0;
        for token in query_tokens {
            let df = self.df(token) as f64;
            if df == 0.0 {
                continue;
            }
            let idf = ((n - df + 0.5) / (df + 0.5)).ln();
            let tf = self
                .postings
                .get(token)
                .and_then(|p| p.get(episode_id))
                .copied()
                .unwrap_or(0) as f64;
            let denom = tf + k1 * (1.0 - b + b * doc_len as f64 / avg_len);
            if denom > 0.0 {
                score += idf * (tf * (k1 + 1.0)) / denom;
            }
        }
        score
    }

    /// Unit-normalized sparse TF-IDF cosine similarity between the query
    /// terms and one document (spec §4.5 step 2, "fallback for on-device").
    fn tfidf_cosine(&self, query_tokens: &[String], episode_id: &str) -> f64 {
        let Some(doc_terms) = self.doc_terms.get(episode_id) else {
            return 0.0;
        };
        let n = self.doc_count().max(1) as f64;
        let mut query_counts: HashMap<&str, u32> = HashMap::new();
        for t in query_tokens {
            *query_counts.entry(t.as_str()).or_insert(0) += 1;
        }

        let weight = |token: &str, tf: u32| -> f64 {
            let df = self.df(token).max(1) as f64;
            let idf = (n / df).ln().max(0.0) + 1.0;
            tf as f64 * idf
        };

        let mut dot = 0.0;
        let mut query_norm = 0.0;
        let mut doc_norm = 0.0;
        for (token, tf) in &query_counts {
            let qw = weight(token, *tf);
            query_norm += qw * qw;
            if let Some(&dtf) = doc_terms.get(*token) {
                let dw = weight(token, dtf);
                dot += qw * dw;
            }
        }
        for (token, tf) in doc_terms {
            let dw = weight(token, *tf);
            doc_norm += dw * dw;
        }
        if query_norm <= 0.0 || doc_norm <= 0.0 {
            return 0.0;
        }
        dot / (query_norm.sqrt() * doc_norm.sqrt())
    }

    /// Cosine similarity between two documents' TF-IDF vectors, used by
    /// MMR's diversity penalty.
    fn doc_cosine(&self, a: &str, b: &str) -> f64 {
        let (Some(at), Some(bt)) = (self.doc_terms.get(a), self.doc_terms.get(b)) else {
            return 0.0;
        };
        let n = self.doc_count().max(1) as f64;
        let weight = |token: &str, tf: u32| -> f64 {
            let df = self.df(token).max(1) as f64;
            let idf = (n / df).ln().max(0.0) + 1.0;
            tf as f64 * idf
        };
        let mut dot = 0.0;
        let mut a_norm = 0.0;
        let mut b_norm = 0.0;
        for (token, tf) in at {
            a_norm += weight(token, *tf).powi(2);
            if let Some(&btf) = bt.get(token) {
                dot += weight(token, *tf) * weight(token, btf);
            }
        }
        for (token, tf) in bt {
            b_norm += weight(token, *tf).powi(2);
        }
        if a_norm <= 0.0 || b_norm <= 0.0 {
            return 0.0;
        }
        dot / (a_norm.sqrt() * b_norm.sqrt())
    }
}

/// Platt-style calibration parameters, updated slowly from outcome events
/// (spec §4.5 step 8, §4.10 learning signals).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub a: f64,
    pub b: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self { a: 1.0, b: 0.0 }
    }
}

impl Calibration {
    pub fn apply(&self, score: f64) -> f64 {
        sigmoid(self.a * score + self.b)
    }

    /// One bounded-rate SGD step toward an observed outcome (`1.0` =
    /// confirmed relevant, `0.0` = confirmed irrelevant). Never blocks the
    /// predict path; callers invoke this out-of-band.
    pub fn update(&mut self, score: f64, outcome: f64, learning_rate: f64) {
        let pred = self.apply(score);
        let grad = pred - outcome;
        self.a -= learning_rate * grad * score;
        self.b -= learning_rate * grad;
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Per-feature contribution trail for one candidate (spec §4.5 step 9
/// trace).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureContribution {
    pub name: &'static str,
    pub weight: f64,
    pub value: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CandidateFeatures {
    pub bm25: f64,
    pub tfidf_cos: f64,
    pub recency: f64,
    pub rrf: f64,
    pub length_penalty: f64,
    pub source_prior: f64,
    pub personalization: f64,
    pub affect_compat: f64,
    pub tom_alignment: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub episode_id: String,
    pub features: CandidateFeatures,
    pub score: f64,
    pub calibrated_conf: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub episode_id: String,
    pub features_used: CandidateFeatures,
    pub reason_breakdown: Vec<FeatureContribution>,
    pub calibrated_conf: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query_text: Option<String>,
    pub from_ts: Option<Timestamp>,
    pub to_ts: Option<Timestamp>,
    pub k: usize,
    pub time_budget_ms: u32,
    pub mmr_lambda: f64,
    pub allow_reranker: bool,
}

impl SearchRequest {
    pub fn new(query_text: impl Into<Option<String>>) -> Self {
        Self {
            query_text: query_text.into(),
            from_ts: None,
            to_ts: None,
            k: 10,
            time_budget_ms: 200,
            mmr_lambda: 0.35,
            allow_reranker: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub results: Vec<RankedCandidate>,
    pub source_used: Vec<&'static str>,
    pub trace: Vec<TraceEntry>,
    pub reasons: Vec<String>,
}

/// Per-space retrieval ranker: owns the lexical postings, a handle to the
/// temporal index, and the calibration state.
pub struct Retriever<'a> {
    config: &'a RetrievalConfig,
    postings: Postings,
    documents: HashMap<String, IndexedDocument>,
    calibration: Calibration,
}

impl<'a> Retriever<'a> {
    pub fn new(config: &'a RetrievalConfig) -> Self {
        Self {
            config,
            postings: Postings::default(),
            documents: HashMap::new(),
            calibration: Calibration::default(),
        }
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn update_calibration(&mut self, score: f64, outcome: f64) {
        self.calibration.update(score, outcome, 0.01);
    }

    /// Restore calibration carried over from a prior [`Retriever`] instance
    /// for the same space (the ranker itself is rebuilt per request from a
    /// document cache; calibration must survive that rebuild).
    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
    }

    /// Register (or re-index) one document.
    pub fn index_document(&mut self, doc: IndexedDocument) {
        self.postings.index(&doc.episode_id, &doc.content);
        self.documents.insert(doc.episode_id.clone(), doc);
    }

    /// `search()` — spec §4.5 steps 1-9.
    pub fn search(&self, request: &SearchRequest, temporal: &TemporalIndex, now: Timestamp) -> Result<SearchResponse> {
        let mut reasons = Vec::new();

        // Step 1: budget gate.
        let fast_path = request.time_budget_ms <= self.config.fast_path_budget_ms;
        if fast_path {
            reasons.push(format!("fast_path: budget ≤ {}ms", self.config.fast_path_budget_ms));
        }
        let k = request.k.min(self.config.max_k).max(1);

        let query_tokens = request.query_text.as_deref().map(tokenize).unwrap_or_default();

        // Step 2: candidate generation in parallel (bounded; this in-process
        // ranker runs each source in sequence but the contract is the same —
        // the caller's deadline already bounds the whole call).
        let mut source_used = Vec::new();
        let two_k = 2 * k;

        let lexical: Vec<(String, f64)> = if !query_tokens.is_empty() {
            source_used.push("fts");
            let mut scored: Vec<(String, f64)> = self
                .documents
                .keys()
                .map(|id| (id.clone(), self.postings.bm25(&query_tokens, id, self.config.bm25_k1, self.config.bm25_b)))
                .filter(|(_, s)| *s > 0.0)
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(two_k);
            scored
        } else {
            Vec::new()
        };

        let vector: Vec<(String, f64)> = if !fast_path && !query_tokens.is_empty() {
            source_used.push("vector");
            let mut scored: Vec<(String, f64)> = self
                .documents
                .keys()
                .map(|id| (id.clone(), self.postings.tfidf_cosine(&query_tokens, id)))
                .filter(|(_, s)| *s > 0.0)
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(two_k);
            scored
        } else {
            Vec::new()
        };

        let temporal_window = request
            .from_ts
            .zip(request.to_ts)
            .map(|(from, to)| (from, to, vec!["explicit time range".to_string()]));

        let temporal_candidates: Vec<(String, f64)> = if let Some((from, to, why)) = &temporal_window {
            source_used.push("temporal");
            reasons.extend(why.clone());
            let mut scored: Vec<(String, f64)> = temporal
                .slice(*from, *to)
                .into_iter()
                .map(|id| {
                    let recency = temporal.features(&id, now).map(|f| f.recency).unwrap_or(0.0);
                    (id, recency)
                })
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(two_k);
            scored
        } else {
            Vec::new()
        };

        if lexical.is_empty() && vector.is_empty() && temporal_candidates.is_empty() {
            // Edge case: empty query with no time range → empty result is
            // valid, not an error (spec §4.5 edge cases).
            if query_tokens.is_empty() && temporal_window.is_none() {
                return Ok(SearchResponse { results: Vec::new(), source_used, trace: Vec::new(), reasons });
            }
            // Empty query with a time range → recency-only ranking over
            // every known document falling in range.
        }

        // Step 3: RRF fusion — an input feature, not the final score.
        let lexical_ranked: Vec<(String, f32)> = lexical.iter().map(|(id, s)| (id.clone(), *s as f32)).collect();
        let vector_ranked: Vec<(String, f32)> = vector.iter().map(|(id, s)| (id.clone(), *s as f32)).collect();
        let fused = reciprocal_rank_fusion(&lexical_ranked, &vector_ranked, self.config.rrf_k as f32);
        let rrf_by_id: HashMap<String, f64> = fused.into_iter().map(|(id, s)| (id, s as f64)).collect();

        // Union of candidate ids across every source.
        let mut candidate_ids: Vec<String> = lexical
            .iter()
            .chain(vector.iter())
            .chain(temporal_candidates.iter())
            .map(|(id, _)| id.clone())
            .collect();
        candidate_ids.sort();
        candidate_ids.dedup();

        if candidate_ids.is_empty() {
            return Ok(SearchResponse { results: Vec::new(), source_used, trace: Vec::new(), reasons });
        }

        // Step 4: feature assembly per candidate.
        let weights = &self.config.weights;
        let mut scored: Vec<RankedCandidate> = candidate_ids
            .iter()
            .map(|id| {
                let bm25 = lexical.iter().find(|(c, _)| c == id).map(|(_, s)| *s).unwrap_or(0.0);
                let tfidf_cos = vector.iter().find(|(c, _)| c == id).map(|(_, s)| *s).unwrap_or(0.0);
                let recency = temporal.features(id, now).map(|f| f.recency).unwrap_or(0.0);
                let rrf = rrf_by_id.get(id).copied().unwrap_or(0.0);
                let doc_len = self.postings.doc_len.get(id).copied().unwrap_or(0) as f64;
                let length_penalty = if doc_len > 0.0 { 1.0 / (1.0 + doc_len.ln()) } else { 0.0 };
                let doc = self.documents.get(id);
                let features = CandidateFeatures {
                    bm25,
                    tfidf_cos,
                    recency,
                    rrf,
                    length_penalty,
                    source_prior: doc.map(|d| d.source_prior).unwrap_or(0.0),
                    personalization: doc.map(|d| d.personalization).unwrap_or(0.0),
                    affect_compat: doc.map(|d| d.affect_compat).unwrap_or(0.0),
                    tom_alignment: doc.map(|d| d.tom_alignment).unwrap_or(0.0),
                };
                // Step 5: linear ranker.
                let score = weights.bm25 * features.bm25
                    + weights.tfidf_cos * features.tfidf_cos
                    + weights.recency * features.recency
                    + weights.rrf * features.rrf
                    + weights.length_penalty * features.length_penalty
                    + weights.source_prior * features.source_prior
                    + weights.personalization * features.personalization
                    + weights.affect_compat * features.affect_compat
                    + weights.tom_alignment * features.tom_alignment;
                let calibrated_conf = self.calibration.apply(score);
                RankedCandidate { episode_id: id.clone(), features, score, calibrated_conf }
            })
            .collect();

        // Tie-break: (higher score, higher calibrated conf, lower candidate id).
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.calibrated_conf.partial_cmp(&a.calibrated_conf).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.episode_id.cmp(&b.episode_id))
        });

        // Step 6: MMR diversification (skipped on the fast path).
        let selected = if fast_path {
            scored.into_iter().take(k).collect::<Vec<_>>()
        } else {
            self.mmr_select(scored, k, request.mmr_lambda)
        };

        // Step 7: optional reranker — no external cross-encoder is wired in
        // this core; honoring `allow_reranker` here is a no-op pass-through,
        // matching spec §4.5 step 7's "otherwise a no-op".
        let _ = request.allow_reranker;

        // Step 9: trace for top-3 candidates.
        let trace = selected
            .iter()
            .take(3)
            .map(|c| TraceEntry {
                episode_id: c.episode_id.clone(),
                features_used: c.features.clone(),
                reason_breakdown: vec![
                    FeatureContribution { name: "bm25", weight: weights.bm25, value: c.features.bm25, contribution: weights.bm25 * c.features.bm25 },
                    FeatureContribution { name: "tfidf_cos", weight: weights.tfidf_cos, value: c.features.tfidf_cos, contribution: weights.tfidf_cos * c.features.tfidf_cos },
                    FeatureContribution { name: "recency", weight: weights.recency, value: c.features.recency, contribution: weights.recency * c.features.recency },
                    FeatureContribution { name: "rrf", weight: weights.rrf, value: c.features.rrf, contribution: weights.rrf * c.features.rrf },
                ],
                calibrated_conf: c.calibrated_conf,
            })
            .collect();

        Ok(SearchResponse { results: selected, source_used, trace, reasons })
    }

    /// Maximal Marginal Relevance selection (spec §4.5 step 6):
    /// `argmax_d λ·score(d) − (1−λ)·max sim(d, d')`.
    fn mmr_select(&self, ranked: Vec<RankedCandidate>, k: usize, lambda: f64) -> Vec<RankedCandidate> {
        let mut pool = ranked;
        let mut selected: Vec<RankedCandidate> = Vec::new();
        while selected.len() < k && !pool.is_empty() {
            let mut best_idx = 0;
            let mut best_value = f64::NEG_INFINITY;
            for (i, cand) in pool.iter().enumerate() {
                let max_sim = selected
                    .iter()
                    .map(|s| self.postings.doc_cosine(&cand.episode_id, &s.episode_id))
                    .fold(0.0_f64, f64::max);
                let value = lambda * cand.score - (1.0 - lambda) * max_sim;
                if value > best_value {
                    best_value = value;
                    best_idx = i;
                }
            }
            selected.push(pool.remove(best_idx));
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    fn doc(id: &str, content: &str, ts_str: &str) -> IndexedDocument {
        IndexedDocument {
            episode_id: id.to_string(),
            content: content.to_string(),
            ts: ts(ts_str),
            source_prior: 0.0,
            personalization: 0.0,
            affect_compat: 0.0,
            tom_alignment: 0.0,
        }
    }

    #[test]
    fn increasing_bm25_strictly_increases_linear_score() {
        let config = RetrievalConfig::default();
        let mut retriever = Retriever::new(&config);
        retriever.index_document(doc("a", "balloons candles cake", "2026-01-01T00:00:00Z"));
        retriever.index_document(doc("b", "balloons balloons balloons candles cake", "2026-01-01T00:00:00Z"));
        let temporal = TemporalIndex::new("UTC", 72.0).unwrap();
        temporal.ingest("a", ts("2026-01-01T00:00:00Z"));
        temporal.ingest("b", ts("2026-01-01T00:00:00Z"));

        let req = SearchRequest { k: 10, ..SearchRequest::new(Some("balloons candles".to_string())) };
        let resp = retriever.search(&req, &temporal, ts("2026-01-02T00:00:00Z")).unwrap();
        let a = resp.results.iter().find(|r| r.episode_id == "a").unwrap();
        let b = resp.results.iter().find(|r| r.episode_id == "b").unwrap();
        assert!(b.features.bm25 > a.features.bm25);
        assert!(b.score > a.score);
    }

    #[test]
    fn fast_path_skips_mmr_and_vector_source() {
        let config = RetrievalConfig::default();
        let mut retriever = Retriever::new(&config);
        retriever.index_document(doc("a", "balloons candles", "2026-01-01T00:00:00Z"));
        let temporal = TemporalIndex::new("UTC", 72.0).unwrap();
        temporal.ingest("a", ts("2026-01-01T00:00:00Z"));

        let req = SearchRequest { time_budget_ms: 2, ..SearchRequest::new(Some("balloons candles".to_string())) };
        let resp = retriever.search(&req, &temporal, ts("2026-01-02T00:00:00Z")).unwrap();
        assert_eq!(resp.source_used, vec!["fts"]);
        assert!(resp.reasons.iter().any(|r| r.contains("fast_path: budget ≤ 3ms")));
    }

    #[test]
    fn empty_query_with_time_range_ranks_by_recency() {
        let config = RetrievalConfig::default();
        let mut retriever = Retriever::new(&config);
        retriever.index_document(doc("old", "x", "2026-01-01T00:00:00Z"));
        retriever.index_document(doc("new", "x", "2026-01-03T00:00:00Z"));
        let temporal = TemporalIndex::new("UTC", 72.0).unwrap();
        temporal.ingest("old", ts("2026-01-01T00:00:00Z"));
        temporal.ingest("new", ts("2026-01-03T00:00:00Z"));

        let req = SearchRequest {
            from_ts: Some(ts("2025-01-01T00:00:00Z")),
            to_ts: Some(ts("2027-01-01T00:00:00Z")),
            ..SearchRequest::new(None)
        };
        let resp = retriever.search(&req, &temporal, ts("2026-01-03T00:00:00Z")).unwrap();
        assert_eq!(resp.results.first().unwrap().episode_id, "new");
    }

    #[test]
    fn empty_result_set_is_a_valid_response() {
        let config = RetrievalConfig::default();
        let retriever = Retriever::new(&config);
        let temporal = TemporalIndex::new("UTC", 72.0).unwrap();
        let req = SearchRequest::new(None);
        let resp = retriever.search(&req, &temporal, ts("2026-01-01T00:00:00Z")).unwrap();
        assert!(resp.results.is_empty());
    }

    #[test]
    fn mmr_prefers_diverse_candidates_over_near_duplicates() {
        let config = RetrievalConfig { mmr_lambda: 0.1, ..RetrievalConfig::default() };
        let mut retriever = Retriever::new(&config);
        retriever.index_document(doc("dup1", "balloons candles cake party", "2026-01-01T00:00:00Z"));
        retriever.index_document(doc("dup2", "balloons candles cake party", "2026-01-01T00:00:00Z"));
        retriever.index_document(doc("diverse", "fishing trip lake morning", "2026-01-01T00:00:00Z"));
        let temporal = TemporalIndex::new("UTC", 72.0).unwrap();
        for id in ["dup1", "dup2", "diverse"] {
            temporal.ingest(id, ts("2026-01-01T00:00:00Z"));
        }
        let req = SearchRequest { k: 2, mmr_lambda: 0.1, ..SearchRequest::new(Some("balloons candles cake party fishing".to_string())) };
        let resp = retriever.search(&req, &temporal, ts("2026-01-02T00:00:00Z")).unwrap();
        assert_eq!(resp.results.len(), 2);
        assert!(resp.results.iter().any(|r| r.episode_id == "diverse"));
    }

    #[test]
    fn calibration_update_moves_confidence_toward_outcome() {
        let mut cal = Calibration::default();
        let before = cal.apply(0.0);
        for _ in 0..50 {
            cal.update(0.0, 1.0, 0.1);
        }
        let after = cal.apply(0.0);
        assert!(after > before);
    }
}
