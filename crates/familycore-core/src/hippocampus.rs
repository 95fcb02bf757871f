//! Hippocampus (C7, spec §4.7): pattern separation, pattern completion, and
//! consolidation scheduling over episodic memory.
//!
//! Three stages mirror the DG/CA3/CA1 circuit named in the spec:
//! - **DG** ([`Hippocampus::separate`]) projects a dense feature vector into
//!   a high-dimensional sparse code via a fixed random projection, so that
//!   similar inputs land on mostly-disjoint active bits.
//! - **CA3** ([`Hippocampus::complete`]) recalls the stored codes nearest a
//!   query code by Hamming distance, the circuit's associative-recall role.
//! - **CA1** ([`Hippocampus::bridge`]) binds a sparse code back to an
//!   episode id and summary tokens, and queues the episode for
//!   consolidation.
//!
//! The random projection is seeded once per [`Hippocampus`] instance so
//! codes are reproducible for a given seed (spec §8 determinism property),
//! not per-process-random like `consolidation/sleep.rs`'s scan order.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roaring::RoaringBitmap;

use crate::ids::Timestamp;

/// Sparse binary code produced by the DG separator: the set of active bit
/// indices out of `dg_dim`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseCode(RoaringBitmap);

impl SparseCode {
    pub fn active_bits(&self) -> Vec<u32> {
        self.0.iter().collect()
    }

    pub fn len(&self) -> u64 {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn hamming_distance(&self, other: &SparseCode) -> u64 {
        let union = self.0.len() + other.0.len();
        let intersection = (&self.0 & &other.0).len();
        union - 2 * intersection
    }

    /// `1 - normalized_hamming_distance`, `1.0` for identical codes.
    pub fn similarity(&self, other: &SparseCode, dg_dim: u32) -> f64 {
        1.0 - (self.hamming_distance(other) as f64 / dg_dim as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionMatch {
    pub episode_id: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationCandidate {
    pub episode_id: String,
    pub importance: f64,
    pub ts: Timestamp,
}

/// A grouped consolidation result, published as `rollup.apply` (spec §4.7
/// consolidation).
#[derive(Debug, Clone, PartialEq)]
pub struct RollupEvent {
    pub derived_from: Vec<String>,
    pub summary_tokens: Vec<String>,
    pub combined_score: f64,
}

struct CaRecord {
    code: SparseCode,
    episode_id: String,
    summary_tokens: Vec<String>,
}

/// Per-space hippocampus: owns the DG projection matrix and the CA3/CA1
/// associative memory built up by `bridge`.
pub struct Hippocampus {
    input_dim: usize,
    dg_dim: u32,
    k_active: usize,
    projection: Vec<Vec<f64>>,
    records: Vec<CaRecord>,
    pending: Vec<ConsolidationCandidate>,
}

impl Hippocampus {
    /// `dg_dim` is the sparse code width; `k_active` defaults to
    /// `round(sqrt(dg_dim))` when `None` (spec §4.7 "top-k ≈ √d").
    pub fn new(seed: u64, input_dim: usize, dg_dim: u32, k_active: Option<usize>) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let projection = (0..dg_dim)
            .map(|_| (0..input_dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();
        let k_active = k_active.unwrap_or_else(|| (dg_dim as f64).sqrt().round() as usize).max(1);
        Self {
            input_dim,
            dg_dim,
            k_active,
            projection,
            records: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn dg_dim(&self) -> u32 {
        self.dg_dim
    }

    /// DG: dense features → sparse code via fixed random projection, keeping
    /// only the `k_active` highest-activation bits.
    pub fn separate(&self, features: &[f64]) -> SparseCode {
        debug_assert_eq!(features.len(), self.input_dim, "feature vector must match input_dim");
        let mut activations: Vec<(u32, f64)> = self
            .projection
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let dot: f64 = row.iter().zip(features.iter()).map(|(w, x)| w * x).sum();
                (i as u32, dot)
            })
            .collect();
        activations.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let mut bitmap = RoaringBitmap::new();
        for (idx, _) in activations.into_iter().take(self.k_active) {
            bitmap.insert(idx);
        }
        SparseCode(bitmap)
    }

    /// CA3: recall the `limit` stored codes nearest `query` by Hamming
    /// distance, ties broken by insertion order.
    pub fn complete(&self, query: &SparseCode, limit: usize) -> Vec<CompletionMatch> {
        let mut scored: Vec<CompletionMatch> = self
            .records
            .iter()
            .map(|r| CompletionMatch {
                episode_id: r.episode_id.clone(),
                similarity: query.similarity(&r.code, self.dg_dim),
            })
            .collect();
        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }

    /// CA1: bind `code` to `episode_id`/`summary_tokens` and queue the
    /// episode for consolidation scoring.
    pub fn bridge(&mut self, episode_id: impl Into<String>, code: SparseCode, summary_tokens: Vec<String>, importance: f64, ts: Timestamp) {
        let episode_id = episode_id.into();
        self.pending.push(ConsolidationCandidate { episode_id: episode_id.clone(), importance, ts });
        self.records.push(CaRecord { code, episode_id, summary_tokens });
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Consolidation scheduler (spec §4.7): `score = importance ·
    /// recency_decay`, greedily clusters pending episodes whose codes sit
    /// within `hamming_threshold`, and emits a [`RollupEvent`] per cluster
    /// whose combined score clears `rollup_threshold`. Consolidated
    /// episodes are removed from the pending queue; everything else stays
    /// for the next run.
    pub fn run_consolidation(&mut self, now: Timestamp, half_life_hours: f64, hamming_threshold: u64, rollup_threshold: f64) -> Vec<RollupEvent> {
        let scored: Vec<(usize, f64)> = self
            .pending
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let delta_hours = (now - c.ts).num_milliseconds() as f64 / 3_600_000.0;
                let decay = 2f64.powf(-delta_hours.max(0.0) / half_life_hours);
                (i, c.importance * decay)
            })
            .collect();

        let code_of = |episode_id: &str| -> Option<&SparseCode> {
            self.records.iter().find(|r| r.episode_id == episode_id).map(|r| &r.code)
        };

        let mut visited = vec![false; self.pending.len()];
        let mut rollups = Vec::new();
        let mut consumed_indices: Vec<usize> = Vec::new();

        for &(i, score_i) in &scored {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            let mut cluster = vec![i];
            let mut combined = score_i;
            let Some(code_i) = code_of(&self.pending[i].episode_id) else {
                continue;
            };
            for &(j, score_j) in &scored {
                if visited[j] || i == j {
                    continue;
                }
                let Some(code_j) = code_of(&self.pending[j].episode_id) else {
                    continue;
                };
                if code_i.hamming_distance(code_j) <= hamming_threshold {
                    visited[j] = true;
                    cluster.push(j);
                    combined += score_j;
                }
            }

            if combined >= rollup_threshold && cluster.len() > 1 {
                let derived_from: Vec<String> = cluster.iter().map(|&idx| self.pending[idx].episode_id.clone()).collect();
                let mut summary_tokens: Vec<String> = Vec::new();
                for episode_id in &derived_from {
                    if let Some(record) = self.records.iter().find(|r| &r.episode_id == episode_id) {
                        summary_tokens.extend(record.summary_tokens.iter().cloned());
                    }
                }
                summary_tokens.sort();
                summary_tokens.dedup();
                rollups.push(RollupEvent { derived_from, summary_tokens, combined_score: combined });
                consumed_indices.extend(cluster);
            }
        }

        consumed_indices.sort_unstable();
        consumed_indices.dedup();
        for &idx in consumed_indices.iter().rev() {
            self.pending.remove(idx);
        }

        rollups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[test]
    fn separate_is_deterministic_for_a_fixed_seed() {
        let hippo = Hippocampus::new(42, 8, 256, None);
        let features = vec![0.1, -0.2, 0.3, 0.4, -0.5, 0.6, -0.7, 0.8];
        let a = hippo.separate(&features);
        let b = hippo.separate(&features);
        assert_eq!(a, b);
    }

    #[test]
    fn code_width_matches_k_active() {
        let hippo = Hippocampus::new(1, 4, 100, Some(10));
        let code = hippo.separate(&[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(code.len(), 10);
    }

    #[test]
    fn identical_inputs_yield_similarity_one() {
        let hippo = Hippocampus::new(7, 6, 200, None);
        let features = vec![0.2, 0.4, -0.1, 0.3, 0.5, -0.2];
        let a = hippo.separate(&features);
        let b = hippo.separate(&features);
        assert_eq!(a.similarity(&b, hippo.dg_dim()), 1.0);
    }

    #[test]
    fn complete_recalls_the_bridged_episode_with_highest_similarity() {
        let mut hippo = Hippocampus::new(3, 4, 200, None);
        let features = vec![1.0, 0.5, -0.5, 0.2];
        let code = hippo.separate(&features);
        hippo.bridge("e1", code.clone(), vec!["birthday".to_string()], 0.8, ts("2026-01-01T00:00:00Z"));
        hippo.bridge("e2", hippo.separate(&[-1.0, -0.5, 0.5, -0.2]), vec!["taxes".to_string()], 0.2, ts("2026-01-01T00:00:00Z"));

        let matches = hippo.complete(&code, 1);
        assert_eq!(matches[0].episode_id, "e1");
        assert!(matches[0].similarity > 0.99);
    }

    #[test]
    fn consolidation_groups_similar_candidates_above_threshold() {
        let mut hippo = Hippocampus::new(9, 4, 200, None);
        let shared_code = hippo.separate(&[0.9, 0.1, 0.0, 0.0]);
        hippo.bridge("e1", shared_code.clone(), vec!["cake".to_string()], 0.9, ts("2026-01-01T00:00:00Z"));
        hippo.bridge("e2", shared_code, vec!["candles".to_string()], 0.9, ts("2026-01-01T00:00:00Z"));
        hippo.bridge("e3", hippo.separate(&[-0.9, -0.1, 0.0, 0.0]), vec!["unrelated".to_string()], 0.1, ts("2026-01-01T00:00:00Z"));

        let rollups = hippo.run_consolidation(ts("2026-01-01T01:00:00Z"), 72.0, 5, 1.0);
        assert_eq!(rollups.len(), 1);
        assert!(rollups[0].derived_from.contains(&"e1".to_string()));
        assert!(rollups[0].derived_from.contains(&"e2".to_string()));
        assert!(rollups[0].summary_tokens.contains(&"cake".to_string()));
        // e3 stayed pending: too dissimilar and too low-scoring alone.
        assert_eq!(hippo.pending_count(), 1);
    }

    #[test]
    fn consolidation_leaves_below_threshold_candidates_pending() {
        let mut hippo = Hippocampus::new(11, 4, 200, None);
        let code = hippo.separate(&[0.3, 0.3, 0.3, 0.3]);
        hippo.bridge("e1", code, vec!["low".to_string()], 0.01, ts("2026-01-01T00:00:00Z"));
        let rollups = hippo.run_consolidation(ts("2026-01-01T00:00:00Z"), 72.0, 5, 1.0);
        assert!(rollups.is_empty());
        assert_eq!(hippo.pending_count(), 1);
    }
}
