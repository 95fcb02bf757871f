//! Typed configuration record (spec §6 env vars, §9 "configuration via
//! ad-hoc kwargs" redesign guidance).
//!
//! Every tunable named throughout spec §4 (attention thresholds, ranker
//! weights, arbiter utility weights, MMR lambda, backoff knobs, retention
//! defaults) lives here with the documented default. `CoreConfig::from_env`
//! overlays environment variables onto the defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::ids::Band;

/// `FAMILY_CORE_DATA_DIR`
const ENV_DATA_DIR: &str = "FAMILY_CORE_DATA_DIR";
/// `FAMILY_CORE_FLUSH_INTERVAL_MS`
const ENV_FLUSH_INTERVAL_MS: &str = "FAMILY_CORE_FLUSH_INTERVAL_MS";
/// `FAMILY_CORE_MAX_ATTEMPTS`
const ENV_MAX_ATTEMPTS: &str = "FAMILY_CORE_MAX_ATTEMPTS";
/// `FAMILY_CORE_BACKOFF_BASE_MS`
const ENV_BACKOFF_BASE_MS: &str = "FAMILY_CORE_BACKOFF_BASE_MS";
/// `FAMILY_CORE_BACKOFF_MAX_MS`
const ENV_BACKOFF_MAX_MS: &str = "FAMILY_CORE_BACKOFF_MAX_MS";
/// `FAMILY_CORE_TEMPORAL_HALF_LIFE_H`
const ENV_TEMPORAL_HALF_LIFE_H: &str = "FAMILY_CORE_TEMPORAL_HALF_LIFE_H";
/// `FAMILY_CORE_DEFAULT_BAND`
const ENV_DEFAULT_BAND: &str = "FAMILY_CORE_DEFAULT_BAND";

/// Retention policy for one canonical topic (§6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Retention {
    pub max_bytes: u64,
    pub max_age: Duration,
}

/// Bus-wide tunables (§4.3).
#[derive(Debug, Clone, PartialEq)]
pub struct BusConfig {
    pub flush_interval_ms: u32,
    pub max_attempts: u32,
    pub backoff_base_ms: u32,
    pub backoff_max_ms: u32,
    pub backoff_jitter: f64,
    /// High-watermark (queued WAL writes) past which `publish` returns `Busy`.
    pub publish_high_watermark: usize,
    /// Default retention for decision/prediction topics (Open Question 5).
    pub decision_topic_retention: Retention,
    /// Default retention for `hippo.encode` (Open Question 5).
    pub hippo_encode_retention: Retention,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 5,
            max_attempts: 8,
            backoff_base_ms: 250,
            backoff_max_ms: 10_000,
            backoff_jitter: 0.2,
            publish_high_watermark: 4096,
            decision_topic_retention: Retention {
                max_bytes: 256 * 1024 * 1024,
                max_age: Duration::from_secs(7 * 24 * 3600),
            },
            hippo_encode_retention: Retention {
                max_bytes: 1024 * 1024 * 1024,
                max_age: Duration::from_secs(30 * 24 * 3600),
            },
        }
    }
}

/// Attention gate tunables (§4.6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttentionConfig {
    pub admit_high: f64,
    pub admit_low: f64,
    pub load_admit_ceiling: f64,
    pub drop_load_floor: f64,
    pub defer_base_ms: u64,
    pub novelty_weight: f64,
    pub affect_arousal_weight: f64,
    pub urgency_weight: f64,
    pub actor_priority_weight: f64,
    pub recency_weight: f64,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            admit_high: 0.75,
            admit_low: 0.4,
            load_admit_ceiling: 0.8,
            drop_load_floor: 0.9,
            defer_base_ms: 2_000,
            novelty_weight: 0.3,
            affect_arousal_weight: 0.25,
            urgency_weight: 0.25,
            actor_priority_weight: 0.1,
            recency_weight: 0.1,
        }
    }
}

/// Temporal index tunables (§4.4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalConfig {
    pub half_life_hours: f64,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            half_life_hours: 72.0,
        }
    }
}

/// Retrieval ranker tunables (§4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankerWeights {
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

impl Default for RankerWeights {
    fn default() -> Self {
        Self {
            bm25: 1.0,
            tfidf_cos: 1.1,
            recency: 0.8,
            rrf: 0.6,
            length_penalty: -0.2,
            source_prior: 0.3,
            personalization: 0.2,
            affect_compat: 0.1,
            tom_alignment: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    pub weights: RankerWeights,
    pub mmr_lambda: f64,
    pub rrf_k: f64,
    pub fast_path_budget_ms: u32,
    pub default_k: usize,
    pub max_k: usize,
    pub bm25_k1: f64,
    pub bm25_b: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            weights: RankerWeights::default(),
            mmr_lambda: 0.35,
            rrf_k: 60.0,
            fast_path_budget_ms: 3,
            default_k: 10,
            max_k: 64,
            bm25_k1: 1.2,
            bm25_b: 0.75,
        }
    }
}

/// Arbiter tunables (§4.9).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArbiterConfig {
    pub w_relevance: f64,
    pub w_goal_alignment: f64,
    pub w_expected_reward: f64,
    pub w_habitability: f64,
    pub w_prosocial: f64,
    pub w_cost: f64,
    pub w_wm_load: f64,
    pub w_friction: f64,
    pub risk_lambda: f64,
    pub urgent_affect_bonus: f64,
    pub negative_affect_damp: f64,
    pub planner_max_depth: usize,
    pub planner_beam: usize,
    pub planner_discount: f64,
    pub confirm_arousal_threshold: f64,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            w_relevance: 1.0,
            w_goal_alignment: 0.9,
            w_expected_reward: 0.8,
            w_habitability: 0.3,
            w_prosocial: 0.2,
            w_cost: 0.7,
            w_wm_load: 0.4,
            w_friction: 0.3,
            risk_lambda: 0.8,
            urgent_affect_bonus: 0.2,
            negative_affect_damp: 0.2,
            planner_max_depth: 3,
            planner_beam: 6,
            planner_discount: 0.9,
            confirm_arousal_threshold: 0.85,
        }
    }
}

/// Cortex predictor tunables (§4.8).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CortexConfig {
    pub urgent_bonus: f64,
    pub band_penalty: f64,
    pub defer_value_beta: f64,
}

impl Default for CortexConfig {
    fn default() -> Self {
        Self {
            urgent_bonus: 0.5,
            band_penalty: 0.5,
            defer_value_beta: 0.5,
        }
    }
}

/// Top-level configuration record.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub default_band: Band,
    pub bus: BusConfig,
    pub attention: AttentionConfig,
    pub temporal: TemporalConfig,
    pub retrieval: RetrievalConfig,
    pub arbiter: ArbiterConfig,
    pub cortex: CortexConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let data_dir = directories::ProjectDirs::from("com", "familycore", "core")
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("./familycore-data"));
        Self {
            data_dir,
            default_band: Band::Green,
            bus: BusConfig::default(),
            attention: AttentionConfig::default(),
            temporal: TemporalConfig::default(),
            retrieval: RetrievalConfig::default(),
            arbiter: ArbiterConfig::default(),
            cortex: CortexConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Overlay recognized `FAMILY_CORE_*` environment variables onto the
    /// documented defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = parse_env_u32(ENV_FLUSH_INTERVAL_MS) {
            config.bus.flush_interval_ms = v;
        }
        if let Some(v) = parse_env_u32(ENV_MAX_ATTEMPTS) {
            config.bus.max_attempts = v;
        }
        if let Some(v) = parse_env_u32(ENV_BACKOFF_BASE_MS) {
            config.bus.backoff_base_ms = v;
        }
        if let Some(v) = parse_env_u32(ENV_BACKOFF_MAX_MS) {
            config.bus.backoff_max_ms = v;
        }
        if let Some(v) = parse_env_f64(ENV_TEMPORAL_HALF_LIFE_H) {
            config.temporal.half_life_hours = v;
        }
        if let Ok(band) = std::env::var(ENV_DEFAULT_BAND) {
            if let Ok(b) = band.parse() {
                config.default_band = b;
            }
        }

        config
    }
}

fn parse_env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn parse_env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
