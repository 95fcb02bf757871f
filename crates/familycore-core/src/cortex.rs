//! Cortex Predictor (C8, spec §4.8).
//!
//! Tier-0 is a linear/rules head over a fixed feature backbone
//! (`retrieval.*`, `temporal.*`, `affect.*`, `tom.*`, `wm.*`, `outcomes.*`,
//! `policy.band_onehot`) producing `need_action`, `need_recall`,
//! `expected_reward`, an uncertainty estimate, and a `defer_value`. Tier-1
//! is an externally-trained model plugged in behind [`Tier1Model`]; when
//! none is configured, tier-0 is the whole prediction.

use crate::config::CortexConfig;
use crate::ids::Band;

/// The fixed feature backbone every tier reads from (spec §4.8 step 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CortexFeatures {
    pub retrieval_top_score: f64,
    pub retrieval_result_count: f64,
    pub temporal_recency: f64,
    pub affect_valence: f64,
    pub affect_arousal: f64,
    pub tom_alignment: f64,
    pub wm_load: f64,
    pub outcomes_recent_success_rate: f64,
    pub band: Band,
    pub urgent: bool,
}

impl CortexFeatures {
    fn band_onehot(&self) -> [f64; 4] {
        match self.band {
            Band::Green => [1.0, 0.0, 0.0, 0.0],
            Band::Amber => [0.0, 1.0, 0.0, 0.0],
            Band::Red => [0.0, 0.0, 1.0, 0.0],
            Band::Black => [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CortexPrediction {
    pub need_action: f64,
    pub need_recall: f64,
    pub expected_reward: f64,
    /// `[0, 1]`, higher means the tier-0/tier-1 heads disagree or the
    /// margin between adjacent decisions is thin (spec §4.8 step 4).
    pub uncertainty: f64,
    /// Value of deferring the decision one more cycle to gather more
    /// signal, `defer_value_beta · uncertainty · (1 − recency)` (spec §4.8
    /// step 5).
    pub defer_value: f64,
    pub tier: &'static str,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Binary entropy of `p`, normalized to `[0, 1]` (divided by its max of 1
/// bit at `p = 0.5`). `0` at `p ∈ {0, 1}` (fully confident), `1` at
/// `p = 0.5` (maximally uncertain).
fn normalized_binary_entropy(p: f64) -> f64 {
    let p = p.clamp(1e-12, 1.0 - 1e-12);
    -(p * p.log2() + (1.0 - p) * (1.0 - p).log2())
}

/// Tier-1 pluggable model hook (spec §4.8 Open Question: externally
/// provided artifact). Implementors may wrap an on-device MLP; this core
/// ships no concrete tier-1, only the seam.
pub trait Tier1Model: Send + Sync {
    fn predict(&self, features: &CortexFeatures, tier0: CortexPrediction) -> CortexPrediction;
}

/// Linear/rules tier-0 head. Weights are intentionally small and
/// hand-set — this is the "rules" half of "linear/rules", not a trained
/// model.
pub struct CortexPredictor<'a> {
    config: &'a CortexConfig,
    tier1: Option<Box<dyn Tier1Model>>,
}

impl<'a> CortexPredictor<'a> {
    pub fn new(config: &'a CortexConfig) -> Self {
        Self { config, tier1: None }
    }

    pub fn with_tier1(config: &'a CortexConfig, model: Box<dyn Tier1Model>) -> Self {
        Self { config, tier1: Some(model) }
    }

    /// `predict()` — spec §4.8 steps 2-6.
    pub fn predict(&self, features: &CortexFeatures) -> CortexPrediction {
        let band_onehot = features.band_onehot();
        let band_penalty = self.config.band_penalty * (band_onehot[2] + band_onehot[3]);

        let action_logit = 0.6 * features.retrieval_top_score
            + 0.3 * features.wm_load
            + 0.4 * features.affect_arousal
            - band_penalty
            + if features.urgent { self.config.urgent_bonus } else { 0.0 };
        let need_action = sigmoid(action_logit);

        let recall_logit = 0.5 * features.temporal_recency
            + 0.4 * features.retrieval_result_count.min(10.0) / 10.0
            + 0.2 * features.tom_alignment
            - 0.5 * band_penalty;
        let need_recall = sigmoid(recall_logit);

        let reward_raw = 0.5 * features.affect_valence
            + 0.3 * features.outcomes_recent_success_rate
            + 0.2 * features.retrieval_top_score
            - band_penalty;
        let expected_reward = reward_raw.tanh();

        // uncertainty = 1 - (1 - H(need_action)) * (1 - H(need_recall)): zero
        // only when both heads are confident, one either way.
        let h_action = normalized_binary_entropy(need_action);
        let h_recall = normalized_binary_entropy(need_recall);
        let uncertainty = (1.0 - (1.0 - h_action) * (1.0 - h_recall)).clamp(0.0, 1.0);
        let defer_value = self.config.defer_value_beta * uncertainty * (1.0 - features.temporal_recency);

        let tier0 = CortexPrediction {
            need_action,
            need_recall,
            expected_reward,
            uncertainty,
            defer_value,
            tier: "tier0",
        };

        match &self.tier1 {
            Some(model) => {
                let mut blended = model.predict(features, tier0);
                blended.tier = "tier1";
                blended
            }
            None => tier0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_features() -> CortexFeatures {
        CortexFeatures {
            retrieval_top_score: 0.5,
            retrieval_result_count: 3.0,
            temporal_recency: 0.5,
            affect_valence: 0.0,
            affect_arousal: 0.3,
            tom_alignment: 0.4,
            wm_load: 0.2,
            outcomes_recent_success_rate: 0.6,
            band: Band::Green,
            urgent: false,
        }
    }

    #[test]
    fn urgent_flag_raises_need_action() {
        let config = CortexConfig::default();
        let predictor = CortexPredictor::new(&config);
        let calm = predictor.predict(&base_features());
        let mut urgent_features = base_features();
        urgent_features.urgent = true;
        let urgent = predictor.predict(&urgent_features);
        assert!(urgent.need_action > calm.need_action);
    }

    #[test]
    fn red_band_depresses_expected_reward_vs_green() {
        let config = CortexConfig::default();
        let predictor = CortexPredictor::new(&config);
        let green = predictor.predict(&base_features());
        let mut red_features = base_features();
        red_features.band = Band::Red;
        let red = predictor.predict(&red_features);
        assert!(red.expected_reward < green.expected_reward);
    }

    #[test]
    fn outputs_are_bounded() {
        let config = CortexConfig::default();
        let predictor = CortexPredictor::new(&config);
        let mut extreme = base_features();
        extreme.retrieval_top_score = 100.0;
        extreme.wm_load = 100.0;
        let pred = predictor.predict(&extreme);
        assert!(pred.need_action >= 0.0 && pred.need_action <= 1.0);
        assert!(pred.need_recall >= 0.0 && pred.need_recall <= 1.0);
        assert!(pred.expected_reward >= -1.0 && pred.expected_reward <= 1.0);
        assert!(pred.uncertainty >= 0.0 && pred.uncertainty <= 1.0);
    }

    #[test]
    fn confident_agreeing_heads_yield_low_uncertainty() {
        let config = CortexConfig::default();
        let predictor = CortexPredictor::new(&config);
        // Push both need_action and need_recall toward 1.0 so each head's
        // binary entropy is near zero.
        let mut features = base_features();
        features.retrieval_top_score = 10.0;
        features.wm_load = 10.0;
        features.affect_arousal = 10.0;
        features.temporal_recency = 10.0;
        features.retrieval_result_count = 10.0;
        features.tom_alignment = 10.0;
        let pred = predictor.predict(&features);
        assert!(pred.uncertainty < 0.1, "two confident, agreeing heads should yield near-zero uncertainty, got {}", pred.uncertainty);
    }

    #[test]
    fn defer_value_scales_down_as_recency_increases() {
        let config = CortexConfig::default();
        let predictor = CortexPredictor::new(&config);
        let mut stale = base_features();
        stale.temporal_recency = 0.0;
        let mut fresh = base_features();
        fresh.temporal_recency = 1.0;

        let stale_pred = predictor.predict(&stale);
        let fresh_pred = predictor.predict(&fresh);
        assert_eq!(fresh_pred.defer_value, 0.0, "defer_value must vanish at full recency regardless of uncertainty");
        assert!(stale_pred.defer_value >= fresh_pred.defer_value);
    }

    #[test]
    fn tier0_is_used_when_no_tier1_configured() {
        let config = CortexConfig::default();
        let predictor = CortexPredictor::new(&config);
        let pred = predictor.predict(&base_features());
        assert_eq!(pred.tier, "tier0");
    }

    struct AlwaysConfidentTier1;
    impl Tier1Model for AlwaysConfidentTier1 {
        fn predict(&self, _features: &CortexFeatures, mut tier0: CortexPrediction) -> CortexPrediction {
            tier0.uncertainty = 0.0;
            tier0.defer_value = 0.0;
            tier0
        }
    }

    #[test]
    fn tier1_overrides_and_is_labeled() {
        let config = CortexConfig::default();
        let predictor = CortexPredictor::with_tier1(&config, Box::new(AlwaysConfidentTier1));
        let pred = predictor.predict(&base_features());
        assert_eq!(pred.tier, "tier1");
        assert_eq!(pred.uncertainty, 0.0);
    }
}
