//! S4: the arbiter's risk gate blocks automation outright on a BLACK-band
//! context or a policy denial, before any utility scoring happens, and
//! requires confirmation for a sharing action under high-arousal AMBER.

use familycore_core::{Arbiter, ArbiterConfig, Band, CandidateAction, DecisionContext};

fn candidate(name: &str, sharing_class: bool) -> CandidateAction {
    CandidateAction {
        name: name.to_string(),
        args: serde_json::json!({}),
        relevance: 0.9,
        goal_alignment: 0.9,
        expected_reward: 0.9,
        habitability: 0.8,
        prosocial: 0.8,
        cost: 0.1,
        wm_load: 0.1,
        friction: 0.1,
        window_score: 1.0,
        risk: 0.1,
        prior: 0.5,
        sharing_class,
        preconditions: Vec::new(),
        effects: Vec::new(),
    }
}

fn permissive_context(band: Band) -> DecisionContext {
    DecisionContext {
        band,
        minor_present: false,
        conflict_hint: false,
        arousal: 0.1,
        valence: 0.0,
        urgent: false,
        policy_permits: true,
    }
}

#[test]
fn black_band_blocks_every_candidate() {
    let config = ArbiterConfig::default();
    let arbiter = Arbiter::new(&config);
    let ctx = permissive_context(Band::Black);

    let frame = arbiter.decide(&ctx, &[candidate("notify_emergency_contact", false)]);
    assert!(frame.chosen.is_none());
    assert!(frame.reasons.iter().any(|r| r.contains("BLACK")));
}

#[test]
fn policy_denial_blocks_regardless_of_band() {
    let config = ArbiterConfig::default();
    let arbiter = Arbiter::new(&config);
    let mut ctx = permissive_context(Band::Green);
    ctx.policy_permits = false;

    let frame = arbiter.decide(&ctx, &[candidate("share_photo", true)]);
    assert!(frame.chosen.is_none());
}

#[test]
fn amber_high_arousal_sharing_action_requires_confirmation() {
    let config = ArbiterConfig::default();
    let arbiter = Arbiter::new(&config);
    let mut ctx = permissive_context(Band::Amber);
    ctx.arousal = config.confirm_arousal_threshold + 0.1;

    let frame = arbiter.decide(&ctx, &[candidate("share_photo", true)]);
    assert!(frame.requires_confirm, "a sharing action under aroused AMBER must require confirmation, not auto-execute");
}

#[test]
fn green_band_allows_the_best_candidate_through() {
    let config = ArbiterConfig::default();
    let arbiter = Arbiter::new(&config);
    let ctx = permissive_context(Band::Green);

    let frame = arbiter.decide(&ctx, &[candidate("log_reminder", false)]);
    assert!(frame.chosen.is_some());
    assert!(!frame.requires_confirm);
}
