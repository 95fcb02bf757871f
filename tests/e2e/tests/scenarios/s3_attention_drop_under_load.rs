//! S3: once working-memory load crosses the drop floor, the attention gate
//! drops even a maximally salient candidate instead of admitting or
//! deferring it.

use chrono::Utc;
use familycore_core::{AttentionConfig, AttentionGate, AttentionInput, AttentionState, Band, Decision};

fn high_salience_input() -> AttentionInput {
    AttentionInput {
        novelty: 1.0,
        affect_arousal: 1.0,
        urgency_tag: 1.0,
        actor_priority: 1.0,
        recency_of_related: 1.0,
        actor: familycore_e2e_tests::fixtures::alice(),
        band: Band::Green,
        ts: Utc::now(),
    }
}

#[test]
fn high_load_drops_regardless_of_salience() {
    let config = AttentionConfig::default();
    let gate = AttentionGate::new(&config);
    let mut state = AttentionState::new();
    state.set_load(config.drop_load_floor);

    let input = high_salience_input();
    assert!(gate.salience(&input) >= config.admit_high, "fixture should be maximally salient");

    let outcome = gate.score("ep-1", &input, &mut state);
    assert_eq!(outcome.decision, Decision::Drop);
    assert!(!outcome.reasons.is_empty());
}

#[test]
fn moderate_load_boosts_a_high_salience_candidate_instead_of_admitting() {
    let config = AttentionConfig::default();
    let gate = AttentionGate::new(&config);
    let mut state = AttentionState::new();
    // Above the admission ceiling but below the drop floor.
    state.set_load((config.load_admit_ceiling + config.drop_load_floor) / 2.0);

    let outcome = gate.score("ep-2", &high_salience_input(), &mut state);
    assert_eq!(outcome.decision, Decision::Boost);
}

#[test]
fn low_load_admits_a_high_salience_candidate_and_raises_load() {
    let config = AttentionConfig::default();
    let gate = AttentionGate::new(&config);
    let mut state = AttentionState::new();

    let before = state.load();
    let outcome = gate.score("ep-3", &high_salience_input(), &mut state);
    assert_eq!(outcome.decision, Decision::Admit);
    assert!(state.load() > before, "admitting should raise working-memory load");
}
