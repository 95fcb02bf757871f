//! Attention Gate (C6, spec §4.6).
//!
//! Scores every inbound candidate episode for salience and decides
//! `Admit`, `Defer`, `Boost`, or `Drop` under a per-space load ceiling.
//! Single writer per space: callers serialize calls to [`AttentionGate::score`]
//! per [`SpaceId`] (the gate itself holds no cross-space state).

use std::collections::VecDeque;

use crate::config::AttentionConfig;
use crate::ids::{ActorRef, Band, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Defer,
    Boost,
    Drop,
}

/// Raw signals for one inbound candidate, assembled by the caller from the
/// envelope and whatever context is already in working memory (spec §4.6
/// step 1).
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionInput {
    /// `1.0` if nothing like this episode exists in recent context, `0.0` if
    /// it is a near-duplicate.
    pub novelty: f64,
    /// `[0, 1]` arousal component of the attached affect estimate, if any.
    pub affect_arousal: f64,
    /// Producer-tagged urgency, `[0, 1]`.
    pub urgency_tag: f64,
    /// `[0, 1]` priority of the producing actor (e.g. a parent vs. a
    /// background sensor).
    pub actor_priority: f64,
    /// Recency of a related episode already admitted, `[0, 1]`, `0` if none.
    pub recency_of_related: f64,
    pub actor: ActorRef,
    pub band: Band,
    pub ts: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttentionOutcome {
    pub decision: Decision,
    pub salience: f64,
    /// Populated only for `Defer`: earliest wall-clock time the item should
    /// be re-offered (spec §4.6 step 4, exponential-ish backoff per retry).
    pub defer_until: Option<Timestamp>,
    pub reasons: Vec<String>,
    pub intent_tags: Vec<String>,
}

/// Mutable per-space attention state: current working-memory load and the
/// deferred queue. Spec §4.6 requires a single writer per space; callers
/// must not share one `AttentionState` across concurrent tasks without
/// external serialization (e.g. one actor per space).
#[derive(Debug, Default)]
pub struct AttentionState {
    /// `[0, 1]` estimate of current working-memory pressure, raised on
    /// `Admit`/`Boost` and decayed by the caller as items are consumed.
    load: f64,
    deferred: VecDeque<(String, Timestamp)>,
}

impl AttentionState {
    pub fn new() -> Self {
        Self { load: 0.0, deferred: VecDeque::new() }
    }

    pub fn load(&self) -> f64 {
        self.load
    }

    pub fn set_load(&mut self, load: f64) {
        self.load = load.clamp(0.0, 1.0);
    }

    pub fn raise_load(&mut self, delta: f64) {
        self.set_load(self.load + delta);
    }

    pub fn decay_load(&mut self, factor: f64) {
        self.set_load(self.load * factor.clamp(0.0, 1.0));
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    fn push_deferred(&mut self, episode_id: impl Into<String>, until: Timestamp) {
        self.deferred.push_back((episode_id.into(), until));
    }

    /// Pop every deferred item whose `defer_until` has passed `now`, in
    /// insertion order (spec §4.6 "defer re-offers FIFO once due").
    pub fn pop_due(&mut self, now: Timestamp) -> Vec<String> {
        let mut due = Vec::new();
        while let Some((_, until)) = self.deferred.front() {
            if *until <= now {
                due.push(self.deferred.pop_front().unwrap().0);
            } else {
                break;
            }
        }
        due
    }
}

/// Stateless scorer over an `AttentionConfig`; state (load, deferred queue)
/// lives in [`AttentionState`] so the gate can be shared read-only across
/// spaces while each space keeps its own mutable state.
pub struct AttentionGate<'a> {
    config: &'a AttentionConfig,
}

impl<'a> AttentionGate<'a> {
    pub fn new(config: &'a AttentionConfig) -> Self {
        Self { config }
    }

    /// Linear salience combiner (spec §4.6 step 2):
    /// `w_novelty·novelty + w_arousal·affect_arousal + w_urgency·urgency_tag
    /// + w_actor·actor_priority + w_recency·recency_of_related`, clamped to
    /// `[0, 1]`.
    pub fn salience(&self, input: &AttentionInput) -> f64 {
        let raw = self.config.novelty_weight * input.novelty
            + self.config.affect_arousal_weight * input.affect_arousal
            + self.config.urgency_weight * input.urgency_tag
            + self.config.actor_priority_weight * input.actor_priority
            + self.config.recency_weight * input.recency_of_related;
        raw.clamp(0.0, 1.0)
    }

    /// `score()` — spec §4.6 steps 2-5. `episode_id` is used only to key the
    /// deferred-retry queue on `Defer`.
    pub fn score(&self, episode_id: &str, input: &AttentionInput, state: &mut AttentionState) -> AttentionOutcome {
        let salience = self.salience(input);
        let mut reasons = Vec::new();
        let mut intent_tags = Vec::new();

        if input.urgency_tag >= 0.8 {
            intent_tags.push("urgent".to_string());
        }
        if input.affect_arousal >= 0.7 {
            intent_tags.push("high_arousal".to_string());
        }
        if input.band >= Band::Red {
            intent_tags.push("sensitive".to_string());
        }

        // Step 3: load ceilings override salience (spec §4.6 "DROP if load
        // exceeds the drop floor regardless of salience").
        if state.load >= self.config.drop_load_floor {
            reasons.push(format!("load {:.2} ≥ drop_load_floor {:.2}", state.load, self.config.drop_load_floor));
            return AttentionOutcome { decision: Decision::Drop, salience, defer_until: None, reasons, intent_tags };
        }

        if salience >= self.config.admit_high {
            if state.load >= self.config.load_admit_ceiling {
                reasons.push(format!(
                    "salience {:.2} ≥ admit_high {:.2} but load {:.2} ≥ ceiling {:.2} → boost instead",
                    salience, self.config.admit_high, state.load, self.config.load_admit_ceiling
                ));
                return AttentionOutcome { decision: Decision::Boost, salience, defer_until: None, reasons, intent_tags };
            }
            reasons.push(format!("salience {:.2} ≥ admit_high {:.2}", salience, self.config.admit_high));
            state.raise_load(salience * 0.1);
            return AttentionOutcome { decision: Decision::Admit, salience, defer_until: None, reasons, intent_tags };
        }

        if salience >= self.config.admit_low {
            if state.load >= self.config.load_admit_ceiling {
                let retry = state.deferred_count() as u32;
                let defer_ms = self.config.defer_base_ms.saturating_mul(1 + retry as u64);
                let defer_until = input.ts + chrono::Duration::milliseconds(defer_ms as i64);
                state.push_deferred(episode_id, defer_until);
                reasons.push(format!(
                    "salience {:.2} in [admit_low, admit_high) and load {:.2} ≥ ceiling {:.2} → defer",
                    salience, state.load, self.config.load_admit_ceiling
                ));
                return AttentionOutcome { decision: Decision::Defer, salience, defer_until: Some(defer_until), reasons, intent_tags };
            }
            reasons.push(format!("salience {:.2} in [admit_low, admit_high)", salience));
            state.raise_load(salience * 0.1);
            return AttentionOutcome { decision: Decision::Admit, salience, defer_until: None, reasons, intent_tags };
        }

        reasons.push(format!("salience {:.2} < admit_low {:.2}", salience, self.config.admit_low));
        AttentionOutcome { decision: Decision::Drop, salience, defer_until: None, reasons, intent_tags }
    }
}
