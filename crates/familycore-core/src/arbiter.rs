//! Arbiter (C9, spec §4.9).
//!
//! Synthesizes a `DecisionFrame` from the latest workspace broadcast,
//! cortex prediction, affect annotation, and belief update for a space:
//! risk gate first, then a linear utility over candidate actions, then a
//! tiny forward-search planner when no single action dominates.

use crate::config::ArbiterConfig;
use crate::ids::Band;

/// One candidate action considered by the arbiter, with everything the
/// utility formula and risk gate need (spec §4.9).
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateAction {
    pub name: String,
    pub args: serde_json::Value,
    pub relevance: f64,
    pub goal_alignment: f64,
    pub expected_reward: f64,
    pub habitability: f64,
    pub prosocial: f64,
    pub cost: f64,
    pub wm_load: f64,
    pub friction: f64,
    pub window_score: f64,
    pub risk: f64,
    pub prior: f64,
    pub sharing_class: bool,
    /// Preconditions/effects for the forward-search planner; empty for a
    /// single-step action.
    pub preconditions: Vec<String>,
    pub effects: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionContext {
    pub band: Band,
    pub minor_present: bool,
    pub conflict_hint: bool,
    pub arousal: f64,
    pub valence: f64,
    pub urgent: bool,
    /// Whether the injected policy/ABAC evaluator permits this request at
    /// all; `false` forces a block regardless of the candidates.
    pub policy_permits: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredAction {
    pub name: String,
    pub args: serde_json::Value,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionFrame {
    pub chosen: Option<ScoredAction>,
    pub alternates: Vec<ScoredAction>,
    pub score: f64,
    pub reasons: Vec<String>,
    pub band: Band,
    pub requires_confirm: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateVerdict {
    Block,
    RequireConfirm,
    Allow,
}

pub struct Arbiter<'a> {
    config: &'a ArbiterConfig,
}

impl<'a> Arbiter<'a> {
    pub fn new(config: &'a ArbiterConfig) -> Self {
        Self { config }
    }

    /// Pre-utility hard rules (spec §4.9 "Risk gate").
    fn risk_gate(&self, ctx: &DecisionContext, action: &CandidateAction) -> (GateVerdict, Vec<String>) {
        let mut reasons = Vec::new();
        if !ctx.policy_permits {
            reasons.push("policy evaluator denied".to_string());
            return (GateVerdict::Block, reasons);
        }
        if ctx.band == Band::Black {
            reasons.push("band BLACK".to_string());
            return (GateVerdict::Block, reasons);
        }
        if ctx.band == Band::Red && (ctx.minor_present || ctx.conflict_hint) {
            reasons.push("band RED with minor_present or conflict_hint".to_string());
            return (GateVerdict::Block, reasons);
        }
        if ctx.band == Band::Amber && ctx.arousal >= self.config.confirm_arousal_threshold && action.sharing_class {
            reasons.push(format!("band AMBER, arousal {:.2} ≥ {:.2}, sharing-class action", ctx.arousal, self.config.confirm_arousal_threshold));
            return (GateVerdict::RequireConfirm, reasons);
        }
        (GateVerdict::Allow, reasons)
    }

    /// Linear utility (spec §4.9 "Selection math"), fully expanded with the
    /// affect nudge, timing multiplier, and risk adjustment.
    fn utility(&self, ctx: &DecisionContext, action: &CandidateAction) -> (f64, Vec<String>) {
        let mut reasons = Vec::new();
        let c = self.config;
        let mut u = c.w_relevance * action.relevance
            + c.w_goal_alignment * action.goal_alignment
            + c.w_expected_reward * action.expected_reward
            + c.w_habitability * action.habitability
            + c.w_prosocial * action.prosocial
            - c.w_cost * action.cost
            - c.w_wm_load * action.wm_load
            - c.w_friction * action.friction;

        if ctx.urgent {
            u += c.urgent_affect_bonus * ctx.arousal;
            reasons.push(format!("urgent affect bonus +{:.3}", c.urgent_affect_bonus * ctx.arousal));
        }
        if ctx.valence < 0.0 && ctx.band >= Band::Amber {
            let damp = c.negative_affect_damp * ctx.valence.abs();
            u -= damp;
            reasons.push(format!("negative affect damp -{damp:.3}"));
        }

        let timing_multiplier = 0.5 + 0.5 * action.window_score;
        u *= timing_multiplier;
        reasons.push(format!("timing multiplier ×{timing_multiplier:.3}"));

        let risk_adjusted = u - c.risk_lambda * action.risk;
        reasons.push(format!("risk adjustment -{:.3}", c.risk_lambda * action.risk));

        (risk_adjusted, reasons)
    }

    /// `decide()` — risk-gates every candidate, scores the survivors, and
    /// picks the winner by utility with spec §4.9 tie-breakers: lower cost,
    /// then lower risk, then higher prior, then lexicographic action name.
    pub fn decide(&self, ctx: &DecisionContext, candidates: &[CandidateAction]) -> DecisionFrame {
        let mut reasons = Vec::new();
        let mut scored: Vec<(ScoredAction, &CandidateAction)> = Vec::new();
        let mut requires_confirm = false;

        for action in candidates {
            let (verdict, gate_reasons) = self.risk_gate(ctx, action);
            match verdict {
                GateVerdict::Block => {
                    reasons.push(format!("{}: blocked ({})", action.name, gate_reasons.join("; ")));
                    continue;
                }
                GateVerdict::RequireConfirm => {
                    requires_confirm = true;
                    reasons.push(format!("{}: requires confirm ({})", action.name, gate_reasons.join("; ")));
                }
                GateVerdict::Allow => {}
            }
            let (score, utility_reasons) = self.utility(ctx, action);
            reasons.extend(utility_reasons.iter().map(|r| format!("{}: {r}", action.name)));
            scored.push((ScoredAction { name: action.name.clone(), args: action.args.clone(), score }, action));
        }

        scored.sort_by(|(a_scored, a), (b_scored, b)| {
            b_scored
                .score
                .partial_cmp(&a_scored.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.risk.partial_cmp(&b.risk).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| b.prior.partial_cmp(&a.prior).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a_scored.name.cmp(&b_scored.name))
        });

        if scored.is_empty() {
            reasons.push("all candidates blocked: emitting no-op decision".to_string());
            return DecisionFrame { chosen: None, alternates: Vec::new(), score: 0.0, reasons, band: ctx.band, requires_confirm };
        }

        let (chosen, _) = scored.remove(0);
        let score = chosen.score;
        let alternates = scored.into_iter().map(|(s, _)| s).collect();

        DecisionFrame { chosen: Some(chosen), alternates, score, reasons, band: ctx.band, requires_confirm }
    }

    /// Tiny forward-search planner (spec §4.9 "Tiny planner"): depth ≤
    /// `planner_max_depth`, beam ≤ `planner_beam`, discounting each step's
    /// contribution by `planner_discount`. Stops when `goal` is satisfied by
    /// the accumulated effects, the beam runs dry, or a step's risk gate
    /// fails.
    pub fn plan(&self, ctx: &DecisionContext, actions: &[CandidateAction], goal: &str) -> Option<Vec<String>> {
        #[derive(Clone)]
        struct Node {
            path: Vec<String>,
            effects: Vec<String>,
            value: f64,
        }

        let mut frontier = vec![Node { path: Vec::new(), effects: Vec::new(), value: 0.0 }];

        for depth in 0..self.config.planner_max_depth {
            let discount = self.config.planner_discount.powi(depth as i32);
            let mut next_frontier: Vec<Node> = Vec::new();

            for node in &frontier {
                if node.effects.iter().any(|e| e == goal) {
                    continue;
                }
                for action in actions {
                    if !action.preconditions.iter().all(|p| node.effects.contains(p)) {
                        continue;
                    }
                    let (verdict, _) = self.risk_gate(ctx, action);
                    if verdict == GateVerdict::Block {
                        continue;
                    }
                    let (step_utility, _) = self.utility(ctx, action);
                    let mut effects = node.effects.clone();
                    effects.extend(action.effects.iter().cloned());
                    let mut path = node.path.clone();
                    path.push(action.name.clone());
                    next_frontier.push(Node { path, effects, value: node.value + discount * step_utility });
                }
            }

            if next_frontier.is_empty() {
                break;
            }
            next_frontier.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal));
            next_frontier.truncate(self.config.planner_beam);
            frontier = next_frontier;

            if frontier.iter().any(|n| n.effects.iter().any(|e| e == goal)) {
                break;
            }
        }

        frontier
            .into_iter()
            .filter(|n| n.effects.iter().any(|e| e == goal))
            .max_by(|a, b| a.value.partial_cmp(&b.value).unwrap_or(std::cmp::Ordering::Equal))
            .map(|n| n.path)
    }
}
