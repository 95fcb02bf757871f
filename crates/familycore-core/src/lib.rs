//! # familycore-core
//!
//! Cognitive event & decision core for an on-device family-memory platform:
//! a durable, at-least-once event bus; an attention gate that triages what
//! gets remembered; a hippocampal memory-formation pipeline (separate,
//! bridge, consolidate); a hybrid retrieval and ranking engine; a cortex
//! predictor; a linear-utility arbitration/decision engine; a multi-resolution
//! temporal index; and the pipeline orchestrator that wires all of the above
//! onto twenty named pipelines bound to the canonical topic set.
//!
//! ## Layering
//!
//! - [`storage`] — per-space SQLite substrate (five attached KV databases)
//!   plus an append-only, checksummed write-ahead log per topic.
//! - [`bus`] — synchronous publish/poll/complete API over the substrate,
//!   with a dead-letter queue and an outbox drained after every commit.
//! - [`uow`] — the unit-of-work that groups an episode write, index
//!   rebuild hook, and outbox event under one idempotency-keyed commit.
//! - [`envelope`] — the wire-normative event envelope, its QoS/obligation
//!   metadata, and validation.
//! - [`attention`], [`hippocampus`], [`temporal`], [`retrieval`], [`cortex`],
//!   [`arbiter`] — the cognitive components, each a library with no bus
//!   dependency of its own.
//! - [`pipelines`] — the orchestrator (C10) binding the above onto bus
//!   topics as the fixed twenty-pipeline catalogue.
//!
//! Cross-cutting: [`config`] (a single typed configuration record with an
//! env-var overlay), [`error`] (the shared `Classify` contract every
//! subsystem's error enum implements, collapsing into [`error::ErrorKind`]
//! at the orchestrator boundary), [`clock`] (injectable time), [`ids`]
//! (space/actor/event identifiers), [`capabilities`] (policy, redaction,
//! key storage, and embedding provider traits a deployment injects), and
//! [`metrics`] (an in-process counter/gauge/histogram registry).

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod arbiter;
pub mod attention;
pub mod bus;
pub mod capabilities;
pub mod clock;
pub mod config;
pub mod cortex;
pub mod envelope;
pub mod error;
pub mod hippocampus;
pub mod ids;
pub mod metrics;
pub mod pipelines;
pub mod retrieval;
pub mod storage;
pub mod temporal;
pub mod topics;
pub mod uow;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Shared error contract
pub use error::{Classify, CoreError, ErrorKind, Result};

// Configuration
pub use config::{ArbiterConfig, AttentionConfig, BusConfig, CoreConfig, CortexConfig, RankerWeights, Retention, RetrievalConfig, TemporalConfig};

// Clock
pub use clock::{Clock, FixedClock, SystemClock};

// Identifiers
pub use ids::{ActorRef, Band, EventId, SpaceId, Timestamp, TraceId};

// Wire envelope
pub use envelope::{Envelope, EnvelopeBuilder, EnvelopeInvalid, Hashes, Qos, OBLIGATION_AUDIT_ACCESS, OBLIGATION_TOMBSTONE_ON_DELETE};

// Injected capabilities
pub use capabilities::{
    DegradedEmbeddingProvider, DenseVec, EmbeddingProvider, KeyStore, KeyStoreError, NoopRedactor, PassthroughKeyStore, PermitAllPolicyEvaluator, PiiTag,
    PolicyContext, PolicyDecision, PolicyEvaluator, PolicyVerdict, Redactor,
};

// Metrics
pub use metrics::{HistogramSnapshot, Metrics, MetricsSnapshot};

// Canonical topics
pub use topics::{
    default_retention, pipeline_request_topic, pipeline_result_topic, required_obligations_for, TopicSpec, ACTION_DECISION, ACTION_EXECUTED,
    AFFECT_ANNOTATED, ATTENTION_ADMISSION, BELIEF_UPDATE, CORTEX_PREDICTION, HIPPO_ENCODE, PIPELINE_REJECT, PROSPECTIVE_TRIGGER, RETRIEVAL_REQUEST,
    RETRIEVAL_RESPONSE, ROLLUP_APPLY, WORKSPACE_BROADCAST,
};

// Storage substrate
pub use storage::{DlqRow, EpisodeRow, OutboxRow, ReceiptRow, SnapshotHandle, SpaceStorage, Storage, StorageError, WalLog, WalRecord};

// Unit of work
pub use uow::{derive_idem_key, EpisodeDraft, Receipt, UnitOfWork, UowError, UowHandle};

// Event bus
pub use bus::{Bus, BusError, Delivery, HandlerOutcome};

// Attention gate
pub use attention::{AttentionGate, AttentionInput, AttentionOutcome, AttentionState, Decision};

// Hippocampal memory formation
pub use hippocampus::{CompletionMatch, ConsolidationCandidate, Hippocampus, RollupEvent, SparseCode};

// Temporal index
pub use temporal::{HourBucket, PhraseRange, TemporalError, TemporalFeatures, TemporalIndex, TemporalKey};

// Hybrid retrieval and ranking
pub use retrieval::{CandidateFeatures, Calibration, FeatureContribution, IndexedDocument, RankedCandidate, Retriever, SearchRequest, SearchResponse, TraceEntry};

// Cortex predictor
pub use cortex::{CortexFeatures, CortexPredictor, CortexPrediction, Tier1Model};

// Arbiter / decision engine
pub use arbiter::{Arbiter, CandidateAction, DecisionContext, DecisionFrame, ScoredAction};

// Pipeline orchestrator
pub use pipelines::{catalogue, run_pipeline_once, verify_space, PipelineContext, PipelineEffect, PipelineError, PipelineHandler, SpaceRuntime, VerifyReport};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for embedding `familycore-core` into a host process
/// (the operator CLI, a test harness, or an in-process daemon).
pub mod prelude {
    pub use crate::{
        Arbiter, AttentionGate, Band, Bus, CandidateAction, Classify, CoreConfig, CoreError, DecisionContext, Envelope, EnvelopeBuilder, ErrorKind,
        EventId, Hippocampus, PipelineContext, PipelineEffect, PipelineHandler, Result, Retriever, SearchRequest, SpaceId, Storage, TemporalIndex,
    };
}
