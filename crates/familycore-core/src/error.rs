//! Error taxonomy (spec §7)
//!
//! Each subsystem defines its own `thiserror::Error` enum (see
//! `storage::StorageError`, `bus::BusError`, `uow::UowError`,
//! `retrieval::RetrievalError`, `temporal::TemporalError`,
//! `hippocampus::HippocampusError`, `arbiter::ArbiterError`). At the
//! Pipeline Orchestrator boundary (C10) every subsystem error collapses
//! into one [`ErrorKind`] so handlers decide Ack / Nack / DLQ without
//! matching on subsystem-specific variants.

use std::fmt;

/// The error *kinds* from spec §7 — not specific error names, but the
/// categories that drive retry/DLQ/rollback behavior uniformly across
/// subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Schema invalid, missing `mls_group` at AMBER+, unknown topic.
    /// Non-retriable; DLQ immediately.
    InvariantViolation,
    /// Disk/IO errors. Retriable by caller with backoff; fatal to the
    /// in-flight UoW.
    SubstrateFailure,
    /// Time budget exhausted. Retriable up to `max_attempts` for bus
    /// handlers; retrieval returns partial results with reasons instead.
    Deadline,
    /// The policy evaluator returned `deny`. Non-retriable; no side
    /// effects; a `pipeline.reject` event is emitted.
    PolicyDenial,
    /// Idempotency ledger hit. Non-error; returns the prior receipt.
    Duplicate,
    /// Transient backpressure; producer must apply the recommended delay.
    Busy,
    /// Embedding/redactor capability failed deterministically; retrieval
    /// or encode proceeds in degraded mode.
    PoisonedDependency,
}

impl ErrorKind {
    /// Whether a bus handler nacking with this kind should be retried
    /// (subject to `max_attempts`) rather than sent straight to the DLQ.
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            ErrorKind::SubstrateFailure | ErrorKind::Deadline | ErrorKind::Busy
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvariantViolation => "invariant_violation",
            ErrorKind::SubstrateFailure => "substrate_failure",
            ErrorKind::Deadline => "deadline",
            ErrorKind::PolicyDenial => "policy_denial",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Busy => "busy",
            ErrorKind::PoisonedDependency => "poisoned_dependency",
        };
        write!(f, "{s}")
    }
}

/// Trait implemented by every subsystem error enum so the orchestrator can
/// classify without a match statement per subsystem.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Top-level error the Pipeline Orchestrator (C10) surfaces from a handler
/// invocation, wrapping whichever subsystem error occurred while carrying
/// its classification.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {source}")]
pub struct CoreError {
    pub kind: ErrorKind,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl CoreError {
    pub fn new<E>(kind: ErrorKind, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
