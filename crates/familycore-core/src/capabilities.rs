//! Capability facades (C12) — thin adapters over externally-provided
//! policy, redaction, crypto, and embedding implementations. The core
//! never embeds rules or cryptographic primitives directly; it only
//! defines the interface and a few local-operation defaults suitable for
//! a single-device deployment with no external provider configured.

use serde::{Deserialize, Serialize};

use crate::ids::{ActorRef, Band};

// ============================================================================
// POLICY EVALUATOR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyDecision {
    Permit,
    Deny,
    Confirm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub decision: PolicyDecision,
    pub band: Band,
    pub reasons: Vec<String>,
    pub obligations: Vec<String>,
}

/// Evaluation context: the action being attempted and the resource it
/// targets, as opaque strings the evaluator interprets.
#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub action: String,
    pub resource: String,
    pub ctx: serde_json::Value,
}

pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(&self, actor: &ActorRef, ctx: &PolicyContext) -> PolicyVerdict;
}

/// A permissive local evaluator: always permits at the caller-supplied
/// band with no obligations. Used when no external ABAC/RBAC provider is
/// wired (single-device, pre-replication deployments).
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitAllPolicyEvaluator;

impl PolicyEvaluator for PermitAllPolicyEvaluator {
    fn evaluate(&self, _actor: &ActorRef, _ctx: &PolicyContext) -> PolicyVerdict {
        PolicyVerdict {
            decision: PolicyDecision::Permit,
            band: Band::Green,
            reasons: vec!["no policy evaluator configured: permit-all default".to_string()],
            obligations: Vec::new(),
        }
    }
}

// ============================================================================
// REDACTOR
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiTag {
    pub kind: String,
    pub span: (usize, usize),
}

/// Deterministic, pure PII scrubber.
pub trait Redactor: Send + Sync {
    fn scrub(&self, text: &str, actor: &ActorRef, band: Band) -> (String, Vec<PiiTag>);
}

/// No-op redactor: returns the text unchanged. Used only when an external
/// redaction provider is not configured; callers at AMBER+ should not rely
/// on this in a multi-device deployment.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRedactor;

impl Redactor for NoopRedactor {
    fn scrub(&self, text: &str, _actor: &ActorRef, _band: Band) -> (String, Vec<PiiTag>) {
        (text.to_string(), Vec::new())
    }
}

// ============================================================================
// KEYSTORE
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("encryption not configured for space")]
    NotConfigured,
    #[error("signature verification failed")]
    BadSignature,
}

pub trait KeyStore: Send + Sync {
    fn encrypt(&self, bytes: &[u8], space_id: &str) -> Result<Vec<u8>, KeyStoreError>;
    fn decrypt(&self, sealed: &[u8], space_id: &str) -> Result<Vec<u8>, KeyStoreError>;
    fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, KeyStoreError>;
    fn verify(&self, bytes: &[u8], signature: &[u8]) -> Result<bool, KeyStoreError>;
}

/// Passthrough keystore for local, single-device operation without an
/// MLS-backed crypto provider: encryption is the identity function,
/// signatures always verify. Never use in a multi-device deployment.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughKeyStore;

impl KeyStore for PassthroughKeyStore {
    fn encrypt(&self, bytes: &[u8], _space_id: &str) -> Result<Vec<u8>, KeyStoreError> {
        Ok(bytes.to_vec())
    }

    fn decrypt(&self, sealed: &[u8], _space_id: &str) -> Result<Vec<u8>, KeyStoreError> {
        Ok(sealed.to_vec())
    }

    fn sign(&self, _bytes: &[u8]) -> Result<Vec<u8>, KeyStoreError> {
        Ok(Vec::new())
    }

    fn verify(&self, _bytes: &[u8], _signature: &[u8]) -> Result<bool, KeyStoreError> {
        Ok(true)
    }
}

// ============================================================================
// EMBEDDING PROVIDER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DenseVec(pub Vec<f32>);

/// Non-blocking dense-embedding provider. Failure is tolerated: retrieval
/// degrades to the sparse TF-IDF path (spec §6, §4.5 step 2).
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, texts: &[String]) -> Option<Vec<DenseVec>>;
}

/// Always-degrades provider: reports no dense vectors available, so the
/// ranker falls back to the sparse path. This is the correct default when
/// no embedding model is configured, not a stub to be "completed" later.
#[derive(Debug, Clone, Copy, Default)]
pub struct DegradedEmbeddingProvider;

impl EmbeddingProvider for DegradedEmbeddingProvider {
    fn embed(&self, _texts: &[String]) -> Option<Vec<DenseVec>> {
        None
    }
}
