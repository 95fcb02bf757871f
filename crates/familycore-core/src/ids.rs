//! Core identifiers and primitives
//!
//! `EventId` is ULID-class: lexicographically sortable, monotonic per
//! device, 128 bits. `Timestamp` is a thin alias over a UTC instant with
//! nanosecond precision. `SpaceId`, `Band`, and `TraceId` are the remaining
//! primitives shared by every envelope and every subsystem.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

// ============================================================================
// EVENT ID
// ============================================================================

/// Lexicographically-sortable opaque 128-bit event identifier (ULID-class).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Ulid);

impl EventId {
    /// Generate a new id using the current wall clock.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Generate a new id at a specific timestamp, used by components that
    /// must derive deterministic ids (e.g. replayed DLQ records).
    pub fn from_timestamp_ms(ts_ms: u64) -> Self {
        Self(Ulid::from_parts(ts_ms, rand::random()))
    }

    pub fn as_u128(&self) -> u128 {
        self.0.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Ulid::from_str(s)?))
    }
}

// ============================================================================
// TIMESTAMP
// ============================================================================

/// UTC instant with nanosecond precision.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

// ============================================================================
// SPACE ID
// ============================================================================

/// Opaque string naming a memory scope (e.g. `personal:alice`, `shared:family`).
/// All stored data is space-scoped; physical layout may be shared across
/// spaces but logical scoping is enforced at every read path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceId(String);

impl SpaceId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sanitized form safe for use as a filesystem path component.
    pub fn path_safe(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SpaceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SpaceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// ACTOR REF
// ============================================================================

/// Identifies the person and device that produced an event or action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    pub person_id: String,
    pub device_id: String,
}

impl ActorRef {
    pub fn new(person_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            person_id: person_id.into(),
            device_id: device_id.into(),
        }
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.person_id, self.device_id)
    }
}

// ============================================================================
// BAND
// ============================================================================

/// Total-ordered policy classification of an envelope.
///
/// `GREEN` (shareable) < `AMBER` (family-scoped, encrypted) < `RED`
/// (sensitive) < `BLACK` (blocked from automation).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Band {
    #[default]
    Green,
    Amber,
    Red,
    Black,
}

impl Band {
    /// Whether this band requires an `mls_group` on the envelope.
    pub fn requires_mls_group(self) -> bool {
        self >= Band::Amber
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Band::Green => "GREEN",
            Band::Amber => "AMBER",
            Band::Red => "RED",
            Band::Black => "BLACK",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Band {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GREEN" => Ok(Band::Green),
            "AMBER" => Ok(Band::Amber),
            "RED" => Ok(Band::Red),
            "BLACK" => Ok(Band::Black),
            other => Err(format!("unknown band: {other}")),
        }
    }
}

// ============================================================================
// TRACE ID
// ============================================================================

/// Correlation id carried across every envelope derived from the same
/// causal chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(Ulid);

impl TraceId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TraceId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Ulid::from_str(s)?))
    }
}
