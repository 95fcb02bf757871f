//! Canonical topic catalogue (spec §6).
//!
//! Each topic carries a retention policy, a maximum envelope size, and a
//! required-obligations template used by [`crate::envelope::Envelope::validate`].

use std::time::Duration;

use crate::config::Retention;
use crate::envelope::{OBLIGATION_AUDIT_ACCESS, OBLIGATION_TOMBSTONE_ON_DELETE};

/// Descriptor for one topic.
#[derive(Debug, Clone)]
pub struct TopicSpec {
    pub name: String,
    pub max_envelope_bytes: usize,
    pub required_obligations: &'static [&'static str],
    pub is_tombstone_applied: bool,
    pub is_audited: bool,
}

pub const HIPPO_ENCODE: &str = "hippo.encode";
pub const CORTEX_PREDICTION: &str = "cortex.prediction";
pub const ACTION_DECISION: &str = "action.decision";
pub const ACTION_EXECUTED: &str = "action.executed";
pub const ATTENTION_ADMISSION: &str = "attention.admission";
pub const AFFECT_ANNOTATED: &str = "affect.annotated";
pub const BELIEF_UPDATE: &str = "belief.update";
pub const WORKSPACE_BROADCAST: &str = "workspace.broadcast";
pub const PROSPECTIVE_TRIGGER: &str = "prospective.trigger";
pub const RETRIEVAL_REQUEST: &str = "retrieval.request";
pub const RETRIEVAL_RESPONSE: &str = "retrieval.response";
pub const ROLLUP_APPLY: &str = "rollup.apply";
pub const PIPELINE_REJECT: &str = "pipeline.reject";

/// Pipeline topic names P01..P20, `{request,result}` per pipeline.
pub fn pipeline_request_topic(n: u8) -> String {
    format!("pipelines.p{n:02}.request")
}

pub fn pipeline_result_topic(n: u8) -> String {
    format!("pipelines.p{n:02}.result")
}

const DEFAULT_MAX_ENVELOPE_BYTES: usize = 256 * 1024;

/// Look up the static descriptor for a canonical topic name. Pipeline
/// topics (`pipelines.pNN.{request,result}`) and any topic not in the
/// canonical set get the default descriptor with no required obligations.
pub fn lookup(topic: &str) -> TopicSpec {
    match topic {
        HIPPO_ENCODE => TopicSpec {
            name: HIPPO_ENCODE.to_string(),
            max_envelope_bytes: DEFAULT_MAX_ENVELOPE_BYTES,
            required_obligations: &[],
            is_tombstone_applied: false,
            is_audited: false,
        },
        ACTION_DECISION => TopicSpec {
            name: ACTION_DECISION.to_string(),
            max_envelope_bytes: DEFAULT_MAX_ENVELOPE_BYTES,
            required_obligations: &[],
            is_tombstone_applied: false,
            is_audited: true,
        },
        ROLLUP_APPLY => TopicSpec {
            name: ROLLUP_APPLY.to_string(),
            max_envelope_bytes: DEFAULT_MAX_ENVELOPE_BYTES,
            required_obligations: &[OBLIGATION_TOMBSTONE_ON_DELETE],
            is_tombstone_applied: true,
            is_audited: false,
        },
        other => TopicSpec {
            name: other.to_string(),
            max_envelope_bytes: DEFAULT_MAX_ENVELOPE_BYTES,
            required_obligations: &[],
            is_tombstone_applied: false,
            is_audited: false,
        },
    }
}

/// Required-obligations helper matching spec §6's rule: tombstone-applied
/// topics require `TOMBSTONE_ON_DELETE`; audited topics (subject-access
/// export, band-change, receipt-created, and `action.decision`) require
/// `AUDIT_ACCESS`.
pub fn required_obligations_for(topic: &str) -> Vec<&'static str> {
    let spec = lookup(topic);
    let mut obligations = Vec::new();
    if spec.is_tombstone_applied {
        obligations.push(OBLIGATION_TOMBSTONE_ON_DELETE);
    }
    if spec.is_audited {
        obligations.push(OBLIGATION_AUDIT_ACCESS);
    }
    obligations
}

pub fn default_retention(topic: &str) -> Retention {
    if topic == HIPPO_ENCODE {
        Retention {
            max_bytes: 1024 * 1024 * 1024,
            max_age: Duration::from_secs(30 * 24 * 3600),
        }
    } else {
        Retention {
            max_bytes: 256 * 1024 * 1024,
            max_age: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_decision_is_audited() {
        assert_eq!(required_obligations_for(ACTION_DECISION), vec![OBLIGATION_AUDIT_ACCESS]);
    }

    #[test]
    fn rollup_apply_requires_tombstone_marker() {
        assert_eq!(
            required_obligations_for(ROLLUP_APPLY),
            vec![OBLIGATION_TOMBSTONE_ON_DELETE]
        );
    }

    #[test]
    fn pipeline_topic_names_follow_convention() {
        assert_eq!(pipeline_request_topic(1), "pipelines.p01.request");
        assert_eq!(pipeline_result_topic(20), "pipelines.p20.result");
    }
}
