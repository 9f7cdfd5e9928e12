//! Wire types: upstream transcript events and downstream notifications.
//!
//! ## Notification wire shape
//!
//! ```json
//! {"seq": 12, "type": "topicUpdate", "topicId": 1, "topic": "Solar Energy",
//!  "keywords": ["solar"], "isNew": true, "totalTopics": 2}
//! ```
//!
//! Variant tags are camelCase (`transcript`, `topicUpdate`, `claimSelected`,
//! `factResult`, `error`), fields camelCase, verdicts UPPERCASE.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ColloquyError, Result};

// ---------------------------------------------------------------------------
// Upstream transcript events
// ---------------------------------------------------------------------------

/// One event from the speech-to-text source.
///
/// Only `is_final == true` events advance the topic and claim counters;
/// partials are forwarded to observers and otherwise ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptUpdate {
    /// Recognised text (a sentence when final, a prefix when partial).
    pub text: String,
    /// Whether the upstream source has committed this text.
    pub is_final: bool,
    /// Source confidence in [0.0, 1.0].
    pub confidence: f32,
    /// Optional per-word confidences, when the source provides them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_confidences: Option<Vec<f32>>,
    /// When the event was received from the transport.
    pub received_at: DateTime<Utc>,
}

impl TranscriptUpdate {
    /// A final sentence received now with full confidence. Host convenience.
    pub fn final_sentence(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            confidence: 1.0,
            word_confidences: None,
            received_at: Utc::now(),
        }
    }

    /// A partial hypothesis received now.
    pub fn partial(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            confidence,
            word_confidences: None,
            received_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Outcome of verifying one claim against retrieved evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Supported,
    Refuted,
    Uncertain,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Supported => "SUPPORTED",
            Verdict::Refuted => "REFUTED",
            Verdict::Uncertain => "UNCERTAIN",
        }
    }

    /// Parse a verdict string from an LLM response.
    ///
    /// Anything outside the enumerated set is a policy violation, not a
    /// parse failure — the response was well-formed JSON that broke the
    /// contract.
    pub fn parse_policy(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUPPORTED" => Ok(Verdict::Supported),
            "REFUTED" => Ok(Verdict::Refuted),
            "UNCERTAIN" => Ok(Verdict::Uncertain),
            other => Err(ColloquyError::Policy(format!(
                "verdict {other:?} is outside the enumerated set"
            ))),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Downstream notifications
// ---------------------------------------------------------------------------

/// One notification delivered to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Monotonically increasing sequence number across all event types.
    pub seq: u64,
    #[serde(flatten)]
    pub payload: NotificationPayload,
}

/// Notification payloads, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NotificationPayload {
    /// Every transcript event, partial or final.
    Transcript {
        text: String,
        is_final: bool,
        confidence: f32,
    },
    /// A topic was created or reused.
    TopicUpdate {
        topic_id: u64,
        topic: String,
        keywords: Vec<String>,
        is_new: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        total_topics: usize,
    },
    /// A claim was enqueued for verification.
    ClaimSelected { claim: String, queue_size: usize },
    /// A claim finished the verification pipeline.
    FactResult {
        claim: String,
        verdict: Verdict,
        confidence: f32,
        explanation: String,
        key_facts: Vec<String>,
        sources: Vec<String>,
    },
    /// A pipeline step failed; the stream continues.
    Error { kind: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_update_serializes_with_camel_case() {
        let update = TranscriptUpdate {
            text: "hello".into(),
            is_final: true,
            confidence: 0.93,
            word_confidences: None,
            received_at: Utc::now(),
        };

        let json = serde_json::to_value(&update).expect("serialize transcript update");
        assert_eq!(json["text"], "hello");
        assert_eq!(json["isFinal"], true);
        assert!(json.get("wordConfidences").is_none());
        let conf = json["confidence"].as_f64().expect("confidence is a number");
        assert!((conf - 0.93).abs() < 1e-5);
    }

    #[test]
    fn topic_update_notification_uses_camel_case_tag() {
        let event = Notification {
            seq: 4,
            payload: NotificationPayload::TopicUpdate {
                topic_id: 1,
                topic: "Solar Energy".into(),
                keywords: vec!["solar".into()],
                is_new: true,
                image_url: None,
                total_topics: 2,
            },
        };

        let json = serde_json::to_value(&event).expect("serialize notification");
        assert_eq!(json["seq"], 4);
        assert_eq!(json["type"], "topicUpdate");
        assert_eq!(json["topicId"], 1);
        assert_eq!(json["isNew"], true);
        assert_eq!(json["totalTopics"], 2);
        assert!(json.get("imageUrl").is_none());

        let round_trip: Notification =
            serde_json::from_value(json).expect("deserialize notification");
        assert_eq!(round_trip.seq, 4);
        assert!(matches!(
            round_trip.payload,
            NotificationPayload::TopicUpdate { topic_id: 1, .. }
        ));
    }

    #[test]
    fn fact_result_notification_serializes_verdict_uppercase() {
        let event = Notification {
            seq: 9,
            payload: NotificationPayload::FactResult {
                claim: "Water boils at 100C at sea level".into(),
                verdict: Verdict::Supported,
                confidence: 0.96,
                explanation: "Standard physics".into(),
                key_facts: vec!["boiling point 100C".into()],
                sources: vec!["https://example.org".into()],
            },
        };

        let json = serde_json::to_value(&event).expect("serialize notification");
        assert_eq!(json["type"], "factResult");
        assert_eq!(json["verdict"], "SUPPORTED");
        assert_eq!(json["keyFacts"][0], "boiling point 100C");
    }

    #[test]
    fn verdict_outside_enumerated_set_is_a_policy_error() {
        let err = Verdict::parse_policy("MAYBE").unwrap_err();
        assert_eq!(err.kind(), "policy");
        assert_eq!(Verdict::parse_policy("supported").unwrap(), Verdict::Supported);
    }
}
