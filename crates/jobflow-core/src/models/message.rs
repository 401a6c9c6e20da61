use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Recipient name that addresses every subscriber except the sender.
pub const BROADCAST: &str = "*";

/// Kinds of messages exchanged between pipeline participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    CompanyIntel,
    JobAnalysis,
    ScoringResult,
    PositioningStrategy,
    ContentRequest,
    ContentGenerated,
    QaRequest,
    QaResult,
    Error,
    Status,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompanyIntel => "company_intel",
            Self::JobAnalysis => "job_analysis",
            Self::ScoringResult => "scoring_result",
            Self::PositioningStrategy => "positioning_strategy",
            Self::ContentRequest => "content_request",
            Self::ContentGenerated => "content_generated",
            Self::QaRequest => "qa_request",
            Self::QaResult => "qa_result",
            Self::Error => "error",
            Self::Status => "status",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "company_intel" => Some(Self::CompanyIntel),
            "job_analysis" => Some(Self::JobAnalysis),
            "scoring_result" => Some(Self::ScoringResult),
            "positioning_strategy" => Some(Self::PositioningStrategy),
            "content_request" => Some(Self::ContentRequest),
            "content_generated" => Some(Self::ContentGenerated),
            "qa_request" => Some(Self::QaRequest),
            "qa_result" => Some(Self::QaResult),
            "error" => Some(Self::Error),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    /// Kind an agent answers with when it receives a message of this kind.
    pub fn reply_kind(&self) -> MessageKind {
        match self {
            Self::ContentRequest => Self::ContentGenerated,
            Self::QaRequest => Self::QaResult,
            other => *other,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of communication on the message bus.
///
/// Envelopes are immutable once built: the bus clones them for delivery and
/// history, and replies are new envelopes that reuse the request's
/// correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    pub correlation_id: String,
    /// Id of the request this envelope answers, if it is a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentMessage {
    /// Build a new envelope with a fresh correlation id.
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        kind: MessageKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: sender.into(),
            recipient: recipient.into(),
            kind,
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            reply_to: None,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Build a reply addressed back to this message's sender.
    ///
    /// The reply keeps the correlation id and records this message's id in
    /// `reply_to`; request metadata is carried over so step context survives
    /// the round trip.
    pub fn reply(
        &self,
        sender: impl Into<String>,
        kind: MessageKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: sender.into(),
            recipient: self.sender.clone(),
            kind,
            payload,
            correlation_id: self.correlation_id.clone(),
            reply_to: Some(self.id.clone()),
            created_at: Utc::now(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient == BROADCAST
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_keeps_correlation_and_points_at_request() {
        let request = AgentMessage::new(
            "workflow_engine",
            "scoring_agent",
            MessageKind::ScoringResult,
            json!({"job": "abc"}),
        )
        .with_correlation_id("abc123")
        .with_metadata("step", json!("scoring"));

        let reply = request.reply("scoring_agent", MessageKind::ScoringResult, json!({"success": true}));

        assert_eq!(reply.correlation_id, "abc123");
        assert_eq!(reply.recipient, "workflow_engine");
        assert_eq!(reply.reply_to.as_deref(), Some(request.id.as_str()));
        assert_eq!(reply.metadata.get("step"), Some(&json!("scoring")));
        assert_ne!(reply.id, request.id);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let value = serde_json::to_value(MessageKind::PositioningStrategy).unwrap();
        assert_eq!(value, json!("positioning_strategy"));
        assert_eq!(MessageKind::from_str("qa_request"), Some(MessageKind::QaRequest));
        assert_eq!(MessageKind::from_str("nope"), None);
    }
}
