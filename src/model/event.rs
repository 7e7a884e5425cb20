//! The append-only Event type and the tagged kinds it may carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CallId, EventId, ThreadId};
use super::tool::{ApprovalDecision, ContentPart, ToolOutcome};

/// Token usage recorded against an `AGENT_MESSAGE` event, when the
/// Provider reports one at the end of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The kind-specific payload of an Event. Tagged union mirroring the
/// closed set of event kinds in the data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    UserMessage {
        text: String,
    },
    AgentMessage {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    ToolCall {
        call_id: CallId,
        tool_name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        call_id: CallId,
        outcome: ToolOutcome,
        content: Vec<ContentPart>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ToolApprovalRequest {
        call_id: CallId,
    },
    ToolApprovalResponse {
        call_id: CallId,
        decision: ApprovalDecision,
    },
    SystemNote {
        text: String,
    },
}

impl EventPayload {
    /// The callId this payload is keyed on, for kinds that carry one.
    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            EventPayload::ToolCall { call_id, .. }
            | EventPayload::ToolResult { call_id, .. }
            | EventPayload::ToolApprovalRequest { call_id }
            | EventPayload::ToolApprovalResponse { call_id, .. } => Some(call_id),
            _ => None,
        }
    }
}

/// A single entry in a Thread's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub thread_id: ThreadId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn new(thread_id: ThreadId, timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            thread_id,
            timestamp,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(payload: EventPayload) -> Event {
        Event::new(ThreadId::new(), Utc::now(), payload)
    }

    #[test]
    fn user_message_roundtrip() {
        let event = sample_event(EventPayload::UserMessage {
            text: "hello".into(),
        });
        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        match parsed.payload {
            EventPayload::UserMessage { text } => assert_eq!(text, "hello"),
            _ => panic!("expected UserMessage"),
        }
    }

    #[test]
    fn tag_uses_screaming_snake_case() {
        let event = sample_event(EventPayload::ToolApprovalRequest {
            call_id: CallId::from("c1"),
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"TOOL_APPROVAL_REQUEST\""));
    }

    #[test]
    fn call_id_extracted_for_tool_kinds() {
        let event = sample_event(EventPayload::ToolCall {
            call_id: CallId::from("c1"),
            tool_name: "bash".into(),
            arguments: serde_json::json!({"command": "ls"}),
        });
        assert_eq!(event.payload.call_id().unwrap().0, "c1");
    }

    #[test]
    fn call_id_absent_for_user_message() {
        let event = sample_event(EventPayload::UserMessage {
            text: "hi".into(),
        });
        assert!(event.payload.call_id().is_none());
    }

    #[test]
    fn agent_message_without_usage_omits_field() {
        let event = sample_event(EventPayload::AgentMessage {
            text: "done".into(),
            usage: None,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("usage"));
    }

    #[test]
    fn tool_result_roundtrip_with_error() {
        let event = sample_event(EventPayload::ToolResult {
            call_id: CallId::from("c1"),
            outcome: ToolOutcome::Denied,
            content: vec![ContentPart::Text {
                text: "tool 'bash' denied by policy".into(),
            }],
            error: Some("tool 'bash' denied by policy".into()),
        });
        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        match parsed.payload {
            EventPayload::ToolResult { outcome, .. } => assert_eq!(outcome, ToolOutcome::Denied),
            _ => panic!("expected ToolResult"),
        }
    }
}
