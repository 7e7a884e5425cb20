//! Thread: an ordered conversation, and its replay-derived logical view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::event::{Event, EventPayload, TokenUsage};
use super::ids::{CallId, ProjectId, SessionId, ThreadId};
use super::tool::{ToolCall, ToolOutcome};

/// A Thread's header: everything except its event log. A Thread's entire
/// semantic state is the fold of its events (`ThreadView`, below).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: ThreadId,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Thread {
    pub fn new(session_id: Option<SessionId>, project_id: Option<ProjectId>) -> Self {
        let now = Utc::now();
        Self {
            id: ThreadId::new(),
            session_id,
            project_id,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }
}

/// A pending approval, as surfaced by replay: a `TOOL_APPROVAL_REQUEST`
/// with no matching `TOOL_APPROVAL_RESPONSE`, joined with its originating
/// `TOOL_CALL` for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    pub thread_id: ThreadId,
    pub call_id: CallId,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub requested_at: DateTime<Utc>,
}

/// The logical view of a Thread, produced by folding its event log once.
/// This is the Thread Manager's replay output (§4.B): ordered events, open
/// tool calls, pending approvals, and cumulative token usage.
#[derive(Debug, Clone, Default)]
pub struct ThreadView {
    pub events: Vec<Event>,
    pub open_tool_calls: HashMap<CallId, ToolCall>,
    pub pending_approvals: Vec<PendingApproval>,
    pub token_usage: TokenUsage,
}

impl ThreadView {
    /// Fold a thread's event log into its logical view. Pure function of
    /// the log: replaying the same events twice produces an identical view
    /// (the replay-determinism property in §8).
    pub fn replay(thread_id: &ThreadId, events: Vec<Event>) -> Self {
        let mut view = ThreadView::default();
        let mut requests: HashMap<CallId, DateTime<Utc>> = HashMap::new();

        for event in &events {
            match &event.payload {
                EventPayload::ToolCall {
                    call_id,
                    tool_name,
                    arguments,
                } => {
                    view.open_tool_calls.insert(
                        call_id.clone(),
                        ToolCall {
                            call_id: call_id.clone(),
                            tool_name: tool_name.clone(),
                            arguments: arguments.clone(),
                        },
                    );
                }
                EventPayload::ToolResult { call_id, .. } => {
                    view.open_tool_calls.remove(call_id);
                    requests.remove(call_id);
                }
                EventPayload::ToolApprovalRequest { call_id } => {
                    requests.insert(call_id.clone(), event.timestamp);
                }
                EventPayload::ToolApprovalResponse { call_id, .. } => {
                    requests.remove(call_id);
                }
                EventPayload::AgentMessage { usage: Some(usage), .. } => {
                    view.token_usage.input_tokens += usage.input_tokens;
                    view.token_usage.output_tokens += usage.output_tokens;
                }
                _ => {}
            }
        }

        view.pending_approvals = requests
            .into_iter()
            .filter_map(|(call_id, requested_at)| {
                view.open_tool_calls.get(&call_id).map(|call| PendingApproval {
                    thread_id: thread_id.clone(),
                    call_id: call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    arguments: call.arguments.clone(),
                    requested_at,
                })
            })
            .collect();
        view.pending_approvals
            .sort_by_key(|a| a.requested_at);

        view.events = events;
        view
    }

    /// The resolved outcome for a callId, if its `TOOL_RESULT` has been
    /// appended.
    pub fn outcome_of(&self, call_id: &CallId) -> Option<ToolOutcome> {
        self.events.iter().find_map(|event| match &event.payload {
            EventPayload::ToolResult {
                call_id: id,
                outcome,
                ..
            } if id == call_id => Some(*outcome),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tool::ContentPart;

    fn evt(thread_id: &ThreadId, payload: EventPayload) -> Event {
        Event::new(thread_id.clone(), Utc::now(), payload)
    }

    #[test]
    fn replay_tracks_open_tool_calls() {
        let thread_id = ThreadId::new();
        let call_id = CallId::from("c1");
        let events = vec![evt(
            &thread_id,
            EventPayload::ToolCall {
                call_id: call_id.clone(),
                tool_name: "bash".into(),
                arguments: serde_json::json!({}),
            },
        )];

        let view = ThreadView::replay(&thread_id, events);
        assert!(view.open_tool_calls.contains_key(&call_id));
    }

    #[test]
    fn replay_closes_tool_call_on_result() {
        let thread_id = ThreadId::new();
        let call_id = CallId::from("c1");
        let events = vec![
            evt(
                &thread_id,
                EventPayload::ToolCall {
                    call_id: call_id.clone(),
                    tool_name: "bash".into(),
                    arguments: serde_json::json!({}),
                },
            ),
            evt(
                &thread_id,
                EventPayload::ToolResult {
                    call_id: call_id.clone(),
                    outcome: ToolOutcome::Completed,
                    content: vec![ContentPart::Text { text: "ok".into() }],
                    error: None,
                },
            ),
        ];

        let view = ThreadView::replay(&thread_id, events);
        assert!(!view.open_tool_calls.contains_key(&call_id));
        assert_eq!(view.outcome_of(&call_id), Some(ToolOutcome::Completed));
    }

    #[test]
    fn replay_surfaces_pending_approval_without_response() {
        let thread_id = ThreadId::new();
        let call_id = CallId::from("c1");
        let events = vec![
            evt(
                &thread_id,
                EventPayload::ToolCall {
                    call_id: call_id.clone(),
                    tool_name: "bash".into(),
                    arguments: serde_json::json!({"command": "ls"}),
                },
            ),
            evt(
                &thread_id,
                EventPayload::ToolApprovalRequest {
                    call_id: call_id.clone(),
                },
            ),
        ];

        let view = ThreadView::replay(&thread_id, events);
        assert_eq!(view.pending_approvals.len(), 1);
        assert_eq!(view.pending_approvals[0].call_id, call_id);
    }

    #[test]
    fn replay_omits_approval_once_responded() {
        let thread_id = ThreadId::new();
        let call_id = CallId::from("c1");
        let events = vec![
            evt(
                &thread_id,
                EventPayload::ToolCall {
                    call_id: call_id.clone(),
                    tool_name: "bash".into(),
                    arguments: serde_json::json!({}),
                },
            ),
            evt(
                &thread_id,
                EventPayload::ToolApprovalRequest {
                    call_id: call_id.clone(),
                },
            ),
            evt(
                &thread_id,
                EventPayload::ToolApprovalResponse {
                    call_id: call_id.clone(),
                    decision: crate::model::tool::ApprovalDecision::AllowOnce,
                },
            ),
        ];

        let view = ThreadView::replay(&thread_id, events);
        assert!(view.pending_approvals.is_empty());
    }

    #[test]
    fn replay_accumulates_token_usage() {
        let thread_id = ThreadId::new();
        let events = vec![
            evt(
                &thread_id,
                EventPayload::AgentMessage {
                    text: "a".into(),
                    usage: Some(TokenUsage {
                        input_tokens: 10,
                        output_tokens: 5,
                    }),
                },
            ),
            evt(
                &thread_id,
                EventPayload::AgentMessage {
                    text: "b".into(),
                    usage: Some(TokenUsage {
                        input_tokens: 3,
                        output_tokens: 7,
                    }),
                },
            ),
        ];

        let view = ThreadView::replay(&thread_id, events);
        assert_eq!(view.token_usage.input_tokens, 13);
        assert_eq!(view.token_usage.output_tokens, 12);
    }
}
