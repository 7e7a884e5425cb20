//! Tool call/result vocabulary and the policy/approval decision sets.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ids::CallId;

/// The effective policy for a (session, tool) pair, as returned by the
/// Policy Resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    Allow,
    RequireApproval,
    Deny,
    Disable,
}

/// The user's response to an approval request. Closed vocabulary per the
/// data model: these are the only decisions a `TOOL_APPROVAL_RESPONSE`
/// event may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    AllowOnce,
    AllowSession,
    AllowProject,
    AllowAlways,
    Deny,
    Disable,
}

impl ApprovalDecision {
    /// Whether this decision permits the call to run.
    pub fn grants_execution(self) -> bool {
        matches!(
            self,
            ApprovalDecision::AllowOnce
                | ApprovalDecision::AllowSession
                | ApprovalDecision::AllowProject
                | ApprovalDecision::AllowAlways
        )
    }
}

/// A single content part of a tool result. Only `Text` is interpreted by
/// the Core; other kinds are opaque passthrough.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContentPart {
    Text { text: String },
    Opaque { value: serde_json::Value },
}

/// Outcome of a completed tool call, as recorded on a `TOOL_RESULT` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Completed,
    Failed,
    Denied,
}

/// A tool invocation requested by the Provider and assigned a callId by
/// the Agent. Transient — reconstructed by replaying `TOOL_CALL` events,
/// never stored except as events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: CallId,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// The result of executing a tool, as the Executor hands it back to the
/// Agent before it is wrapped into a `TOOL_RESULT` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub outcome: ToolOutcome,
    pub content: Vec<ContentPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn completed(content: Vec<ContentPart>) -> Self {
        Self {
            outcome: ToolOutcome::Completed,
            content,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: ToolOutcome::Failed,
            content: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            outcome: ToolOutcome::Denied,
            content: vec![ContentPart::Text {
                text: reason.clone(),
            }],
            error: Some(reason),
        }
    }
}

/// A tool's structural argument schema and per-tool merged policy config.
/// `toolPolicies` maps tool name (bare, or `serverId/name` for bridged
/// tools) to an explicit policy; absence falls through to the resolver's
/// default in §4.D.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolConfiguration {
    /// Optional allowlist: if present, tools absent from it are denied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowlist: Option<Vec<String>>,
    #[serde(default)]
    pub tool_policies: HashMap<String, Policy>,
}
