//! Error kinds for the Conversation Core (§7).
//!
//! Each component gets its own error enum, matching the persistence
//! layer's style of one small `Display`-and-`Error`-impl'd type per
//! module rather than a single crate-wide catch-all.

use thiserror::Error;

use crate::model::CallId;

/// Errors from the Event Store (§4.A).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("thread not found: {0}")]
    ThreadNotFound(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the Tool Registry & Executor (§4.C).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Errors from the Approval Coordinator (§4.E). These are returned to the
/// submitter (UI); they never affect a thread's resolved state.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("no pending approval for call {0}")]
    NoPendingApproval(CallId),
    #[error("call {0} already decided")]
    AlreadyDecided(CallId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by the Agent's turn driver (§4.F) that abort the turn
/// rather than being materialized as a `TOOL_RESULT`/`AGENT_MESSAGE` event.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("turn cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_displays_reason() {
        let err = StoreError::ThreadNotFound("t1".into());
        assert_eq!(err.to_string(), "thread not found: t1");
    }

    #[test]
    fn approval_error_wraps_store_error() {
        let err: ApprovalError = StoreError::StorageUnavailable("disk full".into()).into();
        assert!(err.to_string().contains("disk full"));
    }
}
