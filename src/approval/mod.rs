//! The Approval Coordinator (§4.E): turns the ask-and-wait protocol into a
//! pure function of the event log. Holds no in-process approval state —
//! every decision lives in the log, queried via the Event Store.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{ApprovalError, StoreError};
use crate::event_bus::EventBus;
use crate::model::{ApprovalDecision, CallId, EventPayload, SessionId, ThreadId};
use crate::store::EventStore;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What `awaitDecision` resolves to: either an actual decision, or a
/// timeout the Agent must treat as `deny` (§4.E, §7 `ApprovalTimeout`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Decided(ApprovalDecision),
    TimedOut,
}

/// Per-thread state machine that brokers approval requests and responses
/// through the event log. No two calls racing on the same callId can
/// produce more than one request or more than one response (§8).
pub struct ApprovalCoordinator {
    store: Arc<dyn EventStore>,
    event_bus: Arc<EventBus>,
}

impl ApprovalCoordinator {
    pub fn new(store: Arc<dyn EventStore>, event_bus: Arc<EventBus>) -> Self {
        Self { store, event_bus }
    }

    fn request_exists(&self, thread_id: &ThreadId, call_id: &CallId) -> Result<bool, StoreError> {
        let events = self.store.load_events(thread_id)?;
        Ok(events.iter().any(|e| {
            matches!(&e.payload, EventPayload::ToolApprovalRequest { call_id: id } if id == call_id)
        }))
    }

    /// Append a `TOOL_APPROVAL_REQUEST`. Idempotent: a second call for the
    /// same callId is a no-op if one already exists.
    pub fn request_approval(&self, thread_id: &ThreadId, call_id: &CallId) -> Result<(), ApprovalError> {
        if self.request_exists(thread_id, call_id)? {
            return Ok(());
        }
        let event = self
            .store
            .append_event(
                thread_id,
                EventPayload::ToolApprovalRequest {
                    call_id: call_id.clone(),
                },
            )
            .map_err(ApprovalError::from)?;
        self.event_bus.emit(&format!("thread:{thread_id}"), &event);
        Ok(())
    }

    /// Append a `TOOL_APPROVAL_RESPONSE`. Fails with `NoPendingApproval`
    /// if no request exists for the callId, and `AlreadyDecided` if one
    /// already does.
    pub fn submit_decision(
        &self,
        thread_id: &ThreadId,
        call_id: &CallId,
        decision: ApprovalDecision,
    ) -> Result<(), ApprovalError> {
        if !self.request_exists(thread_id, call_id)? {
            return Err(ApprovalError::NoPendingApproval(call_id.clone()));
        }
        if self
            .store
            .get_approval_decision(thread_id, call_id)
            .map_err(ApprovalError::from)?
            .is_some()
        {
            return Err(ApprovalError::AlreadyDecided(call_id.clone()));
        }

        let event = self
            .store
            .append_event(
                thread_id,
                EventPayload::ToolApprovalResponse {
                    call_id: call_id.clone(),
                    decision,
                },
            )
            .map_err(ApprovalError::from)?;
        self.event_bus.emit(&format!("thread:{thread_id}"), &event);
        Ok(())
    }

    /// `submitApproval(sessionId, callId, decision)` (§6.2): a UI holding
    /// only a sessionId and callId cannot know which of the session's
    /// threads owns the request. Fan out over the session's threads to
    /// find the one with a matching pending request, then delegate.
    pub fn submit_decision_for_session(
        &self,
        session_id: &SessionId,
        call_id: &CallId,
        decision: ApprovalDecision,
    ) -> Result<(), ApprovalError> {
        let threads = self
            .store
            .list_threads_by_session(session_id)
            .map_err(ApprovalError::from)?;
        for thread in threads {
            if self.request_exists(&thread.id, call_id).map_err(ApprovalError::from)? {
                return self.submit_decision(&thread.id, call_id, decision);
            }
        }
        Err(ApprovalError::NoPendingApproval(call_id.clone()))
    }

    /// Poll the log until a decision appears or `deadline` elapses. On
    /// timeout the turn is resolved as `deny`; a late response still lands
    /// in the log (it just does not retroactively change the result).
    pub async fn await_decision(
        &self,
        thread_id: &ThreadId,
        call_id: &CallId,
        deadline: Duration,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let poll = async {
            loop {
                if let Some(decision) = self
                    .store
                    .get_approval_decision(thread_id, call_id)
                    .map_err(ApprovalError::from)?
                {
                    return Ok::<_, ApprovalError>(decision);
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(deadline, poll).await {
            Ok(result) => Ok(ApprovalOutcome::Decided(result?)),
            Err(_) => Ok(ApprovalOutcome::TimedOut),
        }
    }
}
