//! The Thread Manager (§4.B): the one door through which the Agent and UI
//! touch the Event Store for conversation data.

use std::sync::Arc;

use crate::error::StoreError;
use crate::model::{
    Event, EventPayload, PendingApproval, ProjectId, Session, SessionId, Thread, ThreadId,
    ThreadView,
};
use crate::store::EventStore;

/// The one door through which Agent and UI touch the Event Store for
/// conversation data. Never interprets event payloads beyond the
/// invariants in §3 — semantic interpretation lives in the Agent.
#[derive(Clone)]
pub struct ThreadManager {
    store: Arc<dyn EventStore>,
}

impl ThreadManager {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Create a thread, optionally linked to a session/project. Agents
    /// create threads lazily, on first use of a conversation.
    pub fn create_thread(
        &self,
        session_id: Option<SessionId>,
        project_id: Option<ProjectId>,
    ) -> Result<Thread, StoreError> {
        let thread = Thread::new(session_id, project_id);
        self.store.save_thread(&thread)?;
        Ok(thread)
    }

    pub fn load_thread(&self, id: &ThreadId) -> Result<Option<Thread>, StoreError> {
        self.store.load_thread(id)
    }

    /// Replay a thread's event log into its logical view (§4.B).
    pub fn replay(&self, id: &ThreadId) -> Result<ThreadView, StoreError> {
        let events = self.store.load_events(id)?;
        Ok(ThreadView::replay(id, events))
    }

    pub fn append_event(&self, id: &ThreadId, payload: EventPayload) -> Result<Event, StoreError> {
        self.store.append_event(id, payload)
    }

    /// Opaque metadata mutation, for non-semantic annotations only.
    pub fn set_metadata(
        &self,
        id: &ThreadId,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<Thread, StoreError> {
        let mut thread = self
            .store
            .load_thread(id)?
            .ok_or_else(|| StoreError::ThreadNotFound(id.to_string()))?;
        thread.metadata.insert(key.into(), value);
        self.store.save_thread(&thread)?;
        Ok(thread)
    }

    pub fn list_threads_by_session(&self, session_id: &SessionId) -> Result<Vec<Thread>, StoreError> {
        self.store.list_threads_by_session(session_id)
    }

    pub fn list_sessions_by_project(&self, project_id: &ProjectId) -> Result<Vec<Session>, StoreError> {
        self.store.load_sessions_by_project(project_id)
    }

    /// Pending approvals across every thread in a session — a fan-out used
    /// by `listPendingApprovalsForSession` (§6).
    pub fn pending_approvals_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<PendingApproval>, StoreError> {
        let thread_ids: Vec<ThreadId> = self
            .store
            .list_threads_by_session(session_id)?
            .into_iter()
            .map(|t| t.id)
            .collect();
        self.store.get_pending_approvals(&thread_ids)
    }
}
