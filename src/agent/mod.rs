//! The Agent (§4.F): drives exactly one assistant turn end-to-end on one
//! thread, composing the prompt, streaming Provider output, and running
//! the tool-call → approval → result loop.

pub mod provider;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::approval::{ApprovalCoordinator, ApprovalOutcome};
use crate::error::{AgentError, StoreError};
use crate::event_bus::{BroadcastEvent, EventBus};
use crate::model::{
    ApprovalDecision, CallId, ContentPart, Event, EventPayload, Policy, Project, Session,
    ThreadId, ToolCall, ToolOutcome, ToolResult,
};
use crate::policy::PolicyResolver;
use crate::store::EventStore;
use crate::threads::ThreadManager;
use crate::tools::{CancellationToken, Executor, ToolContext, ToolRegistry};

pub use provider::{Provider, ProviderMessage, ProviderToolCall, ProviderTurn, Role, ScriptedProvider};

/// The turn state machine (§4.F). `Cancelling` is reachable from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Thinking,
    Streaming,
    AwaitingTool,
    Cancelling,
}

/// Default deadline for `awaitDecision` when the caller does not specify
/// one explicitly.
pub const DEFAULT_APPROVAL_DEADLINE: Duration = Duration::from_secs(300);

/// A single thread's slice of the EventBus (§6.3), filtered by topic.
pub struct ThreadEventStream {
    topic: String,
    receiver: tokio::sync::broadcast::Receiver<BroadcastEvent>,
}

impl ThreadEventStream {
    /// The next event on this thread, skipping lagged gaps and events
    /// published for other threads.
    pub async fn next(&mut self) -> Option<Event> {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match self.receiver.recv().await {
                Ok(broadcast) if broadcast.event_type == self.topic => {
                    if let Ok(event) = serde_json::from_value(broadcast.payload) {
                        return Some(event);
                    }
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Drives one assistant turn on one thread. At most one Agent runs per
/// thread at a time (§5: single-writer per thread).
pub struct Agent<P: Provider> {
    store: Arc<dyn EventStore>,
    threads: ThreadManager,
    approvals: ApprovalCoordinator,
    tools: Executor,
    registry: ToolRegistry,
    provider: P,
    event_bus: Arc<EventBus>,
    state: Mutex<TurnState>,
}

impl<P: Provider> Agent<P> {
    pub fn new(
        store: Arc<dyn EventStore>,
        registry: ToolRegistry,
        provider: P,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            threads: ThreadManager::new(store.clone()),
            approvals: ApprovalCoordinator::new(store.clone(), event_bus.clone()),
            tools: Executor::new(registry.clone()),
            registry,
            store,
            provider,
            event_bus,
            state: Mutex::new(TurnState::Idle),
        }
    }

    pub fn state(&self) -> TurnState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: TurnState) {
        *self.state.lock().unwrap() = state;
        log::debug!("turn state -> {state:?}");
    }

    fn publish(&self, thread_id: &ThreadId, event: &Event) {
        self.event_bus.emit(&format!("thread:{thread_id}"), event);
    }

    /// Append an event and broadcast it in one step. Every event that
    /// lands in the log is published — `streamEvents` (§6.3) renders
    /// assistant messages, tool calls, and approval prompts alike.
    fn append(&self, thread_id: &ThreadId, payload: EventPayload) -> Result<Event, AgentError> {
        let event = self.store.append_event(thread_id, payload)?;
        self.publish(thread_id, &event);
        Ok(event)
    }

    /// `streamEvents(threadId)` (§6.3): a bus subscription filtered to a
    /// single thread's topic.
    pub fn stream_events(&self, thread_id: &ThreadId) -> ThreadEventStream {
        ThreadEventStream {
            topic: format!("thread:{thread_id}"),
            receiver: self.event_bus.subscribe(),
        }
    }

    /// Durable writeback for `allow_session`/`allow_project`/`allow_always`
    /// (§4.E): the decision becomes the tool's effective policy in the
    /// session's or project's configuration, not just a logged event, so
    /// it is honored immediately by the Policy Resolver — including after
    /// a restart — rather than only by replaying the event log.
    fn apply_durable_policy(
        &self,
        project: &Project,
        session: &Session,
        tool_name: &str,
        decision: ApprovalDecision,
    ) -> Result<(), AgentError> {
        match decision {
            ApprovalDecision::AllowSession => {
                let mut session = session.clone();
                session
                    .configuration
                    .tools
                    .tool_policies
                    .insert(tool_name.to_string(), Policy::Allow);
                self.store.update_session(&session)?;
            }
            ApprovalDecision::AllowProject | ApprovalDecision::AllowAlways => {
                let mut project = project.clone();
                project
                    .configuration
                    .tool_policies
                    .insert(tool_name.to_string(), Policy::Allow);
                self.store.update_project(&project)?;
            }
            ApprovalDecision::AllowOnce | ApprovalDecision::Deny | ApprovalDecision::Disable => {}
        }
        Ok(())
    }

    fn advertised_tools(&self, project: &Project, session: &Session) -> Vec<String> {
        self.registry
            .names()
            .into_iter()
            .filter(|name| PolicyResolver::resolve(project, session, name) != Policy::Disable)
            .collect()
    }

    fn compose_messages(&self, view: &crate::model::ThreadView) -> Vec<ProviderMessage> {
        view.events
            .iter()
            .filter_map(|event| match &event.payload {
                EventPayload::UserMessage { text } => Some(ProviderMessage {
                    role: Role::User,
                    content: text.clone(),
                }),
                EventPayload::AgentMessage { text, .. } => Some(ProviderMessage {
                    role: Role::Assistant,
                    content: text.clone(),
                }),
                EventPayload::ToolResult { content, .. } => Some(ProviderMessage {
                    role: Role::Tool,
                    content: content
                        .iter()
                        .map(|part| match part {
                            ContentPart::Text { text } => text.clone(),
                            ContentPart::Opaque { value } => value.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join("\n"),
                }),
                _ => None,
            })
            .collect()
    }

    /// Resolve policy, then run an approval/deny/allow gate, execute the
    /// tool, and append the `TOOL_RESULT` (§4.F step 3). Returns early
    /// without touching the thread further if the turn was cancelled.
    async fn handle_tool_call(
        &self,
        thread_id: &ThreadId,
        project: &Project,
        session: &Session,
        call: ProviderToolCall,
        cancellation: &CancellationToken,
        approval_deadline: Duration,
    ) -> Result<(), AgentError> {
        let call_id = CallId::new();
        self.append(
            thread_id,
            EventPayload::ToolCall {
                call_id: call_id.clone(),
                tool_name: call.tool_name.clone(),
                arguments: call.arguments.clone(),
            },
        )?;

        let policy = PolicyResolver::resolve(project, session, &call.tool_name);

        if matches!(policy, Policy::Disable | Policy::Deny) {
            let reason = format!("tool '{}' denied by policy", call.tool_name);
            self.append(
                thread_id,
                EventPayload::ToolResult {
                    call_id,
                    outcome: ToolOutcome::Denied,
                    content: vec![ContentPart::Text { text: reason.clone() }],
                    error: Some(reason),
                },
            )?;
            return Ok(());
        }

        if policy == Policy::RequireApproval {
            let already_allowed = self.replay_allows(project, session, &call.tool_name)?;
            if !already_allowed {
                self.set_state(TurnState::AwaitingTool);
                self.approvals.request_approval(thread_id, &call_id)?;

                if cancellation.is_cancelled() {
                    return self.fail_call(thread_id, &call_id, "cancelled");
                }

                let outcome = self
                    .approvals
                    .await_decision(thread_id, &call_id, approval_deadline)
                    .await?;

                let decision = match outcome {
                    ApprovalOutcome::Decided(decision) => decision,
                    ApprovalOutcome::TimedOut => {
                        self.append(
                            thread_id,
                            EventPayload::ToolResult {
                                call_id,
                                outcome: ToolOutcome::Denied,
                                content: vec![ContentPart::Text {
                                    text: "approval timeout".into(),
                                }],
                                error: Some("approval timeout".into()),
                            },
                        )?;
                        return Ok(());
                    }
                };

                if !decision.grants_execution() {
                    self.append(
                        thread_id,
                        EventPayload::ToolResult {
                            call_id,
                            outcome: ToolOutcome::Denied,
                            content: vec![ContentPart::Text {
                                text: format!("tool '{}' denied", call.tool_name),
                            }],
                            error: Some("denied".into()),
                        },
                    )?;
                    return Ok(());
                }

                self.apply_durable_policy(project, session, &call.tool_name, decision)?;
            }
        }

        if cancellation.is_cancelled() {
            return self.fail_call(thread_id, &call_id, "cancelled");
        }

        let context = ToolContext {
            thread_id: thread_id.clone(),
            session_id: Some(session.id.clone()),
            project_id: Some(project.id.clone()),
            working_directory: session
                .configuration
                .working_directory
                .clone()
                .unwrap_or_else(|| project.working_directory.clone()),
            environment: session.configuration.environment_variables.clone(),
            cancellation: cancellation.clone(),
        };

        let tool_call = ToolCall {
            call_id: call_id.clone(),
            tool_name: call.tool_name.clone(),
            arguments: call.arguments.clone(),
        };

        let result = match self.tools.execute(&tool_call, &context) {
            Ok(result) => result,
            Err(err) => ToolResult::failed(err.to_string()),
        };

        self.append(
            thread_id,
            EventPayload::ToolResult {
                call_id,
                outcome: result.outcome,
                content: result.content,
                error: result.error,
            },
        )?;
        Ok(())
    }

    fn fail_call(&self, thread_id: &ThreadId, call_id: &CallId, reason: &str) -> Result<(), AgentError> {
        self.append(
            thread_id,
            EventPayload::ToolResult {
                call_id: call_id.clone(),
                outcome: ToolOutcome::Failed,
                content: Vec::new(),
                error: Some(reason.to_string()),
            },
        )?;
        Ok(())
    }

    /// Whether a tool call for `tool_name` anywhere in scope was already
    /// granted `allow_session`/`allow_project`/`allow_always`, so the
    /// Agent can short-circuit without re-asking (§4.E scoped caching;
    /// scenario 1 in §8). `allow_session` is scoped to every thread in
    /// the session; `allow_project`/`allow_always` to every thread in
    /// every session of the project.
    fn replay_allows(&self, project: &Project, session: &Session, tool_name: &str) -> Result<bool, StoreError> {
        for thread in self.store.list_threads_by_session(&session.id)? {
            let events = self.store.load_events(&thread.id)?;
            if Self::tool_granted(
                &events,
                tool_name,
                &[
                    ApprovalDecision::AllowSession,
                    ApprovalDecision::AllowProject,
                    ApprovalDecision::AllowAlways,
                ],
            ) {
                return Ok(true);
            }
        }

        for sibling_session in self.store.load_sessions_by_project(&project.id)? {
            for thread in self.store.list_threads_by_session(&sibling_session.id)? {
                let events = self.store.load_events(&thread.id)?;
                if Self::tool_granted(
                    &events,
                    tool_name,
                    &[ApprovalDecision::AllowProject, ApprovalDecision::AllowAlways],
                ) {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// Whether `events` contains a `TOOL_CALL` for `tool_name` whose
    /// paired `TOOL_APPROVAL_RESPONSE` decision is one of `accepted`.
    fn tool_granted(events: &[Event], tool_name: &str, accepted: &[ApprovalDecision]) -> bool {
        events.iter().any(|event| match &event.payload {
            EventPayload::ToolCall {
                call_id, tool_name: name, ..
            } if name == tool_name => {
                let decision = events.iter().find_map(|e| match &e.payload {
                    EventPayload::ToolApprovalResponse { call_id: id, decision } if id == call_id => {
                        Some(*decision)
                    }
                    _ => None,
                });
                decision.is_some_and(|d| accepted.contains(&d))
            }
            _ => false,
        })
    }

    /// Drive one complete turn (§4.F steps 1-5): compose, call the
    /// Provider, handle any tool intents, loop until a tool-free response,
    /// then go idle.
    pub async fn run_turn(
        &self,
        thread_id: &ThreadId,
        project: &Project,
        session: &Session,
        user_text: String,
        cancellation: CancellationToken,
        approval_deadline: Duration,
    ) -> Result<(), AgentError> {
        self.append(thread_id, EventPayload::UserMessage { text: user_text })?;

        loop {
            if cancellation.is_cancelled() {
                self.set_state(TurnState::Cancelling);
                break;
            }

            self.set_state(TurnState::Thinking);
            let view = self.threads.replay(thread_id)?;
            let messages = self.compose_messages(&view);
            let advertised = self.advertised_tools(project, session);

            self.set_state(TurnState::Streaming);
            let turn = self.provider.respond(messages, advertised).await;

            if !turn.text.is_empty() {
                self.append(
                    thread_id,
                    EventPayload::AgentMessage {
                        text: turn.text.clone(),
                        usage: turn.usage,
                    },
                )?;
            }

            if turn.tool_calls.is_empty() {
                break;
            }

            self.set_state(TurnState::AwaitingTool);
            for call in turn.tool_calls {
                if cancellation.is_cancelled() {
                    self.set_state(TurnState::Cancelling);
                    return Err(AgentError::Cancelled);
                }
                self.handle_tool_call(thread_id, project, session, call, &cancellation, approval_deadline)
                    .await?;
            }
        }

        self.set_state(TurnState::Idle);
        Ok(())
    }

    /// Crash/restart recovery (§4.F): for every open tool call on a
    /// thread, decide whether it stays pending (a genuine awaiting
    /// approval with no response) or is synthesized as `failed`
    /// (`interrupted`) because it was granted-but-not-executed, or never
    /// reached approval at all.
    pub fn recover_thread(&self, thread_id: &ThreadId) -> Result<(), StoreError> {
        let view = self.threads.replay(thread_id)?;
        let pending_call_ids: std::collections::HashSet<CallId> = view
            .pending_approvals
            .iter()
            .map(|p| p.call_id.clone())
            .collect();

        let synthesized: Vec<CallId> = view
            .open_tool_calls
            .keys()
            .filter(|call_id| !pending_call_ids.contains(*call_id))
            .cloned()
            .collect();

        for call_id in synthesized {
            log::warn!("synthesizing interrupted result for call {call_id} on thread {thread_id}");
            let event = self.store.append_event(
                thread_id,
                EventPayload::ToolResult {
                    call_id,
                    outcome: ToolOutcome::Failed,
                    content: Vec::new(),
                    error: Some("interrupted".into()),
                },
            )?;
            self.publish(thread_id, &event);
        }
        Ok(())
    }
}
