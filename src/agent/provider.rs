//! The abstract Provider capability (§1: concrete model providers are out
//! of scope). Generalizes the source's concrete per-backend process
//! managers into one trait the Agent drives generically, plus an
//! in-memory `ScriptedProvider` test double.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use crate::model::TokenUsage;

/// One message in the conversation projected for the Provider.
#[derive(Debug, Clone)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A tool call the Provider wants the Agent to run.
#[derive(Debug, Clone)]
pub struct ProviderToolCall {
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// One assistant response. The contract (§4.F step 2) is that at least
/// one `AGENT_MESSAGE` is emitted per non-empty `text`; implementations
/// may batch streamed deltas into this single value at stream end.
#[derive(Debug, Clone, Default)]
pub struct ProviderTurn {
    pub text: String,
    pub tool_calls: Vec<ProviderToolCall>,
    pub usage: Option<TokenUsage>,
}

/// An abstract model provider. Object-safe: `respond` returns a boxed
/// future rather than being an `async fn`, so the Agent can be generic
/// over any implementation without pulling in an async-trait crate.
pub trait Provider: Send + Sync {
    fn respond(
        &self,
        messages: Vec<ProviderMessage>,
        advertised_tools: Vec<String>,
    ) -> Pin<Box<dyn Future<Output = ProviderTurn> + Send>>;
}

/// A scripted, in-memory Provider that plays back a fixed sequence of
/// turns. Drives the turn state machine deterministically in tests,
/// standing in for the source's concrete CLI-backed agent managers.
pub struct ScriptedProvider {
    script: Mutex<Vec<ProviderTurn>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<ProviderTurn>) -> Self {
        Self {
            script: Mutex::new(script),
        }
    }
}

impl Provider for ScriptedProvider {
    fn respond(
        &self,
        _messages: Vec<ProviderMessage>,
        _advertised_tools: Vec<String>,
    ) -> Pin<Box<dyn Future<Output = ProviderTurn> + Send>> {
        let next = self.script.lock().unwrap().pop();
        Box::pin(async move { next.unwrap_or_default() })
    }
}
