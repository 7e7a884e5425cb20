//! The Tool Registry & Executor (§4.C): the name→tool mapping and a pure
//! `execute(toolCall, context) -> ToolResult` operation. Deliberately
//! carries no policy or approval logic — that belongs to the Agent.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::model::{ProjectId, SessionId, ThreadId, ToolCall, ToolResult};

mod cancellation;
pub use cancellation::CancellationToken;

/// The per-execution capability bundle given to a tool: ids, a resolved
/// working directory, merged environment, and a cancellation signal. A
/// pure value object constructed fresh per call — it does not depend on
/// the Agent (§9: break cyclic handles with a downward-only dependency).
#[derive(Clone)]
pub struct ToolContext {
    pub thread_id: ThreadId,
    pub session_id: Option<SessionId>,
    pub project_id: Option<ProjectId>,
    pub working_directory: String,
    pub environment: HashMap<String, String>,
    pub cancellation: CancellationToken,
}

/// A tool's structural argument schema, validated before execution. A
/// schema is a value, not a type (§9: dynamic tool schemas).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentSchema {
    pub required: Vec<String>,
}

impl ArgumentSchema {
    pub fn none() -> Self {
        Self { required: Vec::new() }
    }

    pub fn validate(&self, arguments: &serde_json::Value) -> Result<(), ToolError> {
        let object = arguments
            .as_object()
            .ok_or_else(|| ToolError::InvalidArguments("arguments must be an object".into()))?;
        for field in &self.required {
            if !object.contains_key(field) {
                return Err(ToolError::InvalidArguments(format!("missing field: {field}")));
            }
        }
        Ok(())
    }
}

/// A Tool descriptor: a stable name used in events and policies, a
/// description, a structural argument schema, and an execute operation.
/// Tools may be native (built-in) or bridged (`serverId/name`, backed by
/// an external tool server).
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> ArgumentSchema {
        ArgumentSchema::none()
    }
    fn execute(&self, arguments: serde_json::Value, context: &ToolContext) -> ToolResult;
}

/// Holds the name→tool mapping. Effectively read-only after
/// initialization except for dynamic bridged-tool registration, which
/// must be serialized against execution (§5).
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<Mutex<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.lock().unwrap().insert(tool.name().to_string(), tool);
    }

    /// Register tools discovered from an external tool server (§4.C),
    /// renamed `serverId/name`.
    pub fn register_bridged(&self, server_id: &str, tools: Vec<Arc<dyn Tool>>) {
        let mut map = self.tools.lock().unwrap();
        for tool in tools {
            map.insert(format!("{server_id}/{}", tool.name()), tool);
        }
    }

    pub fn unregister(&self, name: &str) {
        self.tools.lock().unwrap().remove(name);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.lock().unwrap().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.lock().unwrap().keys().cloned().collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A pure function of (toolCall, context): looks the tool up, validates
/// its arguments structurally, runs it, and converts panics into a
/// `failed` ToolResult. No policy check, no approval knowledge, no thread
/// mutation — the deliberate inversion of the coupled source design.
pub struct Executor {
    registry: ToolRegistry,
}

impl Executor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn execute(&self, call: &ToolCall, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let tool = self
            .registry
            .get(&call.tool_name)
            .ok_or_else(|| ToolError::ToolNotFound(call.tool_name.clone()))?;

        tool.schema().validate(&call.arguments)?;

        let arguments = call.arguments.clone();
        let context = context.clone();
        let result = catch_unwind(AssertUnwindSafe(|| tool.execute(arguments, &context)))
            .unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                ToolResult::failed(message)
            });

        Ok(result)
    }
}

/// A trivial native tool used only to exercise the Executor and Policy
/// Resolver in tests; not a real tool surface.
pub struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes its `text` argument back as tool output."
    }

    fn schema(&self) -> ArgumentSchema {
        ArgumentSchema {
            required: vec!["text".to_string()],
        }
    }

    fn execute(&self, arguments: serde_json::Value, _context: &ToolContext) -> ToolResult {
        let text = arguments
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        ToolResult::completed(vec![crate::model::ContentPart::Text { text }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolOutcome;

    fn context() -> ToolContext {
        ToolContext {
            thread_id: ThreadId::new(),
            session_id: None,
            project_id: None,
            working_directory: "/tmp".into(),
            environment: HashMap::new(),
            cancellation: CancellationToken::new(),
        }
    }

    #[test]
    fn execute_runs_registered_tool() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let executor = Executor::new(registry);

        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "echo".into(),
            arguments: serde_json::json!({"text": "hi"}),
        };
        let result = executor.execute(&call, &context()).unwrap();
        assert_eq!(result.outcome, ToolOutcome::Completed);
    }

    #[test]
    fn execute_fails_for_unknown_tool() {
        let executor = Executor::new(ToolRegistry::new());
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "missing".into(),
            arguments: serde_json::json!({}),
        };
        let result = executor.execute(&call, &context());
        assert!(matches!(result, Err(ToolError::ToolNotFound(_))));
    }

    #[test]
    fn execute_fails_for_invalid_arguments() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let executor = Executor::new(registry);

        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "echo".into(),
            arguments: serde_json::json!({}),
        };
        let result = executor.execute(&call, &context());
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[test]
    fn bridged_tool_is_namespaced() {
        let registry = ToolRegistry::new();
        registry.register_bridged("mcp-server", vec![Arc::new(EchoTool)]);
        assert!(registry.get("mcp-server/echo").is_some());
        assert!(registry.get("echo").is_none());
    }

    #[test]
    fn panicking_tool_becomes_failed_result() {
        struct PanicTool;
        impl Tool for PanicTool {
            fn name(&self) -> &str {
                "panic"
            }
            fn description(&self) -> &str {
                "panics"
            }
            fn execute(&self, _arguments: serde_json::Value, _context: &ToolContext) -> ToolResult {
                panic!("boom");
            }
        }

        let registry = ToolRegistry::new();
        registry.register(Arc::new(PanicTool));
        let executor = Executor::new(registry);

        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "panic".into(),
            arguments: serde_json::json!({}),
        };
        let result = executor.execute(&call, &context()).unwrap();
        assert_eq!(result.outcome, ToolOutcome::Failed);
    }
}
