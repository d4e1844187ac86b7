//! Tool Registry: the `tool_id → tool` mapping that the Permission Filter
//! narrows and the Tool Execution Manager resolves against.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::tool::ToolDefinition;
use serde_json::{Map, Value};

/// Per-call context handed to a tool's `execute`. Carries identity for the
/// surrounding session/message/agent, the call id used to key the active-calls
/// map, a cooperative cancellation signal, and a scratch buffer tools may use
/// to stash intermediate messages (mirrors the original's `messages` list).
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub message_id: String,
    pub agent: String,
    pub call_id: String,
    pub abort: sa_domain::cancel::CancelToken,
    pub messages: Arc<parking_lot::Mutex<Vec<Value>>>,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>, message_id: impl Into<String>, agent: impl Into<String>, call_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message_id: message_id.into(),
            agent: agent.into(),
            call_id: call_id.into(),
            abort: sa_domain::cancel::CancelToken::new(),
            messages: Arc::new(parking_lot::Mutex::new(Vec::new())),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.abort.is_cancelled()
    }
}

/// Outcome of a tool execution, surfaced back to the Streaming LLM Session.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub title: String,
    pub output: String,
    pub metadata: Map<String, Value>,
}

impl ToolResult {
    pub fn ok(title: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            output: output.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A callable tool. `execute` returns `Err` only for failures the tool
/// itself cannot classify — cancellation is observed via `ctx.is_cancelled()`
/// and should normally surface as a clean early-return `Ok`/`Err`, not a panic.
#[async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> &str;
    fn definition(&self) -> ToolDefinition;
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, String>;
}

/// Holds every known tool, keyed by id. Cloning is cheap — tools are
/// reference-counted.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.id().to_string(), tool);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tools.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool ids in a stable, insertion-independent order (sorted), matching
    /// the "registry iteration order" the Context Builder relies on when
    /// emitting tool schemas.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tools.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.tools.get(&id).map(|t| t.definition()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn id(&self) -> &str {
            "echo"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".into(),
                description: "echoes input".into(),
                parameters: serde_json::json!({"type": "object"}),
            }
        }

        async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            Ok(ToolResult::ok("Echo", input.to_string()))
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert!(registry.contains("echo"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn ids_are_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.ids(), vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn tool_executes() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let tool = registry.get("echo").unwrap();
        let ctx = ToolContext::new("s1", "m1", "agent", "call1");
        let result = tool.execute(serde_json::json!("hi"), &ctx).await.unwrap();
        assert_eq!(result.title, "Echo");
    }
}
