use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use sa_domain::tool::ToolDefinition;
use sa_tools::exec::ExecRequest;
use sa_tools::{ProcessManager, Tool, ToolContext, ToolResult};

use crate::json_result;

/// Run a shell command, foregrounded until `yield_ms` then auto-backgrounded.
pub struct ExecTool {
    manager: Arc<ProcessManager>,
}

impl ExecTool {
    pub fn new(manager: Arc<ProcessManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for ExecTool {
    fn id(&self) -> &str {
        "exec"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "exec".into(),
            description: "Run a shell command. Auto-backgrounds if it outlasts yield_ms.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "Shell command to run"},
                    "background": {"type": "boolean", "description": "Start backgrounded immediately"},
                    "yield_ms": {"type": "integer", "description": "Foreground wait before auto-backgrounding"},
                    "timeout_sec": {"type": "integer", "description": "Hard kill timeout"},
                    "workdir": {"type": "string", "description": "Working directory"},
                    "env": {"type": "object", "description": "Extra environment variables"},
                },
                "required": ["command"],
            }),
        }
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
        let req: ExecRequest = serde_json::from_value(input).map_err(|e| format!("invalid exec request: {e}"))?;
        let response = sa_tools::exec::exec(&self.manager, req).await;
        let value = serde_json::to_value(&response).map_err(|e| e.to_string())?;
        Ok(json_result("Exec", value))
    }
}
