use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use sa_domain::tool::ToolDefinition;
use sa_tools::process::{handle_process, ProcessRequest};
use sa_tools::{ProcessManager, Tool, ToolContext, ToolResult};

use crate::json_result;

/// Manage background process sessions spawned by [`crate::ExecTool`]:
/// list, poll, log, write, kill, clear, remove.
pub struct ProcessTool {
    manager: Arc<ProcessManager>,
}

impl ProcessTool {
    pub fn new(manager: Arc<ProcessManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for ProcessTool {
    fn id(&self) -> &str {
        "process"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "process".into(),
            description: "Manage background process sessions (list/poll/log/write/kill/clear/remove).".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["list", "poll", "log", "write", "kill", "clear", "remove"]},
                    "session_id": {"type": "string"},
                    "offset": {"type": "integer"},
                    "limit": {"type": "integer"},
                    "tail_lines": {"type": "integer"},
                    "data": {"type": "string"},
                    "eof": {"type": "boolean"},
                },
                "required": ["action"],
            }),
        }
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
        let req: ProcessRequest = serde_json::from_value(input).map_err(|e| format!("invalid process request: {e}"))?;
        let response = handle_process(&self.manager, req).await;
        if !response.success {
            return Err(response.error.unwrap_or_else(|| "process action failed".into()));
        }
        let value = serde_json::to_value(&response).map_err(|e| e.to_string())?;
        Ok(json_result("Process", value))
    }
}
