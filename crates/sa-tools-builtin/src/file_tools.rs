use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use sa_domain::tool::ToolDefinition;
use sa_tools::file_ops::{
    file_append, file_delete, file_list, file_move, file_read, file_write, FileAppendRequest, FileDeleteRequest,
    FileListRequest, FileMoveRequest, FileReadRequest, FileWriteRequest,
};
use sa_tools::{Tool, ToolContext, ToolResult};

use crate::json_result;

macro_rules! file_tool {
    ($name:ident, $id:literal, $title:literal, $description:literal, $request:ty, $func:path, $schema:expr) => {
        pub struct $name {
            workspace_root: PathBuf,
        }

        impl $name {
            pub fn new(workspace_root: PathBuf) -> Self {
                Self { workspace_root }
            }
        }

        #[async_trait]
        impl Tool for $name {
            fn id(&self) -> &str {
                $id
            }

            fn definition(&self) -> ToolDefinition {
                ToolDefinition {
                    name: $id.into(),
                    description: $description.into(),
                    parameters: $schema,
                }
            }

            async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
                let req: $request = serde_json::from_value(input).map_err(|e| format!(concat!("invalid ", $id, " request: {e}")))?;
                let value = $func(&self.workspace_root, req).await?;
                Ok(json_result($title, value))
            }
        }
    };
}

file_tool!(
    FileReadTool,
    "file_read",
    "Read file",
    "Read a file's contents, optionally by line offset/limit, constrained to the workspace root.",
    FileReadRequest,
    file_read,
    json!({
        "type": "object",
        "properties": {
            "path": {"type": "string"},
            "offset": {"type": "integer", "description": "0-indexed starting line"},
            "limit": {"type": "integer", "description": "Max lines to return"},
        },
        "required": ["path"],
    })
);

file_tool!(
    FileWriteTool,
    "file_write",
    "Write file",
    "Write (create or overwrite) a file atomically, constrained to the workspace root.",
    FileWriteRequest,
    file_write,
    json!({
        "type": "object",
        "properties": {
            "path": {"type": "string"},
            "content": {"type": "string"},
        },
        "required": ["path", "content"],
    })
);

file_tool!(
    FileAppendTool,
    "file_append",
    "Append file",
    "Append content to a file, creating it if needed, constrained to the workspace root.",
    FileAppendRequest,
    file_append,
    json!({
        "type": "object",
        "properties": {
            "path": {"type": "string"},
            "content": {"type": "string"},
        },
        "required": ["path", "content"],
    })
);

file_tool!(
    FileMoveTool,
    "file_move",
    "Move file",
    "Move or rename a file or directory, constrained to the workspace root.",
    FileMoveRequest,
    file_move,
    json!({
        "type": "object",
        "properties": {
            "source": {"type": "string"},
            "destination": {"type": "string"},
        },
        "required": ["source", "destination"],
    })
);

file_tool!(
    FileDeleteTool,
    "file_delete",
    "Delete file",
    "Delete a file or empty directory, constrained to the workspace root.",
    FileDeleteRequest,
    file_delete,
    json!({
        "type": "object",
        "properties": {
            "path": {"type": "string"},
        },
        "required": ["path"],
    })
);

file_tool!(
    FileListTool,
    "file_list",
    "List directory",
    "List a directory's entries with size/modified/is_dir metadata, constrained to the workspace root.",
    FileListRequest,
    file_list,
    json!({
        "type": "object",
        "properties": {
            "path": {"type": "string", "description": "Directory to list, defaults to '.'"},
        },
    })
);

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn file_write_then_read_round_trips_through_the_tool_layer() {
        let ws = TempDir::new().unwrap();
        let ctx = ToolContext::new("s1", "m1", "agent", "c1");

        let writer = FileWriteTool::new(ws.path().to_path_buf());
        writer
            .execute(json!({"path": "hello.txt", "content": "hi"}), &ctx)
            .await
            .unwrap();

        let reader = FileReadTool::new(ws.path().to_path_buf());
        let result = reader.execute(json!({"path": "hello.txt"}), &ctx).await.unwrap();
        assert!(result.output.contains("\"content\":\"hi\""));
    }

    #[tokio::test]
    async fn file_read_rejects_path_escaping_workspace() {
        let ws = TempDir::new().unwrap();
        let ctx = ToolContext::new("s1", "m1", "agent", "c1");
        let reader = FileReadTool::new(ws.path().to_path_buf());

        let err = reader.execute(json!({"path": "../etc/passwd"}), &ctx).await.unwrap_err();
        assert!(err.contains(".."));
    }
}
