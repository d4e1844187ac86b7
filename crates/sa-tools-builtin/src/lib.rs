//! Bundled reference tools: thin `sa_tools::Tool` wrappers around the
//! exec/process/file-ops request handlers, registered together so a runtime
//! has *something* to exercise the Permission Filter and Tool Execution
//! Manager against without a collaborator having to invent its own toolset.
//!
//! Grounded verbatim on `crates/tools/src/{exec,process,file_ops,manager}.rs`
//! — this crate adds only the `Tool` adapter layer (id/definition/execute),
//! none of the exec/process/file-ops logic itself is rewritten.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use sa_tools::{ProcessManager, ToolRegistry, ToolResult};

mod exec_tool;
mod file_tools;
mod process_tool;

pub use exec_tool::ExecTool;
pub use file_tools::{FileAppendTool, FileDeleteTool, FileListTool, FileMoveTool, FileReadTool, FileWriteTool};
pub use process_tool::ProcessTool;

/// Registers every bundled tool into `registry`, rooting file operations at
/// `workspace_root` and routing exec/process through the shared `manager`.
pub fn register_builtin_tools(registry: &mut ToolRegistry, workspace_root: PathBuf, manager: Arc<ProcessManager>) {
    registry.register(Arc::new(ExecTool::new(manager.clone())));
    registry.register(Arc::new(ProcessTool::new(manager)));
    registry.register(Arc::new(FileReadTool::new(workspace_root.clone())));
    registry.register(Arc::new(FileWriteTool::new(workspace_root.clone())));
    registry.register(Arc::new(FileAppendTool::new(workspace_root.clone())));
    registry.register(Arc::new(FileMoveTool::new(workspace_root.clone())));
    registry.register(Arc::new(FileDeleteTool::new(workspace_root.clone())));
    registry.register(Arc::new(FileListTool::new(workspace_root)));
}

fn json_result(title: &str, value: Value) -> ToolResult {
    ToolResult::ok(title, value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_builtin_tools_populates_every_tool() {
        let mut registry = ToolRegistry::new();
        let manager = Arc::new(ProcessManager::new(sa_domain::config::ExecConfig::default()));
        register_builtin_tools(&mut registry, PathBuf::from("."), manager);

        for id in ["exec", "process", "file_read", "file_write", "file_append", "file_move", "file_delete", "file_list"] {
            assert!(registry.contains(id), "missing tool: {id}");
        }
        assert_eq!(registry.len(), 8);
    }
}
