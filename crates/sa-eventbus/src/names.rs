//! Canonical event names published on the bus, grouped by emitter.
//!
//! Payloads are opaque `serde_json::Value` maps; the field lists noted per
//! constant are the fields each emitter is expected to set, not an enforced
//! schema.

/// `{session_id, agent_name, task_id?}`
pub const AGENT_INITIALIZED: &str = "AGENT_INITIALIZED";
/// `{session_id, agent_name, tools_available, task_id?}`
pub const AGENT_READY: &str = "AGENT_READY";
/// `{session_id, agent_name, task_id?}`
pub const AGENT_EXECUTING: &str = "AGENT_EXECUTING";
/// `{session_id, agent_name, task_id?}`
pub const AGENT_CLEANUP: &str = "AGENT_CLEANUP";
/// `{session_id, agent_name, error, duration?, task_id?}`
pub const AGENT_ERROR: &str = "AGENT_ERROR";

/// `{part_id, session_id, tool, input}`
pub const TOOL_STARTED: &str = "TOOL_STARTED";
/// `{part_id, session_id, tool, output}`
pub const TOOL_COMPLETED: &str = "TOOL_COMPLETED";
/// `{part_id, session_id, tool, error}`
pub const TOOL_ERROR: &str = "TOOL_ERROR";

/// `{task_id, agent_name, parent_id?}`
pub const TASK_STARTED: &str = "TASK_STARTED";
/// `{task_id, agent_name, parent_id?, duration}`
pub const TASK_COMPLETED: &str = "TASK_COMPLETED";
/// `{task_id, agent_name, parent_id?, error}`
pub const TASK_FAILED: &str = "TASK_FAILED";
/// `{task_id, agent_name, parent_id?}`
pub const TASK_CANCELLED: &str = "TASK_CANCELLED";

/// `{session_id, message_id}`
pub const MESSAGE_CREATED: &str = "MESSAGE_CREATED";
/// `{session_id, message_id}`
pub const MESSAGE_UPDATED: &str = "MESSAGE_UPDATED";

/// `{session_id}`
pub const SESSION_CREATED: &str = "SESSION_CREATED";
/// `{session_id}`
pub const SESSION_UPDATED: &str = "SESSION_UPDATED";
/// `{session_id}`
pub const SESSION_DELETED: &str = "SESSION_DELETED";
