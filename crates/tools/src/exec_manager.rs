//! Tool Execution Manager: runs a single model-requested tool call, owning
//! its state machine, active-calls bookkeeping, cancellation signal and
//! event publication.
//!
//! Grounded on `tool_execution.py::ToolExecutionManager.execute_tool_call`
//! step for step.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use sa_domain::part::{ToolPart, ToolSource, ToolState, ToolStatus};
use sa_eventbus::{names, EventBus};
use serde_json::{json, Value};

use crate::registry::{Tool, ToolContext, ToolRegistry, ToolResult};

/// Persists a record of a tool execution across its `pending → terminal`
/// lifecycle. Implementations live outside this crate (e.g. an in-memory or
/// JSONL-backed repository); the manager only needs `log_execution` on start
/// and `update_execution` on completion.
#[async_trait::async_trait]
pub trait ToolExecutionTracker: Send + Sync {
    async fn log_execution(&self, execution_id: &str, session_id: &str, message_id: &str, tool_id: &str, state: &ToolState);
    async fn update_execution(&self, execution_id: &str, state: &ToolState);
}

/// Last three raw tool inputs per tool name, used by [`check_doom_loop`].
pub type RecentInputs = HashMap<String, Vec<Value>>;

/// Returns true iff `input` exactly matches any of `last_three_inputs` for
/// `tool_name`. Callers may use this to break pathological repeat-tool loops;
/// the manager itself never consults it.
pub fn check_doom_loop(tool_name: &str, input: &Value, last_three_inputs: &RecentInputs) -> bool {
    last_three_inputs
        .get(tool_name)
        .map(|recent| recent.iter().any(|seen| seen == input))
        .unwrap_or(false)
}

struct ActiveCall {
    ctx: ToolContext,
}

/// Owns every in-flight tool call for one session.
pub struct ToolExecutionManager {
    session_id: String,
    registry: ToolRegistry,
    events: Arc<EventBus>,
    tracker: Option<Arc<dyn ToolExecutionTracker>>,
    active_calls: RwLock<HashMap<String, ActiveCall>>,
}

impl ToolExecutionManager {
    pub fn new(session_id: impl Into<String>, registry: ToolRegistry, events: Arc<EventBus>) -> Self {
        Self {
            session_id: session_id.into(),
            registry,
            events,
            tracker: None,
            active_calls: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn ToolExecutionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Run one model-requested tool call to completion. Never propagates a
    /// tool's internal failure — every outcome is folded into a `ToolResult`
    /// plus the terminal `ToolPart` describing it.
    pub async fn execute_tool_call(
        &self,
        tool_name: &str,
        tool_input: Value,
        tool_call_id: &str,
        message_id: &str,
        agent: &str,
        model: &str,
    ) -> (ToolResult, ToolPart) {
        let part_id = format!("{}_{}", self.session_id, tool_call_id);

        // Step 1: resolve, or synthesize an unknown-tool error with no state
        // machine entered.
        let Some(tool) = self.registry.get(tool_name) else {
            let result = ToolResult::ok(format!("Unknown tool: {tool_name}"), String::new())
                .with_metadata("error", format!("unknown_tool:{tool_name}"));
            let state = ToolState {
                status: ToolStatus::Error,
                input: tool_input.clone(),
                output: None,
                title: Some(result.title.clone()),
                metadata: result.metadata.clone(),
                error: Some(format!("unknown_tool:{tool_name}")),
                time_start: None,
                time_end: Some(Utc::now()),
                time_compacted: None,
            };
            let part = ToolPart {
                id: part_id,
                session_id: self.session_id.clone(),
                message_id: message_id.to_string(),
                tool: tool_name.to_string(),
                call_id: tool_call_id.to_string(),
                state,
                source: Some(ToolSource {
                    provider: String::new(),
                    model: model.to_string(),
                }),
            };
            return (result, part);
        };

        // Step 2: build the per-call context.
        let ctx = ToolContext::new(self.session_id.clone(), message_id, agent, tool_call_id);

        // Step 3: pending state, initial ToolPart, TOOL_STARTED, tracker seed.
        let mut state = ToolState::pending(tool_input.clone());
        self.events.publish(
            names::TOOL_STARTED,
            json!({
                "part_id": part_id,
                "session_id": self.session_id,
                "tool": tool_name,
                "input": tool_input,
            }),
        );
        if let Some(tracker) = &self.tracker {
            tracker
                .log_execution(tool_call_id, &self.session_id, message_id, tool_name, &state)
                .await;
        }

        // Step 4: register in the active-calls map.
        self.active_calls
            .write()
            .insert(tool_call_id.to_string(), ActiveCall { ctx: ctx.clone() });

        // Step 5: invoke, always removing the entry on exit (step 6).
        let outcome = tool.execute(tool_input.clone(), &ctx).await;
        self.active_calls.write().remove(tool_call_id);

        let (result, final_state) = match outcome {
            Ok(result) => {
                state.status = ToolStatus::Completed;
                state.output = Some(result.output.clone());
                state.title = Some(result.title.clone());
                state.metadata = result.metadata.clone();
                state.time_end = Some(Utc::now());
                self.events.publish(
                    names::TOOL_COMPLETED,
                    json!({
                        "part_id": part_id,
                        "session_id": self.session_id,
                        "tool": tool_name,
                        "output": result.output,
                    }),
                );
                (result, state)
            }
            Err(_) if ctx.is_cancelled() => {
                state.status = ToolStatus::Error;
                state.error = Some("Cancelled by user".to_string());
                state.time_end = Some(Utc::now());
                let result = ToolResult::ok("Cancelled", "Cancelled by user").with_metadata("error", "cancelled");
                self.events.publish(
                    names::TOOL_ERROR,
                    json!({
                        "part_id": part_id,
                        "session_id": self.session_id,
                        "tool": tool_name,
                        "error": "cancelled",
                    }),
                );
                (result, state)
            }
            Err(message) => {
                state.status = ToolStatus::Error;
                state.error = Some(message.clone());
                state.time_end = Some(Utc::now());
                let result = ToolResult::ok("Error", message.clone()).with_metadata("error", message.clone());
                self.events.publish(
                    names::TOOL_ERROR,
                    json!({
                        "part_id": part_id,
                        "session_id": self.session_id,
                        "tool": tool_name,
                        "error": message,
                    }),
                );
                (result, state)
            }
        };

        if let Some(tracker) = &self.tracker {
            tracker.update_execution(tool_call_id, &final_state).await;
        }

        let part = ToolPart {
            id: part_id,
            session_id: self.session_id.clone(),
            message_id: message_id.to_string(),
            tool: tool_name.to_string(),
            call_id: tool_call_id.to_string(),
            state: final_state,
            source: Some(ToolSource {
                provider: String::new(),
                model: model.to_string(),
            }),
        };
        (result, part)
    }

    /// Signal cancellation on every call currently registered in the
    /// active-calls map (used when the owning session tears down).
    pub fn cleanup(&self) {
        for call in self.active_calls.read().values() {
            call.ctx.abort.cancel();
        }
    }

    pub fn active_call_count(&self) -> usize {
        self.active_calls.read().len()
    }
}
