//! Agent Runtime: end-to-end execution of one agent invocation — fetch the
//! agent descriptor, load and validate the session, filter tools, build
//! context, resolve a provider/model, run a Streaming LLM Session turn, and
//! fold the outcome (success or failure alike) into an [`AgentResult`].
//!
//! Grounded on `crates/gateway/src/runtime/agent.rs::run_agent` and, for the
//! full step sequence, `examples/original_source/dawn_kestrel/agents/runtime.py`
//! (`AgentRuntime.execute_agent`) — the gateway version is simplified for its
//! chat-channel use case, so the original is the more complete reference.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};

use sa_domain::agent::Agent;
use sa_domain::cancel::CancelToken;
use sa_domain::task::{AgentResult, TokenUsage};
use sa_eventbus::{names, EventBus};
use sa_providers::ProviderRegistry;
use sa_repo::{MessageRepository, PartRepository, RepoBackedTracker, SessionRepository, ToolExecutionRepository};
use sa_session::{SessionDeps, TurnRequest};
use sa_tools::{filter_tools, ToolExecutionManager, ToolRegistry};

const DEFAULT_PROVIDER: &str = "anthropic";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Holds every known [`Agent`] descriptor, keyed by name.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Agent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: Agent) {
        self.agents.insert(agent.name.clone(), agent);
    }

    pub fn get(&self, name: &str) -> Option<Agent> {
        self.agents.get(name).cloned()
    }

    /// Registered agent names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Caller-supplied overrides, layered over the agent descriptor's own
/// defaults (§4.6 step 10 — the agent's values apply first, options win).
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    /// Carried for parity with the original's execution options, but dropped
    /// before the provider call — `ChatRequest` has no top_p slot, matching
    /// the same limitation `sa-session` hit with the system-field.
    pub top_p: Option<f32>,
}

/// Everything one `execute_agent` call needs beyond the shared collaborators
/// in [`AgentDeps`].
pub struct ExecuteRequest {
    pub agent_name: String,
    pub session_id: String,
    pub user_message: String,
    pub skills: Vec<String>,
    pub options: ExecuteOptions,
    pub task_id: Option<String>,
    pub cancel: Option<CancelToken>,
}

/// The collaborators an Agent Runtime needs wired in. One instance serves
/// every invocation.
pub struct AgentDeps {
    pub agents: Arc<AgentRegistry>,
    pub events: Arc<EventBus>,
    pub tools: Arc<ToolRegistry>,
    pub providers: Arc<ProviderRegistry>,
    pub sessions: Arc<dyn SessionRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub parts: Arc<dyn PartRepository>,
    pub tool_executions: Arc<dyn ToolExecutionRepository>,
    pub skills: Vec<sa_context::SkillDoc>,
    pub skill_char_budget: Option<usize>,
}

/// Execute one agent invocation. Always returns an [`AgentResult`] — never an
/// `Err` — folding every failure (agent/session lookup, provider resolution,
/// the session turn itself) into `AgentResult.error` rather than propagating.
/// Callers (the Orchestrator, in particular) inspect `result.is_success()`.
pub async fn execute_agent(deps: &AgentDeps, request: ExecuteRequest) -> AgentResult {
    let start = Instant::now();

    let Some(agent) = deps.agents.get(&request.agent_name) else {
        publish_error(deps, &request, "unknown", &format!("Agent not found: {}", request.agent_name), None);
        return error_result(&request, "unknown", format!("Agent not found: {}", request.agent_name), start);
    };

    let session = match deps.sessions.get(&request.session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            let message = format!("Session not found: {}", request.session_id);
            publish_error(deps, &request, &agent.name, &message, None);
            return error_result(&request, &agent.name, message, start);
        }
        Err(e) => {
            let message = format!("Session lookup failed: {e}");
            publish_error(deps, &request, &agent.name, &message, None);
            return error_result(&request, &agent.name, message, start);
        }
    };

    if let Some(field) = session.first_empty_required_field() {
        let message = format!("Session {} has empty {field}", session.id);
        publish_error(deps, &request, &agent.name, &message, None);
        return error_result(&request, &agent.name, message, start);
    }

    let mut init_payload = json!({"session_id": session.id, "agent_name": agent.name});
    if let Some(task_id) = &request.task_id {
        init_payload["task_id"] = json!(task_id);
    }
    deps.events.publish(names::AGENT_INITIALIZED, init_payload);

    match run_from_permission_filter(deps, &agent, session, &request, start).await {
        Ok((result, _duration)) => result,
        Err(message) => {
            let duration = start.elapsed().as_secs_f64();
            publish_error(deps, &request, &agent.name, &message, Some(duration));
            error_result(&request, &agent.name, message, start)
        }
    }
}

/// Steps 4-14 of §4.6 — everything from tool filtering onward, folded into a
/// single `Result` so the caller can turn any failure into `AGENT_ERROR` plus
/// a folded result without duplicating that bookkeeping at each step.
async fn run_from_permission_filter(
    deps: &AgentDeps,
    agent: &Agent,
    session: sa_domain::session::Session,
    request: &ExecuteRequest,
    start: Instant,
) -> Result<(AgentResult, f64), String> {
    let filtered = filter_tools(&deps.tools, &agent.permission);

    let system_prompt = sa_context::build_system_prompt(&agent.prompt, &request.skills, &deps.skills, deps.skill_char_budget);

    let mut ready_payload = json!({
        "session_id": session.id,
        "agent_name": agent.name,
        "tools_available": filtered.len(),
    });
    if let Some(task_id) = &request.task_id {
        ready_payload["task_id"] = json!(task_id);
    }
    deps.events.publish(names::AGENT_READY, ready_payload);

    let (provider_id, model) = resolve_provider_and_model(agent, &request.options);
    let provider = deps
        .providers
        .get(&provider_id)
        .ok_or_else(|| format!("provider not found: {provider_id}"))?;

    let tracker = Arc::new(RepoBackedTracker::new(deps.tool_executions.clone()));
    let tool_manager = Arc::new(
        ToolExecutionManager::new(session.id.clone(), filtered.clone(), deps.events.clone()).with_tracker(tracker),
    );
    let session_deps = SessionDeps {
        events: deps.events.clone(),
        provider,
        tool_manager,
        sessions: deps.sessions.clone(),
        messages: deps.messages.clone(),
        parts: deps.parts.clone(),
    };

    let mut executing_payload = json!({"session_id": session.id, "agent_name": agent.name, "model": model});
    if let Some(task_id) = &request.task_id {
        executing_payload["task_id"] = json!(task_id);
    }
    deps.events.publish(names::AGENT_EXECUTING, executing_payload);

    let temperature = request.options.temperature.or_else(|| agent.temperature.map(|t| t as f32));

    let history = deps
        .messages
        .list_by_session(&session.id)
        .await
        .map_err(|e| format!("failed to load session history: {e}"))?;

    let turn_request = TurnRequest {
        agent_name: agent.name.clone(),
        user_text: request.user_message.clone(),
        system_prompt,
        tool_definitions: filtered.definitions(),
        model: Some(model.clone()),
        temperature,
    };

    let cancel = request.cancel.clone().unwrap_or_default();

    let outcome = sa_session::process_message(&session_deps, session.clone(), history, turn_request, &cancel)
        .await
        .map_err(|e| e.to_string())?;

    let tools_used = outcome.tools_used.clone();
    let tokens_used = outcome.assistant_message.metadata.tokens.map(|t| TokenUsage {
        input: t.input,
        output: t.output,
        reasoning: 0,
        cache_read: 0,
        cache_write: 0,
    });
    let duration = start.elapsed().as_secs_f64();

    let mut cleanup_payload = json!({
        "session_id": session.id,
        "agent_name": agent.name,
        "tools_used": tools_used,
        "duration": duration,
    });
    if let Some(task_id) = &request.task_id {
        cleanup_payload["task_id"] = json!(task_id);
    }
    deps.events.publish(names::AGENT_CLEANUP, cleanup_payload);

    let metadata = response_metadata(&outcome.assistant_message);

    Ok((
        AgentResult {
            agent_name: agent.name.clone(),
            response: outcome.assistant_message.text.clone(),
            parts: outcome.assistant_message.parts.clone(),
            metadata,
            tools_used,
            tokens_used,
            duration,
            error: None,
            task_id: request.task_id.clone(),
        },
        duration,
    ))
}

/// `options.provider`/`options.model` default, the agent descriptor's
/// `model` hint overrides both when set (§4.6 step 7).
fn resolve_provider_and_model(agent: &Agent, options: &ExecuteOptions) -> (String, String) {
    let mut provider_id = options.provider.clone().unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
    let mut model = options.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());

    if let Some(hint) = &agent.model {
        if let Some(p) = &hint.provider {
            provider_id = p.clone();
        }
        if let Some(m) = &hint.model {
            model = m.clone();
        }
    }

    (provider_id, model)
}

fn response_metadata(message: &sa_domain::session::Message) -> Map<String, Value> {
    let mut metadata = message.metadata.extra.clone();
    if let Some(provider_id) = &message.metadata.provider_id {
        metadata.insert("provider_id".into(), json!(provider_id));
    }
    if let Some(model_id) = &message.metadata.model_id {
        metadata.insert("model_id".into(), json!(model_id));
    }
    metadata
}

fn publish_error(deps: &AgentDeps, request: &ExecuteRequest, agent_name: &str, message: &str, duration: Option<f64>) {
    let mut payload = json!({
        "session_id": request.session_id,
        "agent_name": agent_name,
        "error": message,
    });
    if let Some(duration) = duration {
        payload["duration"] = json!(duration);
    }
    if let Some(task_id) = &request.task_id {
        payload["task_id"] = json!(task_id);
    }
    deps.events.publish(names::AGENT_ERROR, payload);
}

fn error_result(request: &ExecuteRequest, agent_name: &str, message: String, start: Instant) -> AgentResult {
    let mut metadata = Map::new();
    metadata.insert("error".into(), json!(message));
    AgentResult {
        agent_name: agent_name.to_string(),
        response: format!("Error: {message}"),
        parts: Vec::new(),
        metadata,
        tools_used: Vec::new(),
        tokens_used: None,
        duration: start.elapsed().as_secs_f64(),
        error: Some(message),
        task_id: request.task_id.clone(),
    }
}
