//! Composition root: wires the Event Bus, Tool Registry + bundled tools,
//! Provider Registry, repositories, Agent Runtime, Orchestrator and
//! Delegation Engine behind one [`Runtime`] handle.
//!
//! Grounded on `crates/gateway/src/runtime/mod.rs` and the construction
//! sequence in `src/main.rs::run_server` (step-by-step collaborator
//! construction, each logged via `tracing::info!`, config validated before
//! anything is built) — scoped down to the orchestration-runtime
//! collaborators (C1-C8) rather than the gateway's full chat-surface
//! `AppState` (no sessions HTTP API, schedules, deliveries, MCP, nodes, or
//! admin tokens here; those stay external collaborator concerns).

use std::path::PathBuf;
use std::sync::Arc;

use sa_agent::{AgentDeps, AgentRegistry};
use sa_delegation::{DelegateTool, DelegationConfig, DelegationEngine};
use sa_domain::agent::Agent;
use sa_domain::config::Config;
use sa_domain::error::{Error, Result};
use sa_eventbus::EventBus;
use sa_orchestrator::Orchestrator;
use sa_providers::ProviderRegistry;
use sa_repo::{
    InMemoryMemoryRepository, InMemoryMessageRepository, InMemoryPartRepository, InMemorySessionRepository, InMemoryToolExecutionRepository,
    MemoryRepository, MessageRepository, PartRepository, SessionRepository, ToolExecutionRepository,
};
use sa_tools::{ProcessManager, ToolRegistry};

pub mod logging;

/// Load and validate a [`Config`] from a TOML file: errors abort, warnings
/// are logged and the config is still returned. File-discovery/env-override
/// layering is a collaborator concern here — callers hand in an explicit
/// path.
pub fn load_config(path: &std::path::Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
    let config: Config = toml::from_str(&raw).map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))?;

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            sa_domain::config::ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            sa_domain::config::ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == sa_domain::config::ConfigSeverity::Error) {
        return Err(Error::Config(format!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == sa_domain::config::ConfigSeverity::Error).count()
        )));
    }

    Ok(config)
}

/// Every collaborator an embedder needs to run agents, orchestrate tasks,
/// and delegate — constructed once per process and shared behind `Arc`s.
pub struct Runtime {
    pub events: Arc<EventBus>,
    pub tools: Arc<ToolRegistry>,
    pub providers: Arc<ProviderRegistry>,
    pub sessions: Arc<dyn SessionRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub parts: Arc<dyn PartRepository>,
    pub memory: Arc<dyn MemoryRepository>,
    pub tool_executions: Arc<dyn ToolExecutionRepository>,
    pub agents: Arc<AgentRegistry>,
    pub agent_deps: Arc<AgentDeps>,
    pub orchestrator: Arc<Orchestrator>,
    pub processes: Arc<ProcessManager>,
    default_delegation_budget: sa_domain::delegation::DelegationBudget,
}

impl Runtime {
    /// Build a fully-wired runtime from `config` and the given agent
    /// descriptors, rooting file tools at `workspace_root`.
    ///
    /// Registers the bundled reference tools (§9) plus the `delegate` tool
    /// (C8) into one shared [`ToolRegistry`], then builds the single
    /// [`Orchestrator`] (C7) every agent invocation and delegation run
    /// against — including the `delegate` tool itself, via a [`Weak`]
    /// handle (see [`sa_delegation::DelegateTool`]) so the tool can live
    /// inside the very registry the orchestrator's own [`AgentDeps`] carry
    /// without an `Arc` reference cycle.
    pub fn bootstrap(config: &Config, workspace_root: PathBuf, agents: Vec<Agent>) -> Result<Self> {
        tracing::info!("runtime bootstrap starting");

        let events = Arc::new(EventBus::new());

        let mut registry = ToolRegistry::new();
        let processes = Arc::new(ProcessManager::new(config.tools.exec.clone()));
        sa_tools_builtin::register_builtin_tools(&mut registry, workspace_root, processes.clone());
        tracing::info!(tools = registry.len(), "bundled tools registered");

        let providers = Arc::new(ProviderRegistry::from_config(&config.llm).map_err(|e| Error::Config(format!("provider registry: {e}")))?);
        tracing::info!("provider registry ready");

        let sessions: Arc<dyn SessionRepository> = Arc::new(InMemorySessionRepository::new());
        let messages: Arc<dyn MessageRepository> = Arc::new(InMemoryMessageRepository::new());
        let parts: Arc<dyn PartRepository> = Arc::new(InMemoryPartRepository::new());
        let memory: Arc<dyn MemoryRepository> = Arc::new(InMemoryMemoryRepository::new());
        let tool_executions: Arc<dyn ToolExecutionRepository> = Arc::new(InMemoryToolExecutionRepository::new());

        let mut agent_registry = AgentRegistry::new();
        for agent in agents {
            agent_registry.register(agent);
        }
        let agent_registry = Arc::new(agent_registry);
        tracing::info!(agents = agent_registry.len(), "agent registry ready");

        // Phase 1: a provisional orchestrator whose `AgentDeps` carries the
        // registry *without* the delegate tool, used only to mint the
        // `Weak<Orchestrator>` the delegate tool needs.
        let provisional_deps = Arc::new(AgentDeps {
            agents: agent_registry.clone(),
            events: events.clone(),
            tools: Arc::new(registry.clone()),
            providers: providers.clone(),
            sessions: sessions.clone(),
            messages: messages.clone(),
            parts: parts.clone(),
            tool_executions: tool_executions.clone(),
            skills: Vec::new(),
            skill_char_budget: None,
        });
        let provisional_orchestrator = Arc::new(Orchestrator::new(provisional_deps));

        registry.register(Arc::new(DelegateTool::new(&provisional_orchestrator)));
        tracing::info!("delegate tool registered");

        let tools = Arc::new(registry);
        let agent_deps = Arc::new(AgentDeps {
            agents: agent_registry.clone(),
            events: events.clone(),
            tools: tools.clone(),
            providers: providers.clone(),
            sessions: sessions.clone(),
            messages: messages.clone(),
            parts: parts.clone(),
            tool_executions: tool_executions.clone(),
            skills: Vec::new(),
            skill_char_budget: None,
        });
        let orchestrator = Arc::new(Orchestrator::new(agent_deps.clone()));
        tracing::info!("orchestrator ready");

        Ok(Self {
            events,
            tools,
            providers,
            sessions,
            messages,
            parts,
            memory,
            tool_executions,
            agents: agent_registry,
            agent_deps,
            orchestrator,
            processes,
            default_delegation_budget: sa_domain::delegation::DelegationBudget::default(),
        })
    }

    /// Run one agent invocation through the wired orchestrator, returning
    /// the completed task's result.
    pub async fn execute_agent(&self, agent_name: &str, session_id: &str, user_message: &str) -> Result<sa_domain::task::AgentResult> {
        let task_id = uuid::Uuid::new_v4().to_string();
        let task = sa_domain::task::AgentTask::new(task_id.clone(), agent_name, user_message);
        let params = sa_orchestrator::DelegateParams {
            session_id: session_id.to_string(),
            user_message: user_message.to_string(),
            cancel: None,
        };
        self.orchestrator.delegate_task(task, params).await?;
        self.orchestrator
            .get_result(&task_id)
            .and_then(|r| r.result)
            .ok_or_else(|| Error::Internal("agent execution produced no result".into()))
    }

    /// Build a [`DelegationEngine`] bound to this runtime's orchestrator,
    /// using the runtime's default budget unless `config` overrides it.
    pub fn delegation_engine(&self, config: Option<DelegationConfig>) -> Result<DelegationEngine> {
        let config = config.unwrap_or_else(|| DelegationConfig {
            budget: self.default_delegation_budget.clone(),
            ..DelegationConfig::default()
        });
        DelegationEngine::new(self.orchestrator.clone(), config)
    }
}
