//! Delegation Engine: recursively spawns a tree of agent invocations under a
//! configured [`TraversalMode`], bounded by a [`DelegationBudget`] and
//! stopped by the first applicable [`StopReason`] — depth/breadth/total-agent/
//! wall-time/iteration limits, stagnation, or convergence.
//!
//! Grounded on `examples/original_source/dawn_kestrel/delegation/{types,tool}.py`
//! (`DelegationBudget`/`DelegationConfig`/`DelegationContext` field shapes,
//! `DelegateTool`'s argument schema and result-mapping) for everything the
//! pack retrieved; no `engine.py` was retrieved in the original_source pack,
//! so the traversal loop itself is written directly from spec.md §4.8's
//! prose (chunk-by-budget batching, per-parent breadth check, Adaptive's
//! BFS→DFS switch on stagnation) — see DESIGN.md for the specific policy
//! choices this implies.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use sa_domain::delegation::{novelty_signature, DelegationBudget, DelegationContext, DelegationResult, StopReason, TraversalMode};
use sa_domain::error::{Error, Result};
use sa_domain::task::{AgentResult, AgentTask};
use sa_orchestrator::{DelegateParams, Orchestrator};
use sa_tools::{Tool, ToolContext, ToolResult};

/// One node of a delegation spec tree: which agent to run, what to ask it,
/// and its own children (spawned one depth deeper once this node completes).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChildSpec {
    pub agent: String,
    pub prompt: String,
    #[serde(default)]
    pub children: Vec<ChildSpec>,
}

/// Optional async callbacks a caller can hook into the traversal. Failures
/// inside these are the caller's problem — the engine only calls them and
/// does not itself guard against panics (the event bus's isolation is for
/// its own subscribers, not these hooks).
#[async_trait]
pub trait DelegationHooks: Send + Sync {
    async fn on_agent_spawn(&self, _agent_name: &str, _depth: u32) {}
    async fn on_agent_complete(&self, _agent_name: &str, _result: &AgentResult) {}
    /// Returning `Some(decision)` overrides the novelty/stagnation heuristic
    /// for this iteration; `None` defers to it.
    async fn on_convergence_check(&self, _results: &[AgentResult]) -> Option<bool> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct DelegationConfig {
    pub mode: TraversalMode,
    pub budget: DelegationBudget,
    pub check_convergence: bool,
    pub evidence_keys: Vec<String>,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            mode: TraversalMode::Bfs,
            budget: DelegationBudget::default(),
            check_convergence: true,
            evidence_keys: vec!["result".to_string(), "findings".to_string()],
        }
    }
}

struct FrontierNode {
    spec: ChildSpec,
    parent_task_id: String,
    depth: u32,
}

pub struct DelegationEngine {
    orchestrator: Arc<Orchestrator>,
    config: DelegationConfig,
    hooks: Option<Arc<dyn DelegationHooks>>,
}

impl DelegationEngine {
    pub fn new(orchestrator: Arc<Orchestrator>, config: DelegationConfig) -> Result<Self> {
        config.budget.validate()?;
        Ok(Self { orchestrator, config, hooks: None })
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn DelegationHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Run one delegation traversal rooted at `root_agent`/`root_prompt`.
    pub async fn delegate(&self, root_agent: &str, root_prompt: &str, session_id: &str, children: Vec<ChildSpec>) -> Result<DelegationResult> {
        let root_task_id = Uuid::new_v4().to_string();
        let mut ctx = DelegationContext::new(root_task_id.clone());

        let root_task = AgentTask::new(root_task_id.clone(), root_agent, truncate_description(root_prompt));
        if let Some(hooks) = &self.hooks {
            hooks.on_agent_spawn(root_agent, 0).await;
        }
        let params = DelegateParams {
            session_id: session_id.to_string(),
            user_message: root_prompt.to_string(),
            cancel: None,
        };
        self.orchestrator.delegate_task(root_task, params).await?;
        let root_result = self
            .orchestrator
            .get_result(&root_task_id)
            .and_then(|r| r.result)
            .ok_or_else(|| Error::Internal("root delegation produced no result".into()))?;

        ctx.total_agents_spawned = 1;
        ctx.completed_agents = 1;
        if let Some(hooks) = &self.hooks {
            hooks.on_agent_complete(root_agent, &root_result).await;
        }
        record_novelty(&mut ctx, &root_result, &self.config.evidence_keys);
        ctx.results.push(root_result);

        if children.is_empty() {
            return Ok(self.finish(ctx, StopReason::Completed, false, false));
        }

        let mut frontier: VecDeque<FrontierNode> = children
            .into_iter()
            .map(|spec| FrontierNode { spec, parent_task_id: root_task_id.clone(), depth: 1 })
            .collect();
        let mut mode = self.config.mode;
        let mut converged = false;
        let mut stagnation_detected = false;

        let stop_reason = 'traversal: loop {
            ctx.iteration_count += 1;
            if ctx.iteration_count > self.config.budget.max_iterations {
                tracing::warn!(root_task_id = %root_task_id, "delegation hit max_iterations with frontier remaining");
                break StopReason::Completed;
            }
            if ctx.elapsed_seconds() >= self.config.budget.max_wall_time_seconds {
                break StopReason::Timeout;
            }
            if frontier.is_empty() {
                break StopReason::Completed;
            }

            let depth = frontier.front().unwrap().depth;
            if depth > self.config.budget.max_depth {
                break StopReason::DepthLimit;
            }

            let level_len = frontier.iter().take_while(|n| n.depth == depth).count();
            let mut per_parent: HashMap<&str, u32> = HashMap::new();
            for node in frontier.iter().take(level_len) {
                *per_parent.entry(node.parent_task_id.as_str()).or_insert(0) += 1;
            }
            if per_parent.values().any(|&count| count > self.config.budget.max_breadth) {
                break StopReason::BreadthLimit;
            }

            let remaining_budget = self.config.budget.max_total_agents.saturating_sub(ctx.total_agents_spawned);
            if remaining_budget == 0 {
                break StopReason::BudgetExhausted;
            }

            let dfs_active = mode == TraversalMode::Dfs;
            let chunk_size = if dfs_active {
                1
            } else {
                (self.config.budget.max_breadth as usize).min(remaining_budget as usize).min(level_len)
            };
            let chunk: Vec<FrontierNode> = frontier.drain(0..chunk_size).collect();

            ctx.active_agents += chunk.len() as u32;
            ctx.current_depth = ctx.current_depth.max(depth);

            let mut completed: Vec<(FrontierNode, AgentResult)> = Vec::new();
            if dfs_active {
                for node in chunk {
                    if let Some(hooks) = &self.hooks {
                        hooks.on_agent_spawn(&node.spec.agent, node.depth).await;
                    }
                    let task_id = Uuid::new_v4().to_string();
                    let task = AgentTask::new(task_id.clone(), node.spec.agent.clone(), truncate_description(&node.spec.prompt))
                        .with_parent(node.parent_task_id.clone());
                    let params = DelegateParams {
                        session_id: session_id.to_string(),
                        user_message: node.spec.prompt.clone(),
                        cancel: None,
                    };
                    match self.orchestrator.delegate_task(task, params).await {
                        Ok(id) => {
                            if let Some(result) = self.orchestrator.get_result(&id).and_then(|r| r.result) {
                                completed.push((node, result));
                            }
                        }
                        Err(e) => ctx.errors.push(e.to_string()),
                    }
                }
            } else {
                let tasks: Vec<AgentTask> = chunk
                    .iter()
                    .map(|node| {
                        let task_id = Uuid::new_v4().to_string();
                        AgentTask::new(task_id, node.spec.agent.clone(), truncate_description(&node.spec.prompt))
                            .with_parent(node.parent_task_id.clone())
                    })
                    .collect();
                let messages: Vec<String> = chunk.iter().map(|node| node.spec.prompt.clone()).collect();
                for node in &chunk {
                    if let Some(hooks) = &self.hooks {
                        hooks.on_agent_spawn(&node.spec.agent, node.depth).await;
                    }
                }
                // Every task here was just constructed as `Pending`, so
                // `delegate_task`'s only error path (non-pending precondition)
                // never fires — `run_parallel_agents` returns one id per input
                // task, in input order (see its own doc comment).
                let task_ids = match self.orchestrator.run_parallel_agents(tasks, session_id, messages, None).await {
                    Ok(ids) => ids,
                    Err(e) => {
                        ctx.errors.push(e.to_string());
                        break 'traversal StopReason::Error;
                    }
                };
                for (node, task_id) in chunk.into_iter().zip(task_ids.iter()) {
                    if let Some(result) = self.orchestrator.get_result(task_id).and_then(|r| r.result) {
                        completed.push((node, result));
                    }
                }
            }

            ctx.active_agents = ctx.active_agents.saturating_sub(chunk.len() as u32);
            ctx.total_agents_spawned += chunk.len() as u32;
            ctx.completed_agents += completed.len() as u32;

            let mut most_recent_novel: Option<(String, Vec<ChildSpec>)> = None;
            for (node, result) in &completed {
                let was_novel = record_novelty(&mut ctx, result, &self.config.evidence_keys);
                if was_novel && !node.spec.children.is_empty() {
                    most_recent_novel = Some((node.spec.agent.clone(), node.spec.children.clone()));
                }
                if let Some(hooks) = &self.hooks {
                    hooks.on_agent_complete(&node.spec.agent, result).await;
                }
            }

            if dfs_active {
                // Descend into the single processed node's children before its
                // siblings — push to the front, ahead of whatever remains.
                if let Some((node, _)) = completed.first() {
                    for child in node.spec.children.iter().rev() {
                        frontier.push_front(FrontierNode {
                            spec: child.clone(),
                            parent_task_id: child_task_id(&node.spec.agent, &completed),
                            depth: node.depth + 1,
                        });
                    }
                }
            } else {
                for (node, result) in &completed {
                    for child in &node.spec.children {
                        frontier.push_back(FrontierNode {
                            spec: child.clone(),
                            parent_task_id: result.task_id.clone().unwrap_or_else(|| node.parent_task_id.clone()),
                            depth: node.depth + 1,
                        });
                    }
                }
            }

            ctx.results.extend(completed.iter().map(|(_, r)| r.clone()));

            if let Some(hooks) = &self.hooks {
                if let Some(decision) = hooks.on_convergence_check(&ctx.results).await {
                    converged = decision;
                    if decision {
                        break StopReason::Converged;
                    }
                }
            }

            if self.config.check_convergence && ctx.stagnation_count >= self.config.budget.stagnation_threshold {
                stagnation_detected = true;
                if mode == TraversalMode::Adaptive {
                    mode = TraversalMode::Dfs;
                    ctx.stagnation_count = 0;
                    if let Some((_, branch_children)) = most_recent_novel {
                        frontier = branch_children
                            .into_iter()
                            .map(|spec| FrontierNode { spec, parent_task_id: root_task_id.clone(), depth: depth + 1 })
                            .collect();
                    }
                    continue;
                }
                break StopReason::Stagnation;
            }
        };

        Ok(self.finish(ctx, stop_reason, converged, stagnation_detected))
    }

    fn finish(&self, ctx: DelegationContext, stop_reason: StopReason, converged: bool, stagnation_detected: bool) -> DelegationResult {
        DelegationResult {
            success: !matches!(stop_reason, StopReason::Error),
            stop_reason,
            results: ctx.results.clone(),
            errors: ctx.errors.clone(),
            total_agents: ctx.total_agents_spawned,
            max_depth_reached: ctx.current_depth,
            elapsed_seconds: ctx.elapsed_seconds(),
            iterations: ctx.iteration_count,
            converged,
            stagnation_detected,
            final_novelty_signature: ctx.novelty_signatures.last().cloned(),
        }
    }
}

/// Records one completed result's novelty signature against the running
/// context, returning whether it was novel (true) or a repeat (false).
fn record_novelty(ctx: &mut DelegationContext, result: &AgentResult, evidence_keys: &[String]) -> bool {
    let signature = novelty_signature(result, evidence_keys);
    if ctx.novelty_signatures.contains(&signature) {
        ctx.stagnation_count += 1;
        false
    } else {
        ctx.novelty_signatures.push(signature);
        ctx.stagnation_count = 0;
        true
    }
}

/// Best-effort lookup of the task id assigned to the most recently completed
/// node matching `agent_name`, used to parent DFS children correctly when
/// the node's own `AgentResult.task_id` round-trips through the orchestrator.
fn child_task_id(agent_name: &str, completed: &[(FrontierNode, AgentResult)]) -> String {
    completed
        .iter()
        .find(|(node, _)| node.spec.agent == agent_name)
        .and_then(|(_, r)| r.task_id.clone())
        .unwrap_or_default()
}

fn truncate_description(prompt: &str) -> String {
    prompt.chars().take(100).collect()
}

trait WithParent {
    fn with_parent(self, parent_id: String) -> Self;
}

impl WithParent for AgentTask {
    fn with_parent(mut self, parent_id: String) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Tool wrapper exposing the Delegation Engine to agents: `{agent, prompt,
/// mode?, children?, budget?}` in, a summary `ToolResult` out.
///
/// Holds a `Weak` reference rather than `Arc<Orchestrator>`: a runtime wires
/// this tool into the very [`sa_tools::ToolRegistry`] the orchestrator's own
/// `AgentDeps` carries, so the strong-owning direction has to run the other
/// way (`Runtime` → `Orchestrator` → `AgentDeps` → registry → this tool) to
/// avoid an `Arc` cycle that would leak the whole wiring.
pub struct DelegateTool {
    orchestrator: Weak<Orchestrator>,
}

impl DelegateTool {
    pub fn new(orchestrator: &Arc<Orchestrator>) -> Self {
        Self { orchestrator: Arc::downgrade(orchestrator) }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn id(&self) -> &str {
        "delegate"
    }

    fn definition(&self) -> sa_domain::tool::ToolDefinition {
        sa_domain::tool::ToolDefinition {
            name: "delegate".into(),
            description: "Spawn and coordinate subagents with convergence guarantees".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "agent": {"type": "string", "description": "Name of agent to delegate to"},
                    "prompt": {"type": "string", "description": "Prompt for the agent"},
                    "mode": {
                        "type": "string",
                        "enum": ["breadth_first", "depth_first", "adaptive"],
                        "default": "breadth_first",
                        "description": "Traversal mode for delegation",
                    },
                    "children": {
                        "type": "array",
                        "items": {"type": "object"},
                        "description": "Child delegations to spawn",
                    },
                    "budget": {
                        "type": "object",
                        "description": "Budget limits (max_depth, max_breadth, etc.)",
                    },
                },
                "required": ["agent", "prompt"],
            }),
        }
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> std::result::Result<ToolResult, String> {
        let orchestrator = self.orchestrator.upgrade().ok_or_else(|| "orchestrator no longer available".to_string())?;
        let agent = input.get("agent").and_then(Value::as_str).unwrap_or("general").to_string();
        let prompt = input.get("prompt").and_then(Value::as_str).unwrap_or_default().to_string();
        let mode: TraversalMode = input
            .get("mode")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e: serde_json::Error| e.to_string())?
            .unwrap_or(TraversalMode::Bfs);
        let budget: DelegationBudget = input
            .get("budget")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e: serde_json::Error| e.to_string())?
            .unwrap_or_default();
        let children: Vec<ChildSpec> = input
            .get("children")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e: serde_json::Error| e.to_string())?
            .unwrap_or_default();

        let config = DelegationConfig { mode, budget, ..DelegationConfig::default() };
        let engine = DelegationEngine::new(orchestrator, config).map_err(|e| e.to_string())?;

        let result = engine.delegate(&agent, &prompt, &ctx.session_id, children).await.map_err(|e| e.to_string())?;

        Ok(ToolResult::ok(
            "Delegation complete",
            format!("Spawned {} agents, converged: {}", result.total_agents, result.converged),
        )
        .with_metadata("success", result.success)
        .with_metadata("total_agents", result.total_agents)
        .with_metadata("converged", result.converged)
        .with_metadata("stop_reason", serde_json::to_value(result.stop_reason).unwrap_or(Value::Null))
        .with_metadata("max_depth_reached", result.max_depth_reached)
        .with_metadata("elapsed_seconds", result.elapsed_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as async_trait_attr;
    use sa_agent::{AgentDeps, AgentRegistry};
    use sa_domain::agent::Agent;
    use sa_domain::config::llm::LlmConfig;
    use sa_providers::ProviderRegistry;
    use sa_repo::{InMemoryMessageRepository, InMemoryPartRepository, InMemorySessionRepository, InMemoryToolExecutionRepository};
    use sa_tools::ToolRegistry;

    fn orchestrator_with_agents(names: &[&str]) -> Arc<Orchestrator> {
        let mut agents = AgentRegistry::new();
        for name in names {
            agents.register(Agent::new(*name));
        }
        let deps = AgentDeps {
            agents: Arc::new(agents),
            events: Arc::new(sa_eventbus::EventBus::new()),
            tools: Arc::new(ToolRegistry::new()),
            providers: Arc::new(ProviderRegistry::from_config(&LlmConfig::default()).unwrap()),
            sessions: Arc::new(InMemorySessionRepository::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            parts: Arc::new(InMemoryPartRepository::new()),
            tool_executions: Arc::new(InMemoryToolExecutionRepository::new()),
            skills: Vec::new(),
            skill_char_budget: None,
        };
        Arc::new(Orchestrator::new(Arc::new(deps)))
    }

    // `reviewer` is registered but never resolves a provider (none configured),
    // so every spawned agent folds to an `AgentResult` with `.error` set —
    // still a *completed* task per `sa-orchestrator`'s semantics, which is all
    // the traversal loop itself needs to exercise budget/limit enforcement.

    #[tokio::test]
    async fn delegation_with_no_children_completes_immediately() {
        let orch = orchestrator_with_agents(&["reviewer"]);
        let engine = DelegationEngine::new(orch, DelegationConfig::default()).unwrap();
        let result = engine.delegate("reviewer", "scan the diff", "s1", Vec::new()).await.unwrap();
        assert_eq!(result.stop_reason, StopReason::Completed);
        assert_eq!(result.total_agents, 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_stops_after_max_total_agents() {
        let orch = orchestrator_with_agents(&["root", "child"]);
        let config = DelegationConfig {
            budget: DelegationBudget { max_total_agents: 2, ..DelegationBudget::default() },
            ..DelegationConfig::default()
        };
        let engine = DelegationEngine::new(orch, config).unwrap();

        let children = vec![
            ChildSpec { agent: "child".into(), prompt: "a".into(), children: Vec::new() },
            ChildSpec { agent: "child".into(), prompt: "b".into(), children: Vec::new() },
            ChildSpec { agent: "child".into(), prompt: "c".into(), children: Vec::new() },
        ];
        let result = engine.delegate("root", "coordinate", "s1", children).await.unwrap();

        assert_eq!(result.total_agents, 2);
        assert_eq!(result.stop_reason, StopReason::BudgetExhausted);
        assert!(!result.converged);
        assert_eq!(result.max_depth_reached, 1);
    }

    #[tokio::test]
    async fn breadth_limit_is_a_hard_stop_not_a_clip() {
        let orch = orchestrator_with_agents(&["root", "child"]);
        let config = DelegationConfig {
            budget: DelegationBudget { max_breadth: 2, ..DelegationBudget::default() },
            ..DelegationConfig::default()
        };
        let engine = DelegationEngine::new(orch, config).unwrap();

        let children = (0..3)
            .map(|i| ChildSpec { agent: "child".into(), prompt: format!("task {i}"), children: Vec::new() })
            .collect();
        let result = engine.delegate("root", "coordinate", "s1", children).await.unwrap();

        assert_eq!(result.stop_reason, StopReason::BreadthLimit);
        assert_eq!(result.total_agents, 1, "no children should spawn once breadth is exceeded");
    }

    #[tokio::test]
    async fn depth_limit_stops_before_spawning_beyond_max_depth() {
        let orch = orchestrator_with_agents(&["root", "child", "grandchild"]);
        let config = DelegationConfig {
            budget: DelegationBudget { max_depth: 1, ..DelegationBudget::default() },
            ..DelegationConfig::default()
        };
        let engine = DelegationEngine::new(orch, config).unwrap();

        let children = vec![ChildSpec {
            agent: "child".into(),
            prompt: "a".into(),
            children: vec![ChildSpec { agent: "grandchild".into(), prompt: "b".into(), children: Vec::new() }],
        }];
        let result = engine.delegate("root", "coordinate", "s1", children).await.unwrap();

        assert_eq!(result.stop_reason, StopReason::DepthLimit);
        assert_eq!(result.total_agents, 2, "root + the one depth-1 child should have run");
    }

    #[tokio::test]
    async fn stagnation_is_detected_when_results_repeat() {
        // Every spawned agent here is unresolvable (no provider configured),
        // so every `AgentResult.response` folds to the identical
        // "Error: Agent not found: ..." text — an ideal stand-in for
        // "two consecutive iterations produce the same signature" without
        // needing a real provider round trip.
        let orch = orchestrator_with_agents(&["root"]);
        let config = DelegationConfig {
            mode: TraversalMode::Dfs,
            budget: DelegationBudget { stagnation_threshold: 2, max_total_agents: 100, ..DelegationBudget::default() },
            ..DelegationConfig::default()
        };
        let engine = DelegationEngine::new(orch, config).unwrap();

        let children = vec![ChildSpec {
            agent: "ghost".into(),
            prompt: "a".into(),
            children: vec![
                ChildSpec { agent: "ghost".into(), prompt: "a".into(), children: Vec::new() },
                ChildSpec { agent: "ghost".into(), prompt: "a".into(), children: Vec::new() },
            ],
        }];
        let result = engine.delegate("root", "coordinate", "s1", children).await.unwrap();

        assert_eq!(result.stop_reason, StopReason::Stagnation);
        assert!(result.stagnation_detected);
    }

    struct ForceConverge;

    #[async_trait_attr]
    impl DelegationHooks for ForceConverge {
        async fn on_convergence_check(&self, _results: &[AgentResult]) -> Option<bool> {
            Some(true)
        }
    }

    #[tokio::test]
    async fn convergence_hook_overrides_the_novelty_heuristic() {
        let orch = orchestrator_with_agents(&["root", "child"]);
        let engine = DelegationEngine::new(orch, DelegationConfig::default())
            .unwrap()
            .with_hooks(Arc::new(ForceConverge));

        let children = vec![ChildSpec { agent: "child".into(), prompt: "a".into(), children: Vec::new() }];
        let result = engine.delegate("root", "coordinate", "s1", children).await.unwrap();

        assert_eq!(result.stop_reason, StopReason::Converged);
        assert!(result.converged);
    }

    #[tokio::test]
    async fn delegate_tool_maps_result_metadata() {
        let orch = orchestrator_with_agents(&["root"]);
        let tool = DelegateTool::new(&orch);
        let tool_ctx = ToolContext::new("s1", "m1", "root", "call1");

        let result = tool
            .execute(json!({"agent": "root", "prompt": "go"}), &tool_ctx)
            .await
            .unwrap();

        assert_eq!(result.title, "Delegation complete");
        assert_eq!(result.metadata.get("total_agents").and_then(Value::as_u64), Some(1));
    }
}
