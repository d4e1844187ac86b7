//! Streaming LLM Session: turns one user message into one assistant message,
//! interleaving text deltas with synchronous tool-call dispatch through the
//! Tool Execution Manager.
//!
//! Grounded on `crates/gateway/src/runtime/turn.rs` (`run_turn_inner`'s
//! tool-loop shape, `MAX_TOOL_LOOPS` bound, `tc_bufs` incremental tool-call
//! assembly) and `examples/original_source/dawn_kestrel/ai_session.py`
//! (`process_stream`/`create_assistant_message`'s text-delta-append-or-new-part
//! rule and the tool-cycle/`AgentPart` delimiter).

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use uuid::Uuid;

use sa_domain::cancel::CancelToken;
use sa_domain::error::{Error, Result};
use sa_domain::part::{AgentPart, Part, TextPart, ToolPart};
use sa_domain::session::{Message as DomainMessage, MessageMetadata, MessageRole, MessageTokens, Session};
use sa_domain::stream::{StreamEvent, Usage};
use sa_domain::tool::{ContentPart, Message as ProviderMessage, MessageContent, ToolCall};
use sa_eventbus::{names, EventBus};
use sa_providers::{ChatRequest, LlmProvider};
use sa_repo::{MessageRepository, PartRepository, SessionRepository, UnitOfWork, Uow};
use sa_tools::exec_manager::RecentInputs;
use sa_tools::{check_doom_loop, ToolExecutionManager};

/// Hard stop on tool-call cycles within a single `process_message` call.
const MAX_TOOL_LOOPS: usize = 25;

/// The collaborators a Streaming LLM Session needs wired in. Held behind an
/// `Arc` so one instance can service many concurrent sessions.
pub struct SessionDeps {
    pub events: Arc<EventBus>,
    pub provider: Arc<dyn LlmProvider>,
    pub tool_manager: Arc<ToolExecutionManager>,
    pub sessions: Arc<dyn SessionRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub parts: Arc<dyn PartRepository>,
}

impl SessionDeps {
    /// A transaction batching writes over this instance's own repository
    /// handles — one `UnitOfWork` per call, matching the source's posture
    /// that a unit of work isn't shared across concurrent turns.
    fn unit_of_work(&self) -> Uow {
        sa_repo::UnitOfWorkImpl::new(self.sessions.clone(), self.messages.clone(), self.parts.clone())
    }
}

/// Everything one `process_message` call needs beyond the session/history
/// state it mutates.
pub struct TurnRequest {
    pub agent_name: String,
    pub user_text: String,
    pub system_prompt: String,
    pub tool_definitions: Vec<sa_domain::tool::ToolDefinition>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

/// Outcome of one `process_message` call: the updated session (message
/// counter bumped), the persisted assistant message, and accumulated usage.
pub struct TurnOutcome {
    pub session: Session,
    pub user_message: DomainMessage,
    pub assistant_message: DomainMessage,
    pub usage: Usage,
    pub tools_used: Vec<String>,
}

/// Run one full turn: persist the user message, stream the provider
/// response through zero or more tool-call cycles, and persist the
/// resulting assistant message.
///
/// Propagates errors rather than folding them — the Agent Runtime (C6) is
/// the layer responsible for turning a failure here into an `AgentResult`.
pub async fn process_message(
    deps: &SessionDeps,
    mut session: Session,
    history: Vec<DomainMessage>,
    request: TurnRequest,
    cancel: &CancelToken,
) -> Result<TurnOutcome> {
    let user_message_id = session.next_message_id();
    let user_message = DomainMessage::user(user_message_id.clone(), session.id.clone(), request.user_text.clone());
    deps.messages.create(&user_message).await?;
    deps.events.publish(
        names::MESSAGE_CREATED,
        serde_json::json!({"session_id": session.id, "message_id": user_message.id}),
    );

    let mut full_history = history;
    full_history.push(user_message.clone());

    let mut working = to_provider_messages(&full_history, &request.system_prompt);

    let mut turn_parts: Vec<Part> = Vec::new();
    let mut total_usage = Usage {
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
    };
    let mut tools_used: Vec<String> = Vec::new();
    let mut recent_inputs: RecentInputs = RecentInputs::new();
    let assistant_message_id = session.next_message_id();

    for loop_idx in 0..MAX_TOOL_LOOPS {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("session {} cancelled", session.id)));
        }
        tracing::debug!(session_id = %session.id, loop_idx, "session tool-loop iteration");

        let req = ChatRequest {
            messages: working.clone(),
            tools: request.tool_definitions.clone(),
            temperature: request.temperature,
            max_tokens: None,
            json_mode: false,
            model: request.model.clone(),
        };

        let mut stream = deps.provider.chat_stream(req).await?;

        let mut current_text = String::new();
        let mut pending_tool_calls: Vec<ToolCall> = Vec::new();

        while let Some(event_result) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(format!("session {} cancelled mid-stream", session.id)));
            }
            match event_result? {
                StreamEvent::Token { text } => {
                    current_text.push_str(&text);
                }
                StreamEvent::ToolCallStarted { .. } | StreamEvent::ToolCallDelta { .. } => {
                    // Assembly-only: the provider adapter accumulates partial
                    // arguments internally and only emits `ToolCallFinished`
                    // once the call is complete.
                }
                StreamEvent::ToolCallFinished { call_id, tool_name, arguments } => {
                    if !current_text.is_empty() {
                        turn_parts.push(flush_text_part(&session.id, &assistant_message_id, &current_text));
                        current_text.clear();
                    }
                    pending_tool_calls.push(ToolCall {
                        call_id,
                        tool_name,
                        arguments,
                    });
                }
                StreamEvent::Done { usage, finish_reason: _ } => {
                    if let Some(u) = usage {
                        total_usage.prompt_tokens += u.prompt_tokens;
                        total_usage.completion_tokens += u.completion_tokens;
                        total_usage.total_tokens += u.total_tokens;
                    }
                }
                StreamEvent::Error { message } => {
                    return Err(Error::Provider {
                        provider: deps.provider.provider_id().to_string(),
                        message,
                    });
                }
            }
        }

        if !current_text.is_empty() {
            turn_parts.push(flush_text_part(&session.id, &assistant_message_id, &current_text));
            current_text.clear();
        }

        if pending_tool_calls.is_empty() {
            break;
        }

        let mut tool_use_parts = Vec::new();
        for call in &pending_tool_calls {
            tool_use_parts.push(ContentPart::ToolUse {
                id: call.call_id.clone(),
                name: call.tool_name.clone(),
                input: call.arguments.clone(),
            });
        }
        working.push(ProviderMessage {
            role: sa_domain::tool::Role::Assistant,
            content: MessageContent::Parts(tool_use_parts),
        });

        for call in pending_tool_calls {
            if check_doom_loop(&call.tool_name, &call.arguments, &recent_inputs) {
                let part_id = format!("{}_{}", session.id, call.call_id);
                turn_parts.push(Part::Tool(ToolPart {
                    id: part_id,
                    session_id: session.id.clone(),
                    message_id: assistant_message_id.clone(),
                    tool: call.tool_name.clone(),
                    call_id: call.call_id.clone(),
                    state: sa_domain::part::ToolState {
                        status: sa_domain::part::ToolStatus::Error,
                        input: call.arguments.clone(),
                        output: None,
                        title: Some("Doom loop detected".into()),
                        metadata: serde_json::Map::new(),
                        error: Some("doom_loop".into()),
                        time_start: None,
                        time_end: Some(chrono::Utc::now()),
                        time_compacted: None,
                    },
                    source: None,
                }));
                working.push(ProviderMessage::tool_result(&call.call_id, "doom loop detected: repeated identical call"));
                continue;
            }

            recent_inputs.entry(call.tool_name.clone()).or_default().push(call.arguments.clone());
            if let Some(recent) = recent_inputs.get_mut(&call.tool_name) {
                if recent.len() > 3 {
                    recent.remove(0);
                }
            }

            let (result, part) = deps
                .tool_manager
                .execute_tool_call(
                    &call.tool_name,
                    call.arguments.clone(),
                    &call.call_id,
                    &assistant_message_id,
                    &request.agent_name,
                    deps.provider.provider_id(),
                )
                .await;
            tools_used.push(call.tool_name.clone());
            working.push(ProviderMessage::tool_result(&call.call_id, result.output.clone()));
            turn_parts.push(Part::Tool(part));
        }

        turn_parts.push(Part::Agent(AgentPart {
            id: format!("{}_{}", session.id, Uuid::new_v4()),
            session_id: session.id.clone(),
            message_id: assistant_message_id.clone(),
            provider: deps.provider.provider_id().to_string(),
        }));
    }

    let assistant_text: String = turn_parts.iter().filter_map(Part::text_contribution).collect();
    let assistant_message = DomainMessage {
        id: assistant_message_id.clone(),
        session_id: session.id.clone(),
        role: MessageRole::Assistant,
        text: assistant_text,
        parts: turn_parts.clone(),
        metadata: MessageMetadata {
            provider_id: Some(deps.provider.provider_id().to_string()),
            model_id: request.model.clone(),
            tokens: Some(MessageTokens {
                input: total_usage.prompt_tokens,
                output: total_usage.completion_tokens,
            }),
            ..Default::default()
        },
        time_created: chrono::Utc::now(),
    };

    let uow = deps.unit_of_work();
    uow.begin().await?;
    uow.register_message(assistant_message.clone()).await?;
    for part in &turn_parts {
        uow.register_part(assistant_message_id.clone(), part.clone()).await?;
    }
    uow.register_session(session.clone()).await?;
    uow.commit().await?;
    deps.events.publish(
        names::MESSAGE_CREATED,
        serde_json::json!({"session_id": session.id, "message_id": assistant_message.id}),
    );

    Ok(TurnOutcome {
        session,
        user_message,
        assistant_message,
        usage: total_usage,
        tools_used,
    })
}

fn flush_text_part(session_id: &str, message_id: &str, text: &str) -> Part {
    Part::Text(TextPart {
        id: format!("{}_{}", session_id, Uuid::new_v4()),
        session_id: session_id.to_string(),
        message_id: message_id.to_string(),
        text: text.to_string(),
        time_created: chrono::Utc::now(),
        time_updated: None,
    })
}

/// Translate persisted session history into the provider's typed message
/// shape. Reuses `sa_context::message_content`'s text-extraction rule (parts
/// take priority over the cached `text` field) but returns `sa_domain::tool::Message`
/// rather than `sa_context::build_provider_messages`'s JSON shape, since
/// that's what `LlmProvider::chat_stream` actually accepts. `ChatRequest`
/// has no dedicated system-field slot, so the system prompt is always
/// prepended as a `{role: system}` message.
fn to_provider_messages(history: &[DomainMessage], system_prompt: &str) -> Vec<ProviderMessage> {
    let mut out = Vec::with_capacity(history.len() + 1);
    out.push(ProviderMessage::system(system_prompt));
    for message in history {
        let content = sa_context::message_content(message);
        let msg = match message.role {
            MessageRole::User => ProviderMessage::user(content),
            MessageRole::Assistant => ProviderMessage::assistant(content),
            MessageRole::System => ProviderMessage::system(content),
        };
        out.push(msg);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sa_domain::capability::{LlmCapabilities, ModelInfo};
    use sa_domain::stream::BoxStream;
    use sa_providers::{ChatResponse, EmbeddingsRequest, EmbeddingsResponse};
    use sa_repo::{InMemoryMessageRepository, InMemoryPartRepository, InMemorySessionRepository};
    use sa_tools::{Tool, ToolContext, ToolRegistry, ToolResult};
    use std::sync::Mutex as StdMutex;

    struct ScriptedProvider {
        capabilities: LlmCapabilities,
        scripts: StdMutex<Vec<Vec<Result<StreamEvent>>>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            unimplemented!("not used in these tests")
        }

        async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            let next = self.scripts.lock().unwrap().remove(0);
            Ok(Box::pin(futures_util::stream::iter(next)))
        }

        async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            unimplemented!()
        }

        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }

        fn provider_id(&self) -> &str {
            "scripted"
        }

        async fn get_models(&self) -> Result<Vec<ModelInfo>> {
            Ok(Vec::new())
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn id(&self) -> &str {
            "echo"
        }
        fn definition(&self) -> sa_domain::tool::ToolDefinition {
            sa_domain::tool::ToolDefinition {
                name: "echo".into(),
                description: String::new(),
                parameters: serde_json::json!({}),
            }
        }
        async fn execute(&self, input: Value, _ctx: &ToolContext) -> std::result::Result<ToolResult, String> {
            Ok(ToolResult::ok("Echo", input.to_string()))
        }
    }

    fn new_session() -> Session {
        Session {
            id: "s1".into(),
            slug: "s1".into(),
            project_id: "p".into(),
            directory: "/tmp".into(),
            title: "t".into(),
            message_counter: 0,
            created: chrono::Utc::now(),
            updated: chrono::Utc::now(),
        }
    }

    fn deps_with(scripts: Vec<Vec<Result<StreamEvent>>>, registry: ToolRegistry) -> SessionDeps {
        let events = Arc::new(EventBus::new());
        let provider = Arc::new(ScriptedProvider {
            capabilities: LlmCapabilities::default(),
            scripts: StdMutex::new(scripts),
        });
        let tool_manager = Arc::new(ToolExecutionManager::new("s1", registry, events.clone()));
        SessionDeps {
            events,
            provider,
            tool_manager,
            sessions: Arc::new(InMemorySessionRepository::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            parts: Arc::new(InMemoryPartRepository::new()),
        }
    }

    fn request(text: &str) -> TurnRequest {
        TurnRequest {
            agent_name: "assistant".into(),
            user_text: text.into(),
            system_prompt: "be helpful".into(),
            tool_definitions: Vec::new(),
            model: Some("scripted/model".into()),
            temperature: None,
        }
    }

    #[tokio::test]
    async fn text_only_turn_produces_one_text_part() {
        let scripts = vec![vec![
            Ok(StreamEvent::Token { text: "Hello ".into() }),
            Ok(StreamEvent::Token { text: "world".into() }),
            Ok(StreamEvent::Done {
                usage: Some(Usage {
                    prompt_tokens: 5,
                    completion_tokens: 2,
                    total_tokens: 7,
                }),
                finish_reason: Some("stop".into()),
            }),
        ]];
        let deps = deps_with(scripts, ToolRegistry::new());
        let cancel = CancelToken::new();

        let outcome = process_message(&deps, new_session(), Vec::new(), request("hi"), &cancel).await.unwrap();

        assert_eq!(outcome.assistant_message.text, "Hello world");
        assert_eq!(outcome.assistant_message.parts.len(), 1);
        assert!(matches!(outcome.assistant_message.parts[0], Part::Text(_)));
        assert_eq!(outcome.usage.total_tokens, 7);
        assert!(outcome.tools_used.is_empty());
    }

    #[tokio::test]
    async fn tool_call_cycle_runs_the_tool_and_loops_back_for_a_final_answer() {
        let scripts = vec![
            vec![
                Ok(StreamEvent::Token { text: "Let me check.".into() }),
                Ok(StreamEvent::ToolCallStarted {
                    call_id: "c1".into(),
                    tool_name: "echo".into(),
                }),
                Ok(StreamEvent::ToolCallFinished {
                    call_id: "c1".into(),
                    tool_name: "echo".into(),
                    arguments: serde_json::json!({"x": 1}),
                }),
                Ok(StreamEvent::Done {
                    usage: None,
                    finish_reason: Some("tool_calls".into()),
                }),
            ],
            vec![
                Ok(StreamEvent::Token { text: "Done.".into() }),
                Ok(StreamEvent::Done {
                    usage: None,
                    finish_reason: Some("stop".into()),
                }),
            ],
        ];
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let deps = deps_with(scripts, registry);
        let cancel = CancelToken::new();

        let outcome = process_message(&deps, new_session(), Vec::new(), request("check something"), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.tools_used, vec!["echo".to_string()]);
        // text, tool, agent delimiter, text
        assert_eq!(outcome.assistant_message.parts.len(), 4);
        assert!(matches!(outcome.assistant_message.parts[1], Part::Tool(_)));
        assert!(matches!(outcome.assistant_message.parts[2], Part::Agent(_)));
        assert_eq!(outcome.assistant_message.text, "Let me check.Done.");
    }

    #[tokio::test]
    async fn cancellation_before_the_first_call_returns_an_error() {
        let deps = deps_with(vec![vec![]], ToolRegistry::new());
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = process_message(&deps, new_session(), Vec::new(), request("hi"), &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled(_))));
    }

    #[tokio::test]
    async fn provider_error_event_propagates() {
        let scripts = vec![vec![Ok(StreamEvent::Error { message: "boom".into() })]];
        let deps = deps_with(scripts, ToolRegistry::new());
        let cancel = CancelToken::new();

        let result = process_message(&deps, new_session(), Vec::new(), request("hi"), &cancel).await;
        assert!(matches!(result, Err(Error::Provider { .. })));
    }
}
