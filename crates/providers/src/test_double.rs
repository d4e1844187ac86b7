//! The one `LlmProvider` adapter this crate ships.
//!
//! Real adapters (Anthropic, OpenAI-compatible, Google, ...) are a
//! collaborator concern — this crate only defines the trait they implement.
//! `TestDoubleProvider` exists so the registry, the Agent Runtime, and the
//! Streaming LLM Session have something to wire against and exercise in
//! tests without a network dependency.

use std::sync::OnceLock;

use async_trait::async_trait;
use sa_domain::capability::{LlmCapabilities, ModelInfo, ToolSupport};
use sa_domain::error::Result;
use sa_domain::stream::{BoxStream, StreamEvent, Usage};

use crate::traits::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};

/// Echoes the last message's text back as the assistant reply. Deterministic
/// and side-effect free, so it is safe to register under any provider id.
pub struct TestDoubleProvider {
    id: String,
    capabilities: LlmCapabilities,
}

impl TestDoubleProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: LlmCapabilities {
                supports_tools: ToolSupport::Basic,
                supports_streaming: true,
                supports_json_mode: true,
                supports_vision: false,
                context_window_tokens: None,
                max_output_tokens: None,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for TestDoubleProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let content = req.messages.last().map(|m| m.content.extract_all_text()).unwrap_or_default();
        Ok(ChatResponse {
            content,
            tool_calls: Vec::new(),
            usage: Some(Usage {
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
            }),
            model: req.model.unwrap_or_else(|| "test-double".into()),
            finish_reason: Some("stop".into()),
        })
    }

    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let content = req.messages.last().map(|m| m.content.extract_all_text()).unwrap_or_default();
        let events = vec![
            Ok(StreamEvent::Token { text: content }),
            Ok(StreamEvent::Done {
                usage: Some(Usage {
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    total_tokens: 0,
                }),
                finish_reason: Some("stop".into()),
            }),
        ];
        Ok(Box::pin(futures_util::stream::iter(events)))
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        Ok(EmbeddingsResponse {
            embeddings: req.input.iter().map(|_| vec![0.0_f32; 1]).collect(),
        })
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn get_models(&self) -> Result<Vec<ModelInfo>> {
        static MODELS: OnceLock<Vec<ModelInfo>> = OnceLock::new();
        Ok(MODELS
            .get_or_init(|| {
                vec![ModelInfo {
                    id: "test-double".into(),
                    api_id: "test-double".into(),
                    capabilities: LlmCapabilities::default(),
                    pricing: None,
                }]
            })
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::tool::Message;

    #[tokio::test]
    async fn chat_echoes_the_last_message() {
        let provider = TestDoubleProvider::new("test");
        let req = ChatRequest {
            messages: vec![Message::user("hi there")],
            ..ChatRequest::default()
        };
        let resp = provider.chat(req).await.unwrap();
        assert_eq!(resp.content, "hi there");
    }

    #[test]
    fn provider_id_matches_construction() {
        let provider = TestDoubleProvider::new("anthropic");
        assert_eq!(provider.provider_id(), "anthropic");
    }
}
