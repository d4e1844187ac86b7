//! `LlmProvider` trait, its request/response types, a registry that holds
//! provider instances by id, and the one test-double adapter this crate
//! ships. Real provider adapters stay a collaborator concern.

pub mod registry;
pub mod test_double;
pub mod traits;

// Re-exports for convenience.
pub use registry::ProviderRegistry;
pub use test_double::TestDoubleProvider;
pub use traits::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};
