//! Provider registry.
//!
//! Holds the [`LlmProvider`] instances an embedder registers, keyed by
//! provider id. Building a real adapter from a [`ProviderConfig`] (resolving
//! auth, opening an HTTP client, ...) is a collaborator concern; this crate
//! only wires the one adapter it ships, [`TestDoubleProvider`], so the
//! registry is exercisable without a network dependency.

use crate::test_double::TestDoubleProvider;
use crate::traits::LlmProvider;
use sa_domain::config::LlmConfig;
use sa_domain::error::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Holds all instantiated LLM providers, keyed by their config id.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    /// Build an empty registry.
    pub fn new() -> Self {
        Self { providers: HashMap::new() }
    }

    /// Register a provider instance under `id`, replacing any prior entry.
    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(id.into(), provider);
    }

    /// Build a registry from the application's [`LlmConfig`], registering a
    /// [`TestDoubleProvider`] under each configured provider id.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut registry = Self::new();
        for pc in &config.providers {
            tracing::info!(provider_id = %pc.id, kind = ?pc.kind, "registered LLM provider");
            registry.register(pc.id.clone(), Arc::new(TestDoubleProvider::new(pc.id.clone())));
        }
        Ok(registry)
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Iterate over all registered providers.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn LlmProvider>)> {
        self.providers.iter()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List all registered provider IDs (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
