//! Permission Filter: derives an allowed subset of a [`ToolRegistry`] from an
//! ordered list of glob permission rules.

use sa_domain::permission::{is_allowed, PermissionRule};

use crate::registry::ToolRegistry;

/// Build a new registry containing only the tools that `permissions` allows,
/// per [`sa_domain::permission::is_allowed`] (first matching rule wins, `ask`
/// folds to `allow`, empty permissions denies everything). The input registry
/// is never mutated — this always returns a fresh view.
///
/// Deterministic for a given `(registry, permissions)` pair; `O(tools × rules)`.
pub fn filter_tools(registry: &ToolRegistry, permissions: &[PermissionRule]) -> ToolRegistry {
    let mut filtered = ToolRegistry::new();
    for id in registry.ids() {
        if is_allowed(permissions, &id) {
            if let Some(tool) = registry.get(&id) {
                filtered.register(tool);
            }
        }
    }
    filtered
}
