use serde::{Deserialize, Serialize};

/// The effect of a matched [`PermissionRule`].
///
/// `Ask` is treated as `Allow` at the filter boundary — interactive approval
/// is an outer collaborator's concern, not the registry's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Allow,
    Deny,
    Ask,
}

impl PermissionAction {
    fn permits(self) -> bool {
        matches!(self, PermissionAction::Allow | PermissionAction::Ask)
    }
}

/// One entry in an agent's ordered permission list.
///
/// `pattern` uses glob semantics (`*` as a wildcard segment, exact names
/// otherwise). Evaluation is first-match-wins over the ordered list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRule {
    pub pattern: String,
    pub action: PermissionAction,
}

impl PermissionRule {
    pub fn new(pattern: impl Into<String>, action: PermissionAction) -> Self {
        Self {
            pattern: pattern.into(),
            action,
        }
    }

    fn matches(&self, tool_id: &str) -> bool {
        match glob::Pattern::new(&self.pattern) {
            Ok(p) => p.matches(tool_id),
            Err(_) => self.pattern == tool_id,
        }
    }
}

/// Evaluates an ordered permission list against a tool id.
///
/// Empty permissions is deny-all. Returns true iff some rule `i` matches
/// with `action` permitting (`allow` or `ask`) and no rule `j < i` matches
/// with `action = deny`.
pub fn is_allowed(permissions: &[PermissionRule], tool_id: &str) -> bool {
    for rule in permissions {
        if rule.matches(tool_id) {
            return rule.action.permits();
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_permissions_deny_all() {
        assert!(!is_allowed(&[], "bash"));
    }

    #[test]
    fn wildcard_allow_permits_everything() {
        let rules = vec![PermissionRule::new("*", PermissionAction::Allow)];
        assert!(is_allowed(&rules, "bash"));
        assert!(is_allowed(&rules, "read"));
    }

    #[test]
    fn first_match_wins_deny_before_allow() {
        let rules = vec![
            PermissionRule::new("bash", PermissionAction::Deny),
            PermissionRule::new("*", PermissionAction::Allow),
        ];
        assert!(!is_allowed(&rules, "bash"));
        assert!(is_allowed(&rules, "read"));
    }

    #[test]
    fn deny_all_wildcard() {
        let rules = vec![PermissionRule::new("*", PermissionAction::Deny)];
        assert!(!is_allowed(&rules, "bash"));
        assert!(!is_allowed(&rules, "read"));
    }

    #[test]
    fn ask_is_treated_as_allow() {
        let rules = vec![PermissionRule::new("bash", PermissionAction::Ask)];
        assert!(is_allowed(&rules, "bash"));
    }

    #[test]
    fn glob_segment_wildcard_matches_prefix() {
        let rules = vec![PermissionRule::new("memory.*", PermissionAction::Allow)];
        assert!(is_allowed(&rules, "memory.search"));
        assert!(!is_allowed(&rules, "agent.run"));
    }

    #[test]
    fn no_rule_matches_denies() {
        let rules = vec![PermissionRule::new("bash", PermissionAction::Allow)];
        assert!(!is_allowed(&rules, "read"));
    }
}
