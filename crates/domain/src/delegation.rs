use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::task::AgentResult;

/// Order in which the Delegation Engine visits the spawn tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalMode {
    #[serde(rename = "breadth_first")]
    Bfs,
    #[serde(rename = "depth_first")]
    Dfs,
    Adaptive,
}

/// Why a delegation traversal stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    Converged,
    #[serde(rename = "budget")]
    BudgetExhausted,
    Stagnation,
    DepthLimit,
    BreadthLimit,
    Timeout,
    Error,
}

/// Resource limits enforced by the Delegation Engine across one traversal.
/// All fields must be strictly positive — see [`DelegationBudget::validate`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DelegationBudget {
    pub max_depth: u32,
    pub max_breadth: u32,
    pub max_total_agents: u32,
    pub max_wall_time_seconds: f64,
    pub max_iterations: u32,
    pub stagnation_threshold: u32,
}

impl Default for DelegationBudget {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_breadth: 5,
            max_total_agents: 20,
            max_wall_time_seconds: 300.0,
            max_iterations: 10,
            stagnation_threshold: 3,
        }
    }
}

impl DelegationBudget {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(Error::InvalidState("max_depth must be > 0".into()));
        }
        if self.max_breadth == 0 {
            return Err(Error::InvalidState("max_breadth must be > 0".into()));
        }
        if self.max_total_agents == 0 {
            return Err(Error::InvalidState("max_total_agents must be > 0".into()));
        }
        if self.max_wall_time_seconds <= 0.0 {
            return Err(Error::InvalidState(
                "max_wall_time_seconds must be > 0".into(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidState("max_iterations must be > 0".into()));
        }
        if self.stagnation_threshold == 0 {
            return Err(Error::InvalidState(
                "stagnation_threshold must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Mutable state threaded through one delegation traversal, rooted at a
/// single top-level task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationContext {
    pub root_task_id: String,
    #[serde(default)]
    pub current_depth: u32,
    #[serde(default)]
    pub total_agents_spawned: u32,
    #[serde(default)]
    pub active_agents: u32,
    #[serde(default)]
    pub completed_agents: u32,
    #[serde(default)]
    pub results: Vec<AgentResult>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub iteration_count: u32,
    #[serde(default)]
    pub novelty_signatures: Vec<String>,
    #[serde(default)]
    pub stagnation_count: u32,
}

impl DelegationContext {
    pub fn new(root_task_id: impl Into<String>) -> Self {
        Self {
            root_task_id: root_task_id.into(),
            current_depth: 0,
            total_agents_spawned: 0,
            active_agents: 0,
            completed_agents: 0,
            results: Vec::new(),
            errors: Vec::new(),
            start_time: Utc::now(),
            iteration_count: 0,
            novelty_signatures: Vec::new(),
            stagnation_count: 0,
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        (Utc::now() - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

/// Final outcome of a delegation traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationResult {
    pub success: bool,
    pub stop_reason: StopReason,
    pub results: Vec<AgentResult>,
    pub errors: Vec<String>,
    pub total_agents: u32,
    pub max_depth_reached: u32,
    pub elapsed_seconds: f64,
    pub iterations: u32,
    pub converged: bool,
    pub stagnation_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_novelty_signature: Option<String>,
}

/// Projects an [`AgentResult`] to a canonical string by concatenating, in
/// key order, the values of `evidence_keys` reached in `result.metadata`
/// plus `result.response`, and hashes it for novelty comparison.
///
/// Hooked up by the Delegation Engine after each completed agent: a
/// repeated signature bumps `stagnation_count`, a new one resets it.
pub fn novelty_signature(result: &AgentResult, evidence_keys: &[String]) -> String {
    let mut canonical = String::new();
    for key in evidence_keys {
        if let Some(value) = result.metadata.get(key) {
            canonical.push_str(&value.to_string());
        }
    }
    canonical.push_str(&result.response);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_validates() {
        assert!(DelegationBudget::default().validate().is_ok());
    }

    #[test]
    fn zero_max_depth_is_rejected() {
        let mut budget = DelegationBudget::default();
        budget.max_depth = 0;
        assert!(budget.validate().is_err());
    }

    #[test]
    fn zero_wall_time_is_rejected() {
        let mut budget = DelegationBudget::default();
        budget.max_wall_time_seconds = 0.0;
        assert!(budget.validate().is_err());
    }

    #[test]
    fn identical_results_hash_to_the_same_signature() {
        let evidence_keys = vec!["result".to_string()];
        let mut result_a = AgentResult {
            agent_name: "scout".into(),
            response: "same finding".into(),
            parts: Vec::new(),
            metadata: serde_json::Map::new(),
            tools_used: Vec::new(),
            tokens_used: None,
            duration: 1.0,
            error: None,
            task_id: None,
        };
        result_a
            .metadata
            .insert("result".into(), serde_json::json!("x"));
        let mut result_b = result_a.clone();
        result_b.duration = 99.0;

        assert_eq!(
            novelty_signature(&result_a, &evidence_keys),
            novelty_signature(&result_b, &evidence_keys)
        );
    }

    #[test]
    fn different_responses_hash_to_different_signatures() {
        let evidence_keys = vec!["result".to_string()];
        let result_a = AgentResult {
            agent_name: "scout".into(),
            response: "finding A".into(),
            parts: Vec::new(),
            metadata: serde_json::Map::new(),
            tools_used: Vec::new(),
            tokens_used: None,
            duration: 1.0,
            error: None,
            task_id: None,
        };
        let mut result_b = result_a.clone();
        result_b.response = "finding B".into();

        assert_ne!(
            novelty_signature(&result_a, &evidence_keys),
            novelty_signature(&result_b, &evidence_keys)
        );
    }
}
