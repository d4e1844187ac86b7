use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::permission::PermissionRule;

/// Provider/model hint attached to an [`Agent`] descriptor. Either field may
/// be absent; callers fall back to request-level defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelHint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A named descriptor that parameterizes one LLM invocation: prompt,
/// permission list, and model hints. Agents are read-only configuration,
/// not runtime state — the Agent Runtime looks one up by name per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub permission: Vec<PermissionRule>,
    #[serde(default)]
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelHint>,
    #[serde(default)]
    pub options: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            mode: String::new(),
            permission: Vec::new(),
            prompt: String::new(),
            temperature: None,
            top_p: None,
            model: None,
            options: serde_json::Map::new(),
            steps: None,
        }
    }
}
