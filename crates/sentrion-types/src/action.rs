use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Context keys the pipeline recognises; unknown keys are preserved in
/// persistence but do not affect evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionContext {
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub channel: Option<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub conversation_id: Option<String>,
    pub turn_id: Option<String>,
    /// Unrecognised keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// An intended tool invocation submitted for evaluation. Immutable input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub tool: String,
    #[serde(default)]
    pub args: HashMap<String, Value>,
    #[serde(default)]
    pub context: Option<ActionContext>,
    #[serde(default)]
    pub prompt: Option<String>,
}

impl ActionRequest {
    pub fn agent_id(&self) -> Option<&str> {
        self.context.as_ref().and_then(|c| c.agent_id.as_deref())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.context.as_ref().and_then(|c| c.session_id.as_deref())
    }

    pub fn allowed_tools(&self) -> &[String] {
        self.context
            .as_ref()
            .map(|c| c.allowed_tools.as_slice())
            .unwrap_or(&[])
    }

    /// Flatten tool + args + context into one string for pattern scanning.
    /// Mirrors the source's `f"{tool} {args} {context}"` string-building
    /// (Python repr of a dict), approximated here with JSON rendering.
    pub fn flatten(&self) -> String {
        let args_str = serde_json::to_string(&self.args).unwrap_or_default();
        let ctx_str = self
            .context
            .as_ref()
            .map(|c| serde_json::to_string(c).unwrap_or_default())
            .unwrap_or_default();
        format!("{} {} {}", self.tool, args_str, ctx_str)
    }
}
