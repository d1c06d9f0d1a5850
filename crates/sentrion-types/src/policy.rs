use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Allow,
    Block,
    Review,
}

/// A policy's match predicate. Neither `tool` nor any regex present
/// matches every request — preserved from the source, relied on by tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyMatch {
    pub tool: Option<String>,
    pub url_regex: Option<String>,
    pub args_regex: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub policy_id: String,
    pub description: String,
    pub severity: u8,
    #[serde(rename = "match")]
    pub match_: PolicyMatch,
    pub action: PolicyAction,
    pub is_active: bool,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only snapshot of a policy at a given version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyVersion {
    pub policy_id: String,
    pub version: u32,
    pub content: Policy,
    pub actor: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}
