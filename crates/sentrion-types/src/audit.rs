use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::Decision;

/// Append-only audit entry for an evaluated action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub tool: String,
    #[serde(default)]
    pub args: HashMap<String, Value>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub channel: Option<String>,
    pub conversation_id: Option<String>,
    pub turn_id: Option<String>,
    pub risk_score: u8,
    pub decision: Decision,
    pub explanation: String,
    #[serde(default)]
    pub policy_ids: Vec<String>,
    pub chain_pattern: Option<String>,
    pub latency_ms: f64,
    pub fee_amount: Option<String>,
    pub created_at: DateTime<Utc>,
}
