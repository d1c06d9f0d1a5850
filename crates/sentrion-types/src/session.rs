use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Decision;

/// One entry of an agent's recent action history, used by the chain
/// analyser and the drift detector. Scoped to an agent and, optionally,
/// a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub agent_id: String,
    pub session_id: Option<String>,
    pub tool: String,
    pub decision: Decision,
    pub risk_score: u8,
    #[serde(default)]
    pub policy_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
