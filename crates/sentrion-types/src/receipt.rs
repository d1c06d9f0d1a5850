use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub receipt_id: String,
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub decision: String,
    pub risk_score: u8,
    #[serde(default)]
    pub policy_ids: Vec<String>,
    pub chain_pattern: Option<String>,
    pub agent_id: Option<String>,
    pub digest: String,
    pub fee_amount: Option<String>,
}

impl Receipt {
    /// Canonical payload hashed to produce `digest`:
    /// `receipt_id|iso_timestamp|tool|decision|risk|comma_joined_policy_ids`.
    pub fn canonical_payload(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.receipt_id,
            self.timestamp.to_rfc3339(),
            self.tool,
            self.decision,
            self.risk_score,
            self.policy_ids.join(","),
        )
    }
}
