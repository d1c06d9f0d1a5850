use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::ActionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcome {
    Pass,
    Warn,
    Fail,
}

/// Result of a single independent verification check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub check: String,
    pub result: CheckOutcome,
    pub detail: String,
    #[serde(default)]
    pub risk_contribution: u8,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Compliant,
    Suspicious,
    Violation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftSignalResult {
    pub name: String,
    pub description: String,
    pub weight: f64,
    pub triggered: bool,
    pub value: f64,
    pub detail: String,
}

/// Input to `verify(action_id, tool, result, allowed_tools?, original_args?, context?) -> verdict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub action_id: Uuid,
    pub tool: String,
    #[serde(default)]
    pub result: HashMap<String, Value>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub original_args: HashMap<String, Value>,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    /// Carries `trace_id`/`span_id` for the governance trace linker (C11).
    /// When absent, the caller's original evaluation context is used instead.
    #[serde(default)]
    pub context: Option<ActionContext>,
}

/// Persisted verification record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: Uuid,
    pub action_id: Uuid,
    pub tool: String,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub verdict: Verdict,
    pub risk_delta: u8,
    pub findings: Vec<Finding>,
    pub drift_score: Option<f64>,
    #[serde(default)]
    pub drift_signals: Vec<DriftSignalResult>,
    pub escalated: bool,
    pub escalation_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
