use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Review,
    Block,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Review => "review",
            Decision::Block => "block",
        }
    }
}

/// One entry in a decision's execution trace: exactly one per layer that ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub layer: u8,
    pub name: String,
    pub key: String,
    pub outcome: LayerOutcome,
    pub risk_contribution: u8,
    #[serde(default)]
    pub matched_ids: Vec<String>,
    pub detail: Option<String>,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerOutcome {
    Pass,
    Block,
    Review,
}

/// The decision returned to the caller and persisted alongside the audit
/// entry for the evaluated action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDecision {
    pub decision: Decision,
    pub risk_score: u8,
    pub explanation: String,
    #[serde(default)]
    pub policy_ids: Vec<String>,
    #[serde(default)]
    pub execution_trace: Vec<TraceStep>,
    pub chain_pattern: Option<String>,
    pub chain_description: Option<String>,
    pub session_depth: Option<usize>,
    pub escalation_id: Option<Uuid>,
    #[serde(default)]
    pub auto_ks_triggered: bool,
    pub escalation_severity: Option<String>,
}

impl ActionDecision {
    pub fn kill_switch(trace: Vec<TraceStep>) -> Self {
        Self {
            decision: Decision::Block,
            risk_score: 100,
            explanation: "Global kill switch is enabled; all actions are blocked.".to_string(),
            policy_ids: vec!["kill-switch".to_string()],
            execution_trace: trace,
            chain_pattern: None,
            chain_description: None,
            session_depth: None,
            escalation_id: None,
            auto_ks_triggered: false,
            escalation_severity: None,
        }
    }
}
