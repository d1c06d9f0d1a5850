use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTrigger {
    PolicyBlock,
    PolicyReview,
    ChainEscalation,
    AutoKs,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    AutoResolved,
}

impl EscalationStatus {
    /// Once status != pending it is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EscalationStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub id: Uuid,
    pub action_id: Option<Uuid>,
    pub tool: String,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub trigger: EscalationTrigger,
    pub severity: Severity,
    pub decision: String,
    pub risk_score: u8,
    pub explanation: String,
    #[serde(default)]
    pub policy_ids: Vec<String>,
    pub chain_pattern: Option<String>,
    pub status: EscalationStatus,
    pub resolver: Option<String>,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Per-scope escalation configuration (`agent:<id>` or `*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    pub scope: String,
    pub auto_ks_enabled: bool,
    pub auto_ks_block_threshold: u32,
    pub auto_ks_risk_threshold: u8,
    pub auto_ks_window_size: u32,
    pub review_risk_threshold: u8,
    pub notify_on_block: bool,
    pub notify_on_review: bool,
    pub notify_on_auto_ks: bool,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            scope: "*".to_string(),
            auto_ks_enabled: false,
            auto_ks_block_threshold: 3,
            auto_ks_risk_threshold: 82,
            auto_ks_window_size: 10,
            review_risk_threshold: 70,
            notify_on_block: true,
            notify_on_review: true,
            notify_on_auto_ks: true,
        }
    }
}

/// A channel Sentrion can dispatch a governance payload through. Protocol
/// I/O is out of scope; only the selection/fan-out logic is specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Slack,
    WhatsApp,
    Jira,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: Uuid,
    pub kind: ChannelKind,
    pub label: String,
    pub is_active: bool,
    pub on_block: bool,
    pub on_review: bool,
    pub on_auto_ks: bool,
    pub error_count: u32,
    pub last_sent_at: Option<DateTime<Utc>>,
}
