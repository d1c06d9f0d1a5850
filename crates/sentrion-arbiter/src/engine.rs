use std::sync::Arc;

use chrono::Utc;
use sentrion_eventbus::{ActionEvent, EventBus};
use sentrion_store::{KillSwitch, Store};
use sentrion_types::{
    Decision, EscalationEvent, EscalationStatus, EscalationTrigger, NotificationChannel, Severity,
};
use uuid::Uuid;

use crate::dispatch::{self, DispatchEvent, NotificationSink};
use crate::error::ArbiterResult;
use crate::{autoks, config, severity};

/// Result of running the post-evaluation escalation flow for one decision.
#[derive(Debug, Default, Clone)]
pub struct PostEvaluationOutcome {
    pub escalation_id: Option<Uuid>,
    pub auto_kill_switch_engaged: bool,
}

/// Ties escalation-event recording, auto-kill-switch evaluation, and
/// notification fan-out together for every blocked or review-flagged
/// action — the analogue of the source's post-evaluation handler.
pub struct EscalationEngine {
    store: Arc<dyn Store>,
    kill_switch: Arc<KillSwitch>,
    event_bus: Arc<EventBus>,
}

/// Everything about the evaluated action the escalation engine needs,
/// grouped so `handle_post_evaluation` doesn't take a dozen positional
/// arguments.
pub struct PostEvaluationInput<'a> {
    pub action_id: Option<Uuid>,
    pub tool: &'a str,
    pub agent_id: Option<&'a str>,
    pub session_id: Option<&'a str>,
    pub decision: Decision,
    pub risk_score: u8,
    pub explanation: &'a str,
    pub policy_ids: Vec<String>,
    pub chain_pattern: Option<String>,
}

impl EscalationEngine {
    pub fn new(store: Arc<dyn Store>, kill_switch: Arc<KillSwitch>, event_bus: Arc<EventBus>) -> Self {
        Self {
            store,
            kill_switch,
            event_bus,
        }
    }

    /// No-op for `Decision::Allow`; otherwise records an [`EscalationEvent`],
    /// dispatches notifications per the resolved config, and evaluates the
    /// auto-kill-switch, engaging it and broadcasting an `auto_kill_switch`
    /// event when it breaches threshold.
    pub async fn handle_post_evaluation(
        &self,
        sink: &dyn NotificationSink,
        channels: &[NotificationChannel],
        input: PostEvaluationInput<'_>,
    ) -> ArbiterResult<PostEvaluationOutcome> {
        if input.decision == Decision::Allow {
            return Ok(PostEvaluationOutcome::default());
        }

        let cfg = config::resolve_config(self.store.as_ref(), input.agent_id).await?;

        let trigger = if input.chain_pattern.is_some() {
            EscalationTrigger::ChainEscalation
        } else if input.decision == Decision::Block {
            EscalationTrigger::PolicyBlock
        } else {
            EscalationTrigger::PolicyReview
        };
        let sev = severity::compute_severity(input.risk_score, input.decision, input.chain_pattern.as_deref());

        let event = EscalationEvent {
            id: Uuid::new_v4(),
            action_id: input.action_id,
            tool: input.tool.to_string(),
            agent_id: input.agent_id.map(str::to_string),
            session_id: input.session_id.map(str::to_string),
            trigger,
            severity: sev,
            decision: input.decision.as_str().to_string(),
            risk_score: input.risk_score,
            explanation: input.explanation.to_string(),
            policy_ids: input.policy_ids,
            chain_pattern: input.chain_pattern,
            status: EscalationStatus::Pending,
            resolver: None,
            resolution_note: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.store.insert_escalation_event(event.clone()).await?;

        let (dispatch_event, should_notify) = match input.decision {
            Decision::Block => (DispatchEvent::Block, cfg.notify_on_block),
            _ => (DispatchEvent::Review, cfg.notify_on_review),
        };
        if should_notify {
            let payload = serde_json::to_string(&event).unwrap_or_default();
            dispatch::fan_out(sink, channels, dispatch_event, &payload).await;
        }

        let mut outcome = PostEvaluationOutcome {
            escalation_id: Some(event.id),
            auto_kill_switch_engaged: false,
        };

        if let Some(trigger) = autoks::check_auto_kill_switch(self.store.as_ref(), &self.kill_switch, &cfg).await? {
            self.kill_switch.set(true).await?;
            outcome.auto_kill_switch_engaged = true;

            let ks_event = EscalationEvent {
                id: Uuid::new_v4(),
                action_id: None,
                tool: "*".to_string(),
                agent_id: None,
                session_id: None,
                trigger: EscalationTrigger::AutoKs,
                severity: Severity::Critical,
                decision: Decision::Block.as_str().to_string(),
                risk_score: 100,
                explanation: trigger.detail.clone(),
                policy_ids: vec![],
                chain_pattern: None,
                status: EscalationStatus::Pending,
                resolver: None,
                resolution_note: None,
                created_at: Utc::now(),
                resolved_at: None,
            };
            self.store.insert_escalation_event(ks_event.clone()).await?;

            self.event_bus.publish(ActionEvent {
                event_type: "auto_kill_switch".to_string(),
                tool: "*".to_string(),
                decision: Decision::Block.as_str().to_string(),
                risk_score: 100,
                explanation: trigger.detail,
                policy_ids: vec![],
                agent_id: None,
                session_id: None,
                user_id: None,
                channel: None,
                chain_pattern: None,
                timestamp: Utc::now(),
            });

            if cfg.notify_on_auto_ks {
                let payload = serde_json::to_string(&ks_event).unwrap_or_default();
                dispatch::fan_out(sink, channels, DispatchEvent::AutoKs, &payload).await;
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::NullSink;
    use async_trait::async_trait;
    use sentrion_store::SqliteStore;
    use sentrion_types::{AuditEntry, EscalationConfig};
    use std::collections::HashMap;

    fn audit_entry(decision: Decision, risk: u8) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            tool: "shell".to_string(),
            args: HashMap::new(),
            context: HashMap::new(),
            agent_id: Some("agent-1".to_string()),
            session_id: None,
            user_id: None,
            channel: None,
            conversation_id: None,
            turn_id: None,
            risk_score: risk,
            decision,
            explanation: "test".to_string(),
            policy_ids: vec![],
            chain_pattern: None,
            latency_ms: 1.0,
            fee_amount: None,
            created_at: Utc::now(),
        }
    }

    fn input(decision: Decision, risk: u8) -> PostEvaluationInput<'static> {
        PostEvaluationInput {
            action_id: None,
            tool: "shell",
            agent_id: Some("agent-1"),
            session_id: None,
            decision,
            risk_score: risk,
            explanation: "matched policy",
            policy_ids: vec!["p1".to_string()],
            chain_pattern: None,
        }
    }

    #[tokio::test]
    async fn allow_decision_is_a_no_op() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        let ks = Arc::new(KillSwitch::new(store.clone()));
        let bus = Arc::new(EventBus::new());
        let engine = EscalationEngine::new(store, ks, bus);
        let outcome = engine
            .handle_post_evaluation(&NullSink, &[], input(Decision::Allow, 5))
            .await
            .unwrap();
        assert!(outcome.escalation_id.is_none());
        assert!(!outcome.auto_kill_switch_engaged);
    }

    #[tokio::test]
    async fn block_decision_records_escalation_event() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        let ks = Arc::new(KillSwitch::new(store.clone()));
        let bus = Arc::new(EventBus::new());
        let engine = EscalationEngine::new(store, ks, bus);
        let outcome = engine
            .handle_post_evaluation(&NullSink, &[], input(Decision::Block, 92))
            .await
            .unwrap();
        assert!(outcome.escalation_id.is_some());
    }

    #[tokio::test]
    async fn auto_ks_engages_once_threshold_breached() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        for _ in 0..5 {
            store.insert_audit_entry(audit_entry(Decision::Block, 95)).await.unwrap();
        }
        let ks = Arc::new(KillSwitch::new(store.clone()));
        let bus = Arc::new(EventBus::new());
        let mut cfg = EscalationConfig::default();
        cfg.scope = "*".to_string();
        cfg.auto_ks_enabled = true;
        cfg.auto_ks_block_threshold = 2;
        config::set_config(store.as_ref(), &cfg).await.unwrap();

        let engine = EscalationEngine::new(store.clone(), ks.clone(), bus);
        let outcome = engine
            .handle_post_evaluation(&NullSink, &[], input(Decision::Block, 92))
            .await
            .unwrap();
        assert!(outcome.auto_kill_switch_engaged);
        assert!(ks.is_enabled().await.unwrap());
    }
}
