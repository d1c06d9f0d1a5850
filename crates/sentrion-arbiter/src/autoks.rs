use sentrion_store::{KillSwitch, Store, StoreResult};
use sentrion_types::{Decision, EscalationConfig};

/// Detail of a breached auto-kill-switch threshold.
#[derive(Debug, Clone)]
pub struct AutoKsTrigger {
    pub trigger: &'static str,
    pub detail: String,
    pub recent_blocks: u32,
    pub avg_risk: f64,
}

/// Examines the most recent `auto_ks_window_size` actions across all
/// agents; engages when either the recent block count or the average
/// risk score breaches its configured threshold. Idempotent: a no-op
/// once the kill switch is already enabled.
pub async fn check_auto_kill_switch(
    store: &dyn Store,
    kill_switch: &KillSwitch,
    config: &EscalationConfig,
) -> StoreResult<Option<AutoKsTrigger>> {
    if !config.auto_ks_enabled {
        return Ok(None);
    }
    if kill_switch.is_enabled().await? {
        return Ok(None);
    }

    let rows = store.recent_audit_entries(config.auto_ks_window_size as usize).await?;
    if rows.is_empty() {
        return Ok(None);
    }

    let recent_blocks = rows.iter().filter(|r| r.decision == Decision::Block).count() as u32;
    let avg_risk = rows.iter().map(|r| r.risk_score as f64).sum::<f64>() / rows.len() as f64;

    if recent_blocks >= config.auto_ks_block_threshold {
        return Ok(Some(AutoKsTrigger {
            trigger: "block_count",
            detail: format!(
                "{recent_blocks} blocks in last {} actions (threshold: {})",
                rows.len(),
                config.auto_ks_block_threshold
            ),
            recent_blocks,
            avg_risk,
        }));
    }
    if avg_risk >= config.auto_ks_risk_threshold as f64 {
        return Ok(Some(AutoKsTrigger {
            trigger: "avg_risk",
            detail: format!(
                "Average risk {avg_risk:.1}/100 in last {} actions (threshold: {})",
                rows.len(),
                config.auto_ks_risk_threshold
            ),
            recent_blocks,
            avg_risk,
        }));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrion_store::SqliteStore;
    use sentrion_types::AuditEntry;
    use std::collections::HashMap;
    use std::sync::Arc;
    use uuid::Uuid;

    fn entry(decision: Decision, risk: u8) -> AuditEntry {
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
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn disabled_config_never_triggers() {
        let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        let ks = KillSwitch::new(store.clone());
        let config = EscalationConfig { auto_ks_enabled: false, ..EscalationConfig::default() };
        assert!(check_auto_kill_switch(store.as_ref(), &ks, &config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn block_count_threshold_breach_triggers() {
        let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        let ks = KillSwitch::new(store.clone());
        for _ in 0..5 {
            store.insert_audit_entry(entry(Decision::Block, 95)).await.unwrap();
        }
        let config = EscalationConfig {
            auto_ks_enabled: true,
            auto_ks_block_threshold: 3,
            auto_ks_window_size: 10,
            ..EscalationConfig::default()
        };
        let trigger = check_auto_kill_switch(store.as_ref(), &ks, &config).await.unwrap();
        assert!(trigger.is_some());
        assert_eq!(trigger.unwrap().trigger, "block_count");
    }

    #[tokio::test]
    async fn already_engaged_switch_is_a_no_op() {
        let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        let ks = KillSwitch::new(store.clone());
        ks.set(true).await.unwrap();
        for _ in 0..5 {
            store.insert_audit_entry(entry(Decision::Block, 95)).await.unwrap();
        }
        let config = EscalationConfig { auto_ks_enabled: true, auto_ks_block_threshold: 1, ..EscalationConfig::default() };
        assert!(check_auto_kill_switch(store.as_ref(), &ks, &config).await.unwrap().is_none());
    }
}
