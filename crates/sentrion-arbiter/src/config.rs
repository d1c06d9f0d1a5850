use sentrion_store::{Store, StoreResult};
use sentrion_types::EscalationConfig;

fn scope_key(scope: &str) -> String {
    format!("escalation_config:{scope}")
}

/// Resolves escalation config for an agent: agent-specific override, then
/// the global `"*"` scope, then hardcoded defaults.
pub async fn resolve_config(store: &dyn Store, agent_id: Option<&str>) -> StoreResult<EscalationConfig> {
    if let Some(agent_id) = agent_id {
        if let Some(raw) = store.get_state(&scope_key(&format!("agent:{agent_id}"))).await? {
            if let Ok(config) = serde_json::from_str(&raw) {
                return Ok(config);
            }
        }
    }
    if let Some(raw) = store.get_state(&scope_key("*")).await? {
        if let Ok(config) = serde_json::from_str(&raw) {
            return Ok(config);
        }
    }
    Ok(EscalationConfig::default())
}

/// Persists an escalation config override at its `scope` (`agent:<id>` or
/// `"*"`).
pub async fn set_config(store: &dyn Store, config: &EscalationConfig) -> StoreResult<()> {
    let raw = serde_json::to_string(config).map_err(sentrion_store::StoreError::from)?;
    store.set_state(&scope_key(&config.scope), &raw).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrion_store::SqliteStore;

    #[tokio::test]
    async fn absent_config_falls_back_to_defaults() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let config = resolve_config(&store, Some("agent-1")).await.unwrap();
        assert_eq!(config.auto_ks_block_threshold, EscalationConfig::default().auto_ks_block_threshold);
    }

    #[tokio::test]
    async fn agent_specific_override_wins_over_global() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let mut global = EscalationConfig::default();
        global.scope = "*".to_string();
        global.auto_ks_block_threshold = 9;
        set_config(&store, &global).await.unwrap();

        let mut per_agent = EscalationConfig::default();
        per_agent.scope = "agent:agent-1".to_string();
        per_agent.auto_ks_block_threshold = 2;
        set_config(&store, &per_agent).await.unwrap();

        let resolved = resolve_config(&store, Some("agent-1")).await.unwrap();
        assert_eq!(resolved.auto_ks_block_threshold, 2);

        let other = resolve_config(&store, Some("agent-2")).await.unwrap();
        assert_eq!(other.auto_ks_block_threshold, 9);
    }
}
