use std::sync::Arc;

use chrono::Utc;
use sentrion_store::{Store, StoreResult};
use sentrion_types::HistoryEntry;

use crate::config::SessionConfig;

/// Per-agent, optionally per-session, bounded recent-action history (C3).
///
/// Sandbox guarantee: results are always filtered by agent identity; when
/// a session identity is supplied too, no action from another session is
/// observable. An absent agent identity yields the empty list.
pub struct SessionStore {
    store: Arc<dyn Store>,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(store: Arc<dyn Store>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    pub fn with_defaults(store: Arc<dyn Store>) -> Self {
        Self::new(store, SessionConfig::default())
    }

    pub async fn history(
        &self,
        agent_id: Option<&str>,
        session_id: Option<&str>,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let Some(agent_id) = agent_id else {
            return Ok(Vec::new());
        };
        if agent_id.is_empty() {
            return Ok(Vec::new());
        }
        let since = Utc::now()
            - chrono::Duration::from_std(self.config.window).unwrap_or(chrono::Duration::zero());
        self.store
            .history(agent_id, session_id, since, self.config.max_count)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_agent_identity_yields_empty_list() {
        let store = Arc::new(sentrion_store::SqliteStore::connect("sqlite::memory:").await.unwrap());
        let sessions = SessionStore::with_defaults(store);
        let history = sessions.history(None, None).await.unwrap();
        assert!(history.is_empty());
    }
}
