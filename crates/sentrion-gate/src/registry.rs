use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use sentrion_store::Store;
use sentrion_types::{ActionRequest, Policy};
use tokio::sync::RwLock;

use crate::config::PolicyCacheConfig;
use crate::error::{GateError, GateResult};
use crate::regex_cache::RegexCache;

struct Cached {
    policies: Vec<Policy>,
    loaded_at: Instant,
}

/// Loads and caches active policies with a bounded TTL; invalidated on
/// any mutation through the administrative surface (C2).
pub struct PolicyRegistry {
    store: Arc<dyn Store>,
    cache: RwLock<Option<Cached>>,
    regex_cache: RegexCache,
    config: PolicyCacheConfig,
}

impl PolicyRegistry {
    pub fn new(store: Arc<dyn Store>, config: PolicyCacheConfig) -> Self {
        Self {
            store,
            cache: RwLock::new(None),
            regex_cache: RegexCache::new(config),
            config,
        }
    }

    pub fn with_defaults(store: Arc<dyn Store>) -> Self {
        Self::new(store, PolicyCacheConfig::default())
    }

    pub async fn load_active(&self) -> GateResult<Vec<Policy>> {
        {
            let guard = self.cache.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.loaded_at.elapsed() < self.config.ttl {
                    return Ok(cached.policies.clone());
                }
            }
        }
        let mut guard = self.cache.write().await;
        // Another writer may have refreshed the cache while we waited.
        if let Some(cached) = guard.as_ref() {
            if cached.loaded_at.elapsed() < self.config.ttl {
                return Ok(cached.policies.clone());
            }
        }
        let policies = self.store.list_active_policies().await?;
        *guard = Some(Cached {
            policies: policies.clone(),
            loaded_at: Instant::now(),
        });
        Ok(policies)
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    pub async fn create_policy(&self, policy: Policy, actor: Option<String>) -> GateResult<Policy> {
        self.validate(&policy)?;
        let created = self.store.create_policy(policy, actor).await?;
        self.invalidate().await;
        Ok(created)
    }

    pub async fn update_policy(
        &self,
        policy: Policy,
        actor: Option<String>,
        note: Option<String>,
    ) -> GateResult<Policy> {
        self.validate(&policy)?;
        let updated = self.store.update_policy(policy, actor, note).await?;
        self.invalidate().await;
        Ok(updated)
    }

    pub async fn archive_policy(&self, policy_id: &str, actor: Option<String>) -> GateResult<()> {
        self.store.archive_policy(policy_id, actor).await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn restore_version(
        &self,
        policy_id: &str,
        version: u32,
        actor: Option<String>,
    ) -> GateResult<Policy> {
        let restored = self.store.restore_version(policy_id, version, actor).await?;
        self.invalidate().await;
        Ok(restored)
    }

    fn validate(&self, policy: &Policy) -> GateResult<()> {
        if let Some(pattern) = &policy.match_.url_regex {
            Regex::new(pattern).map_err(|e| GateError::InvalidRegex(e.to_string()))?;
        }
        if let Some(pattern) = &policy.match_.args_regex {
            Regex::new(pattern).map_err(|e| GateError::InvalidRegex(e.to_string()))?;
        }
        Ok(())
    }

    /// A policy matches iff: when `tool` is present it equals the request
    /// tool exactly; when `url_regex` is present and the tool is
    /// `http_request`, it finds the compiled pattern in `args.url`; when
    /// `args_regex` is present, it finds the compiled pattern in the
    /// lower-cased flattened payload (un-normalised). Never raises:
    /// a regex that fails to compile is treated as non-matching.
    pub fn matches(&self, policy: &Policy, request: &ActionRequest) -> bool {
        if let Some(tool) = &policy.match_.tool {
            if tool != &request.tool {
                return false;
            }
        }
        if let Some(pattern) = &policy.match_.url_regex {
            if request.tool == "http_request" {
                let url = request
                    .args
                    .get("url")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                match self.regex_cache.get_or_compile(pattern) {
                    Some(re) if re.is_match(url) => {}
                    _ => return false,
                }
            } else {
                return false;
            }
        }
        if let Some(pattern) = &policy.match_.args_regex {
            let flattened = request.flatten().to_lowercase();
            match self.regex_cache.get_or_compile(pattern) {
                Some(re) if re.is_match(&flattened) => {}
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrion_store::SqliteStore;
    use sentrion_types::{PolicyAction, PolicyMatch};
    use std::collections::HashMap;

    async fn registry() -> PolicyRegistry {
        let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        PolicyRegistry::with_defaults(store)
    }

    fn policy(tool: Option<&str>, args_regex: Option<&str>) -> Policy {
        let now = chrono::Utc::now();
        Policy {
            policy_id: "p1".to_string(),
            description: "test".to_string(),
            severity: 50,
            match_: PolicyMatch {
                tool: tool.map(|t| t.to_string()),
                url_regex: None,
                args_regex: args_regex.map(|s| s.to_string()),
            },
            action: PolicyAction::Block,
            is_active: true,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn request(tool: &str) -> ActionRequest {
        ActionRequest {
            tool: tool.to_string(),
            args: HashMap::new(),
            context: None,
            prompt: None,
        }
    }

    #[tokio::test]
    async fn policy_with_no_predicate_matches_everything() {
        let reg = registry().await;
        let p = policy(None, None);
        assert!(reg.matches(&p, &request("anything")));
    }

    #[tokio::test]
    async fn tool_predicate_requires_exact_match() {
        let reg = registry().await;
        let p = policy(Some("shell"), None);
        assert!(reg.matches(&p, &request("shell")));
        assert!(!reg.matches(&p, &request("http_request")));
    }

    #[tokio::test]
    async fn create_duplicate_policy_is_rejected_before_any_store_mutation() {
        let reg = registry().await;
        let mut bad = policy(None, Some("(unclosed"));
        bad.policy_id = "bad".to_string();
        let err = reg.create_policy(bad, None).await;
        assert!(matches!(err, Err(GateError::InvalidRegex(_))));
        assert!(reg.store.get_policy("bad").await.unwrap().is_none());
    }
}
