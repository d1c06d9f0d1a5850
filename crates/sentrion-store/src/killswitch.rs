use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StoreResult;
use crate::traits::Store;

/// Key under which the kill switch is persisted in runtime state.
const KILL_SWITCH_KEY: &str = "kill_switch";

/// Cached view of the global kill switch, backed by [`Store::get_state`] /
/// [`Store::set_state`]. `None` means "not yet loaded from the store" —
/// the first read populates the cache, subsequent reads are in-memory.
///
/// Mirrors the source's module-level boolean-or-None cache behind a lock:
/// every evaluation path consults this before running the pipeline, so it
/// must never block on a slow store round-trip after the first read.
pub struct KillSwitch {
    store: Arc<dyn Store>,
    cached: Mutex<Option<bool>>,
}

impl KillSwitch {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    pub async fn is_enabled(&self) -> StoreResult<bool> {
        if let Some(value) = *self.cached.lock() {
            return Ok(value);
        }
        let value = self
            .store
            .get_state(KILL_SWITCH_KEY)
            .await?
            .map(|raw| raw == "true")
            .unwrap_or(false);
        *self.cached.lock() = Some(value);
        Ok(value)
    }

    pub async fn set(&self, enabled: bool) -> StoreResult<()> {
        self.store
            .set_state(KILL_SWITCH_KEY, if enabled { "true" } else { "false" })
            .await?;
        *self.cached.lock() = Some(enabled);
        Ok(())
    }
}
