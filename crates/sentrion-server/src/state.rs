use std::sync::Arc;

use sentrion_eventbus::EventBus;
use sentrion_gate::{EvaluationPipeline, PolicyCacheConfig, PolicyRegistry};
use sentrion_store::{KillSwitch, Store};
use sentrion_treasury::{Treasury, TreasuryConfig};
use sentrion_verify::VerificationEngine;

use crate::dispatch::StaticNotificationConfig;

/// Shared application state handed to every route handler. Construction
/// wires the five core subsystems (C1/C2/C6, C7, C8, C9, C10, C11) against
/// one shared store and event bus.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub pipeline: EvaluationPipeline,
    pub verification: VerificationEngine,
    pub treasury: Treasury,
    pub escalation: sentrion_arbiter::EscalationEngine,
    pub event_bus: Arc<EventBus>,
    pub notifications: StaticNotificationConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_treasury_config(store, TreasuryConfig::default())
    }

    pub fn with_treasury_config(store: Arc<dyn Store>, treasury_config: TreasuryConfig) -> Self {
        let cache_config = PolicyCacheConfig::default();
        let pipeline = EvaluationPipeline::new(store.clone(), cache_config);
        let registry = Arc::new(PolicyRegistry::new(store.clone(), cache_config));
        let verification = VerificationEngine::new(store.clone(), registry);
        let treasury = Treasury::with_config(store.clone(), treasury_config);
        let kill_switch = Arc::new(KillSwitch::new(store.clone()));
        let event_bus = Arc::new(EventBus::new());
        let escalation = sentrion_arbiter::EscalationEngine::new(store.clone(), kill_switch, event_bus.clone());

        Self {
            store,
            pipeline,
            verification,
            treasury,
            escalation,
            event_bus,
            notifications: StaticNotificationConfig::default(),
        }
    }
}
