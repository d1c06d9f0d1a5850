use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentrion_types::{
    AuditEntry, EscalationEvent, EscalationStatus, HistoryEntry, Policy, PolicyVersion, Receipt,
    TraceSpan, VerificationRecord, Wallet,
};
use uuid::Uuid;

use crate::error::StoreResult;

/// Durable persistence for the gateway: actions, policies, policy versions
/// and audit, traces, receipts, wallets, escalation events, verification
/// logs, and small runtime-state keys (C1).
///
/// Implementations must guarantee: for a single agent, audit entries are
/// totally ordered by insertion time; span ingestion is idempotent keyed by
/// `span_id`; wallet mutations are serialised per-wallet to avoid lost
/// updates under concurrent requests.
#[async_trait]
pub trait Store: Send + Sync {
    // -- runtime state -----------------------------------------------------
    async fn get_state(&self, key: &str) -> StoreResult<Option<String>>;
    async fn set_state(&self, key: &str, value: &str) -> StoreResult<()>;

    // -- policies ------------------------------------------------------------
    /// Insert a brand-new policy at version 1, with its first version
    /// snapshot and an audit-trail entry. Errors with `Conflict` on a
    /// duplicate `policy_id`.
    async fn create_policy(&self, policy: Policy, actor: Option<String>) -> StoreResult<Policy>;

    /// Apply a mutation to an existing policy, bumping `version` and
    /// recording exactly one new version snapshot and one audit entry.
    async fn update_policy(
        &self,
        policy: Policy,
        actor: Option<String>,
        note: Option<String>,
    ) -> StoreResult<Policy>;

    async fn archive_policy(&self, policy_id: &str, actor: Option<String>) -> StoreResult<()>;

    async fn get_policy(&self, policy_id: &str) -> StoreResult<Option<Policy>>;

    /// All active policies, in no particular guaranteed order — callers
    /// (the policy registry cache) own ordering concerns.
    async fn list_active_policies(&self) -> StoreResult<Vec<Policy>>;

    async fn list_versions(&self, policy_id: &str) -> StoreResult<Vec<PolicyVersion>>;

    /// Restore a prior version's content as a new version, strictly
    /// greater than any existing version for this policy.
    async fn restore_version(
        &self,
        policy_id: &str,
        version: u32,
        actor: Option<String>,
    ) -> StoreResult<Policy>;

    // -- audit / session history ---------------------------------------------
    async fn insert_audit_entry(&self, entry: AuditEntry) -> StoreResult<()>;

    async fn get_audit_entry(&self, action_id: Uuid) -> StoreResult<Option<AuditEntry>>;

    /// Recent history entries scoped by agent (mandatory) and session
    /// (optional), within `since`, ordered oldest-to-newest, capped at
    /// `limit`.
    async fn history(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<HistoryEntry>>;

    /// The `limit` most recent audit entries across all agents, newest
    /// first — used by the auto-kill-switch check and baseline stats.
    async fn recent_audit_entries(&self, limit: usize) -> StoreResult<Vec<AuditEntry>>;

    /// Audit entries for one agent within `[from, to)`, oldest-to-newest —
    /// used by the drift detector for baseline and current-window stats.
    async fn audit_entries_in_range(
        &self,
        agent_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<AuditEntry>>;

    // -- verification ---------------------------------------------------------
    async fn insert_verification_record(&self, record: VerificationRecord) -> StoreResult<()>;

    // -- receipts / wallets -----------------------------------------------------
    async fn insert_receipt(&self, receipt: Receipt) -> StoreResult<()>;

    async fn get_wallet(&self, wallet_id: &str) -> StoreResult<Option<Wallet>>;

    async fn upsert_wallet(&self, wallet: Wallet) -> StoreResult<Wallet>;

    /// Atomically subtract `fee` from `balance` and add it to
    /// `total_fees_paid`, returning the updated wallet. Serialised per
    /// `wallet_id` so concurrent requests never lose an update.
    async fn apply_fee(&self, wallet_id: &str, fee: rust_decimal::Decimal) -> StoreResult<Wallet>;

    // -- escalation -------------------------------------------------------------
    async fn insert_escalation_event(&self, event: EscalationEvent) -> StoreResult<Uuid>;

    async fn get_escalation_event(&self, id: Uuid) -> StoreResult<Option<EscalationEvent>>;

    async fn resolve_escalation_event(
        &self,
        id: Uuid,
        status: EscalationStatus,
        resolver: Option<String>,
        note: Option<String>,
    ) -> StoreResult<EscalationEvent>;

    // -- traces -----------------------------------------------------------------
    /// Idempotent bulk ingest keyed by `span_id`. Returns how many rows
    /// were newly inserted versus silently skipped as duplicates.
    async fn ingest_spans(&self, spans: Vec<TraceSpan>) -> StoreResult<sentrion_types::IngestResult>;

    async fn get_spans_by_trace(&self, trace_id: &str) -> StoreResult<Vec<TraceSpan>>;

    async fn delete_spans_by_trace(&self, trace_id: &str) -> StoreResult<u64>;
}
