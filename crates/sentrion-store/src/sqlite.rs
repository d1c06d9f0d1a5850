use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sentrion_types::{
    AuditEntry, Decision, EscalationEvent, EscalationStatus, HistoryEntry, IngestResult, Policy,
    PolicyVersion, Receipt, TraceSpan, VerificationRecord, Wallet,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::Store;

/// `sqlx`-backed SQLite implementation of [`Store`]. Complex nested
/// structures (args maps, policy content, findings) are stored as JSON text
/// columns — SQLite has no native JSON type, and this keeps the schema
/// stable as the data model grows.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let pool = SqlitePool::connect(url).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runtime_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS policies (
                policy_id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                severity INTEGER NOT NULL,
                match_json TEXT NOT NULL,
                action TEXT NOT NULL,
                is_active INTEGER NOT NULL,
                version INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS policy_versions (
                policy_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                content_json TEXT NOT NULL,
                actor TEXT,
                note TEXT,
                created_at TEXT NOT NULL,
                PRIMARY KEY (policy_id, version)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_entries (
                id TEXT PRIMARY KEY,
                tool TEXT NOT NULL,
                args_json TEXT NOT NULL,
                context_json TEXT NOT NULL,
                agent_id TEXT,
                session_id TEXT,
                user_id TEXT,
                channel TEXT,
                conversation_id TEXT,
                turn_id TEXT,
                risk_score INTEGER NOT NULL,
                decision TEXT NOT NULL,
                explanation TEXT NOT NULL,
                policy_ids_json TEXT NOT NULL,
                chain_pattern TEXT,
                latency_ms REAL NOT NULL,
                fee_amount TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_agent ON audit_entries(agent_id, created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_entries(created_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS verification_records (
                id TEXT PRIMARY KEY,
                action_id TEXT NOT NULL,
                tool TEXT NOT NULL,
                agent_id TEXT,
                session_id TEXT,
                verdict TEXT NOT NULL,
                risk_delta INTEGER NOT NULL,
                findings_json TEXT NOT NULL,
                drift_score REAL,
                drift_signals_json TEXT NOT NULL,
                escalated INTEGER NOT NULL,
                escalation_id TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS receipts (
                receipt_id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                tool TEXT NOT NULL,
                decision TEXT NOT NULL,
                risk_score INTEGER NOT NULL,
                policy_ids_json TEXT NOT NULL,
                chain_pattern TEXT,
                agent_id TEXT,
                digest TEXT NOT NULL,
                fee_amount TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallets (
                wallet_id TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                balance TEXT NOT NULL,
                total_deposited TEXT NOT NULL,
                total_fees_paid TEXT NOT NULL,
                currency TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS escalation_events (
                id TEXT PRIMARY KEY,
                action_id TEXT,
                tool TEXT NOT NULL,
                agent_id TEXT,
                session_id TEXT,
                trigger_kind TEXT NOT NULL,
                severity TEXT NOT NULL,
                decision TEXT NOT NULL,
                risk_score INTEGER NOT NULL,
                explanation TEXT NOT NULL,
                policy_ids_json TEXT NOT NULL,
                chain_pattern TEXT,
                status TEXT NOT NULL,
                resolver TEXT,
                resolution_note TEXT,
                created_at TEXT NOT NULL,
                resolved_at TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trace_spans (
                span_id TEXT PRIMARY KEY,
                trace_id TEXT NOT NULL,
                parent_span_id TEXT,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                duration_ms REAL,
                attributes_json TEXT NOT NULL,
                input_json TEXT,
                output_json TEXT,
                events_json TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_spans_trace ON trace_spans(trace_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn policy_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Policy> {
        Ok(Policy {
            policy_id: row.get("policy_id"),
            description: row.get("description"),
            severity: row.get::<i64, _>("severity") as u8,
            match_: serde_json::from_str(row.get::<String, _>("match_json").as_str())?,
            action: serde_json::from_str(&format!("\"{}\"", row.get::<String, _>("action")))?,
            is_active: row.get::<i64, _>("is_active") != 0,
            version: row.get::<i64, _>("version") as u32,
            created_at: DateTime::parse_from_rfc3339(row.get::<String, _>("created_at").as_str())
                .map_err(|e| StoreError::Validation(e.to_string()))?
                .with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(row.get::<String, _>("updated_at").as_str())
                .map_err(|e| StoreError::Validation(e.to_string()))?
                .with_timezone(&Utc),
        })
    }

    async fn insert_policy_row(
        &self,
        policy: &Policy,
        executor: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
    ) -> StoreResult<()> {
        let action_str = serde_json::to_string(&policy.action)?;
        let action_str = action_str.trim_matches('"');
        sqlx::query(
            r#"
            INSERT INTO policies
                (policy_id, description, severity, match_json, action, is_active, version, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(policy_id) DO UPDATE SET
                description = excluded.description,
                severity = excluded.severity,
                match_json = excluded.match_json,
                action = excluded.action,
                is_active = excluded.is_active,
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&policy.policy_id)
        .bind(&policy.description)
        .bind(policy.severity as i64)
        .bind(serde_json::to_string(&policy.match_)?)
        .bind(action_str)
        .bind(policy.is_active as i64)
        .bind(policy.version as i64)
        .bind(policy.created_at.to_rfc3339())
        .bind(policy.updated_at.to_rfc3339())
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn insert_version_row(
        &self,
        policy: &Policy,
        actor: Option<&str>,
        note: Option<&str>,
        executor: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO policy_versions (policy_id, version, content_json, actor, note, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&policy.policy_id)
        .bind(policy.version as i64)
        .bind(serde_json::to_string(policy)?)
        .bind(actor)
        .bind(note)
        .bind(Utc::now().to_rfc3339())
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn insert_policy_audit(
        &self,
        policy: &Policy,
        actor: Option<&str>,
        note: &str,
        executor: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
    ) -> StoreResult<()> {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            tool: "policy.mutation".to_string(),
            args: Default::default(),
            context: Default::default(),
            agent_id: actor.map(|a| a.to_string()),
            session_id: None,
            user_id: actor.map(|a| a.to_string()),
            channel: None,
            conversation_id: None,
            turn_id: None,
            risk_score: 0,
            decision: Decision::Allow,
            explanation: format!("{note} (policy '{}', version {})", policy.policy_id, policy.version),
            policy_ids: vec![policy.policy_id.clone()],
            chain_pattern: None,
            latency_ms: 0.0,
            fee_amount: None,
            created_at: Utc::now(),
        };
        sqlx::query(
            r#"
            INSERT INTO audit_entries
                (id, tool, args_json, context_json, agent_id, session_id, user_id, channel,
                 conversation_id, turn_id, risk_score, decision, explanation, policy_ids_json,
                 chain_pattern, latency_ms, fee_amount, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.tool)
        .bind(serde_json::to_string(&entry.args)?)
        .bind(serde_json::to_string(&entry.context)?)
        .bind(&entry.agent_id)
        .bind(&entry.session_id)
        .bind(&entry.user_id)
        .bind(&entry.channel)
        .bind(&entry.conversation_id)
        .bind(&entry.turn_id)
        .bind(entry.risk_score as i64)
        .bind("allow")
        .bind(&entry.explanation)
        .bind(serde_json::to_string(&entry.policy_ids)?)
        .bind(&entry.chain_pattern)
        .bind(entry.latency_ms)
        .bind(&entry.fee_amount)
        .bind(entry.created_at.to_rfc3339())
        .execute(executor)
        .await?;
        Ok(())
    }

    fn audit_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<AuditEntry> {
        let decision_str: String = row.get("decision");
        Ok(AuditEntry {
            id: Uuid::parse_str(&row.get::<String, _>("id")).map_err(|e| StoreError::Validation(e.to_string()))?,
            tool: row.get("tool"),
            args: serde_json::from_str(row.get::<String, _>("args_json").as_str())?,
            context: serde_json::from_str(row.get::<String, _>("context_json").as_str())?,
            agent_id: row.get("agent_id"),
            session_id: row.get("session_id"),
            user_id: row.get("user_id"),
            channel: row.get("channel"),
            conversation_id: row.get("conversation_id"),
            turn_id: row.get("turn_id"),
            risk_score: row.get::<i64, _>("risk_score") as u8,
            decision: serde_json::from_str(&format!("\"{decision_str}\""))?,
            explanation: row.get("explanation"),
            policy_ids: serde_json::from_str(row.get::<String, _>("policy_ids_json").as_str())?,
            chain_pattern: row.get("chain_pattern"),
            latency_ms: row.get("latency_ms"),
            fee_amount: row.get("fee_amount"),
            created_at: DateTime::parse_from_rfc3339(row.get::<String, _>("created_at").as_str())
                .map_err(|e| StoreError::Validation(e.to_string()))?
                .with_timezone(&Utc),
        })
    }

    fn wallet_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Wallet> {
        Ok(Wallet {
            wallet_id: row.get("wallet_id"),
            label: row.get("label"),
            balance: Decimal::from_str(row.get::<String, _>("balance").as_str())
                .map_err(|e| StoreError::Validation(e.to_string()))?,
            total_deposited: Decimal::from_str(row.get::<String, _>("total_deposited").as_str())
                .map_err(|e| StoreError::Validation(e.to_string()))?,
            total_fees_paid: Decimal::from_str(row.get::<String, _>("total_fees_paid").as_str())
                .map_err(|e| StoreError::Validation(e.to_string()))?,
            currency: row.get("currency"),
            created_at: DateTime::parse_from_rfc3339(row.get::<String, _>("created_at").as_str())
                .map_err(|e| StoreError::Validation(e.to_string()))?
                .with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(row.get::<String, _>("updated_at").as_str())
                .map_err(|e| StoreError::Validation(e.to_string()))?
                .with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_state(&self, key: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM runtime_state WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set_state(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_policy(&self, mut policy: Policy, actor: Option<String>) -> StoreResult<Policy> {
        if self.get_policy(&policy.policy_id).await?.is_some() {
            return Err(StoreError::Conflict(format!(
                "policy '{}' already exists",
                policy.policy_id
            )));
        }
        policy.version = 1;
        let now = Utc::now();
        policy.created_at = now;
        policy.updated_at = now;

        let mut tx = self.pool.begin().await?;
        self.insert_policy_row(&policy, &mut *tx).await?;
        self.insert_version_row(&policy, actor.as_deref(), Some("created"), &mut *tx)
            .await?;
        self.insert_policy_audit(&policy, actor.as_deref(), "Policy created", &mut *tx)
            .await?;
        tx.commit().await?;
        Ok(policy)
    }

    async fn update_policy(
        &self,
        mut policy: Policy,
        actor: Option<String>,
        note: Option<String>,
    ) -> StoreResult<Policy> {
        let existing = self
            .get_policy(&policy.policy_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("policy '{}'", policy.policy_id)))?;
        policy.version = existing.version + 1;
        policy.created_at = existing.created_at;
        policy.updated_at = Utc::now();

        let mut tx = self.pool.begin().await?;
        self.insert_policy_row(&policy, &mut *tx).await?;
        self.insert_version_row(&policy, actor.as_deref(), note.as_deref(), &mut *tx)
            .await?;
        self.insert_policy_audit(
            &policy,
            actor.as_deref(),
            note.as_deref().unwrap_or("Policy updated"),
            &mut *tx,
        )
        .await?;
        tx.commit().await?;
        Ok(policy)
    }

    async fn archive_policy(&self, policy_id: &str, actor: Option<String>) -> StoreResult<()> {
        let mut policy = self
            .get_policy(policy_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("policy '{policy_id}'")))?;
        policy.is_active = false;
        self.update_policy(policy, actor, Some("Policy archived".to_string()))
            .await?;
        Ok(())
    }

    async fn get_policy(&self, policy_id: &str) -> StoreResult<Option<Policy>> {
        let row = sqlx::query("SELECT * FROM policies WHERE policy_id = ?1")
            .bind(policy_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::policy_from_row).transpose()
    }

    async fn list_active_policies(&self) -> StoreResult<Vec<Policy>> {
        let rows = sqlx::query("SELECT * FROM policies WHERE is_active = 1")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::policy_from_row).collect()
    }

    async fn list_versions(&self, policy_id: &str) -> StoreResult<Vec<PolicyVersion>> {
        let rows = sqlx::query(
            "SELECT * FROM policy_versions WHERE policy_id = ?1 ORDER BY version ASC",
        )
        .bind(policy_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(PolicyVersion {
                    policy_id: row.get("policy_id"),
                    version: row.get::<i64, _>("version") as u32,
                    content: serde_json::from_str(row.get::<String, _>("content_json").as_str())?,
                    actor: row.get("actor"),
                    note: row.get("note"),
                    created_at: DateTime::parse_from_rfc3339(row.get::<String, _>("created_at").as_str())
                        .map_err(|e| StoreError::Validation(e.to_string()))?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }

    async fn restore_version(
        &self,
        policy_id: &str,
        version: u32,
        actor: Option<String>,
    ) -> StoreResult<Policy> {
        let row = sqlx::query(
            "SELECT content_json FROM policy_versions WHERE policy_id = ?1 AND version = ?2",
        )
        .bind(policy_id)
        .bind(version as i64)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("policy '{policy_id}' version {version}")))?;
        let restored: Policy = serde_json::from_str(row.get::<String, _>("content_json").as_str())?;
        self.update_policy(
            restored,
            actor,
            Some(format!("Restored from version {version}")),
        )
        .await
    }

    async fn insert_audit_entry(&self, entry: AuditEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_entries
                (id, tool, args_json, context_json, agent_id, session_id, user_id, channel,
                 conversation_id, turn_id, risk_score, decision, explanation, policy_ids_json,
                 chain_pattern, latency_ms, fee_amount, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.tool)
        .bind(serde_json::to_string(&entry.args)?)
        .bind(serde_json::to_string(&entry.context)?)
        .bind(&entry.agent_id)
        .bind(&entry.session_id)
        .bind(&entry.user_id)
        .bind(&entry.channel)
        .bind(&entry.conversation_id)
        .bind(&entry.turn_id)
        .bind(entry.risk_score as i64)
        .bind(entry.decision.as_str())
        .bind(&entry.explanation)
        .bind(serde_json::to_string(&entry.policy_ids)?)
        .bind(&entry.chain_pattern)
        .bind(entry.latency_ms)
        .bind(&entry.fee_amount)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_audit_entry(&self, action_id: Uuid) -> StoreResult<Option<AuditEntry>> {
        let row = sqlx::query("SELECT * FROM audit_entries WHERE id = ?1")
            .bind(action_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::audit_from_row).transpose()
    }

    async fn history(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<HistoryEntry>> {
        if agent_id.is_empty() {
            return Ok(Vec::new());
        }
        let rows = if let Some(session_id) = session_id {
            sqlx::query(
                r#"
                SELECT * FROM audit_entries
                WHERE agent_id = ?1 AND session_id = ?2 AND created_at >= ?3
                ORDER BY created_at DESC LIMIT ?4
                "#,
            )
            .bind(agent_id)
            .bind(session_id)
            .bind(since.to_rfc3339())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                SELECT * FROM audit_entries
                WHERE agent_id = ?1 AND created_at >= ?2
                ORDER BY created_at DESC LIMIT ?3
                "#,
            )
            .bind(agent_id)
            .bind(since.to_rfc3339())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        };
        let mut entries: Vec<HistoryEntry> = rows
            .iter()
            .map(Self::audit_from_row)
            .collect::<StoreResult<Vec<_>>>()?
            .into_iter()
            .map(|a| HistoryEntry {
                agent_id: a.agent_id.unwrap_or_default(),
                session_id: a.session_id,
                tool: a.tool,
                decision: a.decision,
                risk_score: a.risk_score,
                policy_ids: a.policy_ids,
                timestamp: a.created_at,
            })
            .collect();
        entries.reverse(); // oldest-to-newest
        Ok(entries)
    }

    async fn recent_audit_entries(&self, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query("SELECT * FROM audit_entries ORDER BY created_at DESC LIMIT ?1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::audit_from_row).collect()
    }

    async fn audit_entries_in_range(
        &self,
        agent_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM audit_entries
            WHERE agent_id = ?1 AND created_at >= ?2 AND created_at < ?3
            ORDER BY created_at ASC
            "#,
        )
        .bind(agent_id)
        .bind(from.to_rfc3339())
        .bind(to.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::audit_from_row).collect()
    }

    async fn insert_verification_record(&self, record: VerificationRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO verification_records
                (id, action_id, tool, agent_id, session_id, verdict, risk_delta, findings_json,
                 drift_score, drift_signals_json, escalated, escalation_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.action_id.to_string())
        .bind(&record.tool)
        .bind(&record.agent_id)
        .bind(&record.session_id)
        .bind(serde_json::to_string(&record.verdict)?.trim_matches('"'))
        .bind(record.risk_delta as i64)
        .bind(serde_json::to_string(&record.findings)?)
        .bind(record.drift_score)
        .bind(serde_json::to_string(&record.drift_signals)?)
        .bind(record.escalated as i64)
        .bind(record.escalation_id.map(|id| id.to_string()))
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_receipt(&self, receipt: Receipt) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO receipts
                (receipt_id, timestamp, tool, decision, risk_score, policy_ids_json,
                 chain_pattern, agent_id, digest, fee_amount)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&receipt.receipt_id)
        .bind(receipt.timestamp.to_rfc3339())
        .bind(&receipt.tool)
        .bind(&receipt.decision)
        .bind(receipt.risk_score as i64)
        .bind(serde_json::to_string(&receipt.policy_ids)?)
        .bind(&receipt.chain_pattern)
        .bind(&receipt.agent_id)
        .bind(&receipt.digest)
        .bind(&receipt.fee_amount)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_wallet(&self, wallet_id: &str) -> StoreResult<Option<Wallet>> {
        let row = sqlx::query("SELECT * FROM wallets WHERE wallet_id = ?1")
            .bind(wallet_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::wallet_from_row).transpose()
    }

    async fn upsert_wallet(&self, wallet: Wallet) -> StoreResult<Wallet> {
        sqlx::query(
            r#"
            INSERT INTO wallets
                (wallet_id, label, balance, total_deposited, total_fees_paid, currency, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(wallet_id) DO UPDATE SET
                label = excluded.label,
                balance = excluded.balance,
                total_deposited = excluded.total_deposited,
                total_fees_paid = excluded.total_fees_paid,
                currency = excluded.currency,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&wallet.wallet_id)
        .bind(&wallet.label)
        .bind(wallet.balance.to_string())
        .bind(wallet.total_deposited.to_string())
        .bind(wallet.total_fees_paid.to_string())
        .bind(&wallet.currency)
        .bind(wallet.created_at.to_rfc3339())
        .bind(wallet.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(wallet)
    }

    async fn apply_fee(&self, wallet_id: &str, fee: Decimal) -> StoreResult<Wallet> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT * FROM wallets WHERE wallet_id = ?1")
            .bind(wallet_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("wallet '{wallet_id}'")))?;
        let mut wallet = Self::wallet_from_row(&row)?;
        wallet.balance -= fee;
        wallet.total_fees_paid += fee;
        wallet.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE wallets SET balance = ?1, total_fees_paid = ?2, updated_at = ?3
            WHERE wallet_id = ?4
            "#,
        )
        .bind(wallet.balance.to_string())
        .bind(wallet.total_fees_paid.to_string())
        .bind(wallet.updated_at.to_rfc3339())
        .bind(wallet_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(wallet)
    }

    async fn insert_escalation_event(&self, event: EscalationEvent) -> StoreResult<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO escalation_events
                (id, action_id, tool, agent_id, session_id, trigger_kind, severity, decision,
                 risk_score, explanation, policy_ids_json, chain_pattern, status, resolver,
                 resolution_note, created_at, resolved_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.action_id.map(|id| id.to_string()))
        .bind(&event.tool)
        .bind(&event.agent_id)
        .bind(&event.session_id)
        .bind(serde_json::to_string(&event.trigger)?.trim_matches('"'))
        .bind(serde_json::to_string(&event.severity)?.trim_matches('"'))
        .bind(&event.decision)
        .bind(event.risk_score as i64)
        .bind(&event.explanation)
        .bind(serde_json::to_string(&event.policy_ids)?)
        .bind(&event.chain_pattern)
        .bind(serde_json::to_string(&event.status)?.trim_matches('"'))
        .bind(&event.resolver)
        .bind(&event.resolution_note)
        .bind(event.created_at.to_rfc3339())
        .bind(event.resolved_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(event.id)
    }

    async fn get_escalation_event(&self, id: Uuid) -> StoreResult<Option<EscalationEvent>> {
        let row = sqlx::query("SELECT * FROM escalation_events WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(escalation_from_row).transpose()
    }

    async fn resolve_escalation_event(
        &self,
        id: Uuid,
        status: EscalationStatus,
        resolver: Option<String>,
        note: Option<String>,
    ) -> StoreResult<EscalationEvent> {
        let existing = self
            .get_escalation_event(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("escalation event '{id}'")))?;
        if existing.status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "escalation event '{id}' already resolved"
            )));
        }
        let resolved_at = Utc::now();
        sqlx::query(
            r#"
            UPDATE escalation_events
            SET status = ?1, resolver = ?2, resolution_note = ?3, resolved_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(serde_json::to_string(&status)?.trim_matches('"'))
        .bind(&resolver)
        .bind(&note)
        .bind(resolved_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        self.get_escalation_event(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("escalation event '{id}'")))
    }

    async fn ingest_spans(&self, spans: Vec<TraceSpan>) -> StoreResult<IngestResult> {
        let mut result = IngestResult::default();
        let mut tx = self.pool.begin().await?;
        for span in spans {
            let exists = sqlx::query("SELECT 1 FROM trace_spans WHERE span_id = ?1")
                .bind(&span.span_id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            if exists {
                result.skipped += 1;
                continue;
            }
            sqlx::query(
                r#"
                INSERT INTO trace_spans
                    (span_id, trace_id, parent_span_id, kind, name, status, start_time, end_time,
                     duration_ms, attributes_json, input_json, output_json, events_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
            )
            .bind(&span.span_id)
            .bind(&span.trace_id)
            .bind(&span.parent_span_id)
            .bind(serde_json::to_string(&span.kind)?.trim_matches('"'))
            .bind(&span.name)
            .bind(serde_json::to_string(&span.status)?.trim_matches('"'))
            .bind(span.start_time.to_rfc3339())
            .bind(span.end_time.map(|t| t.to_rfc3339()))
            .bind(span.derived_duration_ms())
            .bind(serde_json::to_string(&span.attributes)?)
            .bind(span.input.as_ref().map(serde_json::to_string).transpose()?)
            .bind(span.output.as_ref().map(serde_json::to_string).transpose()?)
            .bind(serde_json::to_string(&span.events)?)
            .execute(&mut *tx)
            .await?;
            result.inserted += 1;
        }
        tx.commit().await?;
        Ok(result)
    }

    async fn get_spans_by_trace(&self, trace_id: &str) -> StoreResult<Vec<TraceSpan>> {
        let rows = sqlx::query("SELECT * FROM trace_spans WHERE trace_id = ?1 ORDER BY start_time ASC")
            .bind(trace_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(span_from_row).collect()
    }

    async fn delete_spans_by_trace(&self, trace_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM trace_spans WHERE trace_id = ?1")
            .bind(trace_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn escalation_from_row(row: sqlx::sqlite::SqliteRow) -> StoreResult<EscalationEvent> {
    let action_id: Option<String> = row.get("action_id");
    let resolved_at: Option<String> = row.get("resolved_at");
    Ok(EscalationEvent {
        id: Uuid::parse_str(&row.get::<String, _>("id")).map_err(|e| StoreError::Validation(e.to_string()))?,
        action_id: action_id
            .map(|id| Uuid::parse_str(&id))
            .transpose()
            .map_err(|e| StoreError::Validation(e.to_string()))?,
        tool: row.get("tool"),
        agent_id: row.get("agent_id"),
        session_id: row.get("session_id"),
        trigger: serde_json::from_str(&format!("\"{}\"", row.get::<String, _>("trigger_kind")))?,
        severity: serde_json::from_str(&format!("\"{}\"", row.get::<String, _>("severity")))?,
        decision: row.get("decision"),
        risk_score: row.get::<i64, _>("risk_score") as u8,
        explanation: row.get("explanation"),
        policy_ids: serde_json::from_str(row.get::<String, _>("policy_ids_json").as_str())?,
        chain_pattern: row.get("chain_pattern"),
        status: serde_json::from_str(&format!("\"{}\"", row.get::<String, _>("status")))?,
        resolver: row.get("resolver"),
        resolution_note: row.get("resolution_note"),
        created_at: DateTime::parse_from_rfc3339(row.get::<String, _>("created_at").as_str())
            .map_err(|e| StoreError::Validation(e.to_string()))?
            .with_timezone(&Utc),
        resolved_at: resolved_at
            .map(|t| DateTime::parse_from_rfc3339(&t).map(|d| d.with_timezone(&Utc)))
            .transpose()
            .map_err(|e| StoreError::Validation(e.to_string()))?,
    })
}

fn span_from_row(row: sqlx::sqlite::SqliteRow) -> StoreResult<TraceSpan> {
    let end_time: Option<String> = row.get("end_time");
    let input_json: Option<String> = row.get("input_json");
    let output_json: Option<String> = row.get("output_json");
    Ok(TraceSpan {
        span_id: row.get("span_id"),
        trace_id: row.get("trace_id"),
        parent_span_id: row.get("parent_span_id"),
        kind: serde_json::from_str(&format!("\"{}\"", row.get::<String, _>("kind")))?,
        name: row.get("name"),
        status: serde_json::from_str(&format!("\"{}\"", row.get::<String, _>("status")))?,
        start_time: DateTime::parse_from_rfc3339(row.get::<String, _>("start_time").as_str())
            .map_err(|e| StoreError::Validation(e.to_string()))?
            .with_timezone(&Utc),
        end_time: end_time
            .map(|t| DateTime::parse_from_rfc3339(&t).map(|d| d.with_timezone(&Utc)))
            .transpose()
            .map_err(|e| StoreError::Validation(e.to_string()))?,
        duration_ms: row.get("duration_ms"),
        attributes: serde_json::from_str(row.get::<String, _>("attributes_json").as_str())?,
        input: input_json.map(|j| serde_json::from_str(&j)).transpose()?,
        output: output_json.map(|j| serde_json::from_str(&j)).transpose()?,
        events: serde_json::from_str(row.get::<String, _>("events_json").as_str())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrion_types::{Decision, PolicyAction, PolicyMatch};

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    fn sample_policy(id: &str) -> Policy {
        let now = Utc::now();
        Policy {
            policy_id: id.to_string(),
            description: "block shell exec".to_string(),
            severity: 80,
            match_: PolicyMatch {
                tool: Some("shell".to_string()),
                url_regex: None,
                args_regex: None,
            },
            action: PolicyAction::Block,
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_and_fetch_policy_round_trips() {
        let store = memory_store().await;
        let created = store
            .create_policy(sample_policy("shell-block"), Some("tester".to_string()))
            .await
            .unwrap();
        assert_eq!(created.version, 1);

        let fetched = store.get_policy("shell-block").await.unwrap().unwrap();
        assert_eq!(fetched.severity, 80);
        assert!(fetched.is_active);

        let versions = store.list_versions("shell-block").await.unwrap();
        assert_eq!(versions.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_policy_creation_conflicts() {
        let store = memory_store().await;
        store
            .create_policy(sample_policy("dup"), None)
            .await
            .unwrap();
        let err = store.create_policy(sample_policy("dup"), None).await;
        assert!(matches!(err, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn update_policy_bumps_version_and_keeps_history() {
        let store = memory_store().await;
        let created = store.create_policy(sample_policy("bump"), None).await.unwrap();
        let mut updated = created.clone();
        updated.severity = 95;
        let saved = store
            .update_policy(updated, None, Some("raise severity".to_string()))
            .await
            .unwrap();
        assert_eq!(saved.version, 2);
        assert_eq!(store.list_versions("bump").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn restore_version_creates_new_version_from_old_content() {
        let store = memory_store().await;
        let created = store.create_policy(sample_policy("restore-me"), None).await.unwrap();
        let mut updated = created.clone();
        updated.severity = 10;
        store.update_policy(updated, None, None).await.unwrap();

        let restored = store.restore_version("restore-me", 1, None).await.unwrap();
        assert_eq!(restored.version, 3);
        assert_eq!(restored.severity, 80);
    }

    #[tokio::test]
    async fn history_is_scoped_and_ordered_oldest_first() {
        let store = memory_store().await;
        for i in 0..3u8 {
            let entry = AuditEntry {
                id: Uuid::new_v4(),
                tool: "shell".to_string(),
                args: Default::default(),
                context: Default::default(),
                agent_id: Some("agent-1".to_string()),
                session_id: Some("sess-1".to_string()),
                user_id: None,
                channel: None,
                conversation_id: None,
                turn_id: None,
                risk_score: i * 10,
                decision: Decision::Allow,
                explanation: format!("step {i}"),
                policy_ids: vec![],
                chain_pattern: None,
                latency_ms: 1.0,
                fee_amount: None,
                created_at: Utc::now() + chrono::Duration::milliseconds(i as i64),
            };
            store.insert_audit_entry(entry).await.unwrap();
        }

        let history = store
            .history("agent-1", Some("sess-1"), Utc::now() - chrono::Duration::hours(1), 50)
            .await
            .unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].risk_score, 0);
        assert_eq!(history[2].risk_score, 20);
    }

    #[tokio::test]
    async fn apply_fee_is_atomic_and_updates_totals() {
        let store = memory_store().await;
        store
            .upsert_wallet(Wallet::auto_provision("agent-1"))
            .await
            .unwrap();
        let updated = store
            .apply_fee("agent-1", Decimal::new(250, 4))
            .await
            .unwrap();
        assert_eq!(updated.balance, Decimal::new(999_750, 4));
        assert_eq!(updated.total_fees_paid, Decimal::new(250, 4));
    }

    #[tokio::test]
    async fn span_ingest_is_idempotent() {
        let store = memory_store().await;
        let span = TraceSpan {
            span_id: "span-1".to_string(),
            trace_id: "trace-1".to_string(),
            parent_span_id: None,
            kind: sentrion_types::SpanKind::Governance,
            name: "evaluate".to_string(),
            status: sentrion_types::SpanStatus::Ok,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            attributes: Default::default(),
            input: None,
            output: None,
            events: vec![],
        };
        let first = store.ingest_spans(vec![span.clone()]).await.unwrap();
        assert_eq!(first.inserted, 1);
        let second = store.ingest_spans(vec![span]).await.unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(store.get_spans_by_trace("trace-1").await.unwrap().len(), 1);
    }
}
