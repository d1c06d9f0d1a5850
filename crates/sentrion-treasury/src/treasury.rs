use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sentrion_store::Store;
use sentrion_types::{Decision, Receipt, Wallet};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::TreasuryConfig;
use crate::error::{TreasuryError, TreasuryResult};
use crate::fees::compute_fee;

/// Governance fee gating and receipt issuance (C8).
///
/// `gate` is consulted before an evaluation runs; `charge_and_receipt` is
/// called after, deducting the tiered fee and producing a signed receipt.
/// Anonymous calls (no `agent_id`) are never fee-gated, and neither is
/// any call once `fee_gating_enabled` is turned off.
pub struct Treasury {
    store: Arc<dyn Store>,
    config: TreasuryConfig,
}

impl Treasury {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_config(store, TreasuryConfig::default())
    }

    pub fn with_config(store: Arc<dyn Store>, config: TreasuryConfig) -> Self {
        Self { store, config }
    }

    /// Auto-provisions a wallet with the default starting balance on
    /// first sight of an agent, then rejects the request if the balance
    /// has been drawn down to zero or below.
    pub async fn gate(&self, agent_id: Option<&str>) -> TreasuryResult<()> {
        if !self.config.fee_gating_enabled {
            return Ok(());
        }
        let Some(agent_id) = agent_id else {
            return Ok(());
        };
        let wallet = match self.store.get_wallet(agent_id).await? {
            Some(wallet) => wallet,
            None => self.store.upsert_wallet(Wallet::auto_provision(agent_id)).await?,
        };
        if wallet.balance <= Decimal::ZERO {
            return Err(TreasuryError::PaymentRequired {
                wallet_id: agent_id.to_string(),
                balance: wallet.balance.to_string(),
            });
        }
        Ok(())
    }

    /// Deducts the tiered fee (if `agent_id` is present and fee-gating is
    /// enabled) and issues a SHA-256-signed receipt for the evaluation.
    pub async fn charge_and_receipt(
        &self,
        tool: &str,
        decision: Decision,
        risk_score: u8,
        policy_ids: Vec<String>,
        chain_pattern: Option<String>,
        agent_id: Option<&str>,
    ) -> TreasuryResult<Receipt> {
        let fee_amount = if self.config.fee_gating_enabled {
            if let Some(agent_id) = agent_id {
                let fee = compute_fee(risk_score);
                self.store.apply_fee(agent_id, fee).await?;
                Some(format!("{fee:.4}"))
            } else {
                None
            }
        } else {
            None
        };

        let receipt_id = format!("ocg-{}", &Uuid::new_v4().simple().to_string()[..16]);
        let mut receipt = Receipt {
            receipt_id,
            timestamp: Utc::now(),
            tool: tool.to_string(),
            decision: decision.as_str().to_string(),
            risk_score,
            policy_ids,
            chain_pattern,
            agent_id: agent_id.map(str::to_string),
            digest: String::new(),
            fee_amount,
        };
        receipt.digest = sha256_hex(&receipt.canonical_payload());

        self.store.insert_receipt(receipt.clone()).await?;
        Ok(receipt)
    }
}

fn sha256_hex(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrion_store::SqliteStore;

    async fn treasury() -> Treasury {
        let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        Treasury::new(store)
    }

    async fn treasury_with(config: TreasuryConfig) -> Treasury {
        let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        Treasury::with_config(store, config)
    }

    #[tokio::test]
    async fn anonymous_calls_are_never_gated() {
        let t = treasury().await;
        assert!(t.gate(None).await.is_ok());
    }

    #[tokio::test]
    async fn first_sight_of_an_agent_auto_provisions_a_wallet() {
        let t = treasury().await;
        assert!(t.gate(Some("agent-1")).await.is_ok());
        let wallet = t.store.get_wallet("agent-1").await.unwrap().unwrap();
        assert_eq!(wallet.balance, Decimal::new(1_000_000, 4));
    }

    #[tokio::test]
    async fn depleted_wallet_is_rejected() {
        let t = treasury().await;
        t.gate(Some("agent-1")).await.unwrap();
        t.store.apply_fee("agent-1", Decimal::new(1_000_000, 4)).await.unwrap();
        let err = t.gate(Some("agent-1")).await;
        assert!(matches!(err, Err(TreasuryError::PaymentRequired { .. })));
    }

    #[tokio::test]
    async fn receipt_digest_is_reproducible_from_canonical_payload() {
        let t = treasury().await;
        t.gate(Some("agent-1")).await.unwrap();
        let receipt = t
            .charge_and_receipt("shell", Decision::Block, 95, vec!["p1".to_string()], None, Some("agent-1"))
            .await
            .unwrap();
        assert_eq!(receipt.digest, sha256_hex(&receipt.canonical_payload()));
        assert!(receipt.receipt_id.starts_with("ocg-"));
        assert_eq!(receipt.receipt_id.len(), 20);
    }

    #[tokio::test]
    async fn disabled_fee_gating_admits_depleted_agents_and_charges_no_fee() {
        let t = treasury_with(TreasuryConfig { fee_gating_enabled: false }).await;
        t.store.upsert_wallet(Wallet::auto_provision("agent-1")).await.unwrap();
        t.store.apply_fee("agent-1", Decimal::new(1_000_000, 4)).await.unwrap();

        assert!(t.gate(Some("agent-1")).await.is_ok());

        let receipt = t
            .charge_and_receipt("shell", Decision::Block, 95, vec!["p1".to_string()], None, Some("agent-1"))
            .await
            .unwrap();
        assert!(receipt.fee_amount.is_none());
        let wallet = t.store.get_wallet("agent-1").await.unwrap().unwrap();
        assert_eq!(wallet.balance, Decimal::ZERO);
    }
}
