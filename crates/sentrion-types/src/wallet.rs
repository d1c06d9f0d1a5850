use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-agent fee-bearing balance gating admission to the pipeline.
/// Amounts are fixed-scale decimal (4 fractional digits), never binary float.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub wallet_id: String,
    pub label: String,
    pub balance: Decimal,
    pub total_deposited: Decimal,
    pub total_fees_paid: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn auto_provision(wallet_id: impl Into<String>) -> Self {
        let wallet_id = wallet_id.into();
        let now = Utc::now();
        let starting = Decimal::new(1_000_000, 4); // 100.0000
        Self {
            label: format!("wallet-{wallet_id}"),
            wallet_id,
            balance: starting,
            total_deposited: starting,
            total_fees_paid: Decimal::ZERO,
            currency: "USD".to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}
