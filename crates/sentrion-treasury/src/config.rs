/// Tunables for the fee ledger (C8).
#[derive(Debug, Clone, Copy)]
pub struct TreasuryConfig {
    /// When `false`, `gate` admits unconditionally and `charge_and_receipt`
    /// issues receipts with no fee deducted, regardless of `agent_id`.
    pub fee_gating_enabled: bool,
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        Self {
            fee_gating_enabled: true,
        }
    }
}
