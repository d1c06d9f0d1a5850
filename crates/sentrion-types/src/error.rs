use thiserror::Error;

/// Core error kinds shared across the workspace. Individual crates define
/// their own `thiserror` enums for their internal failure modes and convert
/// into this one at their public boundary (see `sentrion-store::StoreError`,
/// `sentrion-gate::PolicyError`, etc.).
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("payment required: wallet '{wallet_id}' balance {balance}")]
    PaymentRequired { wallet_id: String, balance: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}
