use sentrion_types::GovernanceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreasuryError {
    #[error("wallet '{wallet_id}' has insufficient balance: {balance}")]
    PaymentRequired { wallet_id: String, balance: String },

    #[error(transparent)]
    Store(#[from] sentrion_store::StoreError),
}

impl From<TreasuryError> for GovernanceError {
    fn from(err: TreasuryError) -> Self {
        match err {
            TreasuryError::PaymentRequired { wallet_id, balance } => {
                GovernanceError::PaymentRequired { wallet_id, balance }
            }
            TreasuryError::Store(e) => e.into(),
        }
    }
}

pub type TreasuryResult<T> = Result<T, TreasuryError>;
