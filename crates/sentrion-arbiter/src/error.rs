use sentrion_types::GovernanceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error(transparent)]
    Store(#[from] sentrion_store::StoreError),
}

impl From<ArbiterError> for GovernanceError {
    fn from(err: ArbiterError) -> Self {
        match err {
            ArbiterError::Store(e) => e.into(),
        }
    }
}

pub type ArbiterResult<T> = Result<T, ArbiterError>;
