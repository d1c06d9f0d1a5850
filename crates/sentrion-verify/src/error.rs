use sentrion_types::GovernanceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("no audit entry found for action {0}")]
    UnknownAction(String),

    #[error(transparent)]
    Store(#[from] sentrion_store::StoreError),

    #[error(transparent)]
    Gate(#[from] sentrion_gate::GateError),
}

impl From<VerifyError> for GovernanceError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::UnknownAction(id) => GovernanceError::NotFound(id),
            VerifyError::Store(e) => e.into(),
            VerifyError::Gate(e) => e.into(),
        }
    }
}

pub type VerifyResult<T> = Result<T, VerifyError>;
