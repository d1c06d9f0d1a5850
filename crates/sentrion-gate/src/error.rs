use sentrion_types::GovernanceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("policy regex failed to compile: {0}")]
    InvalidRegex(String),

    #[error(transparent)]
    Store(#[from] sentrion_store::StoreError),
}

impl From<GateError> for GovernanceError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::InvalidRegex(msg) => GovernanceError::Validation(msg),
            GateError::Store(e) => e.into(),
        }
    }
}

pub type GateResult<T> = Result<T, GateError>;
