use sentrion_types::GovernanceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error(transparent)]
    Store(#[from] sentrion_store::StoreError),
}

impl From<TraceError> for GovernanceError {
    fn from(err: TraceError) -> Self {
        match err {
            TraceError::Store(e) => e.into(),
        }
    }
}

pub type TraceResult<T> = Result<T, TraceError>;
