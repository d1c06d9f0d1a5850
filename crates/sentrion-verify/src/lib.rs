//! Post-execution verification (C7) and cross-session drift detection.

mod checks;
mod drift;
mod engine;
mod error;

pub use checks::{
    check_credential_leak, check_destructive_output, check_diff_size, check_output_injection,
    check_result_intent_alignment, check_scope_compliance, flatten_result,
};
pub use drift::compute_drift_score;
pub use engine::VerificationEngine;
pub use error::{VerifyError, VerifyResult};
