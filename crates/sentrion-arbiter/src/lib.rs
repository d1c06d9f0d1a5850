//! Post-evaluation escalation: auto-kill-switch thresholds, escalation-event
//! recording, severity scoring, and best-effort notification fan-out (C9).

mod autoks;
mod config;
mod dispatch;
mod engine;
mod error;
mod severity;

pub use autoks::{check_auto_kill_switch, AutoKsTrigger};
pub use config::{resolve_config, set_config};
pub use dispatch::{fan_out, DispatchEvent, DispatchOutcome, NotificationSink, NullSink};
pub use engine::{EscalationEngine, PostEvaluationInput, PostEvaluationOutcome};
pub use error::{ArbiterError, ArbiterResult};
pub use severity::compute_severity;
