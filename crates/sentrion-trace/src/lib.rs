//! Synthesises and idempotently persists a "governance" trace span for
//! every decision whose originating request carried a `trace_id` (C11).

mod error;
mod linker;

pub use error::{TraceError, TraceResult};
pub use linker::{link_decision, Operation};
