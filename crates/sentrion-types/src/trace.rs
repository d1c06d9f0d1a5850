use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Agent,
    Llm,
    Tool,
    Governance,
    Retrieval,
    Chain,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// A trace span. Spans form a forest via `parent_span_id` and are stored
/// as flat rows keyed by `span_id` — never materialised as a pointer graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSpan {
    pub span_id: String,
    pub trace_id: String,
    pub parent_span_id: Option<String>,
    pub kind: SpanKind,
    pub name: String,
    pub status: SpanStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    #[serde(default)]
    pub events: Vec<Value>,
}

impl TraceSpan {
    /// Derive `duration_ms` from start/end when absent.
    pub fn derived_duration_ms(&self) -> Option<f64> {
        if self.duration_ms.is_some() {
            return self.duration_ms;
        }
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64)
    }
}

/// Result of a bulk idempotent span ingest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct IngestResult {
    pub inserted: u64,
    pub skipped: u64,
}
