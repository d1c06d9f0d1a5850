use chrono::Utc;
use sentrion_store::Store;
use sentrion_types::{
    ActionDecision, IngestResult, SpanKind, SpanStatus, TraceSpan,
};
use uuid::Uuid;

/// The governance operation a synthesized span records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Evaluate,
    Verify,
}

impl Operation {
    fn span_name(self, tool: &str) -> String {
        match self {
            Operation::Evaluate => format!("governor.evaluate({tool})"),
            Operation::Verify => format!("governor.verify({tool})"),
        }
    }
}

/// Synthesises a `governance`-kind span for a decision and persists it
/// idempotently, parented to the caller's span when the originating
/// request carried one. A no-op (returns `None`) when the request didn't
/// carry a `trace_id` — there's nothing to link the decision to.
pub async fn link_decision(
    store: &dyn Store,
    operation: Operation,
    tool: &str,
    trace_id: Option<&str>,
    parent_span_id: Option<&str>,
    decision: &ActionDecision,
) -> sentrion_store::StoreResult<Option<IngestResult>> {
    let Some(trace_id) = trace_id else {
        return Ok(None);
    };

    let status = if decision.decision == sentrion_types::Decision::Block {
        SpanStatus::Error
    } else {
        SpanStatus::Ok
    };

    let now = Utc::now();
    let mut attributes = std::collections::HashMap::new();
    attributes.insert("decision".to_string(), serde_json::json!(decision.decision.as_str()));
    attributes.insert("risk_score".to_string(), serde_json::json!(decision.risk_score));
    attributes.insert("policy_ids".to_string(), serde_json::json!(decision.policy_ids));
    attributes.insert(
        "chain_pattern".to_string(),
        serde_json::json!(decision.chain_pattern),
    );
    attributes.insert(
        "execution_trace".to_string(),
        serde_json::json!(decision.execution_trace),
    );

    let span = TraceSpan {
        span_id: Uuid::new_v4().to_string(),
        trace_id: trace_id.to_string(),
        parent_span_id: parent_span_id.map(str::to_string),
        kind: SpanKind::Governance,
        name: operation.span_name(tool),
        status,
        start_time: now,
        end_time: Some(now),
        duration_ms: Some(0.0),
        attributes,
        input: None,
        output: Some(serde_json::json!(decision.explanation)),
        events: Vec::new(),
    };

    let result = store.ingest_spans(vec![span]).await?;
    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrion_store::SqliteStore;
    use sentrion_types::Decision;

    fn allow_decision() -> ActionDecision {
        ActionDecision {
            decision: Decision::Allow,
            risk_score: 5,
            explanation: "benign".to_string(),
            policy_ids: vec![],
            execution_trace: vec![],
            chain_pattern: None,
            chain_description: None,
            session_depth: None,
            escalation_id: None,
            auto_ks_triggered: false,
            escalation_severity: None,
        }
    }

    #[tokio::test]
    async fn no_trace_id_is_a_no_op() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let result = link_decision(&store, Operation::Evaluate, "shell", None, None, &allow_decision())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn linking_with_trace_id_inserts_one_span() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let result = link_decision(
            &store,
            Operation::Evaluate,
            "shell",
            Some("trace-1"),
            Some("caller-span"),
            &allow_decision(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(result.inserted, 1);
        assert_eq!(result.skipped, 0);

        let spans = store.get_spans_by_trace("trace-1").await.unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, SpanKind::Governance);
        assert_eq!(spans[0].parent_span_id.as_deref(), Some("caller-span"));
    }

    #[tokio::test]
    async fn blocked_decision_yields_error_status() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let mut blocked = allow_decision();
        blocked.decision = Decision::Block;
        link_decision(&store, Operation::Verify, "shell", Some("trace-2"), None, &blocked)
            .await
            .unwrap();
        let spans = store.get_spans_by_trace("trace-2").await.unwrap();
        assert_eq!(spans[0].status, SpanStatus::Error);
        assert_eq!(spans[0].name, "governor.verify(shell)");
    }
}
