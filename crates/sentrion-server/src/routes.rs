use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::Json;
use sentrion_arbiter::PostEvaluationInput;
use sentrion_eventbus::StreamItem;
use sentrion_trace::Operation;
use sentrion_types::{
    ActionDecision, ActionRequest, AuditEntry, Decision, Policy, Receipt, Severity,
    VerificationRecord, VerificationRequest,
};
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
pub struct EvaluationResponse {
    pub action_id: Uuid,
    #[serde(flatten)]
    pub decision: ActionDecision,
    pub receipt: Receipt,
}

/// Full control-flow orchestration for one evaluation: fee gate (C8) →
/// evaluation pipeline (C6) → persist (C1) → publish (C10) → receipt (C8)
/// → trace span (C11) → escalation (C9) → response.
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    let agent_id = request.agent_id().map(str::to_string);
    state.treasury.gate(agent_id.as_deref()).await?;

    let decision = state.pipeline.evaluate(&request).await?;
    let action_id = Uuid::new_v4();

    let context = request.context.clone();
    let audit_entry = AuditEntry {
        id: action_id,
        tool: request.tool.clone(),
        args: request.args.clone(),
        context: context
            .as_ref()
            .and_then(|c| serde_json::to_value(c).ok())
            .and_then(|v| v.as_object().cloned())
            .map(|obj| obj.into_iter().collect())
            .unwrap_or_default(),
        agent_id: agent_id.clone(),
        session_id: request.session_id().map(str::to_string),
        user_id: context.as_ref().and_then(|c| c.user_id.clone()),
        channel: context.as_ref().and_then(|c| c.channel.clone()),
        conversation_id: context.as_ref().and_then(|c| c.conversation_id.clone()),
        turn_id: context.as_ref().and_then(|c| c.turn_id.clone()),
        risk_score: decision.risk_score,
        decision: decision.decision,
        explanation: decision.explanation.clone(),
        policy_ids: decision.policy_ids.clone(),
        chain_pattern: decision.chain_pattern.clone(),
        latency_ms: decision.execution_trace.iter().map(|s| s.duration_ms).sum(),
        fee_amount: None,
        created_at: chrono::Utc::now(),
    };
    state.store.insert_audit_entry(audit_entry).await?;

    state.event_bus.publish(sentrion_eventbus::ActionEvent {
        event_type: "action_evaluated".to_string(),
        tool: request.tool.clone(),
        decision: decision.decision.as_str().to_string(),
        risk_score: decision.risk_score,
        explanation: decision.explanation.clone(),
        policy_ids: decision.policy_ids.clone(),
        agent_id: agent_id.clone(),
        session_id: request.session_id().map(str::to_string),
        user_id: context.as_ref().and_then(|c| c.user_id.clone()),
        channel: context.as_ref().and_then(|c| c.channel.clone()),
        chain_pattern: decision.chain_pattern.clone(),
        timestamp: chrono::Utc::now(),
    });

    let receipt = state
        .treasury
        .charge_and_receipt(
            &request.tool,
            decision.decision,
            decision.risk_score,
            decision.policy_ids.clone(),
            decision.chain_pattern.clone(),
            agent_id.as_deref(),
        )
        .await?;

    let trace_id = context.as_ref().and_then(|c| c.trace_id.clone());
    let parent_span_id = context.as_ref().and_then(|c| c.span_id.clone());
    if let Err(err) = sentrion_trace::link_decision(
        state.store.as_ref(),
        Operation::Evaluate,
        &request.tool,
        trace_id.as_deref(),
        parent_span_id.as_deref(),
        &decision,
    )
    .await
    {
        tracing::warn!(error = %err, "failed to persist governance trace span");
    }

    let outcome = state
        .escalation
        .handle_post_evaluation(
            &crate::dispatch::sink(),
            &state.notifications.channels,
            PostEvaluationInput {
                action_id: Some(action_id),
                tool: &request.tool,
                agent_id: agent_id.as_deref(),
                session_id: request.session_id(),
                decision: decision.decision,
                risk_score: decision.risk_score,
                explanation: &decision.explanation,
                policy_ids: decision.policy_ids.clone(),
                chain_pattern: decision.chain_pattern.clone(),
            },
        )
        .await?;

    let mut decision = decision;
    decision.escalation_id = outcome.escalation_id;
    decision.auto_ks_triggered = outcome.auto_kill_switch_engaged;
    if outcome.escalation_id.is_some() {
        let sev = sentrion_arbiter::compute_severity(decision.risk_score, decision.decision, decision.chain_pattern.as_deref());
        decision.escalation_severity = Some(severity_label(sev).to_string());
    }

    Ok(Json(EvaluationResponse {
        action_id,
        decision,
        receipt,
    }))
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
        Severity::Critical => "critical",
    }
}

#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    #[serde(flatten)]
    pub record: VerificationRecord,
}

/// Verification flow: look up the original decision (C1) → run the eight
/// checks including cross-session drift (C7) → persist (C1) → publish
/// (C10) → trace span (C11) → optional escalation (C9) → response.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerificationRequest>,
) -> Result<Json<VerificationResponse>, ApiError> {
    let tool = request.tool.clone();
    let agent_id = request.agent_id.clone();
    let session_id = request.session_id.clone();
    let action_id = request.action_id;
    let (mut trace_id, mut span_id) = request
        .context
        .as_ref()
        .map(|c| (c.trace_id.clone(), c.span_id.clone()))
        .unwrap_or((None, None));

    let record = state.verification.verify(request).await?;

    if trace_id.is_none() {
        if let Some(original) = state.store.get_audit_entry(action_id).await? {
            trace_id = original.context.get("trace_id").and_then(|v| v.as_str()).map(str::to_string);
            span_id = original.context.get("span_id").and_then(|v| v.as_str()).map(str::to_string);
        }
    }

    state.event_bus.publish(sentrion_eventbus::ActionEvent {
        event_type: "action_verified".to_string(),
        tool: tool.clone(),
        decision: match record.verdict {
            sentrion_types::Verdict::Compliant => "allow".to_string(),
            sentrion_types::Verdict::Suspicious => "review".to_string(),
            sentrion_types::Verdict::Violation => "block".to_string(),
        },
        risk_score: record.risk_delta,
        explanation: format!("verification verdict: {:?}", record.verdict),
        policy_ids: vec![],
        agent_id: agent_id.clone(),
        session_id: session_id.clone(),
        user_id: None,
        channel: None,
        chain_pattern: None,
        timestamp: chrono::Utc::now(),
    });

    let decision_for_trace = ActionDecision {
        decision: match record.verdict {
            sentrion_types::Verdict::Violation => Decision::Block,
            sentrion_types::Verdict::Suspicious => Decision::Review,
            sentrion_types::Verdict::Compliant => Decision::Allow,
        },
        risk_score: record.risk_delta,
        explanation: format!("verification verdict: {:?}", record.verdict),
        policy_ids: vec![],
        execution_trace: vec![],
        chain_pattern: None,
        chain_description: None,
        session_depth: None,
        escalation_id: None,
        auto_ks_triggered: false,
        escalation_severity: None,
    };
    if let Err(err) = sentrion_trace::link_decision(
        state.store.as_ref(),
        Operation::Verify,
        &tool,
        trace_id.as_deref(),
        span_id.as_deref(),
        &decision_for_trace,
    )
    .await
    {
        tracing::warn!(error = %err, "failed to persist governance trace span");
    }

    if record.verdict != sentrion_types::Verdict::Compliant {
        let _ = state
            .escalation
            .handle_post_evaluation(
                &crate::dispatch::sink(),
                &state.notifications.channels,
                PostEvaluationInput {
                    action_id: Some(record.action_id),
                    tool: &tool,
                    agent_id: agent_id.as_deref(),
                    session_id: session_id.as_deref(),
                    decision: decision_for_trace.decision,
                    risk_score: record.risk_delta,
                    explanation: "post-verification escalation",
                    policy_ids: vec![],
                    chain_pattern: None,
                },
            )
            .await;
    }

    Ok(Json(VerificationResponse { record }))
}

pub async fn list_policies(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Policy>>, ApiError> {
    let policies = state.pipeline.registry().load_active().await?;
    Ok(Json(policies))
}

pub async fn create_policy(
    State(state): State<Arc<AppState>>,
    Json(policy): Json<Policy>,
) -> Result<Json<Policy>, ApiError> {
    let created = state.pipeline.registry().create_policy(policy, None).await?;
    Ok(Json(created))
}

pub async fn archive_policy(
    State(state): State<Arc<AppState>>,
    Path(policy_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.pipeline.registry().archive_policy(&policy_id, None).await?;
    Ok(Json(serde_json::json!({ "status": "archived", "policy_id": policy_id })))
}

/// Real-time stream: one SSE event per published governance event, plus a
/// `connected` event on open and a 15s heart-beat comment while idle. A
/// background task owns the subscription and forwards onto a channel the
/// handler wraps as the SSE body; dropping the receiver (client
/// disconnect) ends the forwarding task on its next send.
pub async fn stream(
    State(state): State<Arc<AppState>>,
) -> Sse<ReceiverStream<Result<Event, Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Event, Infallible>>(32);
    let bus = state.event_bus.clone();

    tokio::spawn(async move {
        if tx.send(Ok(Event::default().event("connected").data("{}"))).await.is_err() {
            return;
        }
        let mut subscription = bus.subscribe();
        loop {
            match subscription.next().await {
                Some(StreamItem::Event(event)) => {
                    let payload = serde_json::to_string(&event).unwrap_or_default();
                    let sse_event = Event::default().event(event.event_type.clone()).data(payload);
                    if tx.send(Ok(sse_event)).await.is_err() {
                        break;
                    }
                }
                Some(StreamItem::Heartbeat) => {
                    if tx.send(Ok(Event::default().comment("heartbeat"))).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    });

    Sse::new(ReceiverStream::new(rx))
}

pub async fn not_found() -> impl IntoResponse {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}
