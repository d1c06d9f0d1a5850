use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use sentrion_gate::PolicyRegistry;
use sentrion_store::Store;
use sentrion_types::{
    ActionRequest, CheckOutcome, Finding, VerificationRecord, VerificationRequest, Verdict,
};
use uuid::Uuid;

use crate::checks;
use crate::drift;
use crate::error::{VerifyError, VerifyResult};

/// Runs the post-execution verification battery (C7) and the
/// cross-session drift detector against a submitted tool result, then
/// persists the verdict.
pub struct VerificationEngine {
    store: Arc<dyn Store>,
    registry: Arc<PolicyRegistry>,
}

impl VerificationEngine {
    pub fn new(store: Arc<dyn Store>, registry: Arc<PolicyRegistry>) -> Self {
        Self { store, registry }
    }

    pub async fn verify(&self, request: VerificationRequest) -> VerifyResult<VerificationRecord> {
        let original = self
            .store
            .get_audit_entry(request.action_id)
            .await?
            .ok_or_else(|| VerifyError::UnknownAction(request.action_id.to_string()))?;

        let result_text = checks::flatten_result(&request.result);

        let mut findings = vec![
            checks::check_credential_leak(&result_text),
            checks::check_destructive_output(&result_text),
            checks::check_scope_compliance(&request.tool, &request.result, &request.allowed_tools, &request.original_args),
            checks::check_diff_size(&request.result),
            checks::check_result_intent_alignment(original.decision, original.risk_score, &request.tool, &request.result),
            checks::check_output_injection(&result_text),
            self.independent_reverify(&request.tool, &request.result, original.risk_score).await?,
        ];

        let (drift_score, drift_signals) = if let Some(agent_id) = &request.agent_id {
            drift::compute_drift_score(self.store.as_ref(), agent_id, request.session_id.as_deref(), &request.tool).await?
        } else {
            (0.0, Vec::new())
        };

        if request.agent_id.is_some() {
            if drift_score >= 0.70 {
                let triggered: Vec<&str> = drift_signals
                    .iter()
                    .filter(|s| s.triggered)
                    .map(|s| s.name.as_str())
                    .collect();
                findings.push(Finding {
                    check: "drift-detection".to_string(),
                    result: if drift_score >= 0.85 { CheckOutcome::Fail } else { CheckOutcome::Warn },
                    detail: format!(
                        "Cross-session drift score: {drift_score:.2}. Signals: {}.",
                        triggered.join(", ")
                    ),
                    risk_contribution: (drift_score * 50.0) as u8,
                    duration_ms: 0.0,
                });
            } else {
                findings.push(Finding {
                    check: "drift-detection".to_string(),
                    result: CheckOutcome::Pass,
                    detail: format!("Drift score: {drift_score:.2} — within normal range."),
                    risk_contribution: 0,
                    duration_ms: 0.0,
                });
            }
        }

        let has_fail = findings.iter().any(|f| f.result == CheckOutcome::Fail);
        let has_warn = findings.iter().any(|f| f.result == CheckOutcome::Warn);
        let risk_delta: u32 = findings
            .iter()
            .filter(|f| f.result != CheckOutcome::Pass)
            .map(|f| f.risk_contribution as u32)
            .sum();
        let verdict = if has_fail {
            Verdict::Violation
        } else if has_warn {
            Verdict::Suspicious
        } else {
            Verdict::Compliant
        };

        let record = VerificationRecord {
            id: Uuid::new_v4(),
            action_id: request.action_id,
            tool: request.tool,
            agent_id: request.agent_id,
            session_id: request.session_id,
            verdict,
            risk_delta: risk_delta.min(100) as u8,
            findings,
            drift_score: if original.agent_id.is_some() || drift_score > 0.0 { Some(drift_score) } else { None },
            drift_signals,
            escalated: false,
            escalation_id: None,
            created_at: Utc::now(),
        };

        self.store.insert_verification_record(record.clone()).await?;
        Ok(record)
    }

    /// Re-evaluates the policy engine against the tool's *outcome* rather
    /// than its original intent, catching output content the intent-side
    /// evaluation couldn't have predicted.
    async fn independent_reverify(
        &self,
        tool: &str,
        result: &std::collections::HashMap<String, serde_json::Value>,
        original_risk: u8,
    ) -> VerifyResult<Finding> {
        let start = Instant::now();
        let synthetic = ActionRequest {
            tool: tool.to_string(),
            args: result.clone(),
            context: None,
            prompt: None,
        };
        let policies = self.registry.load_active().await?;
        let mut matched = Vec::new();
        let mut max_severity: u8 = 0;
        for policy in &policies {
            if self.registry.matches(policy, &synthetic) {
                matched.push(policy.policy_id.clone());
                max_severity = max_severity.max(policy.severity);
            }
        }
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        if matched.is_empty() {
            return Ok(Finding {
                check: "independent-reverify".to_string(),
                result: CheckOutcome::Pass,
                detail: format!("Re-verified against {} policies — no matches in output.", policies.len()),
                risk_contribution: 0,
                duration_ms,
            });
        }

        let severity_delta = max_severity as i32 - original_risk as i32;
        if max_severity >= 80 {
            return Ok(Finding {
                check: "independent-reverify".to_string(),
                result: CheckOutcome::Fail,
                detail: format!(
                    "Independent re-verification matched {} policies against the tool result: {}. Max severity: {max_severity} (original risk: {original_risk}, delta: {severity_delta:+}).",
                    matched.len(),
                    matched.join(", ")
                ),
                risk_contribution: max_severity,
                duration_ms,
            });
        }
        Ok(Finding {
            check: "independent-reverify".to_string(),
            result: CheckOutcome::Warn,
            detail: format!(
                "Re-verification matched {} policies: {}. Severity {max_severity} (below block threshold).",
                matched.len(),
                matched.join(", ")
            ),
            risk_contribution: severity_delta.max(0) as u8,
            duration_ms,
        })
    }
}
