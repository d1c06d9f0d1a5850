use std::collections::HashMap;

use chrono::{Duration, Timelike, Utc};
use sentrion_store::Store;
use sentrion_types::DriftSignalResult;

const BASELINE_WINDOW_DAYS: i64 = 7;
const MIN_BASELINE_ACTIONS: usize = 10;
const CURRENT_WINDOW_MINUTES: i64 = 120;

/// Compares an agent's current behaviour against its 7-day historical
/// baseline, excluding the current 120-minute window. Needs at least
/// [`MIN_BASELINE_ACTIONS`] baseline actions to produce a score; returns
/// `0.0` with an explanatory signal otherwise.
pub async fn compute_drift_score(
    store: &dyn Store,
    agent_id: &str,
    session_id: Option<&str>,
    current_tool: &str,
) -> sentrion_store::StoreResult<(f64, Vec<DriftSignalResult>)> {
    let now = Utc::now();
    let baseline_cutoff = now - Duration::days(BASELINE_WINDOW_DAYS);
    let current_cutoff = now - Duration::minutes(CURRENT_WINDOW_MINUTES);

    let baseline_rows = store.audit_entries_in_range(agent_id, baseline_cutoff, current_cutoff).await?;
    let all_current = store.audit_entries_in_range(agent_id, current_cutoff, now).await?;
    let current_rows: Vec<_> = match session_id {
        Some(sid) => all_current
            .into_iter()
            .filter(|e| e.session_id.as_deref() == Some(sid))
            .collect(),
        None => all_current,
    };

    if baseline_rows.len() < MIN_BASELINE_ACTIONS {
        return Ok((
            0.0,
            vec![DriftSignalResult {
                name: "insufficient-baseline".to_string(),
                description: "Not enough historical data to detect drift".to_string(),
                weight: 0.0,
                triggered: false,
                value: 0.0,
                detail: format!(
                    "Baseline: {} actions (need {}+).",
                    baseline_rows.len(),
                    MIN_BASELINE_ACTIONS
                ),
            }],
        ));
    }

    let mut baseline_tools: HashMap<&str, u32> = HashMap::new();
    let mut baseline_hours: HashMap<u32, u32> = HashMap::new();
    let mut baseline_risk_sum: u64 = 0;
    let mut baseline_block_count: u32 = 0;
    for entry in &baseline_rows {
        *baseline_tools.entry(entry.tool.as_str()).or_default() += 1;
        *baseline_hours.entry(entry.created_at.hour()).or_default() += 1;
        baseline_risk_sum += entry.risk_score as u64;
        if entry.decision == sentrion_types::Decision::Block {
            baseline_block_count += 1;
        }
    }
    let baseline_count = baseline_rows.len() as f64;
    let baseline_avg_risk = baseline_risk_sum as f64 / baseline_count;
    let baseline_block_rate = baseline_block_count as f64 / baseline_count;
    let baseline_hours_span = (BASELINE_WINDOW_DAYS * 24).max(1) as f64;
    let baseline_rate = baseline_count / baseline_hours_span;

    let mut current_tools: HashMap<&str, u32> = HashMap::new();
    let mut current_risk_sum: u64 = 0;
    let mut current_block_count: u32 = 0;
    for entry in &current_rows {
        *current_tools.entry(entry.tool.as_str()).or_default() += 1;
        current_risk_sum += entry.risk_score as u64;
        if entry.decision == sentrion_types::Decision::Block {
            current_block_count += 1;
        }
    }
    let current_count = current_rows.len() as f64;
    let current_avg_risk = current_risk_sum as f64 / current_count.max(1.0);
    let current_block_rate = current_block_count as f64 / current_count.max(1.0);
    let current_rate = current_count / (CURRENT_WINDOW_MINUTES as f64 / 60.0);
    let current_hour = now.hour();

    let mut signals = Vec::with_capacity(5);

    let (td_score, td_detail) = tool_distribution_shift(&baseline_tools, &current_tools);
    signals.push(DriftSignalResult {
        name: "tool-distribution".to_string(),
        description: "Shift in tool usage patterns".to_string(),
        weight: 0.30,
        triggered: td_score >= 0.4,
        value: td_score,
        detail: td_detail,
    });

    let (rp_score, rp_detail) =
        risk_profile_shift(baseline_avg_risk, current_avg_risk, baseline_block_rate, current_block_rate);
    signals.push(DriftSignalResult {
        name: "risk-profile".to_string(),
        description: "Change in risk score or block rate".to_string(),
        weight: 0.25,
        triggered: rp_score >= 0.4,
        value: rp_score,
        detail: rp_detail,
    });

    let (oh_score, oh_detail) = operating_hour_anomaly(&baseline_hours, current_hour);
    signals.push(DriftSignalResult {
        name: "operating-hours".to_string(),
        description: "Activity outside normal operating hours".to_string(),
        weight: 0.15,
        triggered: oh_score >= 0.4,
        value: oh_score,
        detail: oh_detail,
    });

    let (av_score, av_detail) = action_velocity_anomaly(baseline_rate, current_rate);
    signals.push(DriftSignalResult {
        name: "action-velocity".to_string(),
        description: "Abnormal rate of tool invocations".to_string(),
        weight: 0.15,
        triggered: av_score >= 0.4,
        value: av_score,
        detail: av_detail,
    });

    let (se_score, se_detail) = scope_expansion(&baseline_tools, current_tool);
    signals.push(DriftSignalResult {
        name: "scope-expansion".to_string(),
        description: "Agent using tools outside its historical repertoire".to_string(),
        weight: 0.15,
        triggered: se_score >= 0.4,
        value: se_score,
        detail: se_detail,
    });

    let score: f64 = signals.iter().map(|s| s.value * s.weight).sum::<f64>().min(1.0);
    Ok((score, signals))
}

fn tool_distribution_shift(baseline: &HashMap<&str, u32>, current: &HashMap<&str, u32>) -> (f64, String) {
    if baseline.is_empty() || current.is_empty() {
        return (0.0, "Insufficient data for tool distribution comparison.".to_string());
    }
    let baseline_total: u32 = baseline.values().sum::<u32>().max(1);
    let current_total: u32 = current.values().sum::<u32>().max(1);
    let mut all_tools: std::collections::HashSet<&str> = baseline.keys().copied().collect();
    all_tools.extend(current.keys().copied());

    let mut divergence = 0.0;
    let mut new_tools = Vec::new();
    for tool in &all_tools {
        let baseline_freq = *baseline.get(tool).unwrap_or(&0) as f64 / baseline_total as f64;
        let current_freq = *current.get(tool).unwrap_or(&0) as f64 / current_total as f64;
        if !baseline.contains_key(tool) && *current.get(tool).unwrap_or(&0) > 0 {
            new_tools.push(*tool);
        }
        divergence += (baseline_freq - current_freq).abs();
    }
    let mut score: f64 = (divergence / 2.0).min(1.0);
    if !new_tools.is_empty() {
        score = (score + 0.2 * new_tools.len() as f64).min(1.0);
    }
    let mut detail = format!("Distribution shift: {score:.2}.");
    if !new_tools.is_empty() {
        detail.push_str(&format!(" New tools not in baseline: {}.", new_tools.join(", ")));
    }
    (score, detail)
}

fn risk_profile_shift(
    baseline_avg_risk: f64,
    current_avg_risk: f64,
    baseline_block_rate: f64,
    current_block_rate: f64,
) -> (f64, String) {
    let risk_delta = (current_avg_risk - baseline_avg_risk).abs();
    let block_delta = (current_block_rate - baseline_block_rate).abs();
    let risk_score = (risk_delta / 30.0).min(1.0);
    let block_score = (block_delta / 0.20).min(1.0);
    let score = risk_score.max(block_score);
    let detail = format!(
        "Risk shift: {baseline_avg_risk:.0} -> {current_avg_risk:.0} (delta {:+.0}). Block rate: {:.1}% -> {:.1}%.",
        current_avg_risk - baseline_avg_risk,
        baseline_block_rate * 100.0,
        current_block_rate * 100.0
    );
    (score, detail)
}

fn operating_hour_anomaly(baseline_hours: &HashMap<u32, u32>, current_hour: u32) -> (f64, String) {
    if baseline_hours.is_empty() {
        return (0.0, "No baseline hour data.".to_string());
    }
    let total: u32 = baseline_hours.values().sum::<u32>().max(1);
    let hour_freq = *baseline_hours.get(&current_hour).unwrap_or(&0) as f64 / total as f64;
    if hour_freq < 0.02 {
        return (
            0.8,
            format!("Agent rarely operates at hour {current_hour:02} UTC ({:.1}% of baseline).", hour_freq * 100.0),
        );
    }
    if hour_freq < 0.05 {
        return (
            0.4,
            format!("Uncommon operating hour {current_hour:02} UTC ({:.1}% of baseline).", hour_freq * 100.0),
        );
    }
    (0.0, format!("Normal operating hour {current_hour:02} UTC ({:.1}% of baseline).", hour_freq * 100.0))
}

fn action_velocity_anomaly(baseline_rate_per_hour: f64, current_rate_per_hour: f64) -> (f64, String) {
    if baseline_rate_per_hour < 0.1 {
        return (0.0, "Insufficient baseline rate data.".to_string());
    }
    let ratio = current_rate_per_hour / baseline_rate_per_hour;
    if ratio > 5.0 {
        return (
            0.9,
            format!("Action rate {ratio:.1}x baseline ({current_rate_per_hour:.1}/hr vs {baseline_rate_per_hour:.1}/hr)."),
        );
    }
    if ratio > 3.0 {
        return (
            0.6,
            format!("Elevated rate {ratio:.1}x baseline ({current_rate_per_hour:.1}/hr vs {baseline_rate_per_hour:.1}/hr)."),
        );
    }
    if ratio > 2.0 {
        return (0.3, format!("Slightly elevated rate {ratio:.1}x baseline."));
    }
    (0.0, format!("Normal rate ({current_rate_per_hour:.1}/hr, baseline {baseline_rate_per_hour:.1}/hr)."))
}

fn scope_expansion(baseline_tools: &HashMap<&str, u32>, current_tool: &str) -> (f64, String) {
    if baseline_tools.is_empty() {
        return (0.0, "No baseline to compare.".to_string());
    }
    if !baseline_tools.contains_key(current_tool) {
        return (
            0.7,
            format!("Tool '{current_tool}' never used in baseline ({BASELINE_WINDOW_DAYS}d history)."),
        );
    }
    (0.0, format!("Tool '{current_tool}' is part of normal repertoire."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc as ChronoUtc;
    use sentrion_store::SqliteStore;
    use sentrion_types::{AuditEntry, Decision};
    use std::collections::HashMap as Map;
    use uuid::Uuid;

    fn entry(tool: &str, risk: u8, decision: Decision, minutes_ago: i64) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            tool: tool.to_string(),
            args: Map::new(),
            context: Map::new(),
            agent_id: Some("agent-1".to_string()),
            session_id: None,
            user_id: None,
            channel: None,
            conversation_id: None,
            turn_id: None,
            risk_score: risk,
            decision,
            explanation: "test".to_string(),
            policy_ids: vec![],
            chain_pattern: None,
            latency_ms: 1.0,
            fee_amount: None,
            created_at: ChronoUtc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn insufficient_baseline_yields_zero_score() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        for _ in 0..3 {
            store.insert_audit_entry(entry("fetch_price", 10, Decision::Allow, 60 * 24 * 3)).await.unwrap();
        }
        let (score, signals) = compute_drift_score(&store, "agent-1", None, "fetch_price").await.unwrap();
        assert_eq!(score, 0.0);
        assert_eq!(signals[0].name, "insufficient-baseline");
    }

    #[tokio::test]
    async fn brand_new_tool_triggers_scope_expansion() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        for _ in 0..12 {
            store.insert_audit_entry(entry("fetch_price", 10, Decision::Allow, 60 * 24 * 3)).await.unwrap();
        }
        store.insert_audit_entry(entry("shell", 10, Decision::Allow, 1)).await.unwrap();
        let (score, signals) = compute_drift_score(&store, "agent-1", None, "shell").await.unwrap();
        assert!(score > 0.0);
        let scope_signal = signals.iter().find(|s| s.name == "scope-expansion").unwrap();
        assert!(scope_signal.triggered);
    }
}
