use std::collections::{HashMap, HashSet};

use sentrion_types::{Decision, HistoryEntry};

/// Outcome of evaluating the chain-pattern catalogue against a history.
#[derive(Debug, Clone)]
pub struct ChainMatch {
    pub pattern: String,
    pub description: String,
    pub boost: u8,
    pub evidence: String,
}

struct ChainPattern {
    name: &'static str,
    description: &'static str,
    boost: u8,
    min_actions: usize,
    matches: fn(&[HistoryEntry]) -> bool,
}

fn recent_tools(history: &[HistoryEntry], n: usize) -> Vec<&str> {
    let start = history.len().saturating_sub(n);
    history[start..].iter().map(|h| h.tool.as_str()).collect()
}

fn recent_policies(history: &[HistoryEntry], n: usize) -> Vec<&str> {
    let start = history.len().saturating_sub(n);
    history[start..]
        .iter()
        .flat_map(|h| h.policy_ids.iter().map(String::as_str))
        .collect()
}

fn match_browse_then_exfil(history: &[HistoryEntry]) -> bool {
    let tools = recent_tools(history, 6);
    tools.contains(&"http_request") && tools.contains(&"messaging_send")
}

fn match_read_write_exec(history: &[HistoryEntry]) -> bool {
    let tools = recent_tools(history, 6);
    tools.contains(&"file_read") && tools.contains(&"file_write") && tools.contains(&"shell")
}

fn match_repeated_scope_probing(history: &[HistoryEntry]) -> bool {
    history
        .iter()
        .filter(|h| h.policy_ids.iter().any(|p| p == "scope-violation"))
        .count()
        >= 2
}

fn match_credential_then_http(history: &[HistoryEntry]) -> bool {
    let policies = recent_policies(history, 4);
    let tools = recent_tools(history, 4);
    policies.iter().any(|p| p.contains("credential-exfil")) && tools.contains(&"http_request")
}

fn match_rapid_tool_switching(history: &[HistoryEntry]) -> bool {
    const HIGH_RISK: [&str; 4] = ["shell", "file_write", "http_request", "messaging_send"];
    let seen: HashSet<&str> = recent_tools(history, 5).into_iter().collect();
    HIGH_RISK.iter().filter(|t| seen.contains(*t)).count() >= 3
}

fn match_block_bypass_retry(history: &[HistoryEntry]) -> bool {
    let start = history.len().saturating_sub(10);
    let window = &history[start..];
    window.iter().any(|entry| {
        entry.decision == Decision::Block
            && window
                .iter()
                .any(|other| other.tool == entry.tool && other.timestamp > entry.timestamp)
    })
}

fn match_escalating_risk(history: &[HistoryEntry]) -> bool {
    let start = history.len().saturating_sub(6);
    let recent = &history[start..];
    if recent.len() < 5 {
        return false;
    }
    let severity = |d: Decision| match d {
        Decision::Allow => 0u32,
        Decision::Review => 1,
        Decision::Block => 2,
    };
    let scores: Vec<u32> = recent
        .iter()
        .map(|h| severity(h.decision) + h.policy_ids.len() as u32)
        .collect();
    let increasing = scores.windows(2).all(|w| w[1] >= w[0]);
    let has_increase = scores.last().copied().unwrap_or(0) > scores[0];
    increasing && has_increase
}

fn match_argument_mutation(history: &[HistoryEntry]) -> bool {
    let start = history.len().saturating_sub(8);
    let recent = &history[start..];
    if recent.len() < 4 {
        return false;
    }
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for h in recent {
        *counts.entry(h.tool.as_str()).or_insert(0) += 1;
    }
    counts.values().any(|&c| c >= 4)
}

fn match_privilege_chain(history: &[HistoryEntry]) -> bool {
    const ELEVATED: [&str; 5] = ["shell", "exec", "run_code", "file_write", "http_request"];
    let start = history.len().saturating_sub(8);
    let mut cred_phase = false;
    for h in &history[start..] {
        if h.policy_ids.iter().any(|p| p.contains("credential")) {
            cred_phase = true;
        } else if cred_phase && ELEVATED.contains(&h.tool.as_str()) {
            return true;
        }
    }
    false
}

fn match_verification_evasion(history: &[HistoryEntry]) -> bool {
    let start = history.len().saturating_sub(10);
    let recent = &history[start..];
    let blocked_tools: HashSet<&str> = recent
        .iter()
        .filter(|h| h.decision == Decision::Block)
        .map(|h| h.tool.as_str())
        .collect();
    if blocked_tools.is_empty() {
        return false;
    }
    let family = |tool: &str| -> &'static [&'static str] {
        match tool {
            "shell" => &["exec", "run_code", "subprocess", "system"],
            "exec" => &["shell", "run_code", "subprocess", "system"],
            "file_write" => &["file_append", "file_create", "file_modify"],
            "http_request" => &["browser_open", "fetch", "curl", "wget"],
            "messaging_send" => &["email_send", "slack_post", "notify"],
            _ => &[],
        }
    };
    for h in recent {
        if h.decision != Decision::Block {
            for &blocked in &blocked_tools {
                if family(blocked).contains(&h.tool.as_str()) && h.tool != blocked {
                    return true;
                }
            }
        }
    }
    false
}

fn match_high_block_rate(history: &[HistoryEntry]) -> bool {
    if history.len() < 4 {
        return false;
    }
    let start = history.len().saturating_sub(8);
    let window = &history[start..];
    let blocked = window.iter().filter(|h| h.decision == Decision::Block).count();
    (blocked as f64) / (window.len().min(8) as f64) > 0.5
}

const PATTERNS: &[ChainPattern] = &[
    ChainPattern {
        name: "browse-then-exfil",
        description: "External HTTP browsing followed by outbound messaging — possible data exfiltration chain",
        boost: 35,
        min_actions: 2,
        matches: match_browse_then_exfil,
    },
    ChainPattern {
        name: "read-write-exec",
        description: "File read → file write → shell execution — classic lateral movement pattern",
        boost: 45,
        min_actions: 3,
        matches: match_read_write_exec,
    },
    ChainPattern {
        name: "repeated-scope-probing",
        description: "Multiple scope violations in this session — agent is probing permission boundaries",
        boost: 60,
        min_actions: 2,
        matches: match_repeated_scope_probing,
    },
    ChainPattern {
        name: "credential-then-http",
        description: "Credential access followed by external HTTP — possible exfiltration in progress",
        boost: 55,
        min_actions: 2,
        matches: match_credential_then_http,
    },
    ChainPattern {
        name: "rapid-tool-switching",
        description: "Agent switching between high-risk tool categories rapidly — automated attack pattern",
        boost: 30,
        min_actions: 3,
        matches: match_rapid_tool_switching,
    },
    ChainPattern {
        name: "block-bypass-retry",
        description: "Agent retrying previously blocked tools — attempting to find unguarded execution path",
        boost: 40,
        min_actions: 2,
        matches: match_block_bypass_retry,
    },
    ChainPattern {
        name: "escalating-risk",
        description: "Monotonically increasing risk severity across session — systematic boundary testing",
        boost: 50,
        min_actions: 5,
        matches: match_escalating_risk,
    },
    ChainPattern {
        name: "argument-mutation",
        description: "Same tool invoked 4+ times in 8 actions — possible argument mutation to evade policies",
        boost: 45,
        min_actions: 4,
        matches: match_argument_mutation,
    },
    ChainPattern {
        name: "privilege-chain",
        description: "Credential access followed by elevated tool use — privilege escalation chain",
        boost: 65,
        min_actions: 2,
        matches: match_privilege_chain,
    },
    ChainPattern {
        name: "verification-evasion",
        description: "Agent switching to related tools after block — lateral evasion of governance",
        boost: 55,
        min_actions: 3,
        matches: match_verification_evasion,
    },
    ChainPattern {
        name: "high-block-rate",
        description: "Over 50% of recent actions blocked — agent persistently violating governance",
        boost: 50,
        min_actions: 4,
        matches: match_high_block_rate,
    },
];

/// Evaluates the fixed chain-pattern catalogue against session history (C4).
pub struct ChainAnalyser;

impl ChainAnalyser {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate patterns in descending boost order; the first whose
    /// history length reaches `min_actions` and whose predicate matches
    /// wins. A panicking predicate is treated as non-match — this is
    /// enforced with `catch_unwind` since no single malformed pattern may
    /// crash an evaluation.
    pub fn check(&self, history: &[HistoryEntry]) -> Option<ChainMatch> {
        if history.is_empty() {
            return None;
        }
        let mut ordered: Vec<&ChainPattern> = PATTERNS.iter().collect();
        ordered.sort_by(|a, b| b.boost.cmp(&a.boost));

        for pattern in ordered {
            if history.len() < pattern.min_actions {
                continue;
            }
            let fired = std::panic::catch_unwind(|| (pattern.matches)(history)).unwrap_or(false);
            if fired {
                let start = history.len().saturating_sub(5);
                let recent: Vec<&str> = history[start..].iter().map(|h| h.tool.as_str()).collect();
                let evidence = format!(
                    "Last {} tools: {}. Session depth: {} actions.",
                    recent.len(),
                    recent.join(" → "),
                    history.len()
                );
                return Some(ChainMatch {
                    pattern: pattern.name.to_string(),
                    description: pattern.description.to_string(),
                    boost: pattern.boost,
                    evidence,
                });
            }
        }
        None
    }
}

impl Default for ChainAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(tool: &str, decision: Decision, policy_ids: &[&str]) -> HistoryEntry {
        HistoryEntry {
            agent_id: "agent-1".to_string(),
            session_id: Some("sess-1".to_string()),
            tool: tool.to_string(),
            decision,
            risk_score: 10,
            policy_ids: policy_ids.iter().map(|s| s.to_string()).collect(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn empty_history_never_fires() {
        assert!(ChainAnalyser::new().check(&[]).is_none());
    }

    #[test]
    fn browse_then_exfil_fires_on_http_then_messaging() {
        let history = vec![
            entry("http_request", Decision::Allow, &[]),
            entry("messaging_send", Decision::Review, &[]),
        ];
        let result = ChainAnalyser::new().check(&history).unwrap();
        assert_eq!(result.pattern, "browse-then-exfil");
        assert_eq!(result.boost, 35);
    }

    #[test]
    fn short_history_below_min_actions_does_not_fire_repeated_scope_probing() {
        let history = vec![entry("deploy_contract", Decision::Block, &["scope-violation"])];
        assert!(ChainAnalyser::new().check(&history).is_none());
    }

    #[test]
    fn privilege_chain_outranks_browse_then_exfil() {
        let history = vec![
            entry("read_secret", Decision::Allow, &["credential-access"]),
            entry("shell", Decision::Allow, &[]),
            entry("http_request", Decision::Allow, &[]),
            entry("messaging_send", Decision::Review, &[]),
        ];
        let result = ChainAnalyser::new().check(&history).unwrap();
        assert_eq!(result.pattern, "privilege-chain");
    }

    #[test]
    fn high_block_rate_requires_minimum_four_actions() {
        let history = vec![
            entry("shell", Decision::Block, &[]),
            entry("shell", Decision::Block, &[]),
            entry("shell", Decision::Block, &[]),
        ];
        assert!(ChainAnalyser::new().check(&history).is_none());
    }
}
