use sentrion_types::ActionRequest;

const HIGH_RISK_TOOLS: &[&str] = &["shell", "exec", "run_code"];
const MEDIUM_RISK_TOOLS: &[&str] = &["http_request", "browser_open", "file_write"];
const SENSITIVE_KEYWORDS: &[&str] = &[
    "delete",
    "destroy",
    "wipe",
    "format",
    "shutdown",
    "privileged",
    "root",
    "sudo",
    "credential",
    "api key",
    "secret",
    "password",
    "private key",
    "access token",
];
const RECIPIENT_ARG_KEYS: &[&str] = &["to", "cc", "bcc", "recipients"];

/// Heuristic 0-100 risk scorer (C5). Explicitly not a trained model — the
/// "neuro" name is historical; this is pure arithmetic over tool class,
/// recipient cardinality, and keyword hits.
pub struct NeuralScorer;

impl NeuralScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn estimate(&self, request: &ActionRequest) -> u8 {
        let mut candidates = vec![tool_class_score(&request.tool)];
        candidates.push(recipient_cardinality_score(request));
        candidates.push(keyword_hit_score(request));
        candidates.into_iter().max().unwrap_or(0).min(100)
    }
}

impl Default for NeuralScorer {
    fn default() -> Self {
        Self::new()
    }
}

fn tool_class_score(tool: &str) -> u8 {
    if tool.starts_with("surge_") {
        70
    } else if HIGH_RISK_TOOLS.contains(&tool) {
        40
    } else if MEDIUM_RISK_TOOLS.contains(&tool) {
        20
    } else {
        0
    }
}

fn recipient_cardinality_score(request: &ActionRequest) -> u8 {
    let count: usize = RECIPIENT_ARG_KEYS
        .iter()
        .filter_map(|key| request.args.get(*key))
        .map(|value| match value {
            serde_json::Value::Array(items) => items.len(),
            serde_json::Value::String(s) => {
                if s.is_empty() {
                    0
                } else {
                    1
                }
            }
            _ => 0,
        })
        .sum();
    if count >= 50 {
        80
    } else if count >= 10 {
        60
    } else {
        0
    }
}

fn keyword_hit_score(request: &ActionRequest) -> u8 {
    let flattened = request.flatten().to_lowercase();
    let hits = SENSITIVE_KEYWORDS
        .iter()
        .filter(|kw| flattened.contains(*kw))
        .count();
    if hits >= 3 {
        80
    } else if hits >= 1 {
        60
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(tool: &str, args: HashMap<String, serde_json::Value>) -> ActionRequest {
        ActionRequest {
            tool: tool.to_string(),
            args,
            context: None,
            prompt: None,
        }
    }

    #[test]
    fn surge_prefixed_tools_score_seventy() {
        let scorer = NeuralScorer::new();
        assert_eq!(scorer.estimate(&request("surge_transfer_ownership", HashMap::new())), 70);
    }

    #[test]
    fn high_recipient_cardinality_dominates() {
        let scorer = NeuralScorer::new();
        let mut args = HashMap::new();
        let recipients: Vec<serde_json::Value> =
            (0..60).map(|i| serde_json::json!(format!("user{i}@example.com"))).collect();
        args.insert("to".to_string(), serde_json::Value::Array(recipients));
        assert_eq!(scorer.estimate(&request("messaging_send", args)), 80);
    }

    #[test]
    fn three_or_more_keyword_hits_score_eighty() {
        let scorer = NeuralScorer::new();
        let mut args = HashMap::new();
        args.insert(
            "note".to_string(),
            serde_json::json!("need the root credential and api key to wipe the volume"),
        );
        assert_eq!(scorer.estimate(&request("file_write", args)), 80);
    }

    #[test]
    fn benign_request_scores_zero() {
        let scorer = NeuralScorer::new();
        assert_eq!(scorer.estimate(&request("fetch_price", HashMap::new())), 0);
    }
}
