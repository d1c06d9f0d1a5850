use sentrion_types::{Decision, Severity};

/// Derives escalation severity from risk, decision, and whether a
/// behavioural chain pattern fired.
pub fn compute_severity(risk_score: u8, decision: Decision, chain_pattern: Option<&str>) -> Severity {
    if decision == Decision::Block && risk_score >= 90 {
        return Severity::Critical;
    }
    if decision == Decision::Block || risk_score >= 80 {
        return Severity::High;
    }
    if chain_pattern.is_some() || risk_score >= 50 {
        return Severity::Medium;
    }
    Severity::Low
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_critical_risk_is_critical() {
        assert_eq!(compute_severity(92, Decision::Block, None), Severity::Critical);
    }

    #[test]
    fn any_block_below_ninety_is_high() {
        assert_eq!(compute_severity(50, Decision::Block, None), Severity::High);
    }

    #[test]
    fn chain_pattern_alone_promotes_to_medium() {
        assert_eq!(compute_severity(10, Decision::Review, Some("rapid-tool-switching")), Severity::Medium);
    }

    #[test]
    fn benign_allow_is_low() {
        assert_eq!(compute_severity(5, Decision::Allow, None), Severity::Low);
    }
}
