//! Gating: turning evidence into an eligibility verdict.
//!
//! Gating is a pure function over the evidence pack and protocol summary.
//! It never short-circuits verification: the full evidence pack is always
//! collected first so the audit trail stays complete.

use crate::evidence::EvidencePack;
use crate::protocol::ProtocolResult;
use crate::record::Verdict;

/// Samples with fewer than this share of required fields (percent) are
/// ineligible regardless of evidence.
pub const MIN_COMPLETENESS_RATE: f64 = 80.0;

/// Eligibility verdict plus ordered human-readable reasons citing evidence.
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub verdict: Verdict,
    pub reasons: Vec<String>,
}

impl GateDecision {
    pub fn is_eligible(&self) -> bool {
        self.verdict == Verdict::Eligible
    }
}

/// Derive the verdict: ineligible on parse failure, low completeness, or
/// any critical-failing atom.
pub fn gate(evidence: &EvidencePack, protocol: &ProtocolResult) -> GateDecision {
    let mut reasons = Vec::new();

    if !protocol.parsing.success {
        let detail = protocol
            .parsing
            .error
            .as_deref()
            .unwrap_or("unknown parse failure");
        reasons.push(format!("reply did not parse: {}", detail));
    }

    let completeness = protocol.field_completeness.completeness_rate;
    if completeness < MIN_COMPLETENESS_RATE {
        reasons.push(format!(
            "field completeness {:.1}% below required {:.0}%",
            completeness, MIN_COMPLETENESS_RATE
        ));
    }

    let critical_ids: Vec<&str> = evidence
        .critical_failures()
        .map(|a| a.id.as_str())
        .collect();
    if !critical_ids.is_empty() {
        reasons.push(format!(
            "{} critical constraint violation(s): {}",
            critical_ids.len(),
            critical_ids.join(", ")
        ));
    }

    let verdict = if reasons.is_empty() {
        Verdict::Eligible
    } else {
        Verdict::Ineligible
    };

    GateDecision { verdict, reasons }
}
