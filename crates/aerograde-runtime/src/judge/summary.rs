//! The evidence summary handed to the LLM judge.
//!
//! The judge never sees the raw model reply, only this structured summary:
//! atoms grouped by verifier family with per-severity counts, the protocol
//! result, and the error scores when gold was available. Serialization is
//! canonical (ordered maps), because the cache key is a hash of these bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use aerograde_core::protocol::{FieldCompleteness, ParsingResult, ProtocolResult};
use aerograde_core::scoring::ConditionalError;
use aerograde_core::{EvidencePack, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub pass: bool,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeSummary {
    pub critical_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
    pub pass_count: usize,
    pub fail_count: usize,
    pub atoms: Vec<AtomSummary>,
}

/// Everything the judge is allowed to see about one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub parsing: ParsingResult,
    pub field_completeness: FieldCompleteness,
    pub evidence_by_type: BTreeMap<String, TypeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditional_error: Option<ConditionalError>,
}

impl EvidenceSummary {
    pub fn build(
        evidence: &EvidencePack,
        protocol: &ProtocolResult,
        conditional_error: Option<&ConditionalError>,
    ) -> Self {
        let mut evidence_by_type: BTreeMap<String, TypeSummary> = BTreeMap::new();

        for atom in evidence.atoms() {
            let entry = evidence_by_type
                .entry(atom.evidence_type.as_str().to_string())
                .or_default();
            match atom.severity {
                Severity::Critical => entry.critical_count += 1,
                Severity::Warning => entry.warning_count += 1,
                Severity::Info => entry.info_count += 1,
            }
            if atom.pass {
                entry.pass_count += 1;
            } else {
                entry.fail_count += 1;
            }
            entry.atoms.push(AtomSummary {
                id: atom.id.clone(),
                field: atom.field.clone(),
                pass: atom.pass,
                severity: atom.severity,
                message: atom.message.clone(),
            });
        }

        EvidenceSummary {
            parsing: protocol.parsing.clone(),
            field_completeness: protocol.field_completeness.clone(),
            evidence_by_type,
            conditional_error: conditional_error.cloned(),
        }
    }

    /// Canonical JSON bytes; the cache key is a hash over these.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
