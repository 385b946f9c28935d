//! Evidence atoms and the per-sample evidence pack.
//!
//! Every check a verifier performs emits a typed, traceable atom. Atoms are
//! immutable once pushed; the pack assigns dense, insertion-ordered IDs so
//! that adjudicators and reports can cite them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Verifier family that produced an atom. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    NumericValidity,
    RangeSanity,
    JumpDynamics,
    CrossFieldConsistency,
    PhysicsConstraint,
    SafetyConstraint,
}

impl EvidenceType {
    /// All evidence types, in verifier-graph order.
    pub const ALL: [EvidenceType; 6] = [
        EvidenceType::NumericValidity,
        EvidenceType::RangeSanity,
        EvidenceType::JumpDynamics,
        EvidenceType::CrossFieldConsistency,
        EvidenceType::PhysicsConstraint,
        EvidenceType::SafetyConstraint,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EvidenceType::NumericValidity => "numeric_validity",
            EvidenceType::RangeSanity => "range_sanity",
            EvidenceType::JumpDynamics => "jump_dynamics",
            EvidenceType::CrossFieldConsistency => "cross_field_consistency",
            EvidenceType::PhysicsConstraint => "physics_constraint",
            EvidenceType::SafetyConstraint => "safety_constraint",
        }
    }
}

impl fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a failing atom is. Passing atoms are always `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// What an atom is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Field,
    Sample,
    CrossField,
}

/// The smallest traceable verification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceAtom {
    /// Dense per-sample ID, e.g. `EVID_0007`.
    pub id: String,
    #[serde(rename = "type")]
    pub evidence_type: EvidenceType,
    /// Field name, possibly indexed (`GPS Altitude (WGS84 ft)[2]`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub pass: bool,
    pub severity: Severity,
    pub scope: Scope,
    pub message: String,
    /// Checker name, rule name, threshold, observed value, timestep, ...
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
    /// Optional fine-grained score in {0.0, 0.25, 0.5, 0.75, 1.0}.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl EvidenceAtom {
    /// The pass/severity invariant: pass ⇒ info, fail ⇒ warning|critical.
    pub fn severity_consistent(&self) -> bool {
        if self.pass {
            self.severity == Severity::Info
        } else {
            matches!(self.severity, Severity::Warning | Severity::Critical)
        }
    }

    pub fn is_critical_failure(&self) -> bool {
        !self.pass && self.severity == Severity::Critical
    }
}

/// An atom without an ID yet. Verifiers build drafts; the pack assigns IDs
/// at insertion so IDs stay dense even when a verifier's output is replaced.
#[derive(Debug, Clone)]
pub struct AtomDraft {
    pub evidence_type: EvidenceType,
    pub field: Option<String>,
    pub pass: bool,
    pub severity: Severity,
    pub scope: Scope,
    pub message: String,
    pub meta: BTreeMap<String, Value>,
    pub score: Option<f64>,
}

impl AtomDraft {
    /// A passing atom. Severity is fixed to `Info`.
    pub fn pass(evidence_type: EvidenceType, message: impl Into<String>) -> Self {
        Self {
            evidence_type,
            field: None,
            pass: true,
            severity: Severity::Info,
            scope: Scope::Field,
            message: message.into(),
            meta: BTreeMap::new(),
            score: None,
        }
    }

    /// A failing atom. `severity` must be `Warning` or `Critical`; an `Info`
    /// failure would break the severity invariant and is promoted.
    pub fn fail(evidence_type: EvidenceType, severity: Severity, message: impl Into<String>) -> Self {
        let severity = if severity == Severity::Info {
            Severity::Warning
        } else {
            severity
        };
        Self {
            evidence_type,
            field: None,
            pass: false,
            severity,
            scope: Scope::Field,
            message: message.into(),
            meta: BTreeMap::new(),
            score: None,
        }
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// Per-sample, insertion-ordered evidence sequence with ID assignment and
/// type/field indexing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidencePack {
    atoms: Vec<EvidenceAtom>,
    #[serde(skip)]
    next_id: u32,
}

impl EvidencePack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next dense ID and append.
    pub fn push(&mut self, draft: AtomDraft) -> &EvidenceAtom {
        self.next_id += 1;
        let atom = EvidenceAtom {
            id: format!("EVID_{:04}", self.next_id),
            evidence_type: draft.evidence_type,
            field: draft.field,
            pass: draft.pass,
            severity: draft.severity,
            scope: draft.scope,
            message: draft.message,
            meta: draft.meta,
            score: draft.score,
        };
        self.atoms.push(atom);
        self.atoms.last().unwrap()
    }

    pub fn extend(&mut self, drafts: impl IntoIterator<Item = AtomDraft>) {
        for draft in drafts {
            self.push(draft);
        }
    }

    pub fn atoms(&self) -> &[EvidenceAtom] {
        &self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn by_type(&self, evidence_type: EvidenceType) -> impl Iterator<Item = &EvidenceAtom> {
        self.atoms.iter().filter(move |a| a.evidence_type == evidence_type)
    }

    pub fn by_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a EvidenceAtom> {
        self.atoms.iter().filter(move |a| {
            a.field
                .as_deref()
                .is_some_and(|f| f == field || f.strip_suffix(']').and_then(|p| p.split_once('[')).map(|(base, _)| base) == Some(field))
        })
    }

    pub fn critical_failures(&self) -> impl Iterator<Item = &EvidenceAtom> {
        self.atoms.iter().filter(|a| a.is_critical_failure())
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.atoms.iter().any(|a| a.id == id)
    }

    /// fail / (pass + fail) over atoms of one type; `None` when no atoms.
    pub fn failure_ratio(&self, evidence_type: EvidenceType) -> Option<f64> {
        let mut pass = 0usize;
        let mut fail = 0usize;
        for atom in self.by_type(evidence_type) {
            if atom.pass {
                pass += 1;
            } else {
                fail += 1;
            }
        }
        let total = pass + fail;
        if total == 0 {
            None
        } else {
            Some(fail as f64 / total as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_insertion_ordered() {
        let mut pack = EvidencePack::new();
        pack.push(AtomDraft::pass(EvidenceType::NumericValidity, "ok"));
        pack.push(AtomDraft::fail(
            EvidenceType::RangeSanity,
            Severity::Warning,
            "out of range",
        ));
        pack.push(AtomDraft::pass(EvidenceType::JumpDynamics, "ok"));

        let ids: Vec<&str> = pack.atoms().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["EVID_0001", "EVID_0002", "EVID_0003"]);
    }

    #[test]
    fn severity_invariant_holds_for_constructors() {
        let pass = AtomDraft::pass(EvidenceType::SafetyConstraint, "fine");
        let fail = AtomDraft::fail(EvidenceType::SafetyConstraint, Severity::Critical, "bad");
        // An accidental info failure is promoted to warning.
        let promoted = AtomDraft::fail(EvidenceType::SafetyConstraint, Severity::Info, "bad");

        let mut pack = EvidencePack::new();
        pack.push(pass);
        pack.push(fail);
        pack.push(promoted);
        assert!(pack.atoms().iter().all(|a| a.severity_consistent()));
        assert_eq!(pack.atoms()[2].severity, Severity::Warning);
    }

    #[test]
    fn failure_ratio_counts_only_that_type() {
        let mut pack = EvidencePack::new();
        pack.push(AtomDraft::pass(EvidenceType::NumericValidity, "ok"));
        pack.push(AtomDraft::pass(EvidenceType::NumericValidity, "ok"));
        pack.push(AtomDraft::fail(
            EvidenceType::NumericValidity,
            Severity::Critical,
            "NaN",
        ));
        pack.push(AtomDraft::fail(
            EvidenceType::SafetyConstraint,
            Severity::Warning,
            "overspeed",
        ));

        let ratio = pack.failure_ratio(EvidenceType::NumericValidity).unwrap();
        assert!((ratio - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(pack.failure_ratio(EvidenceType::PhysicsConstraint), None);
    }

    #[test]
    fn by_field_matches_indexed_names() {
        let mut pack = EvidencePack::new();
        pack.push(
            AtomDraft::pass(EvidenceType::NumericValidity, "ok")
                .field("GPS Altitude (WGS84 ft)[2]"),
        );
        pack.push(AtomDraft::pass(EvidenceType::NumericValidity, "ok").field("Pitch (deg)"));

        assert_eq!(pack.by_field("GPS Altitude (WGS84 ft)").count(), 1);
        assert_eq!(pack.by_field("Pitch (deg)").count(), 1);
        assert_eq!(pack.by_field("Roll (deg)").count(), 0);
    }
}
