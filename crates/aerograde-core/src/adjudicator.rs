//! The deterministic rule adjudicator.
//!
//! Maps evidence populations to grades by walking each dimension's ladder
//! best-first and taking the first grade whose requirements all hold. Also
//! builds the agent output block: checklist, verdict, and top-K attribution
//! with evidence citations.

use std::collections::BTreeMap;

use crate::evidence::{EvidencePack, EvidenceType, Severity};
use crate::gating::GateDecision;
use crate::protocol::ProtocolResult;
use crate::record::{
    AgentOutput, Attribution, ChecklistItem, ChecklistStatus, OptionalScores,
};
use crate::rubric::{requirements, Dimension, Grade};
use crate::scoring::ConditionalError;

/// Attribution is bounded to the five worst failure groups.
pub const TOP_K_ATTRIBUTION: usize = 5;

/// Pick the grade for one laddered dimension.
///
/// Grades are tried A→D; a grade matches iff every requirement holds.
/// Empty evidence populations trivially satisfy ratio bounds, and D is
/// always satisfiable, so this total function defaults to D.
pub fn determine_grade(
    dimension: Dimension,
    evidence: &EvidencePack,
    protocol: &ProtocolResult,
) -> Grade {
    for grade in Grade::LADDER {
        let Some(req) = requirements(dimension, grade) else {
            // Unladdered dimension: graded elsewhere.
            return Grade::D;
        };

        let mut matches = true;
        for &(evidence_type, max_rate) in req.max_failure_rates {
            if let Some(ratio) = evidence.failure_ratio(evidence_type) {
                if ratio > max_rate {
                    matches = false;
                    break;
                }
            }
        }
        if matches {
            if let Some(required) = req.parsing_success {
                if protocol.parsing.success != required {
                    matches = false;
                }
            }
        }
        if matches {
            if let Some(min_rate) = req.min_completeness {
                if protocol.field_completeness.completeness_rate < min_rate {
                    matches = false;
                }
            }
        }
        if matches {
            return grade;
        }
    }
    Grade::D
}

/// Grade all five dimensions and aggregate.
///
/// Predictive quality is scored directly from the error curves rather than
/// a grade ladder; its grade slot stays `None` under this adjudicator.
pub fn rule_scores(
    evidence: &EvidencePack,
    protocol: &ProtocolResult,
    conditional_error: Option<ConditionalError>,
) -> OptionalScores {
    let mut grade_vector: BTreeMap<String, Option<Grade>> = BTreeMap::new();
    let mut dimension_scores: BTreeMap<String, f64> = BTreeMap::new();

    for dimension in Dimension::ALL {
        if dimension == Dimension::PredictiveQuality {
            let score = conditional_error
                .as_ref()
                .map(|e| e.combined_score / 100.0)
                .unwrap_or(0.0);
            grade_vector.insert(dimension.as_str().to_string(), None);
            dimension_scores.insert(dimension.as_str().to_string(), score);
        } else {
            let grade = determine_grade(dimension, evidence, protocol);
            grade_vector.insert(dimension.as_str().to_string(), Some(grade));
            dimension_scores.insert(dimension.as_str().to_string(), grade.score());
        }
    }

    let mean = dimension_scores.values().sum::<f64>() / dimension_scores.len() as f64;

    OptionalScores {
        grade_vector,
        dimension_scores,
        overall_score: mean * 100.0,
        overall_grade: Grade::from_mean_score(mean),
        conditional_error,
    }
}

/// The fixed all-D score block for terminal records (transport or parse
/// failure) and for the LLM fallback path.
pub fn lowest_scores(conditional_error: Option<ConditionalError>) -> OptionalScores {
    let mut grade_vector: BTreeMap<String, Option<Grade>> = BTreeMap::new();
    let mut dimension_scores: BTreeMap<String, f64> = BTreeMap::new();
    for dimension in Dimension::ALL {
        grade_vector.insert(dimension.as_str().to_string(), Some(Grade::D));
        dimension_scores.insert(dimension.as_str().to_string(), Grade::D.score());
    }
    OptionalScores {
        grade_vector,
        dimension_scores,
        overall_score: 0.0,
        overall_grade: Grade::D,
        conditional_error,
    }
}

/// Build the checklist: one item per evidence family, bound to the atoms
/// that settled it.
pub fn build_checklist(evidence: &EvidencePack) -> Vec<ChecklistItem> {
    EvidenceType::ALL
        .iter()
        .enumerate()
        .map(|(i, &evidence_type)| {
            let atoms: Vec<_> = evidence.by_type(evidence_type).collect();
            let status = if atoms.is_empty() {
                ChecklistStatus::Unknown
            } else if atoms.iter().all(|a| a.pass) {
                ChecklistStatus::Pass
            } else {
                ChecklistStatus::Fail
            };
            ChecklistItem {
                item_id: format!("CHECK_{:03}", i + 1),
                constraint_id: evidence_type.as_str().to_uppercase(),
                evidence_ids: atoms.iter().map(|a| a.id.clone()).collect(),
                status,
            }
        })
        .collect()
}

/// Build the top-K attribution: failing atoms grouped by (type, field),
/// critical groups before warning groups, insertion order within each.
pub fn build_attribution(evidence: &EvidencePack) -> Vec<Attribution> {
    let mut groups: Vec<((EvidenceType, Option<String>), Vec<&crate::evidence::EvidenceAtom>)> =
        Vec::new();

    for severity in [Severity::Critical, Severity::Warning] {
        for atom in evidence.atoms().iter().filter(|a| !a.pass && a.severity == severity) {
            let key = (atom.evidence_type, atom.field.clone());
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(atom),
                None => groups.push((key, vec![atom])),
            }
        }
    }

    groups
        .into_iter()
        .take(TOP_K_ATTRIBUTION)
        .enumerate()
        .map(|(i, ((evidence_type, _field), members))| {
            let representative = members[0];
            Attribution {
                rank: i + 1,
                reason: representative.message.clone(),
                evidence_ids: members.iter().map(|a| a.id.clone()).collect(),
                severity: representative.severity,
                evidence_type,
                count: members.len(),
            }
        })
        .collect()
}

/// Assemble the agent-output block from gating and evidence.
pub fn build_agent_output(
    evidence: &EvidencePack,
    decision: &GateDecision,
    adjudicator: &str,
    adjudicator_meta: BTreeMap<String, serde_json::Value>,
) -> AgentOutput {
    AgentOutput {
        verdict: decision.verdict,
        gating_reasons: decision.reasons.clone(),
        attribution: build_attribution(evidence),
        checklist: build_checklist(evidence),
        adjudicator: adjudicator.to_string(),
        adjudicator_meta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::AtomDraft;
    use crate::parser::ParseOutcome;
    use crate::schema::{FieldMap, SCHEMA_FIELDS};
    use serde_json::json;

    fn complete_protocol() -> ProtocolResult {
        let mut map = FieldMap::new();
        for field in SCHEMA_FIELDS {
            map.insert(field, json!(0.0));
        }
        ProtocolResult::summarize(&ParseOutcome::Parsed(map))
    }

    fn pack_with(passes: usize, fails: usize, evidence_type: EvidenceType) -> EvidencePack {
        let mut pack = EvidencePack::new();
        for _ in 0..passes {
            pack.push(AtomDraft::pass(evidence_type, "ok"));
        }
        for _ in 0..fails {
            pack.push(AtomDraft::fail(evidence_type, Severity::Critical, "bad"));
        }
        pack
    }

    #[test]
    fn clean_evidence_grades_a() {
        let pack = pack_with(19, 0, EvidenceType::NumericValidity);
        assert_eq!(
            determine_grade(Dimension::ProtocolSchema, &pack, &complete_protocol()),
            Grade::A
        );
    }

    #[test]
    fn small_failure_ratio_steps_down_to_c() {
        // 1/19 ~ 5.3% exceeds the A (0%) and B (5%) bounds but stays within
        // C's 15%.
        let pack = pack_with(18, 1, EvidenceType::NumericValidity);
        assert_eq!(
            determine_grade(Dimension::ProtocolSchema, &pack, &complete_protocol()),
            Grade::C
        );
    }

    #[test]
    fn parse_failure_forces_protocol_d() {
        let pack = pack_with(19, 0, EvidenceType::NumericValidity);
        let protocol = ProtocolResult::failed("no JSON".to_string());
        assert_eq!(
            determine_grade(Dimension::ProtocolSchema, &pack, &protocol),
            Grade::D
        );
    }

    #[test]
    fn empty_population_satisfies_ratio_bounds() {
        let pack = EvidencePack::new();
        assert_eq!(
            determine_grade(Dimension::SafetyConstraint, &pack, &complete_protocol()),
            Grade::A
        );
    }

    #[test]
    fn safety_ladder_steps_with_ratio() {
        // 1 fail / 10 atoms = 10%: within B's bound.
        let pack = pack_with(9, 1, EvidenceType::SafetyConstraint);
        assert_eq!(
            determine_grade(Dimension::SafetyConstraint, &pack, &complete_protocol()),
            Grade::B
        );
        // 1 fail / 4 atoms = 25%: within C's bound.
        let pack = pack_with(3, 1, EvidenceType::SafetyConstraint);
        assert_eq!(
            determine_grade(Dimension::SafetyConstraint, &pack, &complete_protocol()),
            Grade::C
        );
        // 1 fail / 2 atoms = 50%: D.
        let pack = pack_with(1, 1, EvidenceType::SafetyConstraint);
        assert_eq!(
            determine_grade(Dimension::SafetyConstraint, &pack, &complete_protocol()),
            Grade::D
        );
    }

    #[test]
    fn rule_scores_average_the_five_dimensions() {
        let pack = EvidencePack::new();
        let scores = rule_scores(&pack, &complete_protocol(), None);
        // Four A dimensions at 1.0 plus predictive quality at 0.0 (no gold).
        assert!((scores.overall_score - 80.0).abs() < 1e-9);
        assert_eq!(scores.overall_grade, Grade::B);
        assert_eq!(
            scores.grade_vector[Dimension::PredictiveQuality.as_str()],
            None
        );
    }

    #[test]
    fn lowest_scores_are_all_d() {
        let scores = lowest_scores(None);
        assert_eq!(scores.overall_score, 0.0);
        assert_eq!(scores.overall_grade, Grade::D);
        assert!(scores
            .grade_vector
            .values()
            .all(|g| *g == Some(Grade::D)));
    }

    #[test]
    fn checklist_covers_every_family() {
        let pack = pack_with(2, 1, EvidenceType::RangeSanity);
        let checklist = build_checklist(&pack);
        assert_eq!(checklist.len(), 6);
        let range = checklist
            .iter()
            .find(|c| c.constraint_id == "RANGE_SANITY")
            .unwrap();
        assert_eq!(range.status, ChecklistStatus::Fail);
        assert_eq!(range.evidence_ids.len(), 3);
        let jump = checklist
            .iter()
            .find(|c| c.constraint_id == "JUMP_DYNAMICS")
            .unwrap();
        assert_eq!(jump.status, ChecklistStatus::Unknown);
    }

    #[test]
    fn attribution_ranks_critical_groups_first() {
        let mut pack = EvidencePack::new();
        pack.push(
            AtomDraft::fail(EvidenceType::RangeSanity, Severity::Warning, "warn range")
                .field("Pitch (deg)"),
        );
        pack.push(
            AtomDraft::fail(
                EvidenceType::SafetyConstraint,
                Severity::Critical,
                "rapid descent",
            )
            .field("Rapid_Descent"),
        );
        pack.push(
            AtomDraft::fail(
                EvidenceType::SafetyConstraint,
                Severity::Critical,
                "rapid descent again",
            )
            .field("Rapid_Descent"),
        );

        let attribution = build_attribution(&pack);
        assert_eq!(attribution.len(), 2);
        assert_eq!(attribution[0].severity, Severity::Critical);
        assert_eq!(attribution[0].count, 2);
        assert_eq!(attribution[0].evidence_type, EvidenceType::SafetyConstraint);
        assert_eq!(attribution[1].severity, Severity::Warning);
        assert_eq!(attribution[0].rank, 1);
    }

    #[test]
    fn attribution_is_bounded_to_top_k() {
        let mut pack = EvidencePack::new();
        for field in SCHEMA_FIELDS.iter().take(8) {
            pack.push(
                AtomDraft::fail(EvidenceType::RangeSanity, Severity::Critical, "bad")
                    .field(*field),
            );
        }
        assert_eq!(build_attribution(&pack).len(), TOP_K_ATTRIBUTION);
    }
}
