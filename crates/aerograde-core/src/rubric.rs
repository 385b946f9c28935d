//! The five-dimension, four-grade rubric.
//!
//! The rubric is a fixed protocol, not a tuning surface: grade → score is
//! exactly {A: 1.0, B: 0.75, C: 0.5, D: 0.0}, the overall score is the
//! arithmetic mean over the five dimensions, and each dimension's grade
//! ladder is expressed as maximum failure ratios over evidence populations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::evidence::EvidenceType;

/// Letter grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl Grade {
    /// Best to worst, the order the adjudicator tries them in.
    pub const LADDER: [Grade; 4] = [Grade::A, Grade::B, Grade::C, Grade::D];

    /// Fixed grade → score protocol.
    pub fn score(self) -> f64 {
        match self {
            Grade::A => 1.0,
            Grade::B => 0.75,
            Grade::C => 0.5,
            Grade::D => 0.0,
        }
    }

    /// Synthesize a letter from a mean dimension score in [0, 1] using the
    /// midpoints between adjacent grade scores: {0.875, 0.625, 0.25}.
    pub fn from_mean_score(mean: f64) -> Grade {
        if mean >= 0.875 {
            Grade::A
        } else if mean >= 0.625 {
            Grade::B
        } else if mean >= 0.25 {
            Grade::C
        } else {
            Grade::D
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        }
    }

    pub fn parse(s: &str) -> Option<Grade> {
        match s.trim() {
            "A" => Some(Grade::A),
            "B" => Some(Grade::B),
            "C" => Some(Grade::C),
            "D" => Some(Grade::D),
            _ => None,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluation dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    ProtocolSchema,
    FieldValidity,
    PhysicsConsistency,
    SafetyConstraint,
    PredictiveQuality,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::ProtocolSchema,
        Dimension::FieldValidity,
        Dimension::PhysicsConsistency,
        Dimension::SafetyConstraint,
        Dimension::PredictiveQuality,
    ];

    /// Stable wire name used in records and judge prompts.
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::ProtocolSchema => "protocol_schema_compliance",
            Dimension::FieldValidity => "field_validity_local_dynamics",
            Dimension::PhysicsConsistency => "physics_cross_field_consistency",
            Dimension::SafetyConstraint => "safety_constraint_satisfaction",
            Dimension::PredictiveQuality => "predictive_quality_reliability",
        }
    }

    pub fn parse(s: &str) -> Option<Dimension> {
        Dimension::ALL.into_iter().find(|d| d.as_str() == s)
    }

    /// The verifier families whose evidence populates this dimension.
    pub fn evidence_types(self) -> &'static [EvidenceType] {
        match self {
            Dimension::ProtocolSchema => &[EvidenceType::NumericValidity],
            Dimension::FieldValidity => &[EvidenceType::RangeSanity, EvidenceType::JumpDynamics],
            Dimension::PhysicsConsistency => &[
                EvidenceType::CrossFieldConsistency,
                EvidenceType::PhysicsConstraint,
            ],
            Dimension::SafetyConstraint => &[EvidenceType::SafetyConstraint],
            Dimension::PredictiveQuality => &[],
        }
    }

    /// The dimension an evidence family attributes to.
    pub fn for_evidence(evidence_type: EvidenceType) -> Dimension {
        match evidence_type {
            EvidenceType::NumericValidity => Dimension::ProtocolSchema,
            EvidenceType::RangeSanity | EvidenceType::JumpDynamics => Dimension::FieldValidity,
            EvidenceType::CrossFieldConsistency | EvidenceType::PhysicsConstraint => {
                Dimension::PhysicsConsistency
            }
            EvidenceType::SafetyConstraint => Dimension::SafetyConstraint,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One grade's evidence requirements within a dimension.
#[derive(Debug, Clone, Copy)]
pub struct GradeRequirements {
    /// Max fail/(pass+fail) ratio per evidence family. Empty populations
    /// trivially satisfy the bound.
    pub max_failure_rates: &'static [(EvidenceType, f64)],
    /// Required parsing.success value, if constrained.
    pub parsing_success: Option<bool>,
    /// Minimum completeness rate in percent, if constrained.
    pub min_completeness: Option<f64>,
}

/// Look up the requirements for (dimension, grade).
///
/// `PredictiveQuality` has no ladder: its score is computed directly from
/// the error curves and this returns `None`.
pub fn requirements(dimension: Dimension, grade: Grade) -> Option<GradeRequirements> {
    use EvidenceType::*;
    use Grade::*;

    let req = match (dimension, grade) {
        (Dimension::ProtocolSchema, A) => GradeRequirements {
            max_failure_rates: &[(NumericValidity, 0.0)],
            parsing_success: Some(true),
            min_completeness: Some(100.0),
        },
        (Dimension::ProtocolSchema, B) => GradeRequirements {
            max_failure_rates: &[(NumericValidity, 0.05)],
            parsing_success: Some(true),
            min_completeness: Some(100.0),
        },
        (Dimension::ProtocolSchema, C) => GradeRequirements {
            max_failure_rates: &[(NumericValidity, 0.15)],
            parsing_success: Some(true),
            min_completeness: Some(90.0),
        },
        (Dimension::ProtocolSchema, D) => GradeRequirements {
            max_failure_rates: &[(NumericValidity, 1.0)],
            parsing_success: None,
            min_completeness: None,
        },

        (Dimension::FieldValidity, A) => GradeRequirements {
            max_failure_rates: &[(RangeSanity, 0.0), (JumpDynamics, 0.0)],
            parsing_success: None,
            min_completeness: None,
        },
        (Dimension::FieldValidity, B) => GradeRequirements {
            max_failure_rates: &[(RangeSanity, 0.05), (JumpDynamics, 0.05)],
            parsing_success: None,
            min_completeness: None,
        },
        (Dimension::FieldValidity, C) => GradeRequirements {
            max_failure_rates: &[(RangeSanity, 0.15), (JumpDynamics, 0.15)],
            parsing_success: None,
            min_completeness: None,
        },
        (Dimension::FieldValidity, D) => GradeRequirements {
            max_failure_rates: &[(RangeSanity, 1.0), (JumpDynamics, 1.0)],
            parsing_success: None,
            min_completeness: None,
        },

        (Dimension::PhysicsConsistency, A) => GradeRequirements {
            max_failure_rates: &[(CrossFieldConsistency, 0.0), (PhysicsConstraint, 0.0)],
            parsing_success: None,
            min_completeness: None,
        },
        (Dimension::PhysicsConsistency, B) => GradeRequirements {
            max_failure_rates: &[(CrossFieldConsistency, 0.10), (PhysicsConstraint, 0.10)],
            parsing_success: None,
            min_completeness: None,
        },
        (Dimension::PhysicsConsistency, C) => GradeRequirements {
            max_failure_rates: &[(CrossFieldConsistency, 0.25), (PhysicsConstraint, 0.25)],
            parsing_success: None,
            min_completeness: None,
        },
        (Dimension::PhysicsConsistency, D) => GradeRequirements {
            max_failure_rates: &[(CrossFieldConsistency, 1.0), (PhysicsConstraint, 1.0)],
            parsing_success: None,
            min_completeness: None,
        },

        (Dimension::SafetyConstraint, A) => GradeRequirements {
            max_failure_rates: &[(SafetyConstraint, 0.0)],
            parsing_success: None,
            min_completeness: None,
        },
        (Dimension::SafetyConstraint, B) => GradeRequirements {
            max_failure_rates: &[(SafetyConstraint, 0.10)],
            parsing_success: None,
            min_completeness: None,
        },
        (Dimension::SafetyConstraint, C) => GradeRequirements {
            max_failure_rates: &[(SafetyConstraint, 0.25)],
            parsing_success: None,
            min_completeness: None,
        },
        (Dimension::SafetyConstraint, D) => GradeRequirements {
            max_failure_rates: &[(SafetyConstraint, 1.0)],
            parsing_success: None,
            min_completeness: None,
        },

        (Dimension::PredictiveQuality, _) => return None,
    };
    Some(req)
}

/// Render the rubric as prompt text for the LLM adjudicator.
pub fn rubric_text() -> String {
    let mut out = String::new();
    for dimension in Dimension::ALL {
        out.push_str(&format!("### {}\n", dimension.as_str()));
        if dimension == Dimension::PredictiveQuality {
            out.push_str(
                "Computed from prediction error against the reference state: MAE and RMSE \
                 are each mapped to a 0-100 score by fixed piecewise-linear curves and \
                 averaged. Grade A requires both scores >= 90, B >= 70, C >= 50, else D. \
                 Without reference data the score is 0 and the grade is D.\n\n",
            );
            continue;
        }
        for grade in Grade::LADDER {
            let req = requirements(dimension, grade).expect("laddered dimension");
            let mut parts: Vec<String> = req
                .max_failure_rates
                .iter()
                .map(|(t, r)| format!("{} failure ratio <= {:.2}", t, r))
                .collect();
            if let Some(success) = req.parsing_success {
                parts.push(format!("parsing success = {}", success));
            }
            if let Some(rate) = req.min_completeness {
                parts.push(format!("field completeness >= {:.0}%", rate));
            }
            out.push_str(&format!("- Grade {}: {}\n", grade, parts.join("; ")));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_score_protocol_is_fixed() {
        assert_eq!(Grade::A.score(), 1.0);
        assert_eq!(Grade::B.score(), 0.75);
        assert_eq!(Grade::C.score(), 0.5);
        assert_eq!(Grade::D.score(), 0.0);
    }

    #[test]
    fn overall_grade_midpoints() {
        assert_eq!(Grade::from_mean_score(1.0), Grade::A);
        assert_eq!(Grade::from_mean_score(0.875), Grade::A);
        assert_eq!(Grade::from_mean_score(0.874), Grade::B);
        assert_eq!(Grade::from_mean_score(0.625), Grade::B);
        assert_eq!(Grade::from_mean_score(0.624), Grade::C);
        assert_eq!(Grade::from_mean_score(0.25), Grade::C);
        assert_eq!(Grade::from_mean_score(0.249), Grade::D);
    }

    #[test]
    fn every_laddered_dimension_has_four_grades() {
        for dimension in Dimension::ALL {
            if dimension == Dimension::PredictiveQuality {
                assert!(requirements(dimension, Grade::A).is_none());
                continue;
            }
            for grade in Grade::LADDER {
                assert!(requirements(dimension, grade).is_some());
            }
        }
    }

    #[test]
    fn grade_d_is_always_satisfiable() {
        // D's ratio bound is 1.0 with no protocol constraints, so it can
        // never be failed; the adjudicator's default is reachable.
        for dimension in Dimension::ALL {
            if let Some(req) = requirements(dimension, Grade::D) {
                assert!(req.max_failure_rates.iter().all(|(_, r)| *r >= 1.0));
                assert!(req.parsing_success.is_none());
                assert!(req.min_completeness.is_none());
            }
        }
    }

    #[test]
    fn dimension_wire_names_round_trip() {
        for dimension in Dimension::ALL {
            assert_eq!(Dimension::parse(dimension.as_str()), Some(dimension));
        }
    }

    #[test]
    fn rubric_text_mentions_every_dimension() {
        let text = rubric_text();
        for dimension in Dimension::ALL {
            assert!(text.contains(dimension.as_str()));
        }
    }
}
